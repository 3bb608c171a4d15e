//! Randomised stand-in for the accrual service, for local runs without it.

use gm_core::{Accrual, AccrualSource, Info, OrderNumber, SourceError, Status};
use rand::Rng;

/// Statuses a real source can report for a purchase order.
const SOURCE_STATUSES: [Status; 4] = [
    Status::Registered,
    Status::Processing,
    Status::Invalid,
    Status::Processed,
];

/// Never fails. `Processed` answers carry an amount in `[1.00, 100.00)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct FakeAccrualSource;

impl FakeAccrualSource {
    fn roll(number: OrderNumber) -> Info {
        let mut rng = rand::thread_rng();
        let status = SOURCE_STATUSES[rng.gen_range(0..SOURCE_STATUSES.len())];
        let accrual = (status == Status::Processed)
            .then(|| Accrual::from_minor(rng.gen_range(100..10_000)));
        Info::new(number, status, accrual)
    }
}

#[async_trait::async_trait]
impl AccrualSource for FakeAccrualSource {
    fn name(&self) -> &'static str {
        "accrual-fake"
    }

    async fn load(&self, number: OrderNumber) -> Result<Info, SourceError> {
        Ok(Self::roll(number))
    }
}
