use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use gm_core::{Accrual, AccrualSource, Info, OrderNumber, SourceError, Status};

type Outcome = Result<(Status, Option<Accrual>), SourceError>;

#[derive(Debug, Default)]
struct Script {
    queued: HashMap<OrderNumber, VecDeque<Outcome>>,
    calls: Vec<OrderNumber>,
}

/// Accrual source that replays scripted outcomes per number.
///
/// Outcomes queued for a number are consumed in order; the last one keeps
/// repeating. A number with nothing scripted answers as unregistered
/// (`New`, no accrual). Every `load` is recorded.
#[derive(Debug, Default)]
pub struct ScriptedAccrualSource {
    script: Mutex<Script>,
}

impl ScriptedAccrualSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a successful answer for `number`.
    pub fn respond(&self, number: OrderNumber, status: Status, accrual: Option<Accrual>) -> &Self {
        self.push(number, Ok((status, accrual)))
    }

    /// Queue a failure for `number`.
    pub fn fail(&self, number: OrderNumber, err: SourceError) -> &Self {
        self.push(number, Err(err))
    }

    /// Every number loaded so far, in call order.
    pub fn calls(&self) -> Vec<OrderNumber> {
        self.lock().calls.clone()
    }

    pub fn calls_for(&self, number: OrderNumber) -> usize {
        self.lock().calls.iter().filter(|n| **n == number).count()
    }

    fn push(&self, number: OrderNumber, outcome: Outcome) -> &Self {
        self.lock().queued.entry(number).or_default().push_back(outcome);
        self
    }

    fn lock(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn next(&self, number: OrderNumber) -> Outcome {
        let mut script = self.lock();
        script.calls.push(number);
        match script.queued.get_mut(&number) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap_or(Ok((Status::New, None))),
            Some(queue) => queue.front().cloned().unwrap_or(Ok((Status::New, None))),
            None => Ok((Status::New, None)),
        }
    }
}

#[async_trait::async_trait]
impl AccrualSource for ScriptedAccrualSource {
    fn name(&self) -> &'static str {
        "accrual-scripted"
    }

    async fn load(&self, number: OrderNumber) -> Result<Info, SourceError> {
        let (status, accrual) = self.next(number)?;
        Ok(Info::new(number, status, accrual))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const N: OrderNumber = OrderNumber::new(18);

    #[tokio::test]
    async fn queue_drains_then_last_outcome_repeats() {
        let source = ScriptedAccrualSource::new();
        source
            .fail(N, SourceError::rate_limited(30))
            .respond(N, Status::Processing, None);

        assert!(source.load(N).await.is_err());
        for _ in 0..3 {
            assert_eq!(source.load(N).await.unwrap().status(), Status::Processing);
        }
        assert_eq!(source.calls_for(N), 4);
    }

    #[tokio::test]
    async fn unscripted_number_is_unregistered() {
        let source = ScriptedAccrualSource::new();
        let info = source.load(OrderNumber::new(26)).await.unwrap();
        assert_eq!(info.status(), Status::New);
        assert_eq!(info.accrual(), None);
        assert_eq!(source.calls(), vec![OrderNumber::new(26)]);
    }
}
