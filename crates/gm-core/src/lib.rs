//! gm-core
//!
//! Domain model for loyalty-order accrual tracking: order numbers and their
//! checksum, the order status state machine, exact point amounts, balance
//! derivation, and the capability traits the service layer is written
//! against.
//!
//! Pure logic. No IO, no runtime, no storage or transport types.

pub mod accrual;
pub mod error;
pub mod ids;
pub mod ledger;
pub mod number;
pub mod order;
pub mod ports;
pub mod status;

pub use accrual::{Accrual, AccrualParseError, MINOR_PER_UNIT};
pub use error::{
    ErrorKind, OrderConflict, SaveOrderError, SourceError, StorageError,
    DEFAULT_RETRY_AFTER_SECS,
};
pub use ids::{OrderId, UserId};
pub use ledger::{compute_balance, Balance};
pub use number::{is_valid_luhn, luhn_check_digit, NumberError, OrderNumber};
pub use order::{Info, Order, TransitionError, Update, WithdrawalOrderError};
pub use ports::{AccrualSource, OrderRepository};
pub use status::{Status, UnknownStatus};
