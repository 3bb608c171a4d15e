//! gm-service
//!
//! Request-driven operations over orders: submission, withdrawal, balance
//! and listings. The service holds its collaborators as trait objects and
//! never sees Postgres or HTTP.

mod error;
mod service;

pub use error::{SubmitError, WithdrawError};
pub use service::{LoadOutcome, OrderService};
