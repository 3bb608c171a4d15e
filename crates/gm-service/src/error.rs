use gm_core::{Accrual, ErrorKind, NumberError, OrderId, OrderNumber, SourceError, StorageError};
use thiserror::Error;

/// Why an order submission failed.
#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("malformed order number: {0:?}")]
    MalformedNumber(String),
    #[error("order number {0} fails the checksum")]
    InvalidNumber(OrderNumber),
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error("order number already registered by another user (order {existing})")]
    OwnedByAnother { existing: OrderId },
    #[error("storage did not echo order id {0}")]
    IdentityMismatch(OrderId),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl SubmitError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SubmitError::MalformedNumber(_) | SubmitError::InvalidNumber(_) => {
                ErrorKind::Validation
            }
            SubmitError::Source(e) => e.kind(),
            SubmitError::OwnedByAnother { .. } => ErrorKind::Conflict,
            SubmitError::IdentityMismatch(_) | SubmitError::Storage(_) => ErrorKind::Internal,
        }
    }
}

impl From<NumberError> for SubmitError {
    fn from(e: NumberError) -> Self {
        match e {
            NumberError::Malformed(raw) => SubmitError::MalformedNumber(raw),
            NumberError::Checksum(n) => SubmitError::InvalidNumber(n),
        }
    }
}

/// Why a withdrawal was refused.
#[derive(Debug, Error)]
pub enum WithdrawError {
    #[error("malformed order number: {0:?}")]
    MalformedNumber(String),
    #[error("order number {0} fails the checksum")]
    InvalidNumber(OrderNumber),
    #[error("invalid withdrawal amount: {0}")]
    InvalidAmount(String),
    #[error("order {0} is not a withdrawal")]
    NotWithdrawal(OrderId),
    #[error("insufficient funds: requested {requested}, available {available}, short by {shortfall}")]
    InsufficientFunds {
        available: Accrual,
        requested: Accrual,
        shortfall: Accrual,
    },
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl WithdrawError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            WithdrawError::MalformedNumber(_)
            | WithdrawError::InvalidNumber(_)
            | WithdrawError::InvalidAmount(_)
            | WithdrawError::NotWithdrawal(_) => ErrorKind::Validation,
            WithdrawError::InsufficientFunds { .. } => ErrorKind::InsufficientFunds,
            WithdrawError::Storage(_) => ErrorKind::Internal,
        }
    }
}

impl From<NumberError> for WithdrawError {
    fn from(e: NumberError) -> Self {
        match e {
            NumberError::Malformed(raw) => WithdrawError::MalformedNumber(raw),
            NumberError::Checksum(n) => WithdrawError::InvalidNumber(n),
        }
    }
}
