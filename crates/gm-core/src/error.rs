//! Error taxonomy shared by the service, the reconciler and the adapters.

use std::time::Duration;

use thiserror::Error;

use crate::{Accrual, OrderId};

/// Retry hint used when the accrual source does not supply one.
pub const DEFAULT_RETRY_AFTER_SECS: u64 = 8;

/// Coarse classification every service error maps onto. The HTTP boundary
/// switches on this, never on message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed or checksum-failing input. Never retried.
    Validation,
    /// Number already owned by another user.
    Conflict,
    /// The accrual source asked us to back off.
    RetryableSource,
    /// Business-rule rejection of a withdrawal.
    InsufficientFunds,
    /// Storage failures, identity mismatches and unexpected source responses.
    Internal,
}

// ---------------------------------------------------------------------------
// Accrual source
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceError {
    /// Rate limiting or a transient failure on the source side.
    #[error("accrual source asked to retry after {after_secs}s: {reason}")]
    Retryable { after_secs: u64, reason: String },
    /// A response shape we do not understand.
    #[error("unexpected accrual source response: {0}")]
    Protocol(String),
    /// The request never produced a response (connect, timeout, body read).
    #[error("accrual source transport failure: {0}")]
    Transport(String),
}

impl SourceError {
    pub fn rate_limited(after_secs: u64) -> Self {
        SourceError::Retryable {
            after_secs,
            reason: "rate limited".to_string(),
        }
    }

    pub fn unavailable() -> Self {
        SourceError::Retryable {
            after_secs: DEFAULT_RETRY_AFTER_SECS,
            reason: "internal source failure".to_string(),
        }
    }

    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            SourceError::Retryable { after_secs, .. } => Some(Duration::from_secs(*after_secs)),
            _ => None,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, SourceError::Retryable { .. })
    }

    pub fn kind(&self) -> ErrorKind {
        if self.is_retryable() {
            ErrorKind::RetryableSource
        } else {
            ErrorKind::Internal
        }
    }
}

// ---------------------------------------------------------------------------
// Repository
// ---------------------------------------------------------------------------

/// Opaque persistence failure. Adapters wrap their driver errors in this.
#[derive(Debug, Error)]
#[error(transparent)]
pub struct StorageError(#[from] anyhow::Error);

impl StorageError {
    pub fn msg(msg: impl std::fmt::Display + std::fmt::Debug + Send + Sync + 'static) -> Self {
        StorageError(anyhow::Error::msg(msg))
    }
}

/// Which uniqueness rule a save tripped over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum OrderConflict {
    /// The number belongs to a different user; carries the existing order id.
    #[error("order number already registered by another user (order {0})")]
    OwnerMismatch(OrderId),
    /// The same user already registered this number.
    #[error("order number already registered by this user")]
    DuplicateSameOwner,
    /// Storage reported a row under an id other than the one written.
    #[error("storage did not echo order id {0}")]
    IdentityMismatch(OrderId),
    /// A withdrawal the owner's balance no longer covers at write time.
    #[error("withdrawal of {requested} exceeds available {available}")]
    InsufficientFunds {
        available: Accrual,
        requested: Accrual,
    },
}

#[derive(Debug, Error)]
pub enum SaveOrderError {
    #[error(transparent)]
    Conflict(#[from] OrderConflict),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_after_only_for_retryable() {
        assert_eq!(
            SourceError::rate_limited(30).retry_after(),
            Some(Duration::from_secs(30))
        );
        assert_eq!(
            SourceError::unavailable().retry_after(),
            Some(Duration::from_secs(DEFAULT_RETRY_AFTER_SECS))
        );
        assert_eq!(SourceError::Protocol("x".into()).retry_after(), None);
        assert_eq!(SourceError::Transport("x".into()).kind(), ErrorKind::Internal);
    }

    #[test]
    fn insufficient_funds_conflict_names_both_amounts() {
        let c = OrderConflict::InsufficientFunds {
            available: Accrual::from_units(40),
            requested: Accrual::from_units(60),
        };
        assert_eq!(c.to_string(), "withdrawal of 60.00 exceeds available 40.00");
    }

    #[test]
    fn storage_error_displays_inner_message() {
        let e = StorageError::msg("connection reset");
        assert_eq!(e.to_string(), "connection reset");
    }
}
