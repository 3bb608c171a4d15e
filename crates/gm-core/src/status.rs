//! Order status and its legal transitions.
//!
//! ```text
//!   New ──────────┬──► Processing ──┬──► Invalid   (terminal)
//!   (Registered)  │                 └──► Processed (terminal)
//!                 ├──────────────────────► Invalid
//!                 └──────────────────────► Processed
//!
//!   Withdraw (terminal, assigned at creation only)
//! ```
//!
//! `Registered` is what the accrual source reports for a known-but-idle
//! order. It is observationally the same as `New` here and is folded into
//! `New` by [`Status::normalized`] before anything is stored or compared.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    New,
    Registered,
    Processing,
    Invalid,
    Processed,
    Withdraw,
}

impl Status {
    /// Statuses the reconciler still has to poll.
    pub const PENDING: [Status; 2] = [Status::New, Status::Processing];

    /// Statuses that contribute to a balance.
    pub const LEDGER: [Status; 2] = [Status::Processed, Status::Withdraw];

    /// Purchase-order statuses shown in a user's order list.
    pub const PURCHASE: [Status; 4] = [
        Status::New,
        Status::Processing,
        Status::Invalid,
        Status::Processed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Status::New => "NEW",
            Status::Registered => "REGISTERED",
            Status::Processing => "PROCESSING",
            Status::Invalid => "INVALID",
            Status::Processed => "PROCESSED",
            Status::Withdraw => "WITHDRAW",
        }
    }

    pub fn parse(s: &str) -> Result<Self, UnknownStatus> {
        match s {
            "NEW" => Ok(Status::New),
            "REGISTERED" => Ok(Status::Registered),
            "PROCESSING" => Ok(Status::Processing),
            "INVALID" => Ok(Status::Invalid),
            "PROCESSED" => Ok(Status::Processed),
            "WITHDRAW" => Ok(Status::Withdraw),
            other => Err(UnknownStatus(other.to_string())),
        }
    }

    /// Fold `Registered` into `New`; every other status is unchanged.
    pub fn normalized(self) -> Status {
        match self {
            Status::Registered => Status::New,
            s => s,
        }
    }

    /// No further change is possible once an order reaches one of these.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Status::Invalid | Status::Processed | Status::Withdraw)
    }

    /// Statuses that must carry an accrual amount.
    pub fn requires_accrual(&self) -> bool {
        matches!(self, Status::Processed | Status::Withdraw)
    }

    /// Whether an order currently in `self` may move to `next`.
    ///
    /// Both sides are normalized first. Staying in the same status is not a
    /// transition and returns `false`.
    pub fn can_transition_to(self, next: Status) -> bool {
        let from = self.normalized();
        let to = next.normalized();
        match (from, to) {
            (Status::New, Status::Processing | Status::Invalid | Status::Processed) => true,
            (Status::Processing, Status::Invalid | Status::Processed) => true,
            _ => false,
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Status::parse(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown order status: {0:?}")]
pub struct UnknownStatus(pub String);
