//! Request and response types for all gm-daemon HTTP endpoints.
//!
//! These types are `Serialize + Deserialize` so they can be JSON-encoded
//! by Axum and decoded by tests.  No business logic lives here.

use chrono::{DateTime, Utc};
use gm_core::{Order, Status};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// /api/health
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub service: String,
    pub version: String,
    /// "idle" | "polling" | "applying" | "stopped"; absent when no reconciler
    /// is attached.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reconciler: Option<String>,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Body of every non-2xx response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    /// "validation" | "conflict" | "retryable_source" | "insufficient_funds"
    /// | "internal" | "unauthorized"
    pub kind: String,
}

// ---------------------------------------------------------------------------
// /api/user/orders
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderResponse {
    pub number: String,
    pub status: Status,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accrual: Option<f64>,
    pub uploaded_at: DateTime<Utc>,
}

impl From<&Order> for OrderResponse {
    fn from(o: &Order) -> Self {
        Self {
            number: o.number().to_string(),
            status: o.status(),
            accrual: o.info().accrual().map(|a| a.to_f64()),
            uploaded_at: o.info().uploaded_at(),
        }
    }
}

// ---------------------------------------------------------------------------
// /api/user/balance
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalanceResponse {
    pub current: f64,
    pub withdrawn: f64,
}

// ---------------------------------------------------------------------------
// /api/user/balance/withdraw  /api/user/withdrawals
// ---------------------------------------------------------------------------

/// `sum` is kept as the raw JSON number so it can be parsed exactly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WithdrawRequest {
    pub order: String,
    pub sum: serde_json::Number,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WithdrawalResponse {
    pub order: String,
    pub sum: f64,
    pub processed_at: DateTime<Utc>,
}

impl From<&Order> for WithdrawalResponse {
    fn from(o: &Order) -> Self {
        Self {
            order: o.number().to_string(),
            sum: o.info().accrual().map(|a| a.to_f64()).unwrap_or_default(),
            processed_at: o.info().uploaded_at(),
        }
    }
}
