//! Axum router and all HTTP handlers for gm-daemon.
//!
//! `build_router` is the single entry point; `main.rs` calls it and attaches
//! middleware layers.  Handlers only translate between HTTP and
//! [`gm_service::OrderService`]; status codes are chosen from the structured
//! error variants, never from message text.

use std::sync::Arc;

use axum::{
    async_trait,
    extract::{rejection::JsonRejection, FromRequestParts, State},
    http::{header, request::Parts, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use gm_core::{ErrorKind, StorageError, UserId};
use gm_service::{LoadOutcome, SubmitError, WithdrawError};
use tracing::{error, info};

use crate::{
    api_types::{
        BalanceResponse, ErrorResponse, HealthResponse, OrderResponse, WithdrawRequest,
        WithdrawalResponse,
    },
    state::AppState,
};

/// Header carrying the caller's user id, set by the authenticating gateway.
pub const USER_ID_HEADER: &str = "x-user-id";

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

/// Build the complete application router wired to the given shared state.
///
/// Middleware layers (tracing) are **not** applied here; `main.rs` attaches
/// them after this call so tests can use the bare router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/user/orders", post(submit_order).get(list_orders))
        .route("/api/user/balance", get(balance))
        .route("/api/user/balance/withdraw", post(withdraw))
        .route("/api/user/withdrawals", get(list_withdrawals))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Caller identity
// ---------------------------------------------------------------------------

/// The authenticated caller, taken from [`USER_ID_HEADER`].
#[derive(Debug, Clone, Copy)]
pub struct CurrentUser(pub UserId);

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for CurrentUser {
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<UserId>().ok())
            .map(CurrentUser)
            .ok_or_else(|| {
                error_response(
                    StatusCode::UNAUTHORIZED,
                    "unauthorized",
                    format!("missing or invalid {USER_ID_HEADER} header"),
                )
            })
    }
}

// ---------------------------------------------------------------------------
// GET /api/health
// ---------------------------------------------------------------------------

pub(crate) async fn health(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            ok: true,
            service: st.build.service.to_string(),
            version: st.build.version.to_string(),
            reconciler: st
                .reconciler_state()
                .map(|s| format!("{s:?}").to_ascii_lowercase()),
        }),
    )
}

// ---------------------------------------------------------------------------
// POST /api/user/orders
// ---------------------------------------------------------------------------

pub(crate) async fn submit_order(
    State(st): State<Arc<AppState>>,
    CurrentUser(user_id): CurrentUser,
    body: String,
) -> Response {
    match st.service.load_order(user_id, &body).await {
        Ok(LoadOutcome::Accepted) => StatusCode::ACCEPTED.into_response(),
        Ok(LoadOutcome::AlreadyExists) => StatusCode::OK.into_response(),
        Err(e) => submit_error_response(&e),
    }
}

fn submit_error_response(e: &SubmitError) -> Response {
    match e {
        SubmitError::MalformedNumber(_) => {
            error_response(StatusCode::BAD_REQUEST, kind_name(e.kind()), e.to_string())
        }
        SubmitError::InvalidNumber(_) => error_response(
            StatusCode::UNPROCESSABLE_ENTITY,
            kind_name(e.kind()),
            e.to_string(),
        ),
        SubmitError::OwnedByAnother { .. } => error_response(
            StatusCode::CONFLICT,
            kind_name(e.kind()),
            "order number already uploaded by another user".to_string(),
        ),
        SubmitError::Source(src) => match src.retry_after() {
            Some(after) => {
                let mut resp = error_response(
                    StatusCode::SERVICE_UNAVAILABLE,
                    kind_name(e.kind()),
                    "accrual system busy, retry later".to_string(),
                );
                if let Ok(v) = HeaderValue::from_str(&after.as_secs().to_string()) {
                    resp.headers_mut().insert(header::RETRY_AFTER, v);
                }
                resp
            }
            None => internal_error(e),
        },
        SubmitError::IdentityMismatch(_) | SubmitError::Storage(_) => internal_error(e),
    }
}

// ---------------------------------------------------------------------------
// GET /api/user/orders
// ---------------------------------------------------------------------------

pub(crate) async fn list_orders(
    State(st): State<Arc<AppState>>,
    CurrentUser(user_id): CurrentUser,
) -> Response {
    match st.service.orders(user_id).await {
        Ok(orders) if orders.is_empty() => StatusCode::NO_CONTENT.into_response(),
        Ok(orders) => {
            let body: Vec<OrderResponse> = orders.iter().map(OrderResponse::from).collect();
            (StatusCode::OK, Json(body)).into_response()
        }
        Err(e) => storage_error(&e),
    }
}

// ---------------------------------------------------------------------------
// GET /api/user/balance
// ---------------------------------------------------------------------------

pub(crate) async fn balance(
    State(st): State<Arc<AppState>>,
    CurrentUser(user_id): CurrentUser,
) -> Response {
    match st.service.balance(user_id).await {
        Ok(b) => (
            StatusCode::OK,
            Json(BalanceResponse {
                current: b.current.to_f64(),
                withdrawn: b.withdrawn.to_f64(),
            }),
        )
            .into_response(),
        Err(e) => storage_error(&e),
    }
}

// ---------------------------------------------------------------------------
// POST /api/user/balance/withdraw
// ---------------------------------------------------------------------------

pub(crate) async fn withdraw(
    State(st): State<Arc<AppState>>,
    CurrentUser(user_id): CurrentUser,
    payload: Result<Json<WithdrawRequest>, JsonRejection>,
) -> Response {
    let req = match payload {
        Ok(Json(req)) => req,
        Err(rej) => {
            return error_response(StatusCode::BAD_REQUEST, "validation", rej.body_text());
        }
    };

    match st
        .service
        .request_withdrawal(user_id, &req.order, &req.sum.to_string())
        .await
    {
        Ok(()) => {
            info!(%user_id, order = %req.order, "withdraw accepted");
            StatusCode::OK.into_response()
        }
        Err(e) => withdraw_error_response(&e),
    }
}

fn withdraw_error_response(e: &WithdrawError) -> Response {
    let status = match e {
        WithdrawError::MalformedNumber(_) => StatusCode::BAD_REQUEST,
        WithdrawError::InvalidNumber(_)
        | WithdrawError::InvalidAmount(_)
        | WithdrawError::NotWithdrawal(_) => StatusCode::UNPROCESSABLE_ENTITY,
        WithdrawError::InsufficientFunds { .. } => StatusCode::PAYMENT_REQUIRED,
        WithdrawError::Storage(_) => return internal_error(e),
    };
    error_response(status, kind_name(e.kind()), e.to_string())
}

// ---------------------------------------------------------------------------
// GET /api/user/withdrawals
// ---------------------------------------------------------------------------

pub(crate) async fn list_withdrawals(
    State(st): State<Arc<AppState>>,
    CurrentUser(user_id): CurrentUser,
) -> Response {
    match st.service.withdrawals(user_id).await {
        Ok(ws) if ws.is_empty() => StatusCode::NO_CONTENT.into_response(),
        Ok(ws) => {
            let body: Vec<WithdrawalResponse> = ws.iter().map(WithdrawalResponse::from).collect();
            (StatusCode::OK, Json(body)).into_response()
        }
        Err(e) => storage_error(&e),
    }
}

// ---------------------------------------------------------------------------
// Error mapping
// ---------------------------------------------------------------------------

fn kind_name(kind: ErrorKind) -> &'static str {
    match kind {
        ErrorKind::Validation => "validation",
        ErrorKind::Conflict => "conflict",
        ErrorKind::RetryableSource => "retryable_source",
        ErrorKind::InsufficientFunds => "insufficient_funds",
        ErrorKind::Internal => "internal",
    }
}

fn error_response(status: StatusCode, kind: &str, error: String) -> Response {
    (
        status,
        Json(ErrorResponse {
            error,
            kind: kind.to_string(),
        }),
    )
        .into_response()
}

/// Log the cause and answer 500 without exposing it.
fn internal_error(e: &dyn std::error::Error) -> Response {
    error!(error = %e, "request failed");
    error_response(
        StatusCode::INTERNAL_SERVER_ERROR,
        kind_name(ErrorKind::Internal),
        "internal error".to_string(),
    )
}

fn storage_error(e: &StorageError) -> Response {
    internal_error(e)
}
