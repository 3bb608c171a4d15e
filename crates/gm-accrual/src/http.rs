//! HTTP adapter for the external accrual-calculation service.
//!
//! `GET {base}/api/orders/{number}` answers with one of:
//!
//! | status | meaning                         | result                               |
//! |--------|---------------------------------|--------------------------------------|
//! | 200    | known order                     | `Info` from the JSON body            |
//! | 204    | number not registered           | `Info { New, accrual: None }`        |
//! | 429    | rate limited                    | `Retryable { Retry-After or default }` |
//! | 500    | source failure                  | `Retryable { default }`              |
//! | other  | unexpected                      | `Protocol`                           |
//!
//! Without a positive integer `Retry-After` the default hint applies.
//! Transport-level retries are not attempted here; a failed request surfaces
//! as [`SourceError::Transport`].

use std::time::Duration;

use anyhow::Context;
use gm_core::{
    Accrual, AccrualSource, Info, OrderNumber, SourceError, Status, DEFAULT_RETRY_AFTER_SECS,
};
use reqwest::{header::RETRY_AFTER, header::HeaderMap, StatusCode};
use serde::Deserialize;
use tracing::debug;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct HttpAccrualSource {
    http: reqwest::Client,
    base_url: String,
    default_retry_after_secs: u64,
}

impl HttpAccrualSource {
    pub fn new(base_url: impl AsRef<str>) -> anyhow::Result<Self> {
        Self::with_options(base_url, DEFAULT_TIMEOUT, DEFAULT_RETRY_AFTER_SECS)
    }

    pub fn with_options(
        base_url: impl AsRef<str>,
        timeout: Duration,
        default_retry_after_secs: u64,
    ) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("build accrual http client")?;

        Ok(Self {
            http,
            base_url: normalize_base_url(base_url.as_ref()),
            default_retry_after_secs,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn order_url(&self, number: OrderNumber) -> String {
        format!("{}/api/orders/{}", self.base_url, number)
    }

    fn retry_after(&self, headers: &HeaderMap) -> u64 {
        headers
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .filter(|secs| *secs > 0)
            .unwrap_or(self.default_retry_after_secs)
    }
}

/// Accept `host:port` as well as full URLs; strip trailing slashes.
pub fn normalize_base_url(raw: &str) -> String {
    let t = raw.trim().trim_end_matches('/');
    if t.starts_with("http://") || t.starts_with("https://") {
        t.to_string()
    } else {
        format!("http://{t}")
    }
}

#[async_trait::async_trait]
impl AccrualSource for HttpAccrualSource {
    fn name(&self) -> &'static str {
        "accrual-http"
    }

    async fn load(&self, number: OrderNumber) -> Result<Info, SourceError> {
        let resp = self
            .http
            .get(self.order_url(number))
            .send()
            .await
            .map_err(|e| SourceError::Transport(e.to_string()))?;

        let status = resp.status();
        debug!(%number, status = status.as_u16(), "accrual source response");

        match status {
            StatusCode::OK => {
                let body: AccrualResponse = resp
                    .json()
                    .await
                    .map_err(|e| SourceError::Protocol(format!("decode body: {e}")))?;
                body.into_info(number)
            }
            StatusCode::NO_CONTENT => Ok(Info::unregistered(number)),
            StatusCode::TOO_MANY_REQUESTS => Err(SourceError::Retryable {
                after_secs: self.retry_after(resp.headers()),
                reason: "too many requests".to_string(),
            }),
            StatusCode::INTERNAL_SERVER_ERROR => Err(SourceError::Retryable {
                after_secs: self.default_retry_after_secs,
                reason: "accrual source internal error".to_string(),
            }),
            other => Err(SourceError::Protocol(format!(
                "unhandled http status {}",
                other.as_u16()
            ))),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct AccrualResponse {
    order: String,
    status: String,
    #[serde(default)]
    accrual: Option<serde_json::Number>,
}

impl AccrualResponse {
    fn into_info(self, number: OrderNumber) -> Result<Info, SourceError> {
        if self.order.trim() != number.to_string() {
            return Err(SourceError::Protocol(format!(
                "response for order {:?} while asking for {number}",
                self.order
            )));
        }

        let status = Status::parse(&self.status)
            .ok()
            .filter(|s| *s != Status::Withdraw)
            .ok_or_else(|| SourceError::Protocol(format!("unsupported status {:?}", self.status)))?;

        // JSON numbers are re-read from their decimal text so no float
        // rounding reaches the amount.
        let accrual = match self.accrual {
            None => None,
            Some(n) => {
                let amount = Accrual::parse_decimal(&n.to_string())
                    .map_err(|e| SourceError::Protocol(format!("accrual: {e}")))?;
                if amount.is_negative() {
                    return Err(SourceError::Protocol(format!("negative accrual {amount}")));
                }
                Some(amount)
            }
        };

        if status == Status::Processed && accrual.is_none() {
            return Err(SourceError::Protocol(
                "PROCESSED response without accrual".to_string(),
            ));
        }

        Ok(Info::new(number, status, accrual))
    }
}
