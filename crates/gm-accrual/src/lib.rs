//! gm-accrual
//!
//! Production adapters for [`gm_core::AccrualSource`]:
//!
//! - [`HttpAccrualSource`]: the external accrual-calculation service over HTTP.
//! - [`FakeAccrualSource`]: random outcomes for local development.
//!
//! This crate does not touch storage; callers hand results to the service or
//! reconciler.

pub mod fake;
pub mod http;

pub use fake::FakeAccrualSource;
pub use http::{normalize_base_url, HttpAccrualSource, DEFAULT_TIMEOUT};
