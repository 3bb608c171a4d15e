//! gm-config
//!
//! Layered daemon configuration:
//!
//! 1. built-in defaults
//! 2. YAML documents, deep-merged in order (later wins)
//! 3. command-line flags
//! 4. environment (`RUN_ADDRESS`, `DATABASE_URI`, `ACCRUAL_SYSTEM_ADDRESS`)
//!
//! The environment wins over flags. Blank values never override.

use std::fs;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

mod secrets;

pub use secrets::{redact_database_uri, resolve_env};

pub const ENV_RUN_ADDRESS: &str = "RUN_ADDRESS";
pub const ENV_DATABASE_URI: &str = "DATABASE_URI";
pub const ENV_ACCRUAL_ADDRESS: &str = "ACCRUAL_SYSTEM_ADDRESS";

// ---------------------------------------------------------------------------
// AppConfig
// ---------------------------------------------------------------------------

/// Effective daemon configuration. `Debug` redacts the database password.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    /// `host:port` the HTTP server binds.
    pub run_address: String,
    /// Postgres connection string. Required by the daemon, optional here so
    /// partial layers can be loaded.
    pub database_uri: Option<String>,
    /// Accrual service address; `http://` is assumed when no scheme is given.
    pub accrual_address: String,
    pub reconcile: ReconcileSection,
    pub accrual_client: AccrualClientSection,
    /// How long shutdown waits for the reconciler before aborting it.
    pub shutdown_grace_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReconcileSection {
    pub interval_secs: u64,
    /// Back-off used when the accrual source gives no `Retry-After`.
    pub default_retry_after_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AccrualClientSection {
    pub timeout_secs: u64,
    /// Use the randomised in-process source instead of HTTP.
    pub fake: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            run_address: "localhost:8080".to_string(),
            database_uri: None,
            accrual_address: "localhost:8081".to_string(),
            reconcile: ReconcileSection::default(),
            accrual_client: AccrualClientSection::default(),
            shutdown_grace_secs: 5,
        }
    }
}

impl Default for ReconcileSection {
    fn default() -> Self {
        Self {
            interval_secs: 6,
            default_retry_after_secs: 8,
        }
    }
}

impl Default for AccrualClientSection {
    fn default() -> Self {
        Self {
            timeout_secs: 10,
            fake: false,
        }
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("run_address", &self.run_address)
            .field(
                "database_uri",
                &self.database_uri.as_deref().map(redact_database_uri),
            )
            .field("accrual_address", &self.accrual_address)
            .field("reconcile", &self.reconcile)
            .field("accrual_client", &self.accrual_client)
            .field("shutdown_grace_secs", &self.shutdown_grace_secs)
            .finish()
    }
}

impl AppConfig {
    /// Defaults, then YAML files, then flags, then environment; validated.
    pub fn load(yaml_paths: &[&str], flags: &Overrides, env: &Overrides) -> Result<Self> {
        let mut cfg = load_layered_yaml(yaml_paths)?;
        cfg.apply(flags);
        cfg.apply(env);
        cfg.validate()?;
        Ok(cfg)
    }

    /// Overwrite fields for which `o` carries a non-blank value.
    pub fn apply(&mut self, o: &Overrides) {
        if let Some(v) = non_blank(&o.run_address) {
            self.run_address = v;
        }
        if let Some(v) = non_blank(&o.database_uri) {
            self.database_uri = Some(v);
        }
        if let Some(v) = non_blank(&o.accrual_address) {
            self.accrual_address = v;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.run_address.trim().is_empty() {
            bail!("CONFIG_INVALID: run_address must not be empty");
        }
        if self.accrual_address.trim().is_empty() && !self.accrual_client.fake {
            bail!("CONFIG_INVALID: accrual_address must not be empty");
        }
        if self.reconcile.interval_secs == 0 {
            bail!("CONFIG_INVALID: reconcile.interval_secs must be > 0");
        }
        if self.accrual_client.timeout_secs == 0 {
            bail!("CONFIG_INVALID: accrual_client.timeout_secs must be > 0");
        }
        Ok(())
    }

    /// The database URI, or an error naming where to set it.
    pub fn require_database_uri(&self) -> Result<&str> {
        match self.database_uri.as_deref().map(str::trim) {
            Some(uri) if !uri.is_empty() => Ok(uri),
            _ => bail!(
                "CONFIG_MISSING: database URI not set (flag -d, env {ENV_DATABASE_URI}, or yaml database_uri)"
            ),
        }
    }

    pub fn reconcile_interval(&self) -> Duration {
        Duration::from_secs(self.reconcile.interval_secs)
    }

    pub fn accrual_timeout(&self) -> Duration {
        Duration::from_secs(self.accrual_client.timeout_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

// ---------------------------------------------------------------------------
// Overrides
// ---------------------------------------------------------------------------

/// Addresses set from outside the YAML layers (flags or environment).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Overrides {
    pub run_address: Option<String>,
    pub database_uri: Option<String>,
    pub accrual_address: Option<String>,
}

impl Overrides {
    /// Read `RUN_ADDRESS`, `DATABASE_URI` and `ACCRUAL_SYSTEM_ADDRESS`.
    pub fn from_env() -> Self {
        Self::from_lookup(resolve_env)
    }

    /// Same as [`Overrides::from_env`] with an injectable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            run_address: lookup(ENV_RUN_ADDRESS),
            database_uri: lookup(ENV_DATABASE_URI),
            accrual_address: lookup(ENV_ACCRUAL_ADDRESS),
        }
    }
}

fn non_blank(v: &Option<String>) -> Option<String> {
    v.as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

// ---------------------------------------------------------------------------
// YAML layering
// ---------------------------------------------------------------------------

pub fn load_layered_yaml(paths: &[&str]) -> Result<AppConfig> {
    let mut docs: Vec<String> = Vec::new();
    for p in paths {
        let raw =
            fs::read_to_string(p).with_context(|| format!("failed to read yaml path: {p}"))?;
        docs.push(raw);
    }

    let doc_refs: Vec<&str> = docs.iter().map(|s| s.as_str()).collect();
    load_layered_yaml_from_strings(&doc_refs)
}

pub fn load_layered_yaml_from_strings(yaml_docs: &[&str]) -> Result<AppConfig> {
    // Defaults form the base layer so a partial document keeps the rest.
    let mut merged =
        serde_json::to_value(AppConfig::default()).context("default config serialize failed")?;
    for raw in yaml_docs {
        let v_yaml: serde_yaml::Value = serde_yaml::from_str(raw).context("invalid yaml")?;
        let v_json = serde_json::to_value(v_yaml).context("yaml->json conversion failed")?;
        merged = deep_merge(merged, v_json);
    }

    serde_json::from_value(merged).context("config does not match schema")
}

fn deep_merge(a: Value, b: Value) -> Value {
    match (a, b) {
        (Value::Object(mut a_map), Value::Object(b_map)) => {
            for (k, b_val) in b_map {
                let a_val = a_map.remove(&k).unwrap_or(Value::Null);
                a_map.insert(k, deep_merge(a_val, b_val));
            }
            Value::Object(a_map)
        }
        // An empty document parses as null and leaves the base untouched.
        (a, Value::Null) => a,
        (_, b_other) => b_other,
    }
}
