//! Scenario: configuration layers resolve in a fixed precedence order.
//!
//! # Invariants under test
//!
//! 1. Later YAML files override earlier ones key by key; untouched keys keep
//!    the earlier (or default) value.
//! 2. Flags override YAML; environment overrides flags.
//! 3. A missing YAML file is an error that names the path.
//! 4. `Debug` output of the effective config never contains the password.

use std::fs;

use gm_config::{AppConfig, Overrides};

const BASE_YAML: &str = r#"
run_address: "0.0.0.0:9000"
database_uri: "postgres://gm:base-secret@db/gophermart"
reconcile:
  interval_secs: 10
accrual_client:
  timeout_secs: 3
"#;

const OVERLAY_YAML: &str = r#"
reconcile:
  interval_secs: 2
accrual_client:
  fake: true
"#;

fn write_layers() -> (tempfile::TempDir, String, String) {
    let dir = tempfile::tempdir().expect("tempdir");
    let base = dir.path().join("base.yaml");
    let overlay = dir.path().join("dev.yaml");
    fs::write(&base, BASE_YAML).unwrap();
    fs::write(&overlay, OVERLAY_YAML).unwrap();
    (
        dir,
        base.to_string_lossy().into_owned(),
        overlay.to_string_lossy().into_owned(),
    )
}

#[test]
fn yaml_files_merge_in_order() {
    let (_dir, base, overlay) = write_layers();

    let cfg = AppConfig::load(&[&base, &overlay], &Overrides::default(), &Overrides::default())
        .unwrap();

    assert_eq!(cfg.run_address, "0.0.0.0:9000");
    assert_eq!(cfg.reconcile.interval_secs, 2);
    assert_eq!(cfg.reconcile.default_retry_after_secs, 8);
    assert_eq!(cfg.accrual_client.timeout_secs, 3);
    assert!(cfg.accrual_client.fake);
    assert_eq!(cfg.accrual_address, "localhost:8081");
}

#[test]
fn environment_beats_flags_beats_yaml() {
    let (_dir, base, _) = write_layers();
    let flags = Overrides {
        run_address: Some("127.0.0.1:7000".into()),
        database_uri: Some("postgres://gm:flag@db/gm".into()),
        accrual_address: Some("accrual:1".into()),
    };
    let env = Overrides::from_lookup(|name| match name {
        "DATABASE_URI" => Some("postgres://gm:env@db/gm".to_string()),
        _ => None,
    });

    let cfg = AppConfig::load(&[&base], &flags, &env).unwrap();

    assert_eq!(cfg.run_address, "127.0.0.1:7000");
    assert_eq!(cfg.accrual_address, "accrual:1");
    assert_eq!(cfg.require_database_uri().unwrap(), "postgres://gm:env@db/gm");
}

#[test]
fn missing_file_names_the_path() {
    let err = AppConfig::load(
        &["/definitely/not/here.yaml"],
        &Overrides::default(),
        &Overrides::default(),
    )
    .unwrap_err();
    assert!(format!("{err:#}").contains("/definitely/not/here.yaml"));
}

#[test]
fn debug_output_redacts_password() {
    let (_dir, base, _) = write_layers();
    let cfg = AppConfig::load(&[&base], &Overrides::default(), &Overrides::default()).unwrap();

    let dbg = format!("{cfg:?}");
    assert!(!dbg.contains("base-secret"), "{dbg}");
    assert!(dbg.contains("<REDACTED>"));
    assert!(dbg.contains("0.0.0.0:9000"));
}
