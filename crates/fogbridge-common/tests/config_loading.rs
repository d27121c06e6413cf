//! ---
//! fb_section: "01-core-functionality"
//! fb_subsection: "tests"
//! fb_type: "source"
//! fb_scope: "test"
//! fb_description: "Configuration discovery and tracing bootstrap."
//! fb_version: "v0.1.0"
//! fb_owner: "tbd"
//! ---
use std::fs;

use fogbridge_common::config::BridgeConfig;
use fogbridge_common::logging::{filter_directive, init_tracing, LOG_ENV};
use fogbridge_common::LoggingConfig;

const CONFIG: &str = r#"
[broker]
url = "amqps://broker.example:5671"

[device]
id = "0123456789abcdef"
"#;

#[test]
fn candidates_env_override_and_tracing() {
    let dir = tempfile::tempdir().expect("tempdir");
    let first = dir.path().join("missing.toml");
    let second = dir.path().join("bridge.toml");
    fs::write(&second, CONFIG).expect("write config");

    let loaded = BridgeConfig::load_with_source(&[&first, &second]).expect("load");
    assert_eq!(loaded.source, second);
    assert_eq!(loaded.config.device.id, "0123456789abcdef");
    assert_eq!(loaded.config.device.name, "fog-device");

    let override_path = dir.path().join("override.toml");
    fs::write(
        &override_path,
        "[device]\nid = \"from-env\"\nname = \"override\"\n",
    )
    .expect("write override");
    std::env::set_var(BridgeConfig::ENV_CONFIG_PATH, &override_path);
    let loaded = BridgeConfig::load_with_source(&[&second]).expect("load override");
    assert_eq!(loaded.config.device.id, "from-env");
    std::env::remove_var(BridgeConfig::ENV_CONFIG_PATH);

    let err = BridgeConfig::load(&[&first]).expect_err("nothing to load");
    assert!(err.to_string().contains("no configuration files found"));

    let mut logging = LoggingConfig {
        directory: dir.path().join("logs"),
        ..LoggingConfig::default()
    };
    std::env::remove_var(LOG_ENV);
    std::env::remove_var("RUST_LOG");
    assert_eq!(filter_directive(&logging), "info");
    std::env::set_var(LOG_ENV, "fogbridge_cloud=trace");
    assert_eq!(filter_directive(&logging), "fogbridge_cloud=trace");
    std::env::remove_var(LOG_ENV);

    logging.file_prefix = Some("bridge".into());
    init_tracing("fogbridge-test", &logging).expect("init tracing");
    assert!(logging.directory.is_dir());
}

#[test]
fn invalid_file_reports_its_path() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("broken.toml");
    fs::write(&path, "[device]\nid = \"\"\n").expect("write config");
    let err = BridgeConfig::from_path(&path).expect_err("invalid");
    assert!(format!("{:#}", err).contains("device id must not be empty"));
    assert!(err.to_string().contains("broken.toml"));
}
