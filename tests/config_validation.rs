//! Integration tests for configuration validation

#![allow(clippy::expect_used, clippy::unwrap_used)]

mod common;

use common::valid_config;
use habbo_protocol::config::NetworkConfig;
use habbo_protocol::error::ProtocolError;
use std::time::Duration;
use tracing::Level;

#[test]
fn test_complete_config_validates() {
    let errors = valid_config().validate();
    assert!(
        errors.is_empty(),
        "Complete config should be valid, but got errors: {:?}",
        errors
    );
}

#[test]
fn test_default_config_lacks_encryption_identity() {
    let errors = NetworkConfig::default().validate();
    assert!(errors.iter().any(|e| e.contains("RSA modulus is missing")));
    assert!(errors.iter().any(|e| e.contains("RSA public exponent is missing")));
    assert!(errors.iter().any(|e| e.contains("RSA private exponent is missing")));
}

#[test]
fn test_non_hex_key_material() {
    let mut config = valid_config();
    config.crypto.rsa_modulus = "not-hex".to_string();

    let errors = config.validate();
    assert!(errors.iter().any(|e| e.contains("RSA modulus is not valid hex")));
}

#[test]
fn test_invalid_server_address() {
    let mut config = valid_config();
    config.server.address = "invalid_address".to_string();

    let errors = config.validate();
    assert!(errors.iter().any(|e| e.contains("Invalid server address")));
}

#[test]
fn test_empty_server_address() {
    let mut config = valid_config();
    config.server.address = String::new();

    let errors = config.validate();
    assert!(errors.iter().any(|e| e.contains("cannot be empty")));
}

#[test]
fn test_zero_backpressure_limit() {
    let mut config = valid_config();
    config.server.backpressure_limit = 0;

    let errors = config.validate();
    assert!(errors
        .iter()
        .any(|e| e.contains("Backpressure limit must be greater than 0")));
}

#[test]
fn test_short_connection_timeout() {
    let mut config = valid_config();
    config.server.connection_timeout = Duration::from_millis(10);

    let errors = config.validate();
    assert!(errors.iter().any(|e| e.contains("Connection timeout too short")));
}

#[test]
fn test_frame_size_bounds() {
    let mut config = valid_config();
    config.server.max_frame_size = 4;
    assert!(config
        .validate()
        .iter()
        .any(|e| e.contains("Max frame size too small")));

    config.server.max_frame_size = 32 * 1024 * 1024;
    assert!(config
        .validate()
        .iter()
        .any(|e| e.contains("Max frame size too large")));
}

#[test]
fn test_zero_crypto_workers() {
    let mut config = valid_config();
    config.server.crypto_workers = 0;

    let errors = config.validate();
    assert!(errors
        .iter()
        .any(|e| e.contains("Crypto workers must be greater than 0")));
}

#[test]
fn test_multiple_errors_are_collected() {
    let mut config = valid_config();
    config.server.address = String::new();
    config.server.backpressure_limit = 0;
    config.logging.app_name = String::new();

    assert!(config.validate().len() >= 3);
}

#[test]
fn test_validate_strict_reports_config_error() {
    let result = NetworkConfig::default().validate_strict();
    match result {
        Err(ProtocolError::ConfigError(msg)) => {
            assert!(msg.contains("Configuration validation failed"));
        }
        other => panic!("expected config error, got {other:?}"),
    }
}

#[test]
fn test_toml_sections_and_millisecond_durations() {
    let toml = format!(
        r#"
[server]
address = "0.0.0.0:3000"
backpressure_limit = 16
connection_timeout = 30000
keepalive_interval = 15000
close_grace_period = 500
restart_delay = 2000
status_interval = 1000
shutdown_timeout = 5000
max_frame_size = 4096
crypto_workers = 2

[crypto]
rsa_public_exponent = "{}"
rsa_modulus = "{}"

[logging]
app_name = "game"
log_level = "debug"
json_format = true
"#,
        common::RSA_E,
        common::RSA_N
    );

    let config = NetworkConfig::from_toml(&toml).expect("valid toml");
    assert_eq!(config.server.address, "0.0.0.0:3000");
    assert_eq!(config.server.connection_timeout, Duration::from_secs(30));
    assert_eq!(config.server.close_grace_period, Duration::from_millis(500));
    assert_eq!(config.server.max_frame_size, 4096);
    assert_eq!(config.logging.log_level, Level::DEBUG);
    assert!(config.logging.json_format);
    assert!(config.crypto.rsa_private_exponent.is_none());
    assert!(config
        .validate()
        .iter()
        .any(|e| e.contains("RSA private exponent is missing")));
}

#[test]
fn test_missing_sections_fall_back_to_defaults() {
    let config = NetworkConfig::from_toml("").expect("empty toml");
    assert_eq!(config.server.address, "127.0.0.1:2095");
    assert_eq!(config.server.max_frame_size, 8192);
    assert_eq!(config.server.connection_timeout, Duration::from_secs(60));
}

#[test]
fn test_malformed_toml_is_rejected() {
    assert!(matches!(
        NetworkConfig::from_toml("[server"),
        Err(ProtocolError::ConfigError(_))
    ));
}

#[test]
fn test_example_config_parses_back() {
    let example = NetworkConfig::example_config();
    let parsed = NetworkConfig::from_toml(&example).expect("example config parses");
    assert_eq!(parsed.server.address, "127.0.0.1:2095");
}
