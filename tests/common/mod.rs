//! Shared fixtures for the integration tests.

#![allow(dead_code, clippy::unwrap_used)]

use std::sync::Arc;

use habbo_protocol::config::NetworkConfig;
use habbo_protocol::crypto::rsa::RsaCrypto;

pub const RSA_E: &str = "10001";
pub const RSA_N: &str = "a21f7629e753f58ce4275ca472b8b4672b890fee50ec5337160c2f5c7585b0f9c5195bc6afcf3a83ea90d9b2f261b9f4e1cc758c3d21939fe8e008a67a328c3fa37021ca3277c1ae2f4926da11afb9e341a0a5d782e1ecf3e7778f4ab34e9b864e36ae74ef330e831b3fcad604e674895290a46c0c9bfe16b24e6ecd2dd61c5d";
pub const RSA_D: &str = "5e67f9b42f0bda1a602577b21f47e56d8a9176e06ce921101bdb9e9cb5a6d346aefab451bfc0e9af35a181d3cd8710f543a37ef3da093a60cd07e0a1a8d8d487b09881cda6045f980af6dc11aee38ecf5a3ff2175ce0a33c757f6f415a9a910f41615ac99be5d4e542b2e87f1d0d15dedb29c0665612e6ea40d06df1be295261";

/// Full key pair, as the server holds it.
pub fn server_key() -> Arc<RsaCrypto> {
    Arc::new(RsaCrypto::from_hex(RSA_E, RSA_N, Some(RSA_D)).unwrap())
}

/// Public half only, as a client holds it.
pub fn client_key() -> Arc<RsaCrypto> {
    Arc::new(RsaCrypto::from_hex(RSA_E, RSA_N, None).unwrap())
}

/// A configuration that passes strict validation.
pub fn valid_config() -> NetworkConfig {
    NetworkConfig::default_with_overrides(|c| {
        c.crypto.rsa_public_exponent = RSA_E.to_string();
        c.crypto.rsa_modulus = RSA_N.to_string();
        c.crypto.rsa_private_exponent = Some(RSA_D.to_string());
    })
}
