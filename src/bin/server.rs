//! Game server entry point.
//!
//! ```text
//! habbo-server [config.toml]
//! ```
//!
//! Without a file the configuration comes from defaults plus `HABBO_*`
//! environment variables. With a file, the environment still overrides it.

use std::process::ExitCode;
use std::sync::Arc;

use habbo_protocol::config::NetworkConfig;
use habbo_protocol::error::Result;
use habbo_protocol::service::identity::InMemoryIdentityResolver;
use habbo_protocol::transport::GameServer;
use habbo_protocol::utils::logging::init_logging;

fn load_config() -> Result<NetworkConfig> {
    match std::env::args().nth(1) {
        Some(path) => {
            let mut config = NetworkConfig::from_file(path)?;
            config.apply_env();
            Ok(config)
        }
        None => NetworkConfig::from_env(),
    }
}

async fn run() -> Result<()> {
    let config = load_config()?;
    init_logging(&config.logging)?;

    // Tickets are issued by the web tier; this process only redeems them.
    let identity = Arc::new(InMemoryIdentityResolver::new());
    let server = GameServer::new(&config, identity)?;
    server.start().await
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("habbo-server: {e}");
            ExitCode::FAILURE
        }
    }
}
