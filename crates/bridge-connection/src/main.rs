//! Gateway bridge entry point
//!
//! Run with:
//! ```bash
//! cargo run -p bridge-connection --bin bridge
//! ```
//!
//! Configuration is loaded from `BRIDGE_CONFIG` (a config file) when set,
//! otherwise from environment variables. The log preset follows `app.env`;
//! `LOG_FORMAT` and `LOG_LEVEL` override it.

use bridge_common::{try_init_tracing_with_config, AppConfig, ConfigError, TracingConfig};
use tracing::{error, info};

#[tokio::main]
async fn main() {
    let loaded = load_config();

    let tracing_config = match &loaded {
        Ok(config) => TracingConfig::for_environment(config.app.env).with_env_overrides(),
        Err(_) => TracingConfig::from_env(),
    };
    if let Err(e) = try_init_tracing_with_config(tracing_config) {
        eprintln!("Warning: Failed to initialize tracing: {e}");
    }

    if let Err(e) = run(loaded).await {
        error!(error = %e, "Bridge failed to start");
        std::process::exit(1);
    }
}

fn load_config() -> Result<AppConfig, ConfigError> {
    match std::env::var("BRIDGE_CONFIG") {
        Ok(path) => AppConfig::from_file(&path),
        Err(_) => AppConfig::from_env(),
    }
}

async fn run(loaded: Result<AppConfig, ConfigError>) -> Result<(), Box<dyn std::error::Error>> {
    info!("Starting gateway bridge...");

    let config = loaded.map_err(|e| {
        error!(error = %e, "Failed to load configuration");
        e
    })?;

    info!(
        env = ?config.app.env,
        accounts = config.accounts.len(),
        "Configuration loaded"
    );

    bridge_connection::run(config).await?;

    Ok(())
}
