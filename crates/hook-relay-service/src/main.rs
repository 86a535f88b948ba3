//! # Hook Relay Service
//!
//! Binary entry point for the webhook relay.
//!
//! This executable:
//! - loads and validates configuration from files and environment
//! - initializes logging
//! - wires the tenant directory, credential cache and relay engine
//! - starts the HTTP server from hook-relay-api
//!
//! Exit codes: 1 bind failure, 2 server failure, 3 configuration.

mod wiring;

use hook_relay_api::{start_server, LoggingConfig, ServiceConfig, VERSION};
use tracing::{error, info};

#[tokio::main]
async fn main() {
    let config = match ServiceConfig::load() {
        Ok(config) => config,
        Err(e) => {
            wiring::init_tracing(&LoggingConfig::default());
            error!(error = %e, "Service configuration is invalid; aborting");
            std::process::exit(3);
        }
    };

    wiring::init_tracing(&config.logging);
    info!(version = VERSION, "Starting Hook Relay");

    let state = match wiring::build_state(config) {
        Ok(state) => state,
        Err(e) => {
            error!(error = %e, "Failed to initialise service; aborting");
            std::process::exit(e.exit_code());
        }
    };

    if let Err(e) = start_server(state).await {
        error!(error = %e, "HTTP server failed");
        std::process::exit(e.exit_code());
    }
}
