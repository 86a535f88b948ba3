//! Builds the application state from validated configuration.

use hook_relay_api::{
    AppState, ConfigError, CredentialSource, DefaultReadinessChecker, LoggingConfig, ServiceConfig,
    ServiceError,
};
use hook_relay_core::credentials::{AppJwtGenerator, CredentialCache, CredentialProvider, PrivateKey};
use hook_relay_core::directory::HttpTenantDirectory;
use hook_relay_core::dispatch::WebhookDispatcher;
use hook_relay_core::github::GitHubAppClient;
use hook_relay_core::relay::RelayEngine;
use hook_relay_core::transport::RelayTransport;
use hook_relay_core::{AppId, SignatureCodec};
use std::fmt::Display;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install the global subscriber. `RUST_LOG` takes precedence over the
/// configured level.
pub fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(logging.filter_directive()));
    let registry = tracing_subscriber::registry().with(filter);

    if logging.json_format {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer()).init();
    }
}

/// Wire every collaborator the router needs.
///
/// Fails with a configuration error when the private key does not parse or a
/// configured URL is unusable.
pub fn build_state(config: ServiceConfig) -> Result<AppState, ServiceError> {
    let private_key =
        PrivateKey::from_file(&config.app.private_key_file).map_err(startup_error("private key"))?;
    let jwt = Arc::new(AppJwtGenerator::new(AppId::new(config.app.app_id), private_key));

    let directory = Arc::new(
        HttpTenantDirectory::new(&config.tenant.base_url, config.tenant.request_timeout())
            .map_err(startup_error("tenant directory"))?,
    );

    let github = Arc::new(
        GitHubAppClient::new(
            &config.app.api_base_url,
            jwt,
            &config.app.bot_name,
            config.relay.request_timeout(),
        )
        .map_err(startup_error("source-control API client"))?,
    );

    let provider: Arc<dyn CredentialProvider> = match config.app.credential_source {
        CredentialSource::Tenant => directory.clone(),
        CredentialSource::App => github.clone(),
    };
    let credentials = CredentialCache::new(provider, &config.credentials);

    let transport =
        RelayTransport::new(&config.relay).map_err(startup_error("relay transport"))?;
    let relay = Arc::new(RelayEngine::new(
        directory.clone(),
        transport,
        SignatureCodec::new(config.app.digest_algorithm),
        &config.relay,
    ));
    let dispatcher = Arc::new(WebhookDispatcher::new(directory, relay));

    info!(
        app_id = config.app.app_id,
        tenant_service = %config.tenant.base_url,
        credential_source = ?config.app.credential_source,
        digest_algorithm = %config.app.digest_algorithm,
        "Relay wired"
    );

    Ok(AppState::new(
        config,
        dispatcher,
        github,
        credentials,
        Arc::new(DefaultReadinessChecker),
    ))
}

fn startup_error<E: Display>(component: &'static str) -> impl Fn(E) -> ServiceError {
    move |e| {
        ServiceError::Configuration(ConfigError::Invalid {
            message: format!("failed to initialise {}: {}", component, e),
        })
    }
}

#[cfg(test)]
#[path = "wiring_tests.rs"]
mod tests;
