//! # Hook Relay HTTP Service
//!
//! HTTP front door for the webhook relay.
//!
//! This service provides:
//! - the webhook ingress, authenticated with the App's shared secret
//! - liveness, readiness and post-install setup endpoints
//! - installation status lookups for owners and repositories
//! - a token diagnostic that exercises the credential cache end to end

pub mod config;
pub mod errors;
pub mod handlers;

pub use config::{
    AppConfig, CredentialSource, DebugConfig, LoggingConfig, ServerConfig, ServiceConfig,
    TenantConfig,
};
pub use errors::{ConfigError, FrontDoorError, ServiceError};

use axum::{
    extract::DefaultBodyLimit,
    middleware,
    response::Response,
    routing::{any, get},
    Router,
};
use hook_relay_core::credentials::CredentialCache;
use hook_relay_core::dispatch::WebhookDispatcher;
use hook_relay_core::github::GitHubAppClient;
use hook_relay_core::retry::RetryPolicy;
use hook_relay_core::SignatureCodec;
use std::future::IntoFuture;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info, instrument, warn};

/// Version reported on the index page.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// ============================================================================
// Application State
// ============================================================================

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Service configuration
    pub config: Arc<ServiceConfig>,

    /// Inbound signature codec
    pub codec: SignatureCodec,

    /// Classifies and acts on authenticated webhooks
    pub dispatcher: Arc<WebhookDispatcher>,

    /// Source-control API client authenticated as the App
    pub github: Arc<GitHubAppClient>,

    /// Installation credential cache
    pub credentials: CredentialCache,

    /// Retry policy for credential refresh on the diagnostic path
    pub credential_retry: RetryPolicy,

    /// Readiness checker
    pub readiness: Arc<dyn ReadinessChecker>,
}

impl AppState {
    pub fn new(
        config: ServiceConfig,
        dispatcher: Arc<WebhookDispatcher>,
        github: Arc<GitHubAppClient>,
        credentials: CredentialCache,
        readiness: Arc<dyn ReadinessChecker>,
    ) -> Self {
        Self {
            codec: SignatureCodec::new(config.app.digest_algorithm),
            credential_retry: config.relay.retry_policy(),
            config: Arc::new(config),
            dispatcher,
            github,
            credentials,
            readiness,
        }
    }
}

// ============================================================================
// Readiness
// ============================================================================

/// Decides whether the service should receive traffic.
#[async_trait::async_trait]
pub trait ReadinessChecker: Send + Sync {
    async fn is_ready(&self) -> bool;
}

/// Ready as soon as the process is serving.
///
/// The relay holds no state that needs warming; the credential cache fills
/// on demand.
pub struct DefaultReadinessChecker;

#[async_trait::async_trait]
impl ReadinessChecker for DefaultReadinessChecker {
    async fn is_ready(&self) -> bool {
        true
    }
}

// ============================================================================
// HTTP Server
// ============================================================================

/// Create HTTP router with all endpoints
pub fn create_router(state: AppState) -> Router {
    let health_routes = Router::new()
        .route("/health", get(handlers::handle_health))
        .route("/ready", get(handlers::handle_ready))
        .route("/setup", get(handlers::handle_setup));

    let installation_routes = Router::new()
        .route("/installed/{owner}", get(handlers::handle_installed_owner))
        .route("/installed/{owner}/", get(handlers::handle_installed_owner))
        .route(
            "/installed/{owner}/{repository}",
            get(handlers::handle_installed_repository),
        );

    let debug_routes = Router::new().route(
        "/debug/ghtoken/{installation}",
        any(handlers::handle_token_check),
    );

    let max_body_size = state.config.server.max_body_size;

    Router::new()
        .merge(health_routes)
        .merge(installation_routes)
        .merge(debug_routes)
        .fallback(handlers::handle_fallback)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive())
                .layer(middleware::from_fn(request_logging_middleware))
                .layer(DefaultBodyLimit::max(max_body_size))
                .into_inner(),
        )
        .with_state(state)
}

/// Start HTTP server
///
/// Runs until SIGINT or SIGTERM. In-flight requests then get up to the
/// configured shutdown timeout to finish.
pub async fn start_server(state: AppState) -> Result<(), ServiceError> {
    let server_config = state.config.server.clone();
    let app = create_router(state);

    let addr = format!("{}:{}", server_config.host, server_config.port);
    let listener =
        tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|e| ServiceError::BindFailed {
                address: addr.clone(),
                message: e.to_string(),
            })?;

    info!(address = %addr, "Starting HTTP server");

    let shutdown_timeout = Duration::from_secs(server_config.shutdown_timeout_seconds);
    let signalled = Arc::new(Notify::new());
    let notify = signalled.clone();

    let server = axum::serve(listener, app).with_graceful_shutdown(async move {
        shutdown_signal(shutdown_timeout).await;
        notify.notify_one();
    });

    tokio::select! {
        result = server.into_future() => {
            result.map_err(|e| ServiceError::ServerFailed {
                message: e.to_string(),
            })?;
        }
        _ = async {
            signalled.notified().await;
            tokio::time::sleep(shutdown_timeout).await;
        } => {
            warn!(
                timeout_seconds = shutdown_timeout.as_secs(),
                "In-flight requests did not finish before the shutdown timeout"
            );
        }
    }

    info!("HTTP server shutdown complete");
    Ok(())
}

/// Resolves on SIGINT or SIGTERM. A handler that cannot be installed is
/// logged and never fires.
async fn shutdown_signal(timeout: Duration) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C signal handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!(timeout_seconds = timeout.as_secs(), "Received SIGINT, initiating graceful shutdown");
        },
        _ = terminate => {
            info!(timeout_seconds = timeout.as_secs(), "Received SIGTERM, initiating graceful shutdown");
        },
    }
}

// ============================================================================
// Middleware
// ============================================================================

/// Header carrying the request correlation id.
pub const CORRELATION_ID_HEADER: &str = "x-correlation-id";

/// Request logging middleware with correlation ID tracking
///
/// Reuses the caller's `x-correlation-id` or generates one, logs the request
/// start and completion, and echoes the id back in the response headers.
#[instrument(skip(request, next), fields(
    method = %request.method(),
    uri = %request.uri(),
    correlation_id
))]
async fn request_logging_middleware(
    mut request: axum::extract::Request,
    next: axum::middleware::Next,
) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start = std::time::Instant::now();

    let correlation_id = request
        .headers()
        .get(CORRELATION_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(|s| s.to_string())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    tracing::Span::current().record("correlation_id", correlation_id.as_str());
    request.extensions_mut().insert(correlation_id.clone());

    info!(correlation_id = %correlation_id, method = %method, uri = %uri, "Request started");

    let mut response = next.run(request).await;
    let duration_ms = start.elapsed().as_millis() as u64;

    if let Ok(header_value) = correlation_id.parse() {
        response
            .headers_mut()
            .insert(CORRELATION_ID_HEADER, header_value);
    }

    let status = response.status();
    if status.is_server_error() {
        error!(
            correlation_id = %correlation_id,
            status = %status,
            duration_ms,
            "Request completed with server error"
        );
    } else if status.is_client_error() {
        warn!(
            correlation_id = %correlation_id,
            status = %status,
            duration_ms,
            "Request completed with client error"
        );
    } else {
        info!(
            correlation_id = %correlation_id,
            status = %status,
            duration_ms,
            "Request completed"
        );
    }

    response
}

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
