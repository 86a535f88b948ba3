//! Error types for the HTTP service

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use hook_relay_core::{DispatchError, GitHubApiError};
use tracing::{error, info};

/// Front door failures with HTTP status code mapping
///
/// The provider and the tooling built around it expect Go-style plain text
/// bodies on the webhook and diagnostic paths, so most variants render as
/// `500 Internal Server Error: {message}` followed by a newline. Installation
/// lookups answer JSON clients and get a JSON error body instead.
#[derive(Debug, thiserror::Error)]
pub enum FrontDoorError {
    /// Missing headers, a bad signature or an unparseable body.
    #[error("Failed to parse webhook: {message}")]
    InvalidWebhook { message: String },

    /// The webhook was understood but could not be handled.
    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error("Invalid method: {method}")]
    InvalidMethod { method: String },

    #[error("Failed to parse numeric installation: {value} due to: {message}")]
    InvalidInstallation { value: String, message: String },

    #[error("Failed to create Scm client from installation: {value} due to: {message}")]
    CredentialUnavailable { value: String, message: String },

    #[error("Failed to list PR labels for installation: {value} due to: {source}")]
    LabelsUnavailable {
        value: String,
        #[source]
        source: GitHubApiError,
    },

    #[error("Failed to look up installation for {owner}: {source}")]
    InstallationLookup {
        owner: String,
        #[source]
        source: GitHubApiError,
    },
}

impl IntoResponse for FrontDoorError {
    fn into_response(self) -> Response {
        let status = StatusCode::INTERNAL_SERVER_ERROR;

        if let Self::InstallationLookup { ref owner, .. } = self {
            error!(owner = %owner, error = %self, "Installation lookup failed");
            let body = serde_json::json!({
                "error": self.to_string(),
                "status": status.as_u16(),
                "timestamp": chrono::Utc::now().to_rfc3339(),
            });
            return (status, Json(body)).into_response();
        }

        let message = format!("500 Internal Server Error: {}", self);
        info!(response = %message, status_code = status.as_u16(), "Responding with error");
        plain_text(status, message)
    }
}

/// Plain text response terminated by a newline.
pub(crate) fn plain_text(status: StatusCode, message: String) -> Response {
    (
        status,
        [("content-type", "text/plain; charset=utf-8")],
        format!("{}\n", message),
    )
        .into_response()
}

/// Service-level errors
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Failed to bind to address {address}: {message}")]
    BindFailed { address: String, message: String },

    #[error("Server failed: {message}")]
    ServerFailed { message: String },

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),
}

impl ServiceError {
    /// Process exit status for this failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::BindFailed { .. } => 1,
            Self::ServerFailed { .. } => 2,
            Self::Configuration(_) => 3,
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Missing required configuration: {key}")]
    Missing { key: String },

    #[error("Configuration loading failed: {0}")]
    Load(#[from] config::ConfigError),
}
