//! Request handlers for the front door routes.

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, Method, StatusCode, Uri},
    response::{IntoResponse, Json, Response},
};
use hook_relay_core::dispatch::DispatchOutcome;
use hook_relay_core::github::InstallationStatus;
use hook_relay_core::webhook::{WebhookEnvelope, WebhookHeaders};
use hook_relay_core::InstallationId;
use std::collections::HashMap;
use tracing::{debug, info, instrument, warn};

use crate::errors::{plain_text, FrontDoorError};
use crate::{AppState, VERSION};

// ============================================================================
// Webhook Ingress
// ============================================================================

/// Catch-all handler.
///
/// Anything at or below the webhook path is a webhook. `/` and `/index.html`
/// serve the index page. Everything else is unknown.
#[instrument(skip(state, headers, body), fields(path = %uri.path()))]
pub async fn handle_fallback(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let path = uri.path();
    let hook_path = state.config.server.webhook_path.as_str();

    if is_webhook_path(path, hook_path) {
        return handle_webhook(&state, &method, &headers, body).await;
    }

    match path.strip_prefix('/').unwrap_or(path) {
        "" | "index.html" => index_page(),
        other => plain_text(StatusCode::NOT_FOUND, format!("unknown path {}", other)),
    }
}

fn is_webhook_path(path: &str, hook_path: &str) -> bool {
    let base = hook_path.trim_end_matches('/');
    path == hook_path || path.strip_prefix(base).is_some_and(|rest| rest.starts_with('/'))
}

/// Authenticate, classify and act on one webhook.
///
/// Failures before dispatch and dispatch errors are 500s. Once dispatch
/// succeeds the provider always sees `OK`, whatever happened to individual
/// relay destinations.
pub async fn handle_webhook(
    state: &AppState,
    method: &Method,
    headers: &HeaderMap,
    body: Bytes,
) -> Response {
    if method != Method::POST {
        return index_page();
    }

    match process_webhook(state, headers, body).await {
        Ok(outcome) => {
            log_outcome(&outcome);
            (StatusCode::OK, "OK").into_response()
        }
        Err(e) => e.into_response(),
    }
}

async fn process_webhook(
    state: &AppState,
    headers: &HeaderMap,
    body: Bytes,
) -> Result<DispatchOutcome, FrontDoorError> {
    let algorithm = state.codec.algorithm();
    let webhook_headers = WebhookHeaders::from_http_headers(&header_map(headers), algorithm)
        .map_err(|e| FrontDoorError::InvalidWebhook {
            message: e.to_string(),
        })?;

    let Some(signature) = webhook_headers.signature.as_deref() else {
        warn!(header = algorithm.header_name(), "Webhook has no signature");
        return Err(FrontDoorError::InvalidWebhook {
            message: format!("missing {} header", algorithm.header_name()),
        });
    };

    if !state
        .codec
        .verify(state.config.app.hmac_token.as_bytes(), &body, signature)
    {
        warn!(
            event_type = %webhook_headers.event_type,
            delivery_id = %webhook_headers.delivery_id,
            "Webhook signature verification failed"
        );
        return Err(FrontDoorError::InvalidWebhook {
            message: "invalid signature".to_string(),
        });
    }

    let envelope =
        WebhookEnvelope::parse(webhook_headers, body).map_err(|e| FrontDoorError::InvalidWebhook {
            message: e.to_string(),
        })?;

    Ok(state.dispatcher.dispatch(&envelope).await?)
}

fn log_outcome(outcome: &DispatchOutcome) {
    match outcome {
        DispatchOutcome::Relayed(report) => info!(
            delivered = report.delivered(),
            failed = report.failed(),
            skipped = report.skipped(),
            elapsed_ms = report.elapsed.as_millis() as u64,
            "Webhook relayed"
        ),
        other => debug!(outcome = ?other, "Webhook handled"),
    }
}

/// Lower-case header names mapped to their values; non-UTF-8 values become
/// empty strings.
fn header_map(headers: &HeaderMap) -> HashMap<String, String> {
    headers
        .iter()
        .map(|(k, v)| {
            (
                k.as_str().to_lowercase(),
                v.to_str().unwrap_or("").to_string(),
            )
        })
        .collect()
}

fn index_page() -> Response {
    debug!("GET index");
    (
        StatusCode::OK,
        format!("Hello from Jenkins X Lighthouse version: {}\n", VERSION),
    )
        .into_response()
}

// ============================================================================
// Health and setup
// ============================================================================

#[instrument]
pub async fn handle_health() -> StatusCode {
    debug!("Health check");
    StatusCode::NO_CONTENT
}

#[instrument(skip(state))]
pub async fn handle_ready(State(state): State<AppState>) -> StatusCode {
    if state.readiness.is_ready().await {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

/// Post-install redirect target.
#[instrument(skip(params))]
pub async fn handle_setup(Query(params): Query<HashMap<String, String>>) -> String {
    let installation_id = params.get("installation_id").map(String::as_str).unwrap_or("");
    let action = params.get("setup_action").map(String::as_str).unwrap_or("");

    format!(
        "Welcome to the Jenkins X Bot for installation: {} action: {}",
        installation_id, action
    )
}

// ============================================================================
// Installation Status
// ============================================================================

#[instrument(skip(state))]
pub async fn handle_installed_owner(
    State(state): State<AppState>,
    Path(owner): Path<String>,
) -> Result<Json<InstallationStatus>, FrontDoorError> {
    find_installation(&state, owner, None).await
}

#[instrument(skip(state))]
pub async fn handle_installed_repository(
    State(state): State<AppState>,
    Path((owner, repository)): Path<(String, String)>,
) -> Result<Json<InstallationStatus>, FrontDoorError> {
    find_installation(&state, owner, Some(repository)).await
}

async fn find_installation(
    state: &AppState,
    owner: String,
    repository: Option<String>,
) -> Result<Json<InstallationStatus>, FrontDoorError> {
    match state
        .github
        .find_installation(&owner, repository.as_deref())
        .await
    {
        Ok(status) => Ok(Json(status)),
        Err(source) => Err(FrontDoorError::InstallationLookup { owner, source }),
    }
}

// ============================================================================
// Token Diagnostic
// ============================================================================

/// Exercise the credential path end to end by listing the labels of a known
/// pull request with an installation token.
#[instrument(skip(state, method))]
pub async fn handle_token_check(
    State(state): State<AppState>,
    method: Method,
    Path(installation): Path<String>,
) -> Result<String, FrontDoorError> {
    if method != Method::GET {
        return Err(FrontDoorError::InvalidMethod {
            method: method.to_string(),
        });
    }

    let installation_id: InstallationId =
        installation
            .parse()
            .map_err(|e: hook_relay_core::ParseIdError| FrontDoorError::InvalidInstallation {
                value: installation.clone(),
                message: e.to_string(),
            })?;

    let credential = state
        .credentials
        .get_with_retry(installation_id, &state.credential_retry)
        .await
        .map_err(|e| FrontDoorError::CredentialUnavailable {
            value: installation.clone(),
            message: e.to_string(),
        })?;

    let client = state.github.installation_client(&credential).map_err(|e| {
        FrontDoorError::CredentialUnavailable {
            value: installation.clone(),
            message: e.to_string(),
        }
    })?;

    let repository = &state.config.debug.verify_repository;
    let number = state.config.debug.verify_pull_request;
    let labels = client
        .list_pull_request_labels(repository, number)
        .await
        .map_err(|source| FrontDoorError::LabelsUnavailable {
            value: installation.clone(),
            source,
        })?;

    let mut text = format!("Found labels on PR {} {}:\n", repository, number);
    for label in labels {
        text.push_str(&label);
        text.push('\n');
    }
    Ok(text)
}
