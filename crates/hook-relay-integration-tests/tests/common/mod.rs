//! Common test utilities for hook-relay integration tests
//!
//! Wires the real tenant directory client, credential cache, relay engine
//! and source-control client against wiremock servers, the same way the
//! service binary does against real ones.

use axum::body::Body;
use axum::http::Request;
use axum::response::Response;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use hook_relay_api::{
    create_router, AppState, CredentialSource, DefaultReadinessChecker, ServiceConfig,
};
use hook_relay_core::credentials::{AppJwtGenerator, CredentialCache, CredentialProvider, PrivateKey};
use hook_relay_core::directory::HttpTenantDirectory;
use hook_relay_core::dispatch::WebhookDispatcher;
use hook_relay_core::github::GitHubAppClient;
use hook_relay_core::relay::RelayEngine;
use hook_relay_core::transport::RelayTransport;
use hook_relay_core::{AppId, RelayConfig, SignatureCodec};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use wiremock::MockServer;

pub const TEST_KEY: &str = include_str!("../../../hook-relay-core/testdata/test_app_key.pem");
pub const APP_SECRET: &str = "app-webhook-secret";
pub const REPO_URL: &str = "https://github.com/acme/demo";

/// Configuration with a short relay budget pointed at mock servers.
pub fn test_config(tenant: &MockServer, api: &MockServer) -> ServiceConfig {
    let mut config = ServiceConfig::default();
    config.app.app_id = 4242;
    config.app.hmac_token = APP_SECRET.to_string();
    config.app.api_base_url = api.uri();
    config.tenant.base_url = tenant.uri();
    config.tenant.request_timeout_seconds = 2;
    config.relay = RelayConfig {
        initial_interval_ms: 100,
        max_elapsed_seconds: 1,
        request_timeout_seconds: 1,
        ..RelayConfig::default()
    };
    config.debug.verify_repository = "acme/demo".to_string();
    config.debug.verify_pull_request = 3;
    config
}

/// Build the application state from `config`.
pub fn build_state(config: ServiceConfig) -> AppState {
    let jwt = AppJwtGenerator::new(
        AppId::new(config.app.app_id),
        PrivateKey::from_pem(TEST_KEY).unwrap(),
    );
    let directory = Arc::new(
        HttpTenantDirectory::new(&config.tenant.base_url, config.tenant.request_timeout()).unwrap(),
    );
    let github = Arc::new(
        GitHubAppClient::new(
            &config.app.api_base_url,
            Arc::new(jwt),
            &config.app.bot_name,
            Duration::from_secs(2),
        )
        .unwrap(),
    );

    let provider: Arc<dyn CredentialProvider> = match config.app.credential_source {
        CredentialSource::Tenant => directory.clone(),
        CredentialSource::App => github.clone(),
    };
    let credentials = CredentialCache::new(provider, &config.credentials);

    let relay = Arc::new(RelayEngine::new(
        directory.clone(),
        RelayTransport::new(&config.relay).unwrap(),
        SignatureCodec::new(config.app.digest_algorithm),
        &config.relay,
    ));
    let dispatcher = Arc::new(WebhookDispatcher::new(directory, relay));

    AppState::new(
        config,
        dispatcher,
        github,
        credentials,
        Arc::new(DefaultReadinessChecker),
    )
}

/// Send one request through a fresh router.
pub async fn send(state: AppState, request: Request<Body>) -> Response {
    use tower::ServiceExt;
    create_router(state).oneshot(request).await.unwrap()
}

/// POST `body` to the webhook path, signed with the App secret.
pub fn signed_webhook(event_type: &str, body: &str) -> Request<Body> {
    let signature = SignatureCodec::default().sign(APP_SECRET.as_bytes(), body.as_bytes());
    Request::builder()
        .method("POST")
        .uri("/hook")
        .header("content-type", "application/json")
        .header("x-github-event", event_type)
        .header("x-github-delivery", "72d3162e-cc78-11e3-81ab-4c9367dc0958")
        .header("x-hub-signature", signature)
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

pub async fn body_text(response: Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

/// A push event for [`REPO_URL`] under `installation_id`.
pub fn push_event(installation_id: u64) -> String {
    json!({
        "ref": "refs/heads/main",
        "repository": {
            "name": "demo",
            "full_name": "acme/demo",
            "owner": { "login": "acme" },
            "html_url": REPO_URL
        },
        "installation": { "id": installation_id }
    })
    .to_string()
}

/// Workspace access record as served by the tenant directory.
pub fn workspace(lighthouse_url: String, secret: &str) -> serde_json::Value {
    json!({
        "project": "tenant-project",
        "cluster": "tenant-cluster",
        "region": "europe-west1",
        "lighthouseURL": lighthouse_url,
        "hmac": STANDARD.encode(secret)
    })
}
