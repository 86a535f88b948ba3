//! HTTP transports used for outbound calls.
//!
//! Relay traffic goes through [`RelayTransport`], which picks a strict or a
//! relaxed certificate policy per destination. API traffic goes through an
//! [`AuthenticatedClient`]: a plain client wrapped with an `Authorization`
//! header, built fresh for each credential and never mutated afterwards.

use reqwest::header::{HeaderValue, AUTHORIZATION};
use reqwest::{Client, IntoUrl, RequestBuilder};
use std::time::Duration;
use tracing::debug;

use crate::config::RelayConfig;
use crate::error::{AuthError, DeliveryError};

const USER_AGENT: &str = concat!("hook-relay/", env!("CARGO_PKG_VERSION"));

/// Whether `url` points at a non-production environment whose certificates
/// are not publicly trusted.
pub fn should_use_insecure_relay(url: &str, markers: &[String]) -> bool {
    markers
        .iter()
        .any(|marker| !marker.is_empty() && url.contains(marker.as_str()))
}

/// Strict and relaxed clients for relay delivery.
#[derive(Debug, Clone)]
pub struct RelayTransport {
    strict: Client,
    relaxed: Client,
    insecure_markers: Vec<String>,
}

impl RelayTransport {
    pub fn new(config: &RelayConfig) -> Result<Self, DeliveryError> {
        let timeout = config.request_timeout();
        Ok(Self {
            strict: build_client(timeout, false)?,
            relaxed: build_client(timeout, true)?,
            insecure_markers: config.insecure_host_markers.clone(),
        })
    }

    /// Client to use for `url`.
    pub fn client_for(&self, url: &str) -> &Client {
        if self.is_insecure(url) {
            debug!(url, "Using relaxed certificate verification");
            &self.relaxed
        } else {
            &self.strict
        }
    }

    pub fn is_insecure(&self, url: &str) -> bool {
        should_use_insecure_relay(url, &self.insecure_markers)
    }
}

fn build_client(timeout: Duration, accept_invalid_certs: bool) -> Result<Client, DeliveryError> {
    Client::builder()
        .timeout(timeout)
        .user_agent(USER_AGENT)
        .danger_accept_invalid_certs(accept_invalid_certs)
        .build()
        .map_err(|e| DeliveryError::Transport {
            message: format!("Failed to create HTTP client: {}", e),
        })
}

/// Builds a plain API client with the given timeout.
pub fn api_client(timeout: Duration) -> Result<Client, reqwest::Error> {
    Client::builder()
        .timeout(timeout)
        .user_agent(USER_AGENT)
        .build()
}

/// A client that attaches one bearer credential to every request.
#[derive(Clone)]
pub struct AuthenticatedClient {
    inner: Client,
    authorization: HeaderValue,
}

impl AuthenticatedClient {
    pub fn bearer(inner: Client, token: &str) -> Result<Self, AuthError> {
        let mut authorization =
            HeaderValue::from_str(&format!("Bearer {}", token)).map_err(|e| {
                AuthError::InvalidToken {
                    message: e.to_string(),
                }
            })?;
        authorization.set_sensitive(true);

        Ok(Self {
            inner,
            authorization,
        })
    }

    pub fn get(&self, url: impl IntoUrl) -> RequestBuilder {
        self.inner
            .get(url)
            .header(AUTHORIZATION, self.authorization.clone())
    }

    pub fn post(&self, url: impl IntoUrl) -> RequestBuilder {
        self.inner
            .post(url)
            .header(AUTHORIZATION, self.authorization.clone())
    }
}

impl std::fmt::Debug for AuthenticatedClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthenticatedClient")
            .field("authorization", &"<REDACTED>")
            .finish()
    }
}

#[cfg(test)]
#[path = "transport_tests.rs"]
mod tests;
