//! # Relay Delivery Engine
//!
//! Fans one verified webhook out to every workspace interested in its
//! repository.
//!
//! Destination resolution and each individual delivery are retried under the
//! same [`RetryPolicy`]. An empty workspace list is treated as directory lag
//! and retried; only when the budget runs out is the whole request failed.
//! Deliveries run concurrently and are isolated from each other: a failing
//! destination is logged and reported, never propagated.
//!
//! One relay request shares a single deadline, `max_elapsed` after it starts.
//! Every destination still gets at least one attempt, so a request can
//! overrun the deadline by at most one per-attempt timeout. Dropping the
//! future returned by [`RelayEngine::relay`] cancels in-flight calls and any
//! pending backoff.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::Bytes;
use futures::future::join_all;
use reqwest::header::CONTENT_TYPE;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{error, info, instrument, warn};

use crate::config::RelayConfig;
use crate::directory::{Destination, TenantDirectory};
use crate::error::{DeliveryError, DirectoryError, RelayError};
use crate::retry::{RetryError, RetryPolicy};
use crate::signature::SignatureCodec;
use crate::transport::RelayTransport;
use crate::webhook::{WebhookHeaders, DELIVERY_ID_HEADER, EVENT_TYPE_HEADER};
use crate::InstallationId;

/// What happened to one destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered { status: u16, attempts: u32 },
    Failed { attempts: u32, reason: String },
    /// The destination's secret could not be decoded; nothing was sent.
    Skipped { reason: String },
}

impl DeliveryOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered { .. })
    }
}

/// Per-destination result of a relay request.
#[derive(Debug, Clone)]
pub struct DestinationReport {
    pub url: String,
    pub insecure: bool,
    pub outcome: DeliveryOutcome,
}

/// Result of relaying one webhook.
#[derive(Debug, Clone, Default)]
pub struct RelayReport {
    pub destinations: Vec<DestinationReport>,
    pub elapsed: Duration,
}

impl RelayReport {
    pub fn delivered(&self) -> usize {
        self.destinations
            .iter()
            .filter(|d| d.outcome.is_delivered())
            .count()
    }

    pub fn failed(&self) -> usize {
        self.destinations
            .iter()
            .filter(|d| matches!(d.outcome, DeliveryOutcome::Failed { .. }))
            .count()
    }

    pub fn skipped(&self) -> usize {
        self.destinations
            .iter()
            .filter(|d| matches!(d.outcome, DeliveryOutcome::Skipped { .. }))
            .count()
    }
}

/// Failure of a single resolution attempt.
#[derive(Debug)]
enum ResolveAttemptError {
    NoWorkspaces,
    Directory(DirectoryError),
}

impl fmt::Display for ResolveAttemptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoWorkspaces => f.write_str("no workspaces found"),
            Self::Directory(e) => write!(f, "{}", e),
        }
    }
}

/// Relays webhooks to tenant workspaces.
pub struct RelayEngine {
    directory: Arc<dyn TenantDirectory>,
    transport: RelayTransport,
    codec: SignatureCodec,
    policy: RetryPolicy,
    attempt_timeout: Duration,
    not_configured_marker: String,
}

impl RelayEngine {
    pub fn new(
        directory: Arc<dyn TenantDirectory>,
        transport: RelayTransport,
        codec: SignatureCodec,
        config: &RelayConfig,
    ) -> Self {
        Self {
            directory,
            transport,
            codec,
            policy: config.retry_policy(),
            attempt_timeout: config.request_timeout(),
            not_configured_marker: config.not_configured_marker.clone(),
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Resolve destinations for `repository_url` and deliver `body` to each.
    ///
    /// Only resolution failures are returned as errors. Delivery failures are
    /// recorded in the report.
    #[instrument(
        skip(self, headers, body),
        fields(
            installation_id = %installation_id,
            event_type = %headers.event_type,
            delivery_id = %headers.delivery_id
        )
    )]
    pub async fn relay(
        &self,
        installation_id: InstallationId,
        repository_url: &str,
        headers: &WebhookHeaders,
        body: &Bytes,
    ) -> Result<RelayReport, RelayError> {
        let start = Instant::now();
        let deadline = start + self.policy.max_elapsed;
        let destinations = self
            .resolve_destinations(installation_id, repository_url)
            .await?;
        let delivery_deadline = deadline.max(Instant::now() + self.attempt_timeout);

        info!(
            repository = repository_url,
            count = destinations.len(),
            "Relaying webhook to workspaces"
        );

        let deliveries = destinations.iter().map(|destination| {
            self.deliver_until(destination, headers, body, delivery_deadline)
        });
        let reports = join_all(deliveries).await;

        let report = RelayReport {
            destinations: reports,
            elapsed: start.elapsed(),
        };

        if report.failed() > 0 || report.skipped() > 0 {
            warn!(
                repository = repository_url,
                delivered = report.delivered(),
                failed = report.failed(),
                skipped = report.skipped(),
                elapsed_ms = report.elapsed.as_millis() as u64,
                "Relay finished with undelivered workspaces"
            );
        } else {
            info!(
                repository = repository_url,
                delivered = report.delivered(),
                elapsed_ms = report.elapsed.as_millis() as u64,
                "Relay finished"
            );
        }

        Ok(report)
    }

    /// Ask the directory for destinations, retrying while it reports none.
    pub async fn resolve_destinations(
        &self,
        installation_id: InstallationId,
        repository_url: &str,
    ) -> Result<Vec<Destination>, RelayError> {
        let result = self
            .policy
            .retry(
                "resolve_workspaces",
                |_| async move {
                    match self
                        .directory
                        .find_workspaces(installation_id, repository_url)
                        .await
                    {
                        Ok(destinations) if destinations.is_empty() => {
                            Err(ResolveAttemptError::NoWorkspaces)
                        }
                        Ok(destinations) => Ok(destinations),
                        Err(e) => Err(ResolveAttemptError::Directory(e)),
                    }
                },
                |e| match e {
                    ResolveAttemptError::NoWorkspaces => true,
                    ResolveAttemptError::Directory(e) => e.is_transient(),
                },
            )
            .await;

        result.map_err(|retry_error| {
            let attempts = retry_error.attempts();
            let repository = repository_url.to_string();
            let cut_off = matches!(
                retry_error,
                RetryError::Exhausted {
                    last_error: None,
                    ..
                }
            );

            let error = match retry_error.into_last_error() {
                Some(ResolveAttemptError::Directory(source)) => RelayError::Resolution {
                    repository,
                    attempts,
                    source,
                },
                _ if cut_off && attempts > 0 => RelayError::Resolution {
                    repository,
                    attempts,
                    source: DirectoryError::Transport {
                        message: "workspace lookup did not finish within the retry budget"
                            .to_string(),
                    },
                },
                _ => RelayError::NoDestinations {
                    installation_id,
                    repository,
                    attempts,
                },
            };
            error!(error = %error, "Failed to resolve workspaces");
            error
        })
    }

    /// Deliver to one destination with a full retry budget. Never fails.
    pub async fn deliver(
        &self,
        destination: &Destination,
        headers: &WebhookHeaders,
        body: &Bytes,
    ) -> DestinationReport {
        let deadline = Instant::now() + self.policy.max_elapsed;
        self.deliver_until(destination, headers, body, deadline).await
    }

    #[instrument(skip(self, destination, headers, body, deadline), fields(destination = %destination.url))]
    async fn deliver_until(
        &self,
        destination: &Destination,
        headers: &WebhookHeaders,
        body: &Bytes,
        deadline: Instant,
    ) -> DestinationReport {
        let insecure = self.transport.is_insecure(&destination.url);
        let report = |outcome| DestinationReport {
            url: destination.url.clone(),
            insecure,
            outcome,
        };

        let secret = match STANDARD.decode(destination.encoded_secret.as_bytes()) {
            Ok(secret) => secret,
            Err(e) => {
                error!(
                    project = %destination.project,
                    error = %e,
                    "Failed to decode workspace secret, skipping"
                );
                return report(DeliveryOutcome::Skipped {
                    reason: format!("invalid secret encoding: {}", e),
                });
            }
        };

        let signature = self.codec.sign(&secret, body);
        let client = self.transport.client_for(&destination.url);

        let result = self
            .policy
            .retry_until(
                "relay_webhook",
                deadline,
                |attempt| {
                    let signature = signature.as_str();
                    async move {
                        let status = self
                            .post_once(client, &destination.url, headers, signature, body)
                            .await?;
                        Ok::<_, DeliveryError>((status, attempt))
                    }
                },
                DeliveryError::is_retryable,
            )
            .await;

        match result {
            Ok((status, attempts)) => {
                info!(status, attempts, "Delivered webhook");
                report(DeliveryOutcome::Delivered { status, attempts })
            }
            Err(retry_error) => {
                let attempts = retry_error.attempts();
                let reason = retry_error.to_string();
                let not_configured = matches!(
                    &retry_error,
                    RetryError::Exhausted { last_error: Some(e), .. } if e.is_not_configured()
                );
                if not_configured {
                    warn!(
                        project = %destination.project,
                        attempts,
                        error = %reason,
                        "Workspace never learned about the repository, giving up"
                    );
                } else {
                    error!(
                        project = %destination.project,
                        attempts,
                        error = %reason,
                        "Giving up on workspace"
                    );
                }
                report(DeliveryOutcome::Failed { attempts, reason })
            }
        }
    }

    async fn post_once(
        &self,
        client: &reqwest::Client,
        url: &str,
        headers: &WebhookHeaders,
        signature: &str,
        body: &Bytes,
    ) -> Result<u16, DeliveryError> {
        let response = client
            .post(url)
            .header(CONTENT_TYPE, "application/json")
            .header(EVENT_TYPE_HEADER, &headers.event_type)
            .header(DELIVERY_ID_HEADER, &headers.delivery_id)
            .header(self.codec.algorithm().header_name(), signature)
            .body(body.clone())
            .send()
            .await
            .map_err(|e| {
                if e.is_builder() {
                    DeliveryError::InvalidDestination {
                        url: url.to_string(),
                        message: e.to_string(),
                    }
                } else {
                    DeliveryError::Transport {
                        message: e.to_string(),
                    }
                }
            })?;

        let status = response.status();
        if status.is_success() {
            return Ok(status.as_u16());
        }

        let text = response.text().await.map_err(|e| DeliveryError::BodyRead {
            message: e.to_string(),
        })?;

        if status.is_server_error() && text.contains(&self.not_configured_marker) {
            Err(DeliveryError::NotConfigured {
                status: status.as_u16(),
                body: text,
            })
        } else {
            Err(DeliveryError::Rejected {
                status: status.as_u16(),
                body: text,
            })
        }
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
