//! Routes classified webhooks to the directory or the relay engine.

use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

use crate::directory::TenantDirectory;
use crate::error::{ClassificationError, DispatchError};
use crate::relay::{RelayEngine, RelayReport};
use crate::webhook::{
    classify, Classification, GeneralRepoEvent, InstallationAction, InstallationLifecycle,
    InstallationRepoChange, WebhookEnvelope,
};
use crate::InstallationId;

/// What the dispatcher did with an accepted webhook.
#[derive(Debug, Clone)]
pub enum DispatchOutcome {
    Installed { installation_id: InstallationId },
    Uninstalled { installation_id: InstallationId },
    /// An installation action with no directory counterpart.
    InstallationActionIgnored { action: String },
    RepositoriesRegistered { installation_id: InstallationId },
    Relayed(RelayReport),
    /// The event names a repository without a URL.
    NoRepositoryUrl { full_name: String },
    Unrecognized { event_type: String },
}

/// Entry point for every authenticated webhook.
pub struct WebhookDispatcher {
    directory: Arc<dyn TenantDirectory>,
    relay: Arc<RelayEngine>,
}

impl WebhookDispatcher {
    pub fn new(directory: Arc<dyn TenantDirectory>, relay: Arc<RelayEngine>) -> Self {
        Self { directory, relay }
    }

    /// Classify `envelope` and act on it.
    ///
    /// Errors mean the inbound request failed. Relay delivery problems after
    /// destinations were resolved are reported in the outcome instead.
    #[instrument(
        skip(self, envelope),
        fields(event_type = %envelope.event_type(), delivery_id = %envelope.delivery_id())
    )]
    pub async fn dispatch(
        &self,
        envelope: &WebhookEnvelope,
    ) -> Result<DispatchOutcome, DispatchError> {
        let classification = classify(envelope).inspect_err(|e| {
            warn!(error = %e, "Rejected webhook");
        })?;

        match classification {
            Classification::InstallationLifecycle(lifecycle) => {
                self.on_installation(lifecycle).await
            }
            Classification::InstallationRepoChange(change) => {
                self.on_repositories_changed(change).await
            }
            Classification::GeneralRepoEvent(event) => self.on_repository_event(event, envelope).await,
            Classification::Unrecognized { event_type } => {
                debug!("No handling for event type, acknowledging");
                Ok(DispatchOutcome::Unrecognized { event_type })
            }
        }
    }

    async fn on_installation(
        &self,
        lifecycle: InstallationLifecycle,
    ) -> Result<DispatchOutcome, DispatchError> {
        let installation_id = lifecycle.installation_id;

        match lifecycle.action {
            InstallationAction::Create => {
                self.register(installation_id, &lifecycle.owner_url).await?;
                Ok(DispatchOutcome::Installed { installation_id })
            }
            InstallationAction::Delete => {
                self.directory
                    .app_uninstall(installation_id)
                    .await
                    .map_err(|source| directory_failure(installation_id, source))?;
                info!(installation_id = %installation_id, "Installation removed");
                Ok(DispatchOutcome::Uninstalled { installation_id })
            }
            InstallationAction::Other(action) => {
                warn!(
                    installation_id = %installation_id,
                    action = %action,
                    "Ignoring unknown installation action"
                );
                Ok(DispatchOutcome::InstallationActionIgnored { action })
            }
        }
    }

    /// Repositories moved in or out of an installation. Re-registering makes
    /// the directory pick up the new repository set.
    async fn on_repositories_changed(
        &self,
        change: InstallationRepoChange,
    ) -> Result<DispatchOutcome, DispatchError> {
        info!(
            installation_id = %change.installation_id,
            added = change.added.len(),
            removed = change.removed.len(),
            "Installation repositories changed"
        );

        self.register(change.installation_id, &change.owner_url)
            .await?;
        Ok(DispatchOutcome::RepositoriesRegistered {
            installation_id: change.installation_id,
        })
    }

    async fn on_repository_event(
        &self,
        event: GeneralRepoEvent,
        envelope: &WebhookEnvelope,
    ) -> Result<DispatchOutcome, DispatchError> {
        let repository = &event.repository;
        let url = repository.url();

        if url.is_empty() {
            warn!(
                full_name = %repository.full_name,
                "Ignoring webhook with no repository URL"
            );
            return Ok(DispatchOutcome::NoRepositoryUrl {
                full_name: repository.full_name.clone(),
            });
        }

        let report = self
            .relay
            .relay(event.installation_id, url, envelope.headers(), envelope.body())
            .await?;
        Ok(DispatchOutcome::Relayed(report))
    }

    async fn register(
        &self,
        installation_id: InstallationId,
        owner_url: &str,
    ) -> Result<(), DispatchError> {
        if owner_url.is_empty() {
            error!(installation_id = %installation_id, "Missing owner URL on installation webhook");
            return Err(ClassificationError::MissingOwnerUrl { installation_id }.into());
        }

        self.directory
            .app_install(installation_id, owner_url)
            .await
            .map_err(|source| directory_failure(installation_id, source))?;
        info!(installation_id = %installation_id, owner_url, "Installation registered");
        Ok(())
    }
}

fn directory_failure(
    installation_id: InstallationId,
    source: crate::error::DirectoryError,
) -> DispatchError {
    error!(installation_id = %installation_id, error = %source, "Tenant directory call failed");
    DispatchError::Directory {
        installation_id,
        source,
    }
}

#[cfg(test)]
#[path = "dispatch_tests.rs"]
mod tests;
