//! Classification of parsed envelopes.
//!
//! [`classify`] is a pure function: it performs no I/O and decides only which
//! branch of the dispatch state machine an envelope belongs to, rejecting
//! envelopes that cannot be handled before anything else happens.

use super::{
    EventKind, InstallationAction, RepositoriesAction, RepositoryDescriptor, WebhookEnvelope,
};
use crate::error::ClassificationError;
use crate::InstallationId;

/// Which handling path an envelope takes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    InstallationLifecycle(InstallationLifecycle),
    InstallationRepoChange(InstallationRepoChange),
    GeneralRepoEvent(GeneralRepoEvent),
    Unrecognized { event_type: String },
}

/// The App was installed, uninstalled or otherwise changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallationLifecycle {
    pub action: InstallationAction,
    pub installation_id: InstallationId,
    pub owner_url: String,
}

/// Repositories were added to or removed from an existing installation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallationRepoChange {
    pub action: RepositoriesAction,
    pub installation_id: InstallationId,
    pub owner_url: String,
    pub added: Vec<String>,
    pub removed: Vec<String>,
}

/// A repository event to be relayed to interested workspaces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneralRepoEvent {
    pub installation_id: InstallationId,
    pub repository: RepositoryDescriptor,
}

/// Decide how `envelope` is handled.
///
/// Installation events with a zero id fail with
/// [`ClassificationError::MissingInstallationId`]; repository events without
/// an installation fail with [`ClassificationError::NoInstallation`].
pub fn classify(envelope: &WebhookEnvelope) -> Result<Classification, ClassificationError> {
    let installation = envelope.installation().filter(|i| i.id.is_valid());

    match envelope.kind() {
        EventKind::Installation(action) => {
            let installation = installation.ok_or(ClassificationError::MissingInstallationId)?;
            Ok(Classification::InstallationLifecycle(InstallationLifecycle {
                action: action.clone(),
                installation_id: installation.id,
                owner_url: installation.owner_url.clone(),
            }))
        }
        EventKind::InstallationRepositories(action) => {
            let installation = installation.ok_or(ClassificationError::MissingInstallationId)?;
            Ok(Classification::InstallationRepoChange(InstallationRepoChange {
                action: action.clone(),
                installation_id: installation.id,
                owner_url: installation.owner_url.clone(),
                added: envelope.repositories_added().to_vec(),
                removed: envelope.repositories_removed().to_vec(),
            }))
        }
        EventKind::Repository => {
            let installation = installation.ok_or(ClassificationError::NoInstallation)?;
            let repository = envelope.repository().cloned().unwrap_or_default();
            Ok(Classification::GeneralRepoEvent(GeneralRepoEvent {
                installation_id: installation.id,
                repository,
            }))
        }
        EventKind::Unrecognized => Ok(Classification::Unrecognized {
            event_type: envelope.event_type().to_string(),
        }),
    }
}

#[cfg(test)]
#[path = "classifier_tests.rs"]
mod tests;
