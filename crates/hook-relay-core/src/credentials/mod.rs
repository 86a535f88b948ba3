//! Installation credentials.
//!
//! An installation credential is a short-lived bearer token that lets the
//! relay act as the App against one installation. Credentials come from an
//! external [`CredentialProvider`] and are held only in process memory by the
//! [`CredentialCache`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::CredentialError;
use crate::InstallationId;

pub mod cache;
pub mod jwt;

pub use cache::CredentialCache;
pub use jwt::{AppJwtGenerator, JsonWebToken, PrivateKey};

/// Short-lived access token scoped to one installation.
#[derive(Clone)]
pub struct InstallationCredential {
    token: String,
    installation_id: InstallationId,
    issued_at: DateTime<Utc>,
    expires_at: Option<DateTime<Utc>>,
}

impl InstallationCredential {
    pub fn new(
        token: String,
        installation_id: InstallationId,
        expires_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            token,
            installation_id,
            issued_at: Utc::now(),
            expires_at,
        }
    }

    pub fn with_issued_at(mut self, issued_at: DateTime<Utc>) -> Self {
        self.issued_at = issued_at;
        self
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn installation_id(&self) -> InstallationId {
        self.installation_id
    }

    pub fn issued_at(&self) -> DateTime<Utc> {
        self.issued_at
    }

    /// Some providers omit the expiry.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }
}

impl std::fmt::Debug for InstallationCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstallationCredential")
            .field("token", &"<REDACTED>")
            .field("installation_id", &self.installation_id)
            .field("issued_at", &self.issued_at)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Exchanges the App's identity for an installation credential.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn fetch_credential(
        &self,
        installation_id: InstallationId,
    ) -> Result<InstallationCredential, CredentialError>;
}

/// Source of the current time, replaceable in tests.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
