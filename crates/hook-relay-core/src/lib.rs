//! # Hook Relay Core
//!
//! Core logic for the multi-tenant webhook relay.
//!
//! A single App webhook arrives from the source-control provider, is
//! authenticated and classified, and is then forwarded byte-for-byte to every
//! tenant workspace that is interested in the originating repository. Each
//! forwarded copy carries a signature computed with that workspace's own
//! shared secret.
//!
//! ## Architecture
//!
//! - [`signature`] computes and verifies `algo=hex` keyed signatures
//! - [`credentials`] caches short-lived installation credentials
//! - [`webhook`] parses envelopes and classifies them
//! - [`directory`] talks to the tenant directory service
//! - [`relay`] fans a webhook out to every destination with bounded retries
//! - [`dispatch`] ties classification, directory calls and relay together
//! - [`github`] is the small slice of the source-control API the service uses
//!
//! All external collaborators sit behind traits so the relay can be tested
//! without network access.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub mod config;
pub mod credentials;
pub mod directory;
pub mod dispatch;
pub mod error;
pub mod github;
pub mod relay;
pub mod retry;
pub mod signature;
pub mod transport;
pub mod webhook;

pub use config::{CredentialCacheConfig, RelayConfig};
pub use error::{
    AuthError, ClassificationError, CredentialError, DeliveryError, DirectoryError,
    DispatchError, GitHubApiError, RelayError,
};
pub use signature::{DigestAlgorithm, SignatureCodec};

// ============================================================================
// Identifier Types
// ============================================================================

/// Numeric identifier of an App installation.
///
/// Zero is never a valid installation; envelopes that carry it are treated as
/// having no installation at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstallationId(u64);

impl InstallationId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }

    /// Returns `true` when the id refers to a real installation.
    pub fn is_valid(&self) -> bool {
        self.0 != 0
    }
}

impl fmt::Display for InstallationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for InstallationId {
    type Err = ParseIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<u64>()
            .map(Self)
            .map_err(|_| ParseIdError {
                kind: "installation",
                value: s.to_string(),
            })
    }
}

/// Numeric identifier of the App itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AppId(u64);

impl AppId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for AppId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for AppId {
    type Err = ParseIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<u64>()
            .map(Self)
            .map_err(|_| ParseIdError {
                kind: "app",
                value: s.to_string(),
            })
    }
}

/// Returned when a numeric identifier cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid {kind} id: {value:?}")]
pub struct ParseIdError {
    kind: &'static str,
    value: String,
}

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
