//! Error types for relay operations.
//!
//! Every error that can feed a retry loop exposes a classification method
//! (`is_transient` or `is_retryable`) so the call site can decide whether to
//! try again without inspecting variants itself.

use thiserror::Error;

use crate::InstallationId;

// ============================================================================
// Tenant Directory Errors
// ============================================================================

/// Failures talking to the tenant directory service.
#[derive(Debug, Error)]
pub enum DirectoryError {
    /// Connection, DNS or timeout failure.
    #[error("Tenant directory request failed: {message}")]
    Transport { message: String },

    /// The directory answered with a non-success status.
    #[error("Tenant directory returned status {status}: {body}")]
    UnexpectedStatus { status: u16, body: String },

    /// The directory answered 2xx but the body could not be decoded.
    #[error("Tenant directory returned an invalid response: {message}")]
    InvalidResponse { message: String },

    /// A request URL could not be constructed.
    #[error("Invalid tenant directory URL: {message}")]
    InvalidUrl { message: String },
}

impl DirectoryError {
    /// Transport failures, server errors and rate limiting may succeed later.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport { .. } => true,
            Self::UnexpectedStatus { status, .. } => *status >= 500 || *status == 429,
            Self::InvalidResponse { .. } => false,
            Self::InvalidUrl { .. } => false,
        }
    }
}

// ============================================================================
// App Authentication Errors
// ============================================================================

/// Failures producing App-level authentication material.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Invalid private key: {message}")]
    InvalidPrivateKey { message: String },

    #[error("JWT generation failed: {message}")]
    JwtGenerationFailed { message: String },

    /// The token cannot be carried in an HTTP header.
    #[error("Invalid bearer token: {message}")]
    InvalidToken { message: String },
}

// ============================================================================
// Source-Control API Errors
// ============================================================================

/// Failures calling the source-control provider's API.
#[derive(Debug, Error)]
pub enum GitHubApiError {
    #[error("GitHub API request failed: {message}")]
    Transport { message: String },

    #[error("GitHub API returned status {status}: {body}")]
    UnexpectedStatus { status: u16, body: String },

    #[error("GitHub API returned an invalid response: {message}")]
    InvalidResponse { message: String },

    #[error("GitHub API authentication failed: {0}")]
    Auth(#[from] AuthError),

    #[error("Invalid GitHub API URL: {message}")]
    InvalidUrl { message: String },
}

impl GitHubApiError {
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport { .. } => true,
            Self::UnexpectedStatus { status, .. } => *status >= 500 || *status == 429,
            Self::InvalidResponse { .. } | Self::Auth(_) | Self::InvalidUrl { .. } => false,
        }
    }
}

// ============================================================================
// Credential Errors
// ============================================================================

/// Failures obtaining an installation credential.
///
/// The credential cache never retries on its own; callers decide using
/// [`CredentialError::is_transient`].
#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("Credential provider returned no token for installation {installation_id}")]
    MissingToken { installation_id: InstallationId },

    #[error("Credential provider failed: {0}")]
    Directory(#[from] DirectoryError),

    #[error("Credential exchange failed: {0}")]
    GitHub(#[from] GitHubApiError),

    #[error("Credential cache operation failed: {message}")]
    Cache { message: String },
}

impl CredentialError {
    pub fn is_transient(&self) -> bool {
        match self {
            Self::MissingToken { .. } => false,
            Self::Directory(e) => e.is_transient(),
            Self::GitHub(e) => e.is_transient(),
            Self::Cache { .. } => true,
        }
    }
}

// ============================================================================
// Classification Errors
// ============================================================================

/// Reasons an inbound webhook is rejected before any relay happens.
#[derive(Debug, Error)]
pub enum ClassificationError {
    #[error("missing event type header")]
    MissingEventType,

    #[error("failed to parse {event_type} payload: {message}")]
    MalformedPayload { event_type: String, message: String },

    #[error("missing installation ID")]
    MissingInstallationId,

    #[error("No installation in webhook")]
    NoInstallation,

    #[error("missing owner URL for installation {installation_id}")]
    MissingOwnerUrl { installation_id: InstallationId },
}

// ============================================================================
// Delivery Errors
// ============================================================================

/// Outcome of a single failed relay attempt to one destination.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// The request never produced a response.
    #[error("relay request failed: {message}")]
    Transport { message: String },

    /// The destination has not yet learned about the repository.
    #[error("destination returned status {status} (repository not configured): {body}")]
    NotConfigured { status: u16, body: String },

    /// Any other non-2xx answer.
    #[error("destination returned status {status}: {body}")]
    Rejected { status: u16, body: String },

    /// The response body could not be read.
    #[error("failed to read relay response body: {message}")]
    BodyRead { message: String },

    /// No request can be built for the destination URL.
    #[error("invalid destination URL {url:?}: {message}")]
    InvalidDestination { url: String, message: String },
}

impl DeliveryError {
    /// Everything except an unreadable response body or an unusable URL is
    /// retried.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::BodyRead { .. } | Self::InvalidDestination { .. })
    }

    /// Whether the destination reported directory lag.
    pub fn is_not_configured(&self) -> bool {
        matches!(self, Self::NotConfigured { .. })
    }
}

// ============================================================================
// Relay Errors
// ============================================================================

/// Terminal failures of a whole relay request.
///
/// Per-destination failures are never surfaced here; they are logged and
/// reported in the [`crate::relay::RelayReport`].
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("no workspaces found for repository {repository} (installation {installation_id}) after {attempts} attempts")]
    NoDestinations {
        installation_id: InstallationId,
        repository: String,
        attempts: u32,
    },

    #[error("failed to resolve workspaces for repository {repository} after {attempts} attempts: {source}")]
    Resolution {
        repository: String,
        attempts: u32,
        #[source]
        source: DirectoryError,
    },
}

// ============================================================================
// Dispatch Errors
// ============================================================================

/// Failures that make the inbound webhook request itself fail.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Classification(#[from] ClassificationError),

    #[error("tenant directory call for installation {installation_id} failed: {source}")]
    Directory {
        installation_id: InstallationId,
        #[source]
        source: DirectoryError,
    },

    #[error(transparent)]
    Relay(#[from] RelayError),
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
