//! Expiry-aware cache of installation credentials.
//!
//! Entries are refreshed lazily on lookup; nothing runs in the background.
//! Concurrent misses for the same installation may each reach the provider,
//! and the last one to finish wins the slot.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::{debug, info, instrument, warn};

use super::{Clock, CredentialProvider, InstallationCredential, SystemClock};
use crate::config::CredentialCacheConfig;
use crate::error::CredentialError;
use crate::retry::{RetryError, RetryPolicy};
use crate::InstallationId;

/// Shared, thread-safe credential cache keyed by installation.
///
/// # Examples
///
/// ```rust
/// use async_trait::async_trait;
/// use hook_relay_core::credentials::{CredentialCache, CredentialProvider, InstallationCredential};
/// use hook_relay_core::{CredentialCacheConfig, CredentialError, InstallationId};
/// use std::sync::Arc;
///
/// struct StaticProvider;
///
/// #[async_trait]
/// impl CredentialProvider for StaticProvider {
///     async fn fetch_credential(
///         &self,
///         installation_id: InstallationId,
///     ) -> Result<InstallationCredential, CredentialError> {
///         Ok(InstallationCredential::new("ghs_example".to_string(), installation_id, None))
///     }
/// }
///
/// # tokio_test::block_on(async {
/// let cache = CredentialCache::new(Arc::new(StaticProvider), &CredentialCacheConfig::default());
///
/// let credential = cache.get(InstallationId::new(1)).await.unwrap();
///
/// assert_eq!(credential.token(), "ghs_example");
/// assert_eq!(cache.len(), 1);
/// # });
/// ```
#[derive(Clone)]
pub struct CredentialCache {
    provider: Arc<dyn CredentialProvider>,
    clock: Arc<dyn Clock>,
    default_ttl: Duration,
    safety_margin: Duration,
    entries: Arc<RwLock<HashMap<InstallationId, CachedCredential>>>,
}

struct CachedCredential {
    credential: InstallationCredential,
    valid_until: DateTime<Utc>,
}

impl CredentialCache {
    pub fn new(provider: Arc<dyn CredentialProvider>, config: &CredentialCacheConfig) -> Self {
        Self::with_clock(provider, config, Arc::new(SystemClock))
    }

    pub fn with_clock(
        provider: Arc<dyn CredentialProvider>,
        config: &CredentialCacheConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            provider,
            clock,
            default_ttl: config.default_ttl(),
            safety_margin: config.safety_margin(),
            entries: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Return a usable credential for `installation_id`.
    ///
    /// Served from cache while `now < valid_until`; otherwise fetched from the
    /// provider. Provider failures are returned as-is and nothing is cached.
    #[instrument(skip(self), fields(installation_id = %installation_id))]
    pub async fn get(
        &self,
        installation_id: InstallationId,
    ) -> Result<InstallationCredential, CredentialError> {
        if let Some(credential) = self.lookup(installation_id, self.clock.now())? {
            debug!("Credential served from cache");
            return Ok(credential);
        }

        let credential = self.provider.fetch_credential(installation_id).await?;
        self.cleanup_expired();
        let now = self.clock.now();

        match self.cache_ttl(&credential, now) {
            Some(ttl) => {
                let mut entries = self.entries.write().map_err(|e| CredentialError::Cache {
                    message: format!("Failed to acquire write lock: {}", e),
                })?;
                entries.insert(
                    installation_id,
                    CachedCredential {
                        credential: credential.clone(),
                        valid_until: now + ttl,
                    },
                );
                info!(ttl_seconds = ttl.num_seconds(), "Cached fresh installation credential");
            }
            None => {
                self.invalidate(installation_id)?;
                warn!(
                    expires_at = ?credential.expires_at(),
                    "Credential expires within the safety margin; not caching"
                );
            }
        }

        Ok(credential)
    }

    /// [`get`](Self::get) retried under `policy` while the failure is transient.
    pub async fn get_with_retry(
        &self,
        installation_id: InstallationId,
        policy: &RetryPolicy,
    ) -> Result<InstallationCredential, RetryError<CredentialError>> {
        policy
            .retry(
                "refresh_credential",
                |_| self.get(installation_id),
                CredentialError::is_transient,
            )
            .await
    }

    /// Drop any cached credential for `installation_id`.
    pub fn invalidate(&self, installation_id: InstallationId) -> Result<(), CredentialError> {
        let mut entries = self.entries.write().map_err(|e| CredentialError::Cache {
            message: format!("Failed to acquire write lock: {}", e),
        })?;
        entries.remove(&installation_id);
        Ok(())
    }

    /// Remove entries that can no longer be served. Runs on every miss.
    pub fn cleanup_expired(&self) {
        let now = self.clock.now();
        if let Ok(mut entries) = self.entries.write() {
            entries.retain(|_, cached| now < cached.valid_until);
        }
    }

    /// Number of entries currently held, including stale ones not yet cleaned.
    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lookup(
        &self,
        installation_id: InstallationId,
        now: DateTime<Utc>,
    ) -> Result<Option<InstallationCredential>, CredentialError> {
        let entries = self.entries.read().map_err(|e| CredentialError::Cache {
            message: format!("Failed to acquire read lock: {}", e),
        })?;

        Ok(entries
            .get(&installation_id)
            .filter(|cached| now < cached.valid_until)
            .map(|cached| cached.credential.clone()))
    }

    /// `min(default_ttl, expires_at - now - margin)`, or `None` when that is
    /// not positive.
    fn cache_ttl(&self, credential: &InstallationCredential, now: DateTime<Utc>) -> Option<Duration> {
        let ttl = match credential.expires_at() {
            Some(expires_at) => self
                .default_ttl
                .min(expires_at - now - self.safety_margin),
            None => self.default_ttl,
        };

        (ttl > Duration::zero()).then_some(ttl)
    }
}

#[cfg(test)]
#[path = "cache_tests.rs"]
mod tests;
