//! Tunables for relay delivery and credential caching.
//!
//! These values are built once at startup and shared read-only. Tests that
//! need different values use [`RelayConfig::scoped`] instead of mutating a
//! shared instance.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::retry::RetryPolicy;

/// Relay delivery settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// First backoff interval in milliseconds
    pub initial_interval_ms: u64,

    /// Backoff growth factor
    pub multiplier: f64,

    /// Cap on a single backoff interval in seconds
    pub max_interval_seconds: u64,

    /// Total retry budget in seconds, shared by resolution and each delivery
    pub max_elapsed_seconds: u64,

    /// Random spread applied to each backoff (0.0 disables jitter)
    pub jitter_percent: f64,

    /// Timeout for a single outbound HTTP request in seconds
    pub request_timeout_seconds: u64,

    /// URL substrings that mark destinations served with non-public certificates
    pub insecure_host_markers: Vec<String>,

    /// Response body marker meaning the destination does not know the repository yet
    pub not_configured_marker: String,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            initial_interval_ms: 2_000,
            multiplier: 2.0,
            max_interval_seconds: 60,
            max_elapsed_seconds: 30,
            jitter_percent: 0.0,
            request_timeout_seconds: 10,
            insecure_host_markers: vec![
                "-pr-".to_string(),
                ".play-jxaas.live".to_string(),
                ".staging-jxaas.live".to_string(),
            ],
            not_configured_marker: "repository not configured".to_string(),
        }
    }
}

impl RelayConfig {
    pub fn max_elapsed(&self) -> Duration {
        Duration::from_secs(self.max_elapsed_seconds)
    }

    /// Per-request timeout, never longer than the whole retry budget.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds).min(self.max_elapsed())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            Duration::from_millis(self.initial_interval_ms),
            self.multiplier,
            self.max_elapsed(),
        )
        .with_max_interval(Duration::from_secs(self.max_interval_seconds))
        .with_jitter_percent(self.jitter_percent)
    }

    /// Run `f` against a modified copy of this configuration.
    ///
    /// `self` is never touched, so the original values are in effect again on
    /// every exit path from `f`, including unwinding.
    ///
    /// ```rust
    /// use hook_relay_core::RelayConfig;
    ///
    /// let config = RelayConfig::default();
    /// let budget = config.scoped(|c| c.max_elapsed_seconds = 5, |c| c.max_elapsed_seconds);
    ///
    /// assert_eq!(budget, 5);
    /// assert_eq!(config.max_elapsed_seconds, 30);
    /// ```
    pub fn scoped<R>(&self, modify: impl FnOnce(&mut Self), f: impl FnOnce(&Self) -> R) -> R {
        let mut overridden = self.clone();
        modify(&mut overridden);
        f(&overridden)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.max_elapsed_seconds == 0 {
            return Err("relay.max_elapsed_seconds must be greater than zero".to_string());
        }
        if self.initial_interval_ms == 0 {
            return Err("relay.initial_interval_ms must be greater than zero".to_string());
        }
        if self.max_interval_seconds == 0 {
            return Err("relay.max_interval_seconds must be greater than zero".to_string());
        }
        if self.multiplier < 1.0 {
            return Err("relay.multiplier must be at least 1.0".to_string());
        }
        if self.not_configured_marker.is_empty() {
            return Err("relay.not_configured_marker cannot be empty".to_string());
        }
        Ok(())
    }
}

/// Credential cache settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CredentialCacheConfig {
    /// Longest time a credential is kept, in seconds
    pub default_ttl_seconds: u64,

    /// How long before expiry a credential stops being served, in seconds
    pub safety_margin_seconds: u64,
}

impl Default for CredentialCacheConfig {
    fn default() -> Self {
        Self {
            default_ttl_seconds: 600,
            safety_margin_seconds: 120,
        }
    }
}

impl CredentialCacheConfig {
    pub fn default_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.default_ttl_seconds as i64)
    }

    pub fn safety_margin(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.safety_margin_seconds as i64)
    }

    /// The margin must be strictly below the TTL or every lookup would miss.
    pub fn validate(&self) -> Result<(), String> {
        if self.default_ttl_seconds == 0 {
            return Err("credentials.default_ttl_seconds must be greater than zero".to_string());
        }
        if self.safety_margin_seconds >= self.default_ttl_seconds {
            return Err(format!(
                "credentials.safety_margin_seconds ({}) must be smaller than default_ttl_seconds ({})",
                self.safety_margin_seconds, self.default_ttl_seconds
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
