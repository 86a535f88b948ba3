//! Configuration types for the HTTP service
//!
//! Sources, later ones overriding earlier ones:
//!
//! 1. `/etc/hook-relay/service.yaml`
//! 2. `./config/service.yaml`
//! 3. the file named by `HOOK_RELAY_CONFIG_FILE`, which must exist when set
//! 4. environment variables prefixed `HOOK_RELAY__`, e.g.
//!    `HOOK_RELAY__SERVER__PORT=9090` sets `server.port`
//!
//! Every field has a default, so an unconfigured environment only fails
//! validation on the App identity settings.

use hook_relay_core::{CredentialCacheConfig, DigestAlgorithm, RelayConfig};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::info;

use crate::errors::ConfigError;

/// Environment variable naming an explicit configuration file.
pub const CONFIG_FILE_ENV: &str = "HOOK_RELAY_CONFIG_FILE";

/// Prefix for configuration environment variables.
pub const ENV_PREFIX: &str = "HOOK_RELAY";

/// Service configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ServiceConfig {
    /// HTTP server settings
    pub server: ServerConfig,

    /// App identity and inbound authentication
    pub app: AppConfig,

    /// Tenant directory service
    pub tenant: TenantConfig,

    /// Relay delivery tunables
    pub relay: RelayConfig,

    /// Credential cache tunables
    pub credentials: CredentialCacheConfig,

    /// Token diagnostic endpoint settings
    pub debug: DebugConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl ServiceConfig {
    /// Load configuration from files and environment, then validate it.
    pub fn load() -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder()
            .add_source(
                config::File::with_name("/etc/hook-relay/service")
                    .required(false)
                    .format(config::FileFormat::Yaml),
            )
            .add_source(
                config::File::with_name("config/service")
                    .required(false)
                    .format(config::FileFormat::Yaml),
            );

        if let Ok(explicit_path) = std::env::var(CONFIG_FILE_ENV) {
            if !explicit_path.is_empty() {
                info!(path = %explicit_path, "Loading configuration from explicit path");
                builder = builder.add_source(
                    config::File::with_name(&explicit_path)
                        .required(true)
                        .format(config::FileFormat::Yaml),
                );
            }
        }

        let config: ServiceConfig = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("relay.insecure_host_markers"),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints and the private key file.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.server.validate()?;
        self.app.validate()?;
        self.tenant.validate()?;
        self.relay.validate().map_err(invalid)?;
        self.credentials.validate().map_err(invalid)?;
        if self.debug.verify_repository.split('/').count() != 2 {
            return Err(invalid(format!(
                "debug.verify_repository must be owner/name, got '{}'",
                self.debug.verify_repository
            )));
        }
        Ok(())
    }
}

fn invalid(message: String) -> ConfigError {
    ConfigError::Invalid { message }
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Graceful shutdown timeout in seconds
    pub shutdown_timeout_seconds: u64,

    /// Path the provider posts webhooks to
    pub webhook_path: String,

    /// Maximum request size in bytes
    pub max_body_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            shutdown_timeout_seconds: 30,
            webhook_path: "/hook".to_string(),
            max_body_size: 25 * 1024 * 1024, // 25MB, the provider's payload cap
        }
    }
}

impl ServerConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if !self.webhook_path.starts_with('/') {
            return Err(invalid(format!(
                "server.webhook_path must start with '/', got '{}'",
                self.webhook_path
            )));
        }
        if self.max_body_size == 0 {
            return Err(invalid("server.max_body_size must be greater than zero".to_string()));
        }
        Ok(())
    }
}

/// Where installation credentials come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CredentialSource {
    /// The tenant directory hands out installation tokens.
    #[default]
    Tenant,
    /// Exchange the App JWT for installation tokens directly.
    App,
}

/// App identity and inbound webhook authentication
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Numeric App id; zero means unset
    pub app_id: u64,

    /// PEM file holding the App's RSA private key
    pub private_key_file: PathBuf,

    /// Shared secret the provider signs webhooks with
    pub hmac_token: String,

    /// Algorithm for inbound and relayed signatures
    pub digest_algorithm: DigestAlgorithm,

    /// Bot account name, with or without the `[bot]` suffix
    pub bot_name: String,

    /// Source-control server the App is registered on
    pub git_server: String,

    /// Source-control provider kind
    pub git_kind: String,

    /// REST API base URL
    pub api_base_url: String,

    /// Installation credential source
    pub credential_source: CredentialSource,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            app_id: 0,
            private_key_file: PathBuf::new(),
            hmac_token: String::new(),
            digest_algorithm: DigestAlgorithm::Sha1,
            bot_name: "jenkins-x-bot".to_string(),
            git_server: "https://github.com".to_string(),
            git_kind: "github".to_string(),
            api_base_url: "https://api.github.com".to_string(),
            credential_source: CredentialSource::Tenant,
        }
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("app_id", &self.app_id)
            .field("private_key_file", &self.private_key_file)
            .field("hmac_token", &"<REDACTED>")
            .field("digest_algorithm", &self.digest_algorithm)
            .field("bot_name", &self.bot_name)
            .field("git_server", &self.git_server)
            .field("git_kind", &self.git_kind)
            .field("api_base_url", &self.api_base_url)
            .field("credential_source", &self.credential_source)
            .finish()
    }
}

impl AppConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.app_id == 0 {
            return Err(ConfigError::Missing {
                key: "app.app_id".to_string(),
            });
        }
        if self.hmac_token.is_empty() {
            return Err(ConfigError::Missing {
                key: "app.hmac_token".to_string(),
            });
        }
        if !self.git_kind.eq_ignore_ascii_case("github") {
            return Err(invalid(format!(
                "app.git_kind '{}' is not supported",
                self.git_kind
            )));
        }
        self.validate_private_key_file()
    }

    /// The key file must exist and hold something; PEM parsing happens at
    /// startup when the signer is built.
    fn validate_private_key_file(&self) -> Result<(), ConfigError> {
        if self.private_key_file.as_os_str().is_empty() {
            return Err(ConfigError::Missing {
                key: "app.private_key_file".to_string(),
            });
        }

        let contents = std::fs::read_to_string(&self.private_key_file).map_err(|e| {
            invalid(format!(
                "failed to read private key file {}: {}",
                self.private_key_file.display(),
                e
            ))
        })?;
        if contents.trim().is_empty() {
            return Err(invalid(format!(
                "private key file {} is empty",
                self.private_key_file.display()
            )));
        }
        Ok(())
    }
}

/// Tenant directory service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TenantConfig {
    /// Base URL of the directory service
    pub base_url: String,

    /// Timeout for one directory request in seconds
    pub request_timeout_seconds: u64,
}

impl Default for TenantConfig {
    fn default() -> Self {
        Self {
            base_url: "http://jx-internal-tenant-service".to_string(),
            request_timeout_seconds: 10,
        }
    }
}

impl TenantConfig {
    pub fn request_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.request_timeout_seconds)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.base_url.is_empty() {
            return Err(ConfigError::Missing {
                key: "tenant.base_url".to_string(),
            });
        }
        if self.request_timeout_seconds == 0 {
            return Err(invalid(
                "tenant.request_timeout_seconds must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Token diagnostic endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DebugConfig {
    /// Repository (`owner/name`) whose pull request labels are listed
    pub verify_repository: String,

    /// Pull request number whose labels are listed
    pub verify_pull_request: u64,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            verify_repository: "jenkins-x/lighthouse".to_string(),
            verify_pull_request: 1,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Logging level
    pub level: String,

    /// Enable JSON structured logging
    pub json_format: bool,

    /// Force debug level regardless of `level`
    pub debug: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
            debug: false,
        }
    }
}

impl LoggingConfig {
    /// Filter directive used when `RUST_LOG` is not set.
    pub fn filter_directive(&self) -> String {
        let level = if self.debug { "debug" } else { self.level.as_str() };
        format!(
            "hook_relay_service={level},hook_relay_api={level},hook_relay_core={level},tower_http=info"
        )
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
