//! Tests for [`ServiceConfig`] validation and loading.

use super::*;
use serial_test::serial;
use std::io::Write;
use tempfile::NamedTempFile;

const TEST_KEY: &str = include_str!("../../hook-relay-core/testdata/test_app_key.pem");

fn key_file(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

fn valid_config(key: &NamedTempFile) -> ServiceConfig {
    let mut config = ServiceConfig::default();
    config.app.app_id = 1234;
    config.app.hmac_token = "secret".to_string();
    config.app.private_key_file = key.path().to_path_buf();
    config
}

// ============================================================================
// Defaults
// ============================================================================

mod default_tests {
    use super::*;

    #[test]
    fn test_defaults_match_deployment_conventions() {
        let config = ServiceConfig::default();

        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.webhook_path, "/hook");
        assert_eq!(config.server.shutdown_timeout_seconds, 30);
        assert_eq!(config.app.bot_name, "jenkins-x-bot");
        assert_eq!(config.app.git_server, "https://github.com");
        assert_eq!(config.app.digest_algorithm, DigestAlgorithm::Sha1);
        assert_eq!(config.app.credential_source, CredentialSource::Tenant);
        assert_eq!(config.tenant.base_url, "http://jx-internal-tenant-service");
        assert_eq!(config.relay.max_elapsed_seconds, 30);
        assert_eq!(config.credentials.default_ttl_seconds, 600);
        assert_eq!(config.debug.verify_repository, "jenkins-x/lighthouse");
    }

    #[test]
    fn test_app_debug_redacts_hmac_token() {
        let mut app = AppConfig::default();
        app.hmac_token = "very-secret-token".to_string();

        let debug_str = format!("{:?}", app);

        assert!(!debug_str.contains("very-secret-token"));
        assert!(debug_str.contains("REDACTED"));
    }

    #[test]
    fn test_debug_flag_forces_debug_filter() {
        let logging = LoggingConfig {
            level: "warn".to_string(),
            json_format: false,
            debug: true,
        };

        let directive = logging.filter_directive();

        assert!(directive.contains("hook_relay_core=debug"));
        assert!(!directive.contains("warn"));
    }
}

// ============================================================================
// Validation
// ============================================================================

mod validation_tests {
    use super::*;

    #[test]
    fn test_valid_config_passes() {
        let key = key_file(TEST_KEY);
        assert!(valid_config(&key).validate().is_ok());
    }

    #[test]
    fn test_zero_app_id_fails() {
        let key = key_file(TEST_KEY);
        let mut config = valid_config(&key);
        config.app.app_id = 0;

        let err = config.validate().unwrap_err();

        assert!(matches!(err, ConfigError::Missing { ref key } if key == "app.app_id"));
    }

    #[test]
    fn test_empty_private_key_path_fails() {
        let key = key_file(TEST_KEY);
        let mut config = valid_config(&key);
        config.app.private_key_file = std::path::PathBuf::new();

        let err = config.validate().unwrap_err();

        assert!(matches!(err, ConfigError::Missing { ref key } if key == "app.private_key_file"));
    }

    #[test]
    fn test_missing_private_key_file_fails() {
        let key = key_file(TEST_KEY);
        let mut config = valid_config(&key);
        config.app.private_key_file = "/definitely/not/here.pem".into();

        let err = config.validate().unwrap_err();

        assert!(matches!(err, ConfigError::Invalid { .. }));
        assert!(err.to_string().contains("failed to read private key file"));
    }

    #[test]
    fn test_empty_private_key_file_fails() {
        let key = key_file("  \n");
        let config = valid_config(&key);

        let err = config.validate().unwrap_err();

        assert!(err.to_string().contains("is empty"));
    }

    #[test]
    fn test_margin_not_below_ttl_fails() {
        let key = key_file(TEST_KEY);
        let mut config = valid_config(&key);
        config.credentials.safety_margin_seconds = config.credentials.default_ttl_seconds;

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_relay_budget_fails() {
        let key = key_file(TEST_KEY);
        let mut config = valid_config(&key);
        config.relay.max_elapsed_seconds = 0;

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_relative_webhook_path_fails() {
        let key = key_file(TEST_KEY);
        let mut config = valid_config(&key);
        config.server.webhook_path = "hook".to_string();

        let err = config.validate().unwrap_err();

        assert!(err.to_string().contains("server.webhook_path"));
    }

    #[test]
    fn test_unsupported_git_kind_fails() {
        let key = key_file(TEST_KEY);
        let mut config = valid_config(&key);
        config.app.git_kind = "gitlab".to_string();

        assert!(config.validate().is_err());
    }
}

// ============================================================================
// Loading
// ============================================================================

mod load_tests {
    use super::*;

    const ENV_VARS: &[&str] = &[
        CONFIG_FILE_ENV,
        "HOOK_RELAY__APP__APP_ID",
        "HOOK_RELAY__APP__HMAC_TOKEN",
        "HOOK_RELAY__APP__PRIVATE_KEY_FILE",
        "HOOK_RELAY__SERVER__PORT",
        "HOOK_RELAY__RELAY__MAX_ELAPSED_SECONDS",
    ];

    fn clear_env() {
        for var in ENV_VARS {
            std::env::remove_var(var);
        }
    }

    #[test]
    #[serial]
    fn test_environment_overrides_defaults() {
        clear_env();
        let key = key_file(TEST_KEY);
        std::env::set_var("HOOK_RELAY__APP__APP_ID", "777");
        std::env::set_var("HOOK_RELAY__APP__HMAC_TOKEN", "from-env");
        std::env::set_var("HOOK_RELAY__APP__PRIVATE_KEY_FILE", key.path());
        std::env::set_var("HOOK_RELAY__SERVER__PORT", "9090");

        let result = ServiceConfig::load();
        clear_env();

        let config = result.unwrap();
        assert_eq!(config.app.app_id, 777);
        assert_eq!(config.app.hmac_token, "from-env");
        assert_eq!(config.server.port, 9090);
        assert_eq!(config.server.webhook_path, "/hook");
    }

    #[test]
    #[serial]
    fn test_explicit_file_loaded_and_env_wins() {
        clear_env();
        let key = key_file(TEST_KEY);
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(
            file,
            "app:\n  app_id: 55\n  hmac_token: from-file\n  private_key_file: {}\nrelay:\n  max_elapsed_seconds: 5\n",
            key.path().display()
        )
        .unwrap();
        std::env::set_var(CONFIG_FILE_ENV, file.path());
        std::env::set_var("HOOK_RELAY__RELAY__MAX_ELAPSED_SECONDS", "7");

        let result = ServiceConfig::load();
        clear_env();

        let config = result.unwrap();
        assert_eq!(config.app.app_id, 55);
        assert_eq!(config.app.hmac_token, "from-file");
        assert_eq!(config.relay.max_elapsed_seconds, 7);
    }

    #[test]
    #[serial]
    fn test_missing_explicit_file_is_error() {
        clear_env();
        std::env::set_var(CONFIG_FILE_ENV, "/no/such/hook-relay.yaml");

        let result = ServiceConfig::load();
        clear_env();

        assert!(matches!(result, Err(ConfigError::Load(_))));
    }

    #[test]
    #[serial]
    fn test_unconfigured_environment_fails_validation() {
        clear_env();

        let result = ServiceConfig::load();

        assert!(matches!(result, Err(ConfigError::Missing { .. })));
    }
}
