use super::*;

mod relay_config_tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RelayConfig::default();

        assert_eq!(config.max_elapsed(), Duration::from_secs(30));
        assert_eq!(config.insecure_host_markers.len(), 3);
        assert_eq!(config.not_configured_marker, "repository not configured");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_request_timeout_bounded_by_budget() {
        let config = RelayConfig {
            request_timeout_seconds: 60,
            max_elapsed_seconds: 5,
            ..RelayConfig::default()
        };

        assert_eq!(config.request_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn test_retry_policy_reflects_config() {
        let config = RelayConfig {
            initial_interval_ms: 500,
            multiplier: 3.0,
            max_elapsed_seconds: 9,
            ..RelayConfig::default()
        };

        let policy = config.retry_policy();

        assert_eq!(policy.initial_interval, Duration::from_millis(500));
        assert_eq!(policy.calculate_delay(1), Duration::from_millis(1500));
        assert_eq!(policy.max_elapsed, Duration::from_secs(9));
    }

    #[test]
    fn test_retry_policy_caps_interval() {
        let config = RelayConfig {
            max_interval_seconds: 4,
            ..RelayConfig::default()
        };

        let policy = config.retry_policy();

        assert_eq!(policy.calculate_delay(0), Duration::from_secs(2));
        assert_eq!(policy.calculate_delay(5), Duration::from_secs(4));
    }

    #[test]
    fn test_scoped_leaves_original_untouched() {
        let config = RelayConfig::default();

        let markers = config.scoped(
            |c| c.insecure_host_markers = vec![".example.test".to_string()],
            |c| c.insecure_host_markers.clone(),
        );

        assert_eq!(markers, vec![".example.test".to_string()]);
        assert_eq!(config.insecure_host_markers.len(), 3);
    }

    #[test]
    fn test_scoped_restores_after_panic() {
        let config = RelayConfig::default();

        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            config.scoped(|c| c.max_elapsed_seconds = 1, |_| panic!("boom"))
        }));

        assert!(outcome.is_err());
        assert_eq!(config.max_elapsed_seconds, 30);
    }

    #[test]
    fn test_zero_budget_rejected() {
        let config = RelayConfig {
            max_elapsed_seconds: 0,
            ..RelayConfig::default()
        };

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_deserialize_uses_defaults() {
        let config: RelayConfig =
            serde_json::from_str(r#"{"max_elapsed_seconds": 12}"#).unwrap();

        assert_eq!(config.max_elapsed_seconds, 12);
        assert_eq!(config.initial_interval_ms, 2_000);
    }
}

mod credential_cache_config_tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = CredentialCacheConfig::default();

        assert_eq!(config.default_ttl(), chrono::Duration::minutes(10));
        assert_eq!(config.safety_margin(), chrono::Duration::minutes(2));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_margin_not_below_ttl_rejected() {
        let config = CredentialCacheConfig {
            default_ttl_seconds: 60,
            safety_margin_seconds: 60,
        };

        assert!(config.validate().is_err());
    }
}
