//! Tests for error classification.

use super::*;

mod directory_error_tests {
    use super::*;

    #[test]
    fn test_server_errors_are_transient() {
        let err = DirectoryError::UnexpectedStatus {
            status: 503,
            body: "unavailable".to_string(),
        };

        assert!(err.is_transient());
    }

    #[test]
    fn test_rate_limit_is_transient() {
        let err = DirectoryError::UnexpectedStatus {
            status: 429,
            body: String::new(),
        };

        assert!(err.is_transient());
    }

    #[test]
    fn test_client_errors_are_permanent() {
        let err = DirectoryError::UnexpectedStatus {
            status: 404,
            body: "not found".to_string(),
        };

        assert!(!err.is_transient());
    }

    #[test]
    fn test_decode_failure_is_permanent() {
        let err = DirectoryError::InvalidResponse {
            message: "expected array".to_string(),
        };

        assert!(!err.is_transient());
    }
}

mod credential_error_tests {
    use super::*;

    #[test]
    fn test_missing_token_is_permanent() {
        let err = CredentialError::MissingToken {
            installation_id: InstallationId::new(3),
        };

        assert!(!err.is_transient());
        assert!(err.to_string().contains('3'));
    }

    #[test]
    fn test_wrapped_directory_error_keeps_classification() {
        let err: CredentialError = DirectoryError::Transport {
            message: "connection reset".to_string(),
        }
        .into();

        assert!(err.is_transient());
    }

    #[test]
    fn test_wrapped_auth_error_is_permanent() {
        let err: CredentialError = GitHubApiError::from(AuthError::InvalidPrivateKey {
            message: "bad pem".to_string(),
        })
        .into();

        assert!(!err.is_transient());
    }
}

mod delivery_error_tests {
    use super::*;

    #[test]
    fn test_not_configured_is_retryable() {
        let err = DeliveryError::NotConfigured {
            status: 500,
            body: "repository not configured".to_string(),
        };

        assert!(err.is_retryable());
        assert!(err.is_not_configured());
    }

    #[test]
    fn test_other_rejections_are_retryable() {
        let err = DeliveryError::Rejected {
            status: 404,
            body: String::new(),
        };

        assert!(err.is_retryable());
        assert!(!err.is_not_configured());
    }

    #[test]
    fn test_body_read_failure_is_permanent() {
        let err = DeliveryError::BodyRead {
            message: "connection closed".to_string(),
        };

        assert!(!err.is_retryable());
    }

    #[test]
    fn test_invalid_destination_is_permanent() {
        let err = DeliveryError::InvalidDestination {
            url: "not a url".to_string(),
            message: "builder error".to_string(),
        };

        assert!(!err.is_retryable());
        assert!(err.to_string().contains("\"not a url\""));
    }
}

mod classification_error_tests {
    use super::*;

    #[test]
    fn test_messages_match_wire_text() {
        assert_eq!(
            ClassificationError::MissingInstallationId.to_string(),
            "missing installation ID"
        );
        assert_eq!(
            ClassificationError::NoInstallation.to_string(),
            "No installation in webhook"
        );
    }
}
