//! Tests for envelope classification.

use super::*;
use crate::webhook::WebhookHeaders;
use bytes::Bytes;
use serde_json::json;

fn envelope(event_type: &str, body: serde_json::Value) -> WebhookEnvelope {
    let headers = WebhookHeaders {
        event_type: event_type.to_string(),
        delivery_id: "delivery-1".to_string(),
        signature: None,
    };
    WebhookEnvelope::parse(headers, Bytes::from(body.to_string())).unwrap()
}

mod installation_tests {
    use super::*;

    #[test]
    fn test_created_installation_classified_as_lifecycle() {
        let env = envelope(
            "installation",
            json!({
                "action": "created",
                "installation": { "id": 42, "account": { "html_url": "https://github.com/acme" } }
            }),
        );

        let classification = classify(&env).unwrap();

        assert_eq!(
            classification,
            Classification::InstallationLifecycle(InstallationLifecycle {
                action: InstallationAction::Create,
                installation_id: InstallationId::new(42),
                owner_url: "https://github.com/acme".to_string(),
            })
        );
    }

    #[test]
    fn test_zero_installation_id_rejected() {
        let env = envelope(
            "installation",
            json!({ "action": "created", "installation": { "id": 0 } }),
        );

        let err = classify(&env).unwrap_err();

        assert!(matches!(err, ClassificationError::MissingInstallationId));
        assert_eq!(err.to_string(), "missing installation ID");
    }

    #[test]
    fn test_missing_installation_object_rejected() {
        let env = envelope("installation", json!({ "action": "deleted" }));

        assert!(matches!(
            classify(&env).unwrap_err(),
            ClassificationError::MissingInstallationId
        ));
    }

    #[test]
    fn test_repositories_change_carries_lists() {
        let env = envelope(
            "installation_repositories",
            json!({
                "action": "removed",
                "installation": { "id": 7, "account": { "html_url": "https://github.com/acme" } },
                "repositories_removed": [ { "full_name": "acme/old" } ]
            }),
        );

        match classify(&env).unwrap() {
            Classification::InstallationRepoChange(change) => {
                assert_eq!(change.action, RepositoriesAction::Removed);
                assert_eq!(change.installation_id, InstallationId::new(7));
                assert_eq!(change.removed, vec!["acme/old".to_string()]);
                assert!(change.added.is_empty());
            }
            other => panic!("unexpected classification {other:?}"),
        }
    }
}

mod repository_event_tests {
    use super::*;

    #[test]
    fn test_push_classified_as_general_event() {
        let env = envelope(
            "push",
            json!({
                "repository": {
                    "name": "demo",
                    "owner": { "login": "acme" },
                    "html_url": "https://github.com/acme/demo"
                },
                "installation": { "id": 3 }
            }),
        );

        match classify(&env).unwrap() {
            Classification::GeneralRepoEvent(event) => {
                assert_eq!(event.installation_id, InstallationId::new(3));
                assert_eq!(event.repository.full_name, "acme/demo");
            }
            other => panic!("unexpected classification {other:?}"),
        }
    }

    #[test]
    fn test_repository_event_without_installation_rejected() {
        let env = envelope(
            "pull_request",
            json!({ "repository": { "name": "demo" } }),
        );

        let err = classify(&env).unwrap_err();

        assert_eq!(err.to_string(), "No installation in webhook");
    }

    #[test]
    fn test_ping_classified_as_unrecognized() {
        let env = envelope("ping", json!({ "zen": "Design for failure." }));

        assert_eq!(
            classify(&env).unwrap(),
            Classification::Unrecognized {
                event_type: "ping".to_string()
            }
        );
    }
}
