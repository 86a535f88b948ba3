//! Tests for the source-control API client.

use super::*;
use crate::credentials::PrivateKey;
use crate::AppId;
use serde_json::json;
use wiremock::matchers::{header_exists, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TEST_KEY: &str = include_str!("../testdata/test_app_key.pem");

fn app_client(server: &MockServer, bot: &str) -> GitHubAppClient {
    let jwt = AppJwtGenerator::new(AppId::new(12345), PrivateKey::from_pem(TEST_KEY).unwrap());
    GitHubAppClient::new(&server.uri(), Arc::new(jwt), bot, Duration::from_secs(5)).unwrap()
}

async fn mount_status(server: &MockServer, route: &str, status: u16, body: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(status).set_body_json(body))
        .mount(server)
        .await;
}

mod naming_tests {
    use super::*;

    #[test]
    fn test_bot_suffix_removed() {
        assert_eq!(bot_name("lighthouse-app[bot]"), "lighthouse-app");
    }

    #[test]
    fn test_empty_bot_name_defaults() {
        assert_eq!(bot_name(""), "jenkins-x");
        assert_eq!(bot_name("[bot]"), "jenkins-x");
    }

    #[test]
    fn test_app_name_title_cased() {
        assert_eq!(app_display_name("jenkins-x"), "Jenkins X");
        assert_eq!(app_display_name("MY-cool-BOT"), "My Cool Bot");
    }

    #[test]
    fn test_install_url() {
        assert_eq!(
            install_url("jenkins-x"),
            "https://github.com/apps/jenkins-x/installations/new"
        );
    }
}

mod installation_lookup_tests {
    use super::*;

    #[tokio::test]
    async fn test_repository_installation_grants_access() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/acme/demo/installation"))
            .and(header_exists("authorization"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": 1,
                "html_url": "https://github.com/organizations/acme/settings/installations/1"
            })))
            .mount(&server)
            .await;

        let client = app_client(&server, "");
        let status = client.find_installation("acme", Some("demo")).await.unwrap();

        assert_eq!(
            status,
            InstallationStatus {
                installed: true,
                access_to_repo: true,
                url: "https://github.com/organizations/acme/settings/installations/1".to_string(),
                app_name: "Jenkins X".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn test_falls_back_to_organization() {
        let server = MockServer::start().await;
        mount_status(&server, "/repos/acme/demo/installation", 404, json!({})).await;
        mount_status(
            &server,
            "/orgs/acme/installation",
            200,
            json!({ "html_url": "https://github.com/org-install" }),
        )
        .await;

        let client = app_client(&server, "");
        let status = client.find_installation("acme", Some("demo")).await.unwrap();

        assert!(status.installed);
        assert!(!status.access_to_repo);
        assert_eq!(status.url, "https://github.com/org-install");
    }

    #[tokio::test]
    async fn test_owner_only_lookup_skips_repository() {
        let server = MockServer::start().await;
        mount_status(&server, "/orgs/someone/installation", 404, json!({})).await;
        mount_status(
            &server,
            "/users/someone/installation",
            200,
            json!({ "html_url": "https://github.com/user-install" }),
        )
        .await;

        let client = app_client(&server, "");
        let status = client.find_installation("someone", None).await.unwrap();

        assert!(status.installed);
        assert_eq!(status.url, "https://github.com/user-install");
        let requested: Vec<String> = server
            .received_requests()
            .await
            .unwrap()
            .iter()
            .map(|r| r.url.path().to_string())
            .collect();
        assert!(!requested.iter().any(|p| p.starts_with("/repos/")));
    }

    #[tokio::test]
    async fn test_not_installed_returns_install_url() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = app_client(&server, "relay-bot[bot]");
        let status = client.find_installation("acme", Some("demo")).await.unwrap();

        assert!(!status.installed);
        assert_eq!(
            status.url,
            "https://github.com/apps/relay-bot/installations/new"
        );
        assert_eq!(status.app_name, "Relay Bot");
    }

    #[tokio::test]
    async fn test_unexpected_status_is_error() {
        let server = MockServer::start().await;
        mount_status(&server, "/repos/acme/demo/installation", 403, json!({})).await;

        let client = app_client(&server, "");
        let err = client
            .find_installation("acme", Some("demo"))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            GitHubApiError::UnexpectedStatus { status: 403, .. }
        ));
    }

    #[tokio::test]
    async fn test_reserved_characters_stay_inside_their_segment() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = app_client(&server, "");
        let status = client
            .find_installation("acme", Some("demo?per_page=1#top"))
            .await
            .unwrap();

        assert!(!status.installed);
        let requests = server.received_requests().await.unwrap();
        assert_eq!(
            requests[0].url.path(),
            "/repos/acme/demo%3Fper_page=1%23top/installation"
        );
        assert_eq!(requests[0].url.query(), None);
    }

    #[test]
    fn test_status_serializes_with_wire_names() {
        let status = InstallationStatus {
            installed: true,
            access_to_repo: false,
            url: "u".to_string(),
            app_name: "Jenkins X".to_string(),
        };

        let value = serde_json::to_value(&status).unwrap();

        assert_eq!(
            value,
            json!({ "Installed": true, "AccessToRepo": false, "URL": "u", "AppName": "Jenkins X" })
        );
    }
}

mod token_exchange_tests {
    use super::*;

    #[tokio::test]
    async fn test_access_token_exchanged() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/app/installations/77/access_tokens"))
            .and(header_exists("authorization"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "token": "ghs_installation",
                "expires_at": "2030-06-01T12:00:00Z"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = app_client(&server, "");
        let credential = client
            .fetch_credential(InstallationId::new(77))
            .await
            .unwrap();

        assert_eq!(credential.token(), "ghs_installation");
        assert!(credential.expires_at().is_some());
    }

    #[tokio::test]
    async fn test_exchange_failure_surfaces() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;

        let client = app_client(&server, "");
        let err = client
            .fetch_credential(InstallationId::new(77))
            .await
            .unwrap_err();

        assert!(matches!(err, CredentialError::GitHub(_)));
        assert!(err.is_transient());
    }
}

mod labels_tests {
    use super::*;

    #[tokio::test]
    async fn test_labels_listed_with_installation_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/acme/demo/issues/12/labels"))
            .and(query_param("per_page", "100"))
            .and(wiremock::matchers::header("authorization", "Bearer ghs_abc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                { "id": 1, "name": "bug" },
                { "id": 2, "name": "approved" }
            ])))
            .mount(&server)
            .await;

        let client = app_client(&server, "");
        let credential =
            InstallationCredential::new("ghs_abc".to_string(), InstallationId::new(3), None);
        let labels = client
            .installation_client(&credential)
            .unwrap()
            .list_pull_request_labels("acme/demo", 12)
            .await
            .unwrap();

        assert_eq!(labels, vec!["bug".to_string(), "approved".to_string()]);
    }

    #[tokio::test]
    async fn test_label_lookup_failure_is_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let client = app_client(&server, "");
        let credential =
            InstallationCredential::new("expired".to_string(), InstallationId::new(3), None);
        let err = client
            .installation_client(&credential)
            .unwrap()
            .list_pull_request_labels("acme/demo", 12)
            .await
            .unwrap_err();

        assert!(!err.is_transient());
    }
}
