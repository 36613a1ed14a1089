//! Request executor behavior against a mock platform: bearer
//! injection, the single refresh-and-retry on 401, and the apply
//! outcome parsing.

use chrono::{Duration, Utc};
use reqwest::Method;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use job_hunter::config::{ApiConfig, AppConfig, OauthConfig};
use job_hunter::core::classifier::ClassifierConfig;
use job_hunter::core::database::{Database, Profile, ProfileRepository};
use job_hunter::core::error::{AuthError, ClientError};
use job_hunter::ApiClient;

fn test_config(server_uri: &str) -> AppConfig {
    AppConfig {
        data_dir: std::env::temp_dir(),
        database_path: std::env::temp_dir().join("jobhunt-test-unused.sqlite"),
        api: ApiConfig {
            base_url: server_uri.to_string(),
            timeout_seconds: 5,
            user_agent: "jobhunt-test".to_string(),
        },
        oauth: OauthConfig {
            base_url: format!("{server_uri}/oauth"),
            client_id: "client-id".to_string(),
            client_secret: "client-secret".to_string(),
            redirect_port: 9037,
        },
        classifier: ClassifierConfig::default(),
    }
}

fn profile(expiry_offset_secs: i64, refresh_token: &str) -> Profile {
    Profile {
        profile_name: "alice".to_string(),
        remote_user_id: "u-1".to_string(),
        email: "alice@example.com".to_string(),
        access_token: "stored-token".to_string(),
        refresh_token: refresh_token.to_string(),
        expires_at: Utc::now() + Duration::seconds(expiry_offset_secs),
    }
}

async fn client_with(server: &MockServer, profile: Profile) -> (Database, ApiClient) {
    let db = Database::in_memory().await.unwrap();
    let profiles = ProfileRepository::new(db.pool().clone());
    profiles.save_or_update(&profile).await.unwrap();
    let client = ApiClient::new(&test_config(&server.uri()), profiles, profile).unwrap();
    (db, client)
}

fn token_response() -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(serde_json::json!({
        "access_token": "fresh-token",
        "refresh_token": "fresh-refresh",
        "expires_in": 3600
    }))
}

#[tokio::test]
async fn valid_token_is_sent_without_refreshing() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(token_response())
        .expect(0)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/me"))
        .and(header("authorization", "Bearer stored-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": "u-1",
            "email": "alice@example.com"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let (_db, client) = client_with(&server, profile(3600, "refresh")).await;
    let me = client.me().await.unwrap();
    assert_eq!(me.id, "u-1");
}

#[tokio::test]
async fn expired_token_is_refreshed_before_the_call() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(token_response())
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/me"))
        .and(header("authorization", "Bearer fresh-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": "u-1"})))
        .expect(1)
        .mount(&server)
        .await;

    let (db, client) = client_with(&server, profile(-60, "refresh")).await;
    client.me().await.unwrap();

    // The refreshed token set is persisted onto the profile row.
    let profiles = ProfileRepository::new(db.pool().clone());
    let stored = profiles.load("alice").await.unwrap();
    assert_eq!(stored.access_token, "fresh-token");
    assert_eq!(stored.refresh_token, "fresh-refresh");
    assert!(stored.expires_at > Utc::now());
}

#[tokio::test]
async fn first_401_triggers_exactly_one_refresh_and_retry() {
    let server = MockServer::start().await;

    // Locally valid token the platform no longer accepts, once.
    Mock::given(method("GET"))
        .and(path("/me"))
        .respond_with(ResponseTemplate::new(401))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(token_response())
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/me"))
        .and(header("authorization", "Bearer fresh-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": "u-1"})))
        .expect(1)
        .mount(&server)
        .await;

    let (_db, client) = client_with(&server, profile(3600, "refresh")).await;
    let me = client.me().await.unwrap();
    assert_eq!(me.id, "u-1");
}

#[tokio::test]
async fn second_401_is_terminal_without_a_third_attempt() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/me"))
        .respond_with(ResponseTemplate::new(401))
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(token_response())
        .expect(1)
        .mount(&server)
        .await;

    let (_db, client) = client_with(&server, profile(3600, "refresh")).await;
    let err = client.me().await.unwrap_err();
    assert!(matches!(
        err,
        ClientError::Auth(AuthError::Unauthorized)
    ));
}

#[tokio::test]
async fn other_errors_propagate_without_retry() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/me"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(token_response())
        .expect(0)
        .mount(&server)
        .await;

    let (_db, client) = client_with(&server, profile(3600, "refresh")).await;
    let err = client.me().await.unwrap_err();
    match err {
        ClientError::Api { status, body } => {
            assert_eq!(status, 500);
            assert_eq!(body, "boom");
        }
        other => panic!("expected ApiError, got {other:?}"),
    }
}

#[tokio::test]
async fn missing_refresh_token_fails_before_any_network_call() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/me"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let (_db, client) = client_with(&server, profile(-60, "")).await;
    let err = client.me().await.unwrap_err();
    assert!(matches!(
        err,
        ClientError::Auth(AuthError::NoRefreshToken)
    ));
}

#[tokio::test]
async fn rejected_refresh_surfaces_auth_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(ResponseTemplate::new(400).set_body_string("invalid_grant"))
        .expect(1)
        .mount(&server)
        .await;

    let (_db, client) = client_with(&server, profile(-60, "refresh")).await;
    let err = client.me().await.unwrap_err();
    match err {
        ClientError::Auth(AuthError::RefreshRejected { status, body }) => {
            assert_eq!(status, 400);
            assert_eq!(body, "invalid_grant");
        }
        other => panic!("expected RefreshRejected, got {other:?}"),
    }
}

#[tokio::test]
async fn no_content_is_distinct_from_json_null() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/empty"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/null"))
        .respond_with(ResponseTemplate::new(200).set_body_string("null"))
        .mount(&server)
        .await;

    let (_db, client) = client_with(&server, profile(3600, "refresh")).await;

    let empty = client.execute(Method::GET, "/empty", &[], None).await.unwrap();
    assert!(empty.is_none());

    let null = client.execute(Method::GET, "/null", &[], None).await.unwrap();
    assert_eq!(null, Some(serde_json::Value::Null));
}

#[tokio::test]
async fn apply_success_and_failure_reasons() {
    let server = MockServer::start().await;

    let expected_body = serde_json::json!({
        "resume_id": "r1",
        "vacancy_id": "v1",
        "message": "hello",
    });
    Mock::given(method("POST"))
        .and(path("/negotiations"))
        .and(body_json(&expected_body))
        .respond_with(ResponseTemplate::new(201))
        .up_to_n_times(1)
        .mount(&server)
        .await;

    let (_db, client) = client_with(&server, profile(3600, "refresh")).await;

    let outcome = client.apply_to_vacancy("r1", "v1", "hello").await.unwrap();
    assert!(outcome.ok);
    assert_eq!(outcome.reason, None);

    // Platform rejects with a parseable reason.
    server.reset().await;
    Mock::given(method("POST"))
        .and(path("/negotiations"))
        .respond_with(ResponseTemplate::new(403).set_body_json(serde_json::json!({
            "errors": [{"type": "negotiations", "value": "test_required"}]
        })))
        .mount(&server)
        .await;

    let outcome = client.apply_to_vacancy("r1", "v2", "hello").await.unwrap();
    assert!(!outcome.ok);
    assert_eq!(outcome.reason.as_deref(), Some("test_required"));

    // Unparseable body downgrades to an http_<status> reason.
    server.reset().await;
    Mock::given(method("POST"))
        .and(path("/negotiations"))
        .respond_with(ResponseTemplate::new(404).set_body_string("gone"))
        .mount(&server)
        .await;

    let outcome = client.apply_to_vacancy("r1", "v3", "hello").await.unwrap();
    assert!(!outcome.ok);
    assert_eq!(outcome.reason.as_deref(), Some("http_404"));
}
