use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};

use multi_repo_extractor_core::contract::ProviderError;
use multi_repo_extractor_core::provider::{build_provider, ProviderConfig, ProviderKind, Visibility};

#[derive(Clone, Default)]
struct Seen {
    query: Arc<Mutex<HashMap<String, String>>>,
    authorization: Arc<Mutex<Option<String>>>,
}

impl Seen {
    fn record(&self, query: HashMap<String, String>, headers: &HeaderMap) {
        *self.query.lock().unwrap() = query;
        *self.authorization.lock().unwrap() = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
    }
}

/// Serves `router` on an ephemeral port and returns its base URL.
async fn serve(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

fn config(kind: ProviderKind, visibility: Visibility, api_base: String) -> ProviderConfig {
    ProviderConfig {
        kind,
        username: Some("octo".to_string()),
        token: "s3cr3t".to_string(),
        visibility,
        api_base: Some(api_base),
    }
}

#[tokio::test]
async fn github_lists_repositories_with_numeric_ids() {
    let seen = Seen::default();
    let router = Router::new()
        .route(
            "/user/repos",
            get(
                |State(seen): State<Seen>, Query(query): Query<HashMap<String, String>>, headers: HeaderMap| async move {
                    seen.record(query, &headers);
                    Json(json!([
                        {"id": 134240628, "full_name": "octo/alpha", "name": "alpha", "private": false},
                        {"id": 134240629, "full_name": "octo/beta", "name": "beta", "private": false}
                    ]))
                },
            ),
        )
        .with_state(seen.clone());
    let base = serve(router).await;

    let provider = build_provider(&config(ProviderKind::GitHub, Visibility::Public, base)).unwrap();
    let repos = provider.list_repositories().await.unwrap();

    let ids: Vec<&str> = repos.iter().map(|r| r.id.as_str()).collect();
    let names: Vec<&str> = repos.iter().map(|r| r.full_name.as_str()).collect();
    assert_eq!(ids, vec!["134240628", "134240629"]);
    assert_eq!(names, vec!["octo/alpha", "octo/beta"]);
    assert_eq!(repos[0].name, "alpha");
    assert_eq!(seen.query.lock().unwrap().get("visibility").map(String::as_str), Some("public"));
    assert_eq!(seen.authorization.lock().unwrap().as_deref(), Some("Bearer s3cr3t"));
}

#[tokio::test]
async fn github_rejected_token_is_an_authentication_error() {
    let router = Router::new().route(
        "/user/repos",
        get(|| async { (StatusCode::UNAUTHORIZED, Json(json!({"message": "Bad credentials"}))) }),
    );
    let base = serve(router).await;

    let provider = build_provider(&config(ProviderKind::GitHub, Visibility::Private, base)).unwrap();
    let err = provider.list_repositories().await.unwrap_err();
    assert!(matches!(err, ProviderError::Authentication { status: 401, .. }), "{err:?}");
}

#[tokio::test]
async fn github_unexpected_body_is_a_decode_error() {
    let router = Router::new().route("/user/repos", get(|| async { Json(json!({"not": "a list"})) }));
    let base = serve(router).await;

    let provider = build_provider(&config(ProviderKind::GitHub, Visibility::All, base)).unwrap();
    let err = provider.list_repositories().await.unwrap_err();
    assert!(matches!(err, ProviderError::Decode { .. }), "{err:?}");
}

fn bitbucket_page() -> Value {
    json!({
        "pagelen": 10,
        "values": [
            {"uuid": "{3f63c6a2-0001}", "full_name": "team/one", "name": "one", "is_private": true},
            {"uuid": "{3f63c6a2-0002}", "full_name": "team/two", "name": "two", "is_private": true}
        ]
    })
}

#[tokio::test]
async fn bitbucket_private_sends_contributor_role_and_privacy_filter() {
    let seen = Seen::default();
    let router = Router::new()
        .route(
            "/2.0/repositories",
            get(
                |State(seen): State<Seen>, Query(query): Query<HashMap<String, String>>, headers: HeaderMap| async move {
                    seen.record(query, &headers);
                    Json(bitbucket_page())
                },
            ),
        )
        .with_state(seen.clone());
    let base = serve(router).await;

    let provider = build_provider(&config(ProviderKind::Bitbucket, Visibility::Private, base)).unwrap();
    let repos = provider.list_repositories().await.unwrap();

    assert_eq!(repos.len(), 2);
    assert_eq!(repos[0].id, "{3f63c6a2-0001}");
    assert_eq!(repos[1].full_name, "team/two");

    let query = seen.query.lock().unwrap().clone();
    assert_eq!(query.get("role").map(String::as_str), Some("contributor"));
    assert_eq!(query.get("q").map(String::as_str), Some("is_private = true"));
    let auth = seen.authorization.lock().unwrap().clone().unwrap();
    assert!(auth.starts_with("Basic "), "{auth}");
}

#[tokio::test]
async fn bitbucket_all_sends_no_privacy_filter() {
    let seen = Seen::default();
    let router = Router::new()
        .route(
            "/2.0/repositories",
            get(
                |State(seen): State<Seen>, Query(query): Query<HashMap<String, String>>, headers: HeaderMap| async move {
                    seen.record(query, &headers);
                    Json(bitbucket_page())
                },
            ),
        )
        .with_state(seen.clone());
    let base = serve(router).await;

    let provider = build_provider(&config(ProviderKind::Bitbucket, Visibility::All, base)).unwrap();
    provider.list_repositories().await.unwrap();

    let query = seen.query.lock().unwrap().clone();
    assert_eq!(query.get("role").map(String::as_str), Some("contributor"));
    assert!(!query.contains_key("q"));
}

#[tokio::test]
async fn bitbucket_forbidden_is_an_authentication_error() {
    let router = Router::new().route("/2.0/repositories", get(|| async { StatusCode::FORBIDDEN }));
    let base = serve(router).await;

    let provider = build_provider(&config(ProviderKind::Bitbucket, Visibility::Public, base)).unwrap();
    let err = provider.list_repositories().await.unwrap_err();
    assert!(matches!(err, ProviderError::Authentication { status: 403, .. }), "{err:?}");
}
