use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;
use tempfile::tempdir;

use multi_repo_extractor::update::{UpdateChecker, UpdateOutcome, Version, BINARY_NAME};

async fn serve(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

fn installed() -> Version {
    Version { major: 1, minor: 2, patch: 0 }
}

/// Release endpoint announcing `name`, with one asset per platform served from the same host.
async fn release_server(name: &'static str) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let base = format!("http://{addr}");
    let assets: Vec<_> = ["linux", "osx", "windows"]
        .iter()
        .map(|os| {
            json!({
                "name": format!("multi_repo_extractor_{os}_amd64"),
                "browser_download_url": format!("{base}/download/{os}")
            })
        })
        .collect();
    let release = json!({"name": name, "tag_name": name, "assets": assets});

    let router = Router::new()
        .route(
            "/releases/latest",
            get(move || {
                let release = release.clone();
                async move { Json(release) }
            }),
        )
        .route("/download/{os}", get(|| async { "new-binary" }));
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    base
}

#[tokio::test]
async fn same_version_is_up_to_date() {
    let base = release_server("v1.2.0").await;
    let dir = tempdir().unwrap();

    let outcome = UpdateChecker::with_release_url(dir.path().to_path_buf(), format!("{base}/releases/latest"), installed())
        .check()
        .await;

    assert_eq!(outcome, UpdateOutcome::UpToDate);
    assert!(!dir.path().join(BINARY_NAME).exists());
}

#[tokio::test]
async fn newer_release_downloads_the_platform_binary() {
    let base = release_server("v1.10.0").await;
    let dir = tempdir().unwrap();

    let outcome = UpdateChecker::with_release_url(dir.path().to_path_buf(), format!("{base}/releases/latest"), installed())
        .check()
        .await;

    let path = dir.path().join(BINARY_NAME);
    assert_eq!(outcome, UpdateOutcome::Downloaded(path.clone()));
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "new-binary");
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o111, 0o111);
    }
}

#[tokio::test]
async fn unparseable_release_name_is_skipped() {
    let base = release_server("nightly").await;
    let dir = tempdir().unwrap();

    let outcome = UpdateChecker::with_release_url(dir.path().to_path_buf(), format!("{base}/releases/latest"), installed())
        .check()
        .await;

    assert_eq!(outcome, UpdateOutcome::Skipped);
}

#[tokio::test]
async fn unreachable_release_endpoint_is_skipped() {
    let router = Router::new();
    let base = serve(router).await;
    let dir = tempdir().unwrap();

    let outcome = UpdateChecker::with_release_url(dir.path().to_path_buf(), format!("{base}/releases/latest"), installed())
        .check()
        .await;

    assert_eq!(outcome, UpdateOutcome::Skipped);
}
