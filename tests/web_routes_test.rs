//! Integration tests for the HTTP surface.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use media_relay::config::Config;
use media_relay::dispatcher::Dispatcher;
use media_relay::fetcher::{CloudFileFetcher, MediaExtractor, MediaMetadata};
use media_relay::platforms::IdentifierExtractor;
use media_relay::storage::MediaStore;
use media_relay::web::{create_app, serve, serve_on, AppState};
use serde_json::Value;
use std::sync::Mutex;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

/// What a fake collaborator writes to its destination.
#[derive(Clone, Copy)]
enum Behavior {
    Write(&'static [u8]),
    WriteEmpty,
    Fail,
}

struct FakeExtractor {
    calls: AtomicUsize,
    behavior: Behavior,
    delay: Duration,
    metadata: MediaMetadata,
}

impl FakeExtractor {
    fn new(behavior: Behavior) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            behavior,
            delay: Duration::ZERO,
            metadata: MediaMetadata {
                title: Some("A short clip".to_string()),
                thumbnail: Some("https://cdn.example.com/thumb.jpg".to_string()),
            },
        })
    }

    fn slow(behavior: Behavior, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            behavior,
            delay,
            metadata: MediaMetadata::default(),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MediaExtractor for FakeExtractor {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn extract(&self, _url: &str, dest: &Path) -> Result<MediaMetadata> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        match self.behavior {
            Behavior::Write(bytes) => {
                tokio::fs::write(dest, bytes).await?;
                Ok(self.metadata.clone())
            }
            Behavior::WriteEmpty => {
                tokio::fs::write(dest, b"").await?;
                Ok(MediaMetadata::default())
            }
            Behavior::Fail => anyhow::bail!("extractor exploded"),
        }
    }
}

#[derive(Default)]
struct FakeDrive {
    urls: Mutex<Vec<String>>,
}

#[async_trait]
impl CloudFileFetcher for FakeDrive {
    async fn fetch(&self, download_url: &str, dest: &Path) -> Result<()> {
        self.urls.lock().unwrap().push(download_url.to_string());
        tokio::fs::write(dest, b"drive bytes").await?;
        Ok(())
    }
}

struct TestApp {
    app: Router,
    dir: TempDir,
    media: Arc<FakeExtractor>,
    drive: Arc<FakeDrive>,
}

fn build_app(
    media: Arc<FakeExtractor>,
    fallback: Option<Arc<FakeExtractor>>,
    public_base_url: Option<&str>,
) -> TestApp {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let config = Config {
        storage_dir: dir.path().to_path_buf(),
        public_base_url: public_base_url.map(str::to_string),
        ..Config::for_testing()
    };
    let drive = Arc::new(FakeDrive::default());

    let mut dispatcher = Dispatcher::new(
        IdentifierExtractor::new(reqwest::Client::new(), Duration::from_secs(1)),
        MediaStore::new(dir.path()),
        drive.clone(),
        media.clone(),
    );
    if let Some(fallback) = fallback {
        dispatcher = dispatcher.with_tiktok_fallback(fallback);
    }

    let app = create_app(AppState {
        config: Arc::new(config),
        dispatcher: Arc::new(dispatcher),
    });

    TestApp {
        app,
        dir,
        media,
        drive,
    }
}

fn default_app() -> TestApp {
    build_app(
        FakeExtractor::new(Behavior::Write(b"video bytes")),
        None,
        Some("http://relay.test"),
    )
}

fn download_uri(url: &str) -> String {
    let encoded: String = url::form_urlencoded::byte_serialize(url.as_bytes()).collect();
    format!("/download?url={encoded}")
}

async fn get(app: &Router, uri: &str) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = serde_json::from_slice(&body).unwrap_or(Value::Null);
    (status, json)
}

fn media_files(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
        .collect();
    names.sort();
    names
}

// ========== /download ==========

#[tokio::test]
async fn test_download_missing_url() {
    let t = default_app();

    let (status, json) = get(&t.app, "/download").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["success"], false);

    let (status, json) = get(&t.app, "/download?url=").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["success"], false);
}

#[tokio::test]
async fn test_download_unsupported_platform_writes_nothing() {
    let t = default_app();

    let (status, json) = get(&t.app, &download_uri("https://example.com/video")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["success"], false);
    assert_eq!(t.media.calls(), 0);
    assert!(media_files(t.dir.path()).is_empty());
}

#[tokio::test]
async fn test_download_tiktok_then_short_circuit() {
    let t = default_app();
    let uri = download_uri("https://www.tiktok.com/@user/video/123456789");

    let (status, first) = get(&t.app, &uri).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["success"], true);
    assert_eq!(
        first["file_url"],
        "http://relay.test/get_file/123456789.mp4"
    );
    assert_eq!(first["message"], "A short clip");
    assert_eq!(first["thumbnail"], "https://cdn.example.com/thumb.jpg");
    assert_eq!(media_files(t.dir.path()), vec!["123456789.mp4"]);

    let (status, second) = get(&t.app, &uri).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(second["file_url"], first["file_url"]);
    assert_eq!(second["message"], "File already downloaded");
    assert_eq!(t.media.calls(), 1);
}

#[tokio::test]
async fn test_download_without_identifier_uses_timestamp() {
    let t = default_app();

    let (status, json) = get(&t.app, &download_uri("https://www.instagram.com/someone/")).await;
    assert_eq!(status, StatusCode::OK);

    let file_url = json["file_url"].as_str().unwrap();
    let name = file_url
        .strip_prefix("http://relay.test/get_file/")
        .unwrap();
    let stem = name.strip_suffix(".mp4").unwrap();
    assert!(!stem.is_empty());
    assert!(stem.chars().all(|c| c.is_ascii_digit()));
}

#[tokio::test]
async fn test_download_google_drive() {
    let t = default_app();

    let (status, json) = get(
        &t.app,
        &download_uri("https://drive.google.com/file/d/1AbC_dEf/view?usp=sharing"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["file_url"], "http://relay.test/get_file/1AbC_dEf.mp4");
    assert!(json.get("thumbnail").is_none());
    assert_eq!(
        *t.drive.urls.lock().unwrap(),
        vec!["https://drive.google.com/uc?id=1AbC_dEf&export=download".to_string()]
    );
    assert_eq!(t.media.calls(), 0);

    let stored = std::fs::read(t.dir.path().join("1AbC_dEf.mp4")).unwrap();
    assert_eq!(stored, b"drive bytes");
}

#[tokio::test]
async fn test_download_google_drive_without_id() {
    let t = default_app();

    let (status, json) = get(
        &t.app,
        &download_uri("https://drive.google.com/drive/my-drive"),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["success"], false);
    assert!(t.drive.urls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_download_failure_is_500_and_leaves_nothing() {
    let t = build_app(
        FakeExtractor::new(Behavior::Fail),
        None,
        Some("http://relay.test"),
    );

    let (status, json) = get(&t.app, &download_uri("https://youtu.be/dQw4w9WgXcQ")).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json["success"], false);
    assert!(json["message"]
        .as_str()
        .unwrap()
        .contains("extractor exploded"));
    assert!(media_files(t.dir.path()).is_empty());
}

#[tokio::test]
async fn test_empty_download_is_not_cached() {
    let t = build_app(
        FakeExtractor::new(Behavior::WriteEmpty),
        None,
        Some("http://relay.test"),
    );
    let uri = download_uri("https://x.com/someone/status/42");

    let (status, _) = get(&t.app, &uri).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    let (status, _) = get(&t.app, &uri).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);

    // Nothing was treated as "already downloaded".
    assert_eq!(t.media.calls(), 2);
    assert!(media_files(t.dir.path()).is_empty());
}

#[tokio::test]
async fn test_tiktok_fallback_runs_only_for_tiktok() {
    let fallback = FakeExtractor::new(Behavior::Write(b"fallback video"));
    let t = build_app(
        FakeExtractor::new(Behavior::Fail),
        Some(fallback.clone()),
        Some("http://relay.test"),
    );

    let (status, json) = get(
        &t.app,
        &download_uri("https://www.tiktok.com/@user/video/777"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["file_url"], "http://relay.test/get_file/777.mp4");
    assert_eq!(fallback.calls(), 1);
    assert_eq!(
        std::fs::read(t.dir.path().join("777.mp4")).unwrap(),
        b"fallback video"
    );

    let (status, _) = get(
        &t.app,
        &download_uri("https://www.facebook.com/reel/555"),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(fallback.calls(), 1);
}

#[tokio::test]
async fn test_file_url_uses_request_host() {
    let t = build_app(
        FakeExtractor::new(Behavior::Write(b"video bytes")),
        None,
        None,
    );

    let response = t
        .app
        .clone()
        .oneshot(
            Request::builder()
                .uri(download_uri("https://www.bilibili.com/video/BV1GJ411x7h7"))
                .header(header::HOST, "media.example.org:5000")
                .header("x-forwarded-proto", "https")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(
        json["file_url"],
        "https://media.example.org:5000/get_file/BV1GJ411x7h7.mp4"
    );
}

#[tokio::test]
async fn test_concurrent_identical_requests_download_once() {
    let media = FakeExtractor::slow(Behavior::Write(b"video bytes"), Duration::from_millis(50));
    let t = build_app(media.clone(), None, Some("http://relay.test"));
    let uri = download_uri("https://www.youtube.com/shorts/abcDEF12345");

    let requests = (0..8).map(|_| {
        let app = t.app.clone();
        let uri = uri.clone();
        tokio::spawn(async move { get(&app, &uri).await })
    });
    let results = futures_util::future::join_all(requests).await;

    for result in results {
        let (status, json) = result.unwrap();
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            json["file_url"],
            "http://relay.test/get_file/abcDEF12345.mp4"
        );
    }
    assert_eq!(media.calls(), 1);
    assert_eq!(media_files(t.dir.path()), vec!["abcDEF12345.mp4"]);
    assert_eq!(
        std::fs::read(t.dir.path().join("abcDEF12345.mp4")).unwrap(),
        b"video bytes"
    );
}

// ========== Server lifecycle ==========

fn server_state(config: Config, media: Arc<FakeExtractor>) -> AppState {
    let dispatcher = Dispatcher::new(
        IdentifierExtractor::new(reqwest::Client::new(), Duration::from_secs(1)),
        MediaStore::new(&config.storage_dir),
        Arc::new(FakeDrive::default()),
        media,
    );
    AppState {
        config: Arc::new(config),
        dispatcher: Arc::new(dispatcher),
    }
}

#[tokio::test]
async fn test_serve_binds_host_name() {
    let dir = TempDir::new().unwrap();
    let config = Config {
        storage_dir: dir.path().to_path_buf(),
        web_host: "localhost".to_string(),
        web_port: 0,
        ..Config::for_testing()
    };
    let state = server_state(config, FakeExtractor::new(Behavior::Write(b"video bytes")));

    let shutdown = CancellationToken::new();
    shutdown.cancel();
    tokio::time::timeout(Duration::from_secs(5), serve(state, shutdown))
        .await
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn test_shutdown_does_not_wait_for_stuck_download() {
    let media = FakeExtractor::slow(Behavior::Write(b"video bytes"), Duration::from_secs(600));
    let dir = TempDir::new().unwrap();
    let config = Config {
        storage_dir: dir.path().to_path_buf(),
        shutdown_grace: Duration::from_millis(200),
        ..Config::for_testing()
    };
    let state = server_state(config, media.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = CancellationToken::new();
    let server = tokio::spawn(serve_on(listener, state, shutdown.clone()));

    let request = tokio::spawn(reqwest::get(format!(
        "http://{addr}{}",
        download_uri("https://www.tiktok.com/@user/video/123")
    )));

    // Wait until the download is running.
    tokio::time::timeout(Duration::from_secs(5), async {
        while media.calls() == 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    shutdown.cancel();
    tokio::time::timeout(Duration::from_secs(5), server)
        .await
        .expect("server should stop after the grace period")
        .unwrap()
        .unwrap();

    assert!(!dir.path().join("123.mp4").exists());
    request.abort();
}

// ========== /get_file ==========

#[tokio::test]
async fn test_get_file_missing() {
    let t = default_app();

    let (status, json) = get(&t.app, "/get_file/nope.mp4").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["success"], false);
}

#[tokio::test]
async fn test_get_file_returns_bytes_as_attachment() {
    let t = default_app();
    std::fs::write(t.dir.path().join("clip.mp4"), b"exact bytes \x00\x01\x02").unwrap();

    let response = t
        .app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/get_file/clip.mp4")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_DISPOSITION],
        "attachment; filename=\"clip.mp4\""
    );
    assert_eq!(response.headers()[header::CONTENT_TYPE], "video/mp4");
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(&body[..], b"exact bytes \x00\x01\x02");
}

#[tokio::test]
async fn test_get_file_rejects_traversal() {
    let t = default_app();

    let (status, json) = get(&t.app, "/get_file/..%2Fsecret.txt").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["success"], false);

    let (status, _) = get(&t.app, "/get_file/..").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_download_then_fetch_round_trip() {
    let t = default_app();

    let (status, json) = get(
        &t.app,
        &download_uri("https://www.instagram.com/reel/Cx1_abc-2/"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let file_url = json["file_url"].as_str().unwrap();
    let path = file_url.strip_prefix("http://relay.test").unwrap();

    let response = t
        .app
        .clone()
        .oneshot(Request::builder().uri(path).body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(&body[..], b"video bytes");
}

// ========== /clean ==========

#[tokio::test]
async fn test_clean_empty_directory() {
    let t = default_app();

    let (status, json) = get(&t.app, "/clean").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["success"], true);
    assert_eq!(json["deleted"], 0);
}

#[tokio::test]
async fn test_clean_deletes_only_mp4() {
    let t = default_app();
    for name in ["a.mp4", "b.mp4", "c.mp4"] {
        std::fs::write(t.dir.path().join(name), b"x").unwrap();
    }
    for name in ["keep.txt", "cover.jpg"] {
        std::fs::write(t.dir.path().join(name), b"x").unwrap();
    }

    let (status, json) = get(&t.app, "/clean").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["success"], true);
    assert_eq!(json["deleted"], 3);
    assert!(json["message"].as_str().unwrap().contains('3'));
    assert_eq!(media_files(t.dir.path()), vec!["cover.jpg", "keep.txt"]);
}

#[tokio::test]
async fn test_clean_missing_directory_fails() {
    let t = default_app();
    let path = t.dir.path().to_path_buf();
    std::fs::remove_dir_all(&path).unwrap();

    let (status, json) = get(&t.app, "/clean").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json["success"], false);
}

// ========== /health ==========

#[tokio::test]
async fn test_health() {
    let t = default_app();

    let (status, json) = get(&t.app, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
    assert!(json["message"].is_string());
    let timestamp = json["timestamp"].as_str().unwrap();
    assert!(chrono::DateTime::parse_from_rfc3339(timestamp).is_ok());
}
