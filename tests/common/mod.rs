#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::http::{header, HeaderMap, StatusCode};
use axum::routing::post;
use axum::{Json, Router};
use intake::{app, build_state, AppConfig, ComplianceConfig, GitHubConfig};
use serde_json::{json, Value};
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

pub const BOUNDARY: &str = "----intakeTestBoundary9f3c";

/// Tracks environment variable mutations and restores originals on drop.
pub struct EnvGuard {
    originals: HashMap<String, Option<String>>,
}

impl EnvGuard {
    pub fn new() -> Self {
        Self {
            originals: HashMap::new(),
        }
    }

    pub fn set(&mut self, key: &str, value: &str) {
        self.capture(key);
        std::env::set_var(key, value);
    }

    pub fn remove(&mut self, key: &str) {
        self.capture(key);
        std::env::remove_var(key);
    }

    fn capture(&mut self, key: &str) {
        if self.originals.contains_key(key) {
            return;
        }
        let original = std::env::var(key).ok();
        self.originals.insert(key.to_string(), original);
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, original) in self.originals.drain() {
            match original {
                Some(value) => std::env::set_var(&key, value),
                None => std::env::remove_var(&key),
            }
        }
    }
}

/// A request captured by a mock upstream.
#[derive(Debug, Clone)]
pub struct Recorded {
    pub authorization: Option<String>,
    pub body: Value,
}

pub type Recorder = Arc<Mutex<Vec<Recorded>>>;

async fn serve(router: Router) -> (String, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    (format!("http://{}", addr), handle)
}

/// Mock GitHub issues API answering every create with `status` and `body`.
pub async fn spawn_mock_github(status: u16, body: &str) -> (String, Recorder) {
    let recorder: Recorder = Arc::new(Mutex::new(Vec::new()));
    let rec = recorder.clone();
    let body = body.to_string();
    let router = Router::new().route(
        "/repos/:owner/:repo/issues",
        post(move |headers: HeaderMap, Json(v): Json<Value>| {
            let rec = rec.clone();
            let body = body.clone();
            async move {
                rec.lock().unwrap().push(Recorded {
                    authorization: headers
                        .get(header::AUTHORIZATION)
                        .and_then(|h| h.to_str().ok())
                        .map(str::to_string),
                    body: v,
                });
                (
                    StatusCode::from_u16(status).unwrap(),
                    [(header::CONTENT_TYPE, "application/json")],
                    body,
                )
            }
        }),
    );
    let (url, _handle) = serve(router).await;
    (url, recorder)
}

/// Mock chat-completion API replying with `content` after `delay`.
pub async fn spawn_mock_llm(content: &str, delay: Duration) -> (String, Recorder) {
    let recorder: Recorder = Arc::new(Mutex::new(Vec::new()));
    let rec = recorder.clone();
    let content = content.to_string();
    let router = Router::new().route(
        "/v1/chat/completions",
        post(move |headers: HeaderMap, Json(v): Json<Value>| {
            let rec = rec.clone();
            let content = content.clone();
            async move {
                rec.lock().unwrap().push(Recorded {
                    authorization: headers
                        .get(header::AUTHORIZATION)
                        .and_then(|h| h.to_str().ok())
                        .map(str::to_string),
                    body: v,
                });
                tokio::time::sleep(delay).await;
                Json(json!({
                    "choices": [{"message": {"role": "assistant", "content": content}}]
                }))
            }
        }),
    );
    let (url, _handle) = serve(router).await;
    (format!("{}/v1/chat/completions", url), recorder)
}

/// Configuration pointing at mock upstreams, with storage under `dir`.
pub fn test_config(dir: &TempDir, github_url: &str, llm_url: Option<&str>) -> AppConfig {
    AppConfig {
        github: GitHubConfig {
            token: Some("test-token".to_string()),
            api_url: github_url.to_string(),
            repo: "acme/intake".to_string(),
        },
        compliance: ComplianceConfig {
            api_key: llm_url.map(|_| "sk-test".to_string()),
            api_url: llm_url.unwrap_or("http://127.0.0.1:9/unused").to_string(),
            model: "test-model".to_string(),
        },
        upload_dir: dir.path().join("uploads"),
        static_dir: dir.path().join("public"),
        upstream_timeout_ms: 2_000,
        ..AppConfig::default()
    }
}

pub async fn spawn_app(config: AppConfig) -> (String, JoinHandle<()>) {
    let state = build_state(config).unwrap();
    serve(app(state)).await
}

pub fn multipart_content_type() -> String {
    format!("multipart/form-data; boundary={}", BOUNDARY)
}

/// Build a multipart body from text fields and an optional file part.
pub fn multipart_body(fields: &[(&str, &str)], file: Option<(&str, &[u8])>) -> Vec<u8> {
    let mut out = Vec::new();
    for (name, value) in fields {
        out.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
                BOUNDARY, name, value
            )
            .as_bytes(),
        );
    }
    if let Some((filename, content)) = file {
        out.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"pdf\"; filename=\"{}\"\r\nContent-Type: application/pdf\r\n\r\n",
                BOUNDARY, filename
            )
            .as_bytes(),
        );
        out.extend_from_slice(content);
        out.extend_from_slice(b"\r\n");
    }
    out.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
    out
}

pub fn uploaded_files(dir: &TempDir) -> Vec<std::path::PathBuf> {
    match std::fs::read_dir(dir.path().join("uploads")) {
        Ok(entries) => entries.map(|e| e.unwrap().path()).collect(),
        Err(_) => Vec::new(),
    }
}
