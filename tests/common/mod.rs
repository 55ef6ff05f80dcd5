#![allow(dead_code)]

use std::path::Path;
use std::sync::{Arc, Mutex};

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, Response, StatusCode};
use log::{LevelFilter, Log, Metadata, Record};
use tower::ServiceExt;

use pkgserve::logging::ServerLog;
use pkgserve::manifest::ManifestStore;
use pkgserve::service::{AppState, router};

/// Logger that keeps every record in memory.
#[derive(Default, Clone)]
pub struct Capture(Arc<Mutex<Vec<(log::Level, String)>>>);

impl Capture {
    pub fn lines(&self) -> Vec<(log::Level, String)> {
        self.0.lock().unwrap().clone()
    }

    pub fn errors(&self) -> Vec<String> {
        self.lines()
            .into_iter()
            .filter(|(level, _)| *level == log::Level::Error)
            .map(|(_, line)| line)
            .collect()
    }
}

impl Log for Capture {
    fn enabled(&self, _: &Metadata<'_>) -> bool {
        true
    }

    fn log(&self, record: &Record<'_>) {
        self.0
            .lock()
            .unwrap()
            .push((record.level(), record.args().to_string()));
    }

    fn flush(&self) {}
}

/// A package store in a temp dir.
pub struct Store {
    pub dir: tempfile::TempDir,
}

impl Store {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
        }
    }

    pub fn with_manifest(json: &str) -> Self {
        let store = Self::new();
        store.write_manifest(json);
        store
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn write_manifest(&self, json: &str) {
        std::fs::write(self.path().join("version.json"), json).unwrap();
    }

    pub fn write_file(&self, rel: &str, bytes: &[u8]) {
        let path = self.path().join(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, bytes).unwrap();
    }

    pub fn app(&self, limit: usize) -> (Router, Capture) {
        log::set_max_level(LevelFilter::Trace);
        let capture = Capture::default();
        let state = AppState::new(
            ManifestStore::new(self.path(), "version.json"),
            ServerLog::new(capture.clone()),
        );
        (router(state, limit), capture)
    }
}

pub fn manifest(entries: &[(&str, &str)]) -> String {
    let versions: Vec<_> = entries
        .iter()
        .map(|(version, path)| serde_json::json!({ "version": version, "path": path }))
        .collect();
    serde_json::json!({ "versions": versions }).to_string()
}

pub async fn get(app: &Router, uri: &str) -> Response<Body> {
    app.clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap()
}

pub async fn get_text(app: &Router, uri: &str) -> (StatusCode, String) {
    let response = get(app, uri).await;
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, String::from_utf8(bytes.to_vec()).unwrap())
}
