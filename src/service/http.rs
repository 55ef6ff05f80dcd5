//! HTTP endpoints: `GET /latest_version` and `GET /download/{version}`.
//!
//! Handlers read the manifest on every request. Failures are logged in full
//! through the injected [`ServerLog`] and answered with an opaque body.

use std::any::Any;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::body::{Body, HttpBody};
use axum::extract::{Path, Request, State};
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE};
use axum::http::{HeaderValue, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use futures_util::StreamExt;
use tokio::sync::Semaphore;
use tokio_util::io::ReaderStream;
use tower::ServiceBuilder;
use tower_http::catch_panic::CatchPanicLayer;

use crate::error::{INTERNAL_ERROR_BODY, ServeError};
use crate::logging::ServerLog;
use crate::manifest::ManifestStore;

/// Per-server state shared by every handler.
#[derive(Debug)]
pub struct AppState {
    store: ManifestStore,
    log: ServerLog,
}

impl AppState {
    pub fn new(store: ManifestStore, log: ServerLog) -> Self {
        Self { store, log }
    }

    /// Log the failure in full and turn it into the client-facing response.
    fn reject(&self, route: &str, err: ServeError) -> Response {
        let status = err.status();
        if status == StatusCode::NOT_FOUND {
            log::warn!(logger: self.log, "{route}: {}", err.diagnostic());
        } else {
            log::error!(logger: self.log, "{route}: {}", err.diagnostic());
        }
        (status, err.public_message()).into_response()
    }
}

/// Build the application router.
///
/// At most `max_concurrent` requests are in flight at once, counting the time
/// spent streaming a response body; anything beyond that gets 429 right away.
pub fn router(state: AppState, max_concurrent: usize) -> Router {
    let log = state.log.clone();
    let routes = Router::new()
        .route("/latest_version", get(latest_version))
        .route("/download/{version}", get(download))
        .with_state(Arc::new(state));
    with_middleware(routes, log, max_concurrent)
}

/// Panic recovery, access logging and the in-flight limit, outermost first.
fn with_middleware(routes: Router, log: ServerLog, max_concurrent: usize) -> Router {
    let permits = Arc::new(Semaphore::new(max_concurrent));
    let panic_log = log.clone();

    routes.layer(
        ServiceBuilder::new()
            .layer(CatchPanicLayer::custom(
                move |err: Box<dyn Any + Send + 'static>| panic_response(&panic_log, err),
            ))
            .layer(middleware::from_fn_with_state(log, access_log))
            .layer(middleware::from_fn_with_state(permits, limit_in_flight)),
    )
}

async fn latest_version(State(state): State<Arc<AppState>>) -> Response {
    match current_latest(&state.store).await {
        Ok(version) => (StatusCode::OK, version).into_response(),
        Err(e) => state.reject("GET /latest_version", e),
    }
}

/// Highest version listed in the manifest, rendered from its integer tuple.
pub async fn current_latest(store: &ManifestStore) -> Result<String, ServeError> {
    let manifest = store.load().await?;
    let (tuple, _) = manifest.latest()?;
    Ok(tuple.to_string())
}

async fn download(
    State(state): State<Arc<AppState>>,
    Path(version): Path<String>,
) -> Response {
    match package_response(&state.store, &version).await {
        Ok(response) => response,
        Err(e) => state.reject(&format!("GET /download/{version:?}"), e),
    }
}

async fn package_response(store: &ManifestStore, version: &str) -> Result<Response, ServeError> {
    let manifest = store.load().await?;
    let entry = manifest
        .find(version)
        .ok_or_else(|| ServeError::VersionNotFound {
            version: version.to_string(),
        })?;
    let path = store.resolve(entry).await?;

    let file_unavailable = |source: std::io::Error| ServeError::FileUnavailable {
        version: entry.version.clone(),
        path: path.clone(),
        source,
    };
    let file = tokio::fs::File::open(&path).await.map_err(file_unavailable)?;
    let len = file.metadata().await.map_err(file_unavailable)?.len();

    let filename = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "package".to_string());

    Ok((
        StatusCode::OK,
        [
            (CONTENT_TYPE, HeaderValue::from_static("application/octet-stream")),
            (CONTENT_LENGTH, HeaderValue::from(len)),
            (CONTENT_DISPOSITION, attachment_disposition(&filename)),
        ],
        Body::from_stream(ReaderStream::new(file)),
    )
        .into_response())
}

/// `attachment; filename="..."`, plus an RFC 5987 `filename*` when the name is
/// not plain ASCII.
fn attachment_disposition(filename: &str) -> HeaderValue {
    let fallback: String = filename
        .chars()
        .map(|c| match c {
            ' '..='~' if c != '"' && c != '\\' => c,
            _ => '_',
        })
        .collect();

    let value = if fallback == filename {
        format!("attachment; filename=\"{fallback}\"")
    } else {
        let mut encoded = String::with_capacity(filename.len() * 3);
        for byte in filename.bytes() {
            if byte.is_ascii_alphanumeric() || b"!#$&+-.^_`|~".contains(&byte) {
                encoded.push(byte as char);
            } else {
                encoded.push_str(&format!("%{byte:02X}"));
            }
        }
        format!("attachment; filename=\"{fallback}\"; filename*=UTF-8''{encoded}")
    };

    // Only visible ASCII remains at this point.
    HeaderValue::from_str(&value).unwrap_or_else(|_| HeaderValue::from_static("attachment"))
}

async fn limit_in_flight(
    State(permits): State<Arc<Semaphore>>,
    req: Request,
    next: Next,
) -> Response {
    let Ok(permit) = permits.try_acquire_owned() else {
        return (StatusCode::TOO_MANY_REQUESTS, "Too many requests").into_response();
    };

    let (parts, body) = next.run(req).await.into_parts();
    if body.size_hint().exact().is_some() {
        return Response::from_parts(parts, body);
    }

    // Streamed bodies hold the permit until they finish or are dropped.
    let body = Body::from_stream(body.into_data_stream().map(move |chunk| {
        let _held = &permit;
        chunk
    }));
    Response::from_parts(parts, body)
}

async fn access_log(State(log): State<ServerLog>, req: Request, next: Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_owned();
    let started = Instant::now();
    let response = next.run(req).await;
    log::debug!(
        logger: log,
        "{method} {path} -> {} in {:?}",
        response.status().as_u16(),
        started.elapsed()
    );
    response
}

fn panic_response(log: &ServerLog, err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        (*s).to_string()
    } else {
        "unknown panic payload".to_string()
    };
    log::error!(logger: log, "request handler panicked: {detail}");
    (StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_ERROR_BODY).into_response()
}
