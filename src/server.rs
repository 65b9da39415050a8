use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context as _;
use axum::Router;
use axum::body::Bytes;
use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode, Uri, header};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{MethodRouter, get, post};
use serde::Deserialize;
use serde_json::{Value, json};
use tower_http::services::ServeDir;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

use crate::formats::UpsertRequest;
use crate::gateway::{GatewayError, StorageGateway};
use crate::request_log::{EndpointLog, RequestLog};
use crate::store::LocalFsChapterStore;

pub const DEFAULT_ALLOWED_ORIGIN: &str = "http://localhost:5174";

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub data_dir: PathBuf,
    pub allowed_origin: String,
}

impl ServerConfig {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            allowed_origin: DEFAULT_ALLOWED_ORIGIN.to_owned(),
        }
    }
}

#[derive(Clone)]
struct ServerState {
    gateway: Arc<StorageGateway>,
    request_log: RequestLog,
}

/// The storage endpoints plus `/audio/{file}` and `/healthz`, with CORS headers on every response.
pub fn router(config: &ServerConfig) -> anyhow::Result<Router> {
    let store = LocalFsChapterStore::new(&config.data_dir);
    let audio_dir = store.audio_dir();
    let state = ServerState {
        gateway: Arc::new(StorageGateway::new(Arc::new(store))),
        request_log: RequestLog::new(&config.data_dir),
    };
    let origin = HeaderValue::from_str(&config.allowed_origin)
        .with_context(|| format!("invalid allowed origin {:?}", config.allowed_origin))?;

    Ok(Router::new()
        .route("/lookup", endpoint(get(lookup)))
        .route("/list-index", endpoint(get(list_index)))
        .route("/upsert", endpoint(post(upsert)))
        .route("/delete-all", endpoint(post(delete_all)))
        .route("/healthz", get(|| async { "ok" }))
        .nest_service("/audio", ServeDir::new(audio_dir))
        .layer(SetResponseHeaderLayer::overriding(
            header::ACCESS_CONTROL_ALLOW_ORIGIN,
            origin,
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static("GET, POST, OPTIONS"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::ACCESS_CONTROL_ALLOW_HEADERS,
            HeaderValue::from_static("Content-Type, Authorization"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::ACCESS_CONTROL_MAX_AGE,
            HeaderValue::from_static("86400"),
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state))
}

fn endpoint(route: MethodRouter<ServerState>) -> MethodRouter<ServerState> {
    route.options(preflight).fallback(method_not_allowed)
}

async fn preflight() -> Json<Value> {
    Json(json!({"success": true, "message": "OPTIONS request handled"}))
}

async fn method_not_allowed() -> ApiError {
    ApiError::new(StatusCode::METHOD_NOT_ALLOWED, "method not allowed")
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl From<GatewayError> for ApiError {
    fn from(err: GatewayError) -> Self {
        let status = if err.is_client_error() {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };
        Self::new(status, err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

/// Opens the endpoint's log file and records the request line and headers.
async fn begin(
    state: &ServerState,
    endpoint: &str,
    method: &Method,
    uri: &Uri,
    headers: &HeaderMap,
) -> Result<EndpointLog, ApiError> {
    let log = state.request_log.open(endpoint).await.map_err(|err| {
        tracing::error!(endpoint, err = %format!("{err:#}"), "request log unavailable");
        ApiError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "cannot create logs directory",
        )
    })?;
    log.line(format!("Request method: {method}")).await;
    log.line(format!("Request URI: {uri}")).await;
    log.line(format!("Headers: {}", describe_headers(headers)))
        .await;
    Ok(log)
}

async fn finish<T: IntoResponse>(log: &EndpointLog, result: Result<T, ApiError>) -> Response {
    match result {
        Ok(body) => body.into_response(),
        Err(err) => {
            log.line(format!("Error {}: {}", err.status.as_u16(), err.message))
                .await;
            if err.status.is_server_error() {
                tracing::error!(status = %err.status, message = %err.message, "request failed");
            }
            err.into_response()
        }
    }
}

fn describe_headers(headers: &HeaderMap) -> String {
    headers
        .iter()
        .map(|(name, value)| {
            let value = if name == header::AUTHORIZATION {
                "<redacted>"
            } else {
                value.to_str().unwrap_or("<binary>")
            };
            format!("{name}: {value}")
        })
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Debug, Deserialize)]
struct LookupQuery {
    #[serde(default)]
    chapter_name: String,
}

async fn lookup(
    State(state): State<ServerState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    query: Result<Query<LookupQuery>, QueryRejection>,
) -> Response {
    let log = match begin(&state, "lookup", &method, &uri, &headers).await {
        Ok(log) => log,
        Err(err) => return err.into_response(),
    };
    let result = async {
        let Query(query) = query.map_err(|rejection| {
            ApiError::new(
                StatusCode::BAD_REQUEST,
                format!("invalid query: {}", rejection.body_text()),
            )
        })?;
        let found = state.gateway.lookup(&query.chapter_name).await?;
        log.line(format!(
            "Lookup {:?}: exists={}",
            query.chapter_name, found.exists
        ))
        .await;
        Ok::<_, ApiError>(Json(json!({
            "success": true,
            "exists": found.exists,
            "data": found.data,
        })))
    }
    .await;
    finish(&log, result).await
}

async fn list_index(
    State(state): State<ServerState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
) -> Response {
    let log = match begin(&state, "list-index", &method, &uri, &headers).await {
        Ok(log) => log,
        Err(err) => return err.into_response(),
    };
    let chapters = state.gateway.list_index().await;
    log.line(format!("Listed {} chapters", chapters.len())).await;
    finish(
        &log,
        Ok(Json(json!({ "success": true, "chapters": chapters }))),
    )
    .await
}

async fn upsert(
    State(state): State<ServerState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let log = match begin(&state, "upsert", &method, &uri, &headers).await {
        Ok(log) => log,
        Err(err) => return err.into_response(),
    };
    let result = async {
        let request: UpsertRequest = serde_json::from_slice(&body)
            .map_err(|err| ApiError::new(StatusCode::BAD_REQUEST, format!("invalid JSON body: {err}")))?;
        log.line(format!(
            "Upsert {:?} (audio: {})",
            request.chapter_name,
            request.audio_filename.as_deref().unwrap_or("none")
        ))
        .await;
        let outcome = state.gateway.upsert(request).await?;
        log.line(format!("Saved {}", outcome.json_path)).await;
        if let Some(audio_path) = &outcome.audio_path {
            log.line(format!("Saved {audio_path}")).await;
        }
        Ok::<_, ApiError>(Json(json!({
            "success": true,
            "json_path": outcome.json_path,
            "audio_path": outcome.audio_path,
        })))
    }
    .await;
    finish(&log, result).await
}

async fn delete_all(
    State(state): State<ServerState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
) -> Response {
    let log = match begin(&state, "delete-all", &method, &uri, &headers).await {
        Ok(log) => log,
        Err(err) => return err.into_response(),
    };
    let report = state.gateway.delete_all().await;
    for path in &report.removed {
        log.line(format!("Deleted {}", display_relative(path, state.request_log.dir())))
            .await;
    }
    for (path, err) in &report.failures {
        log.line(format!("Failed to delete {}: {err}", path.display()))
            .await;
    }
    finish(&log, Ok(Json(json!({ "success": true })))).await
}

fn display_relative(path: &Path, logs_dir: &Path) -> String {
    let base = logs_dir.parent().unwrap_or(logs_dir);
    path.strip_prefix(base)
        .unwrap_or(path)
        .display()
        .to_string()
}
