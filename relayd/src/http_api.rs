//! HTTP surface of the relay.
//!
//! Provides:
//! - `GET /health` - platform, port and whether an update is running
//! - `POST /v1/update` - run the add-on update script
//! - `OPTIONS *` - CORS preflight
//!
//! Every response carries permissive CORS headers and `Cache-Control: no-store`.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Json, Router,
    body::Bytes,
    extract::{DefaultBodyLimit, FromRequest, Request, State},
    http::{HeaderValue, Method, StatusCode, header},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use relay_common::{
    APP_NAME, CommandSpec, Platform, RelayConfig, ResolvedPaths, ScriptRunner, TagSource,
    UpdateParams, build_command, build_paths, normalize_release_tag, normalize_repository,
    read_installed_tag,
};
use serde::{Deserialize, Deserializer, Serialize};
use tracing::{debug, info};

use crate::error::RelayError;
use crate::gate::{RunGate, RunGuard};

/// Shared state for HTTP handlers.
pub struct RelayState {
    pub runner: Arc<dyn ScriptRunner>,
    pub gate: Arc<RunGate>,
    pub platform: Platform,
    /// Port reported by `/health`.
    pub port: u16,
    pub run_timeout: Duration,
    pub max_body_bytes: usize,
}

impl RelayState {
    pub fn new(runner: Arc<dyn ScriptRunner>, config: &RelayConfig, port: u16) -> Self {
        Self {
            runner,
            gate: Arc::new(RunGate::new()),
            platform: Platform::current(),
            port,
            run_timeout: config.run_timeout,
            max_body_bytes: config.max_body_bytes,
        }
    }
}

/// Treat only a JSON `true` as set; any other value means off.
fn strict_true<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(value == serde_json::Value::Bool(true))
}

/// Body of `POST /v1/update`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UpdateRequest {
    pub repository: Option<String>,
    pub release_tag: Option<String>,
    pub local_root_path: Option<String>,
    #[serde(deserialize_with = "strict_true")]
    pub include_prerelease: bool,
    #[serde(deserialize_with = "strict_true")]
    pub no_backup: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateResponse {
    pub ok: bool,
    pub installed_tag: String,
    pub tag_source: TagSource,
    pub stdout: String,
    pub stderr: String,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub app: &'static str,
    pub platform: &'static str,
    pub port: u16,
    pub running: bool,
}

#[derive(Debug, Serialize)]
struct NotFound {
    ok: bool,
    error: &'static str,
}

/// Create the relay router.
pub fn create_router(state: Arc<RelayState>) -> Router {
    let max_body_bytes = state.max_body_bytes;
    Router::new()
        .route(
            "/health",
            get(health_handler)
                .options(preflight_handler)
                .fallback(not_found_handler),
        )
        .route(
            "/v1/update",
            post(update_handler)
                .options(preflight_handler)
                .fallback(not_found_handler),
        )
        .fallback(not_found_handler)
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(middleware::map_response(relay_headers))
        .with_state(state)
}

async fn relay_headers(mut response: Response) -> Response {
    let headers = response.headers_mut();
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET,POST,OPTIONS"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Content-Type"),
    );
    response
}

async fn preflight_handler() -> StatusCode {
    StatusCode::NO_CONTENT
}

async fn not_found_handler(method: Method) -> Response {
    if method == Method::OPTIONS {
        return StatusCode::NO_CONTENT.into_response();
    }
    (
        StatusCode::NOT_FOUND,
        Json(NotFound {
            ok: false,
            error: "Not found.",
        }),
    )
        .into_response()
}

/// Host OS in the naming browser clients of the relay expect
/// (`win32`, `darwin`, `linux`, ...).
fn host_platform() -> &'static str {
    node_platform_name(std::env::consts::OS)
}

fn node_platform_name(os: &'static str) -> &'static str {
    match os {
        "windows" => "win32",
        "macos" => "darwin",
        other => other,
    }
}

/// Handler for `/health`. Reads the gate without touching it.
async fn health_handler(State(state): State<Arc<RelayState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        ok: true,
        app: APP_NAME,
        platform: host_platform(),
        port: state.port,
        running: state.gate.is_running(),
    })
}

fn parse_request(body: &[u8]) -> Result<UpdateRequest, RelayError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(UpdateRequest::default());
    }
    serde_json::from_slice(body).map_err(|_| RelayError::Validation("Invalid JSON body.".to_string()))
}

/// Validate the request and resolve everything the run needs.
fn prepare(
    platform: Platform,
    request: &UpdateRequest,
) -> Result<(UpdateParams, ResolvedPaths, CommandSpec), RelayError> {
    let repository = normalize_repository(request.repository.as_deref().unwrap_or_default())
        .ok_or_else(|| {
            RelayError::Validation("Invalid repository (expected owner/repo).".to_string())
        })?;
    let local_root_path = request.local_root_path.as_deref().unwrap_or_default().trim();
    if local_root_path.is_empty() {
        return Err(RelayError::Validation(
            "localRootPath is required.".to_string(),
        ));
    }
    let release_tag = normalize_release_tag(request.release_tag.as_deref().unwrap_or_default());

    let paths = build_paths(local_root_path)?;
    let params = UpdateParams {
        repository,
        release_tag,
        include_prerelease: request.include_prerelease,
        no_backup: request.no_backup,
    };
    let spec = build_command(platform, &params, &paths)?;
    Ok((params, paths, spec))
}

/// Handler for `/v1/update`.
async fn update_handler(
    State(state): State<Arc<RelayState>>,
    request: Request,
) -> Result<Json<UpdateResponse>, RelayError> {
    // Reject before reading the body; no queuing.
    if state.gate.is_running() {
        return Err(RelayError::Busy);
    }

    let body = Bytes::from_request(request, &()).await.map_err(|rejection| {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            RelayError::PayloadTooLarge
        } else {
            RelayError::Validation(rejection.body_text())
        }
    })?;
    let request = parse_request(&body)?;
    let (params, paths, spec) = prepare(state.platform, &request)?;

    let guard = state.gate.try_enter().ok_or(RelayError::Busy)?;
    info!(
        "Running update for {} (tag: {}) in {}",
        params.repository,
        if params.release_tag.is_empty() {
            "latest"
        } else {
            params.release_tag.as_str()
        },
        paths.root.display()
    );
    debug!("Update command: {}", spec.display());

    // The run lives in its own task so a disconnecting client only drops
    // this waiter; the script still finishes or times out.
    let run = tokio::spawn(run_update(
        guard,
        state.runner.clone(),
        spec,
        state.run_timeout,
        paths,
        params.release_tag,
    ));
    let response = run
        .await
        .map_err(|e| RelayError::Internal(format!("Update task failed: {e}")))??;
    Ok(Json(response))
}

/// Run the script and read back the installed tag. Holds the gate throughout.
async fn run_update(
    _guard: RunGuard,
    runner: Arc<dyn ScriptRunner>,
    spec: CommandSpec,
    run_timeout: Duration,
    paths: ResolvedPaths,
    release_tag: String,
) -> Result<UpdateResponse, RelayError> {
    let result = runner.run(&spec, run_timeout).await?;
    if !result.success() {
        return Err(RelayError::ScriptFailure {
            exit_code: result.exit_code,
            stdout: result.stdout,
            stderr: result.stderr,
        });
    }

    let installed = read_installed_tag(&paths.state_file, &release_tag).await;
    info!(
        "Update finished: installed {} ({:?}), {} bytes stdout, {} bytes stderr",
        if installed.tag.is_empty() {
            "<unknown>"
        } else {
            installed.tag.as_str()
        },
        installed.source,
        result.stdout.len(),
        result.stderr.len()
    );
    Ok(UpdateResponse {
        ok: true,
        installed_tag: installed.tag,
        tag_source: installed.source,
        stdout: result.stdout,
        stderr: result.stderr,
    })
}
