//! Relay error taxonomy and its HTTP mapping.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use relay_common::{ConfigurationError, RunError};
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum RelayError {
    /// Client-correctable request problem.
    #[error("{0}")]
    Validation(String),

    #[error("Payload too large.")]
    PayloadTooLarge,

    #[error("Update already running.")]
    Busy,

    /// Root, scripts or config directory missing, or path escapes the root.
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error("{0}")]
    Spawn(String),

    #[error("Update timeout after {}s", .elapsed.as_secs())]
    Timeout { elapsed: Duration },

    #[error("Update script failed (exit {exit_code}).")]
    ScriptFailure {
        exit_code: i32,
        stdout: String,
        stderr: String,
    },

    #[error("{0}")]
    Internal(String),
}

impl From<RunError> for RelayError {
    fn from(err: RunError) -> Self {
        match err {
            RunError::Spawn { .. } => Self::Spawn(err.to_string()),
            RunError::Timeout { elapsed } => Self::Timeout { elapsed },
            RunError::Io(_) => Self::Internal(err.to_string()),
        }
    }
}

impl RelayError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            Self::Busy => StatusCode::CONFLICT,
            Self::Configuration(_)
            | Self::Spawn(_)
            | Self::Timeout { .. }
            | Self::ScriptFailure { .. }
            | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    ok: bool,
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    stdout: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stderr: Option<String>,
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            warn!("Update failed: {}", self);
        }
        let error = self.to_string();
        let (stdout, stderr) = match self {
            Self::ScriptFailure { stdout, stderr, .. } => (Some(stdout), Some(stderr)),
            _ => (None, None),
        };
        let body = ErrorBody {
            ok: false,
            error,
            stdout,
            stderr,
        };
        (status, Json(body)).into_response()
    }
}
