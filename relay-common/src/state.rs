//! Best-effort read of the state file the update script leaves behind.

use crate::normalize::normalize_release_tag;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

#[derive(Debug, Deserialize)]
struct InstalledState {
    #[serde(default)]
    release_tag: Option<serde_json::Value>,
}

/// Where the reported tag came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TagSource {
    /// Read from the script's state file.
    StateFile,
    /// The state file had no usable tag; the requested tag is echoed back.
    Requested,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledTag {
    pub tag: String,
    pub source: TagSource,
}

/// Read the installed release tag, falling back to `fallback_tag`.
///
/// Missing, unreadable or malformed state is not an error.
pub async fn read_installed_tag(state_file: &Path, fallback_tag: &str) -> InstalledTag {
    let fallback = || InstalledTag {
        tag: fallback_tag.to_string(),
        source: TagSource::Requested,
    };

    let raw = match tokio::fs::read(state_file).await {
        Ok(raw) => raw,
        Err(e) => {
            debug!("No installed state at {}: {}", state_file.display(), e);
            return fallback();
        }
    };
    let state: InstalledState = match serde_json::from_slice(&raw) {
        Ok(state) => state,
        Err(e) => {
            debug!("Ignoring malformed state file {}: {}", state_file.display(), e);
            return fallback();
        }
    };

    let tag = match state.release_tag {
        Some(serde_json::Value::String(tag)) => normalize_release_tag(&tag),
        Some(serde_json::Value::Number(n)) => normalize_release_tag(&n.to_string()),
        _ => String::new(),
    };
    if tag.is_empty() {
        return fallback();
    }
    InstalledTag {
        tag,
        source: TagSource::StateFile,
    }
}
