//! Local root layout and confinement checks.
//!
//! A Grocy root is expected to look like:
//!
//! ```text
//! <root>/
//!   addon/scripts/          update-from-github.{sh,ps1}
//!   config/data/            grocy-addon-state.json (written by the script)
//! ```

use std::path::{Path, PathBuf};
use thiserror::Error;

pub const SCRIPTS_SUBDIR: [&str; 2] = ["addon", "scripts"];
pub const CONFIG_SUBDIR: &str = "config";
pub const DATA_SUBDIR: &str = "data";
pub const STATE_FILE_NAME: &str = "grocy-addon-state.json";

/// Environment problems with the local root. Never retried.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("Local root not found: {0}")]
    RootNotFound(String),

    #[error("Invalid local root path.")]
    EscapesRoot { candidate: PathBuf },

    #[error("Scripts directory not found: {}", .0.display())]
    ScriptsDirNotFound(PathBuf),

    #[error("Config data directory not found: {}", .0.display())]
    DataDirNotFound(PathBuf),

    #[error("Script not found: {}", .0.display())]
    ScriptNotFound(PathBuf),
}

/// The set of locations an update is allowed to touch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPaths {
    pub root: PathBuf,
    pub scripts_dir: PathBuf,
    pub config_dir: PathBuf,
    pub data_dir: PathBuf,
    pub state_file: PathBuf,
}

/// Canonicalize when the path exists so symlinks are followed; otherwise
/// fall back to the lexical path.
fn resolve(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}

/// True when `candidate` is `root` itself or lies below it.
///
/// Compares whole components, so `/srv/root2` is not inside `/srv/root`.
fn ensure_inside_root(root: &Path, candidate: &Path) -> bool {
    candidate.starts_with(root)
}

/// Resolve and validate the directory layout below `local_root_path`.
pub fn build_paths(local_root_path: &str) -> Result<ResolvedPaths, ConfigurationError> {
    let raw = local_root_path.trim();
    if raw.is_empty() {
        return Err(ConfigurationError::RootNotFound(local_root_path.to_string()));
    }
    let root = Path::new(raw)
        .canonicalize()
        .map_err(|_| ConfigurationError::RootNotFound(local_root_path.to_string()))?;
    if !root.is_dir() {
        return Err(ConfigurationError::RootNotFound(local_root_path.to_string()));
    }

    let scripts_dir = resolve(&SCRIPTS_SUBDIR.iter().fold(root.clone(), |p, s| p.join(s)));
    let config_dir = resolve(&root.join(CONFIG_SUBDIR));
    for candidate in [&scripts_dir, &config_dir] {
        if !ensure_inside_root(&root, candidate) {
            return Err(ConfigurationError::EscapesRoot {
                candidate: candidate.clone(),
            });
        }
    }

    let data_dir = config_dir.join(DATA_SUBDIR);
    if !scripts_dir.is_dir() {
        return Err(ConfigurationError::ScriptsDirNotFound(scripts_dir));
    }
    if !data_dir.is_dir() {
        return Err(ConfigurationError::DataDirNotFound(data_dir));
    }

    let state_file = data_dir.join(STATE_FILE_NAME);
    Ok(ResolvedPaths {
        root,
        scripts_dir,
        config_dir,
        data_dir,
        state_file,
    })
}
