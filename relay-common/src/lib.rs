//! Shared building blocks for the StatNerd relay.
//!
//! Everything the HTTP front end needs to turn an update request into a
//! confined, bounded run of the add-on update script lives here:
//!
//! - [`normalize`] - repository and release tag sanitization
//! - [`paths`] - root directory layout and confinement checks
//! - [`command`] - per-platform script invocation
//! - [`runner`] - process execution with timeout and bounded output
//! - [`state`] - best-effort read of the installed release tag
//! - [`config`] - relay settings from defaults, TOML, env and CLI

pub mod command;
pub mod config;
pub mod normalize;
pub mod output;
pub mod paths;
pub mod runner;
pub mod state;

pub use command::{CommandSpec, Platform, UpdateParams, build_command};
pub use config::{
    ConfigError, ConfigSource, EnvError, EnvParser, LoadedConfig, RelayConfig, Sourced,
    load_config, normalize_port,
};
pub use normalize::{NormalizedRepository, normalize_release_tag, normalize_repository};
pub use output::TailBuffer;
pub use paths::{ConfigurationError, ResolvedPaths, build_paths};
pub use runner::{MockScriptRunner, ProcessResult, ProcessRunner, RunError, ScriptRunner};
pub use state::{InstalledTag, TagSource, read_installed_tag};

/// Application identifier reported by the health endpoint.
pub const APP_NAME: &str = "statnerd-relay";
