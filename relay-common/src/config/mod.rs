//! Relay configuration.
//!
//! Values are layered, lowest precedence first:
//! built-in defaults, the TOML file, `STATNERD_RELAY_*` environment
//! variables, then command-line flags applied by the binary.

pub mod env;
pub mod source;

pub use env::{EnvError, EnvParser};
pub use source::{ConfigSource, Sourced};

use crate::output::DEFAULT_OUTPUT_LIMIT;
use serde::Deserialize;
use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

pub const DEFAULT_PORT: u16 = 17863;
pub const MIN_PORT: u16 = 1024;
pub const DEFAULT_HOST: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);
pub const DEFAULT_RUN_TIMEOUT: Duration = Duration::from_secs(20 * 60);
pub const DEFAULT_MAX_BODY_BYTES: usize = 64 * 1024;

const CONFIG_DIR_NAME: &str = "statnerd-relay";
const CONFIG_FILE_NAME: &str = "relay.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid duration for {field}: {value}")]
    InvalidDuration { field: &'static str, value: String },

    #[error("Invalid environment: {}", format_env_errors(.0))]
    Env(Vec<EnvError>),

    #[error("{0}")]
    Invalid(String),
}

fn format_env_errors(errors: &[EnvError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Effective relay settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayConfig {
    pub host: IpAddr,
    pub port: u16,
    /// Hard wall-clock budget for one update script run.
    pub run_timeout: Duration,
    /// Largest accepted request body.
    pub max_body_bytes: usize,
    /// Per-stream ceiling for captured script output.
    pub output_limit_bytes: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST,
            port: DEFAULT_PORT,
            run_timeout: DEFAULT_RUN_TIMEOUT,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            output_limit_bytes: DEFAULT_OUTPUT_LIMIT,
        }
    }
}

impl RelayConfig {
    /// Reject settings the relay must never run with.
    ///
    /// The embedded server skips this so tests and hosts may bind port 0.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.host.is_loopback() {
            return Err(ConfigError::Invalid(format!(
                "host {} is not a loopback address",
                self.host
            )));
        }
        if self.port < MIN_PORT {
            return Err(ConfigError::Invalid(format!(
                "port {} is out of range ({}..=65535)",
                self.port, MIN_PORT
            )));
        }
        if self.run_timeout.is_zero() {
            return Err(ConfigError::Invalid("run_timeout must be positive".to_string()));
        }
        if self.max_body_bytes == 0 || self.output_limit_bytes == 0 {
            return Err(ConfigError::Invalid(
                "max_body_bytes and output_limit_bytes must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Coerce a port supplied by a supervising host's settings.
///
/// Anything outside `1024..=65535` falls back to [`DEFAULT_PORT`].
pub fn normalize_port(port: i64) -> u16 {
    u16::try_from(port)
        .ok()
        .filter(|p| *p >= MIN_PORT)
        .unwrap_or(DEFAULT_PORT)
}

/// On-disk representation. Every key is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RelayFileConfig {
    pub host: Option<IpAddr>,
    pub port: Option<u16>,
    /// Humantime duration, e.g. `"20m"`.
    pub run_timeout: Option<String>,
    pub max_body_bytes: Option<usize>,
    pub output_limit_bytes: Option<usize>,
}

impl RelayFileConfig {
    pub fn from_toml(path: &Path, text: &str) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    fn run_timeout(&self) -> Result<Option<Duration>, ConfigError> {
        self.run_timeout
            .as_deref()
            .map(|value| {
                humantime::parse_duration(value).map_err(|_| ConfigError::InvalidDuration {
                    field: "run_timeout",
                    value: value.to_string(),
                })
            })
            .transpose()
    }
}

/// Configuration values with the layer each one came from.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub host: Sourced<IpAddr>,
    pub port: Sourced<u16>,
    pub run_timeout: Sourced<Duration>,
    pub max_body_bytes: Sourced<usize>,
    pub output_limit_bytes: Sourced<usize>,
    /// The file that was read, if any.
    pub file: Option<PathBuf>,
}

impl LoadedConfig {
    fn defaults() -> Self {
        let d = RelayConfig::default();
        Self {
            host: Sourced::default_value(d.host),
            port: Sourced::default_value(d.port),
            run_timeout: Sourced::default_value(d.run_timeout),
            max_body_bytes: Sourced::default_value(d.max_body_bytes),
            output_limit_bytes: Sourced::default_value(d.output_limit_bytes),
            file: None,
        }
    }

    fn apply_file(mut self, file: RelayFileConfig) -> Result<Self, ConfigError> {
        let run_timeout = file.run_timeout()?;
        self.host = self.host.overlay(file.host, ConfigSource::File);
        self.port = self.port.overlay(file.port, ConfigSource::File);
        self.run_timeout = self.run_timeout.overlay(run_timeout, ConfigSource::File);
        self.max_body_bytes = self
            .max_body_bytes
            .overlay(file.max_body_bytes, ConfigSource::File);
        self.output_limit_bytes = self
            .output_limit_bytes
            .overlay(file.output_limit_bytes, ConfigSource::File);
        Ok(self)
    }

    fn apply_env(mut self) -> Result<Self, ConfigError> {
        let mut parser = EnvParser::new();
        self.host = parser.get_ip("HOST", self.host);
        self.port = parser.get_u16_range("PORT", self.port, MIN_PORT, u16::MAX);
        self.run_timeout = parser.get_duration("TIMEOUT", self.run_timeout);
        self.max_body_bytes = parser.get_usize_min("MAX_BODY", self.max_body_bytes, 1);
        self.output_limit_bytes = parser.get_usize_min("OUTPUT_LIMIT", self.output_limit_bytes, 1);
        if parser.has_errors() {
            return Err(ConfigError::Env(parser.take_errors()));
        }
        Ok(self)
    }

    /// Apply a command-line port override.
    pub fn with_cli_port(mut self, port: Option<u16>) -> Self {
        self.port = self.port.overlay(port, ConfigSource::CommandLine);
        self
    }

    /// Apply a command-line timeout override.
    pub fn with_cli_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.run_timeout = self.run_timeout.overlay(timeout, ConfigSource::CommandLine);
        self
    }

    pub fn config(&self) -> RelayConfig {
        RelayConfig {
            host: self.host.value,
            port: self.port.value,
            run_timeout: self.run_timeout.value,
            max_body_bytes: self.max_body_bytes.value,
            output_limit_bytes: self.output_limit_bytes.value,
        }
    }

    /// One-line summary for the startup log.
    pub fn describe(&self) -> String {
        format!(
            "host={} ({}), port={} ({}), run_timeout={} ({}), max_body={} ({}), output_limit={} ({})",
            self.host.value,
            self.host.source,
            self.port.value,
            self.port.source,
            humantime::format_duration(self.run_timeout.value),
            self.run_timeout.source,
            self.max_body_bytes.value,
            self.max_body_bytes.source,
            self.output_limit_bytes.value,
            self.output_limit_bytes.source,
        )
    }
}

/// Default location of the config file, e.g. `~/.config/statnerd-relay/relay.toml`.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
}

/// Load configuration from defaults, file and environment.
///
/// An explicit `path` must exist; the default location is optional.
pub fn load_config(path: Option<&Path>) -> Result<LoadedConfig, ConfigError> {
    let mut loaded = LoadedConfig::defaults();

    let file_path = match path {
        Some(path) => Some(path.to_path_buf()),
        None => default_config_path().filter(|p| p.is_file()),
    };
    if let Some(file_path) = file_path {
        let text = std::fs::read_to_string(&file_path).map_err(|source| ConfigError::Read {
            path: file_path.clone(),
            source,
        })?;
        debug!("Loading relay config from {}", file_path.display());
        let file = RelayFileConfig::from_toml(&file_path, &text)?;
        loaded = loaded.apply_file(file)?;
        loaded.file = Some(file_path);
    }

    loaded.apply_env()
}
