//! Environment variable parsing with type safety.
//!
//! Each getter takes the value produced by the lower layers and returns it
//! unchanged when the variable is unset. Invalid values are collected so all
//! problems can be reported at once.

use super::source::Sourced;
use std::env;
use std::net::IpAddr;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during environment variable parsing.
#[derive(Debug, Error)]
pub enum EnvError {
    /// Invalid value for a variable.
    #[error("Invalid value for {var}: expected {expected}, got '{value}'")]
    InvalidValue {
        var: String,
        expected: String,
        value: String,
    },

    /// Invalid duration format.
    #[error("Invalid duration for {var}: {value}")]
    InvalidDuration { var: String, value: String },

    /// Value out of valid range.
    #[error("Value out of range for {var}: {value} (valid: {min}..={max})")]
    OutOfRange {
        var: String,
        value: String,
        min: String,
        max: String,
    },
}

/// Type-safe environment variable parser.
pub struct EnvParser {
    prefix: &'static str,
    errors: Vec<EnvError>,
}

impl EnvParser {
    /// Create a new parser with the `STATNERD_RELAY_` prefix.
    pub fn new() -> Self {
        Self {
            prefix: "STATNERD_RELAY_",
            errors: Vec::new(),
        }
    }

    pub fn errors(&self) -> &[EnvError] {
        &self.errors
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn take_errors(&mut self) -> Vec<EnvError> {
        std::mem::take(&mut self.errors)
    }

    fn var_name(&self, name: &str) -> String {
        format!("{}{}", self.prefix, name)
    }

    /// Read a non-empty, trimmed variable.
    fn read(&self, name: &str) -> Option<(String, String)> {
        let var_name = self.var_name(name);
        match env::var(&var_name) {
            Ok(value) if !value.trim().is_empty() => Some((value.trim().to_string(), var_name)),
            _ => None,
        }
    }

    /// Get a u16 value with range validation.
    pub fn get_u16_range(
        &mut self,
        name: &str,
        current: Sourced<u16>,
        min: u16,
        max: u16,
    ) -> Sourced<u16> {
        let Some((value, var_name)) = self.read(name) else {
            return current;
        };
        match value.parse::<u64>() {
            Ok(n) if (u64::from(min)..=u64::from(max)).contains(&n) => {
                Sourced::from_env(n as u16, var_name)
            }
            Ok(_) => {
                self.errors.push(EnvError::OutOfRange {
                    var: var_name,
                    value,
                    min: min.to_string(),
                    max: max.to_string(),
                });
                current
            }
            _ => {
                self.errors.push(EnvError::InvalidValue {
                    var: var_name,
                    expected: "port number".to_string(),
                    value,
                });
                current
            }
        }
    }

    /// Get a usize value that must be at least `min`.
    pub fn get_usize_min(&mut self, name: &str, current: Sourced<usize>, min: usize) -> Sourced<usize> {
        let Some((value, var_name)) = self.read(name) else {
            return current;
        };
        match value.parse::<usize>() {
            Ok(n) if n >= min => Sourced::from_env(n, var_name),
            Ok(n) => {
                self.errors.push(EnvError::OutOfRange {
                    var: var_name,
                    value: n.to_string(),
                    min: min.to_string(),
                    max: usize::MAX.to_string(),
                });
                current
            }
            Err(_) => {
                self.errors.push(EnvError::InvalidValue {
                    var: var_name,
                    expected: "unsigned integer".to_string(),
                    value,
                });
                current
            }
        }
    }

    /// Get a duration in humantime form (`90s`, `20m`) or plain seconds.
    pub fn get_duration(&mut self, name: &str, current: Sourced<Duration>) -> Sourced<Duration> {
        let Some((value, var_name)) = self.read(name) else {
            return current;
        };
        if let Ok(secs) = value.parse::<u64>() {
            return Sourced::from_env(Duration::from_secs(secs), var_name);
        }
        match humantime::parse_duration(&value) {
            Ok(duration) => Sourced::from_env(duration, var_name),
            Err(_) => {
                self.errors.push(EnvError::InvalidDuration {
                    var: var_name,
                    value,
                });
                current
            }
        }
    }

    /// Get an IP address.
    pub fn get_ip(&mut self, name: &str, current: Sourced<IpAddr>) -> Sourced<IpAddr> {
        let Some((value, var_name)) = self.read(name) else {
            return current;
        };
        match value.parse::<IpAddr>() {
            Ok(ip) => Sourced::from_env(ip, var_name),
            Err(_) => {
                self.errors.push(EnvError::InvalidValue {
                    var: var_name,
                    expected: "IP address".to_string(),
                    value,
                });
                current
            }
        }
    }
}

impl Default for EnvParser {
    fn default() -> Self {
        Self::new()
    }
}
