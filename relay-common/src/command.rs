//! Platform-specific invocation of the add-on update script.

use crate::normalize::NormalizedRepository;
use crate::paths::{ConfigurationError, ResolvedPaths};
use std::path::PathBuf;

/// Host platform family, which decides the script and flag syntax.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Windows,
    Posix,
}

impl Platform {
    /// Platform family of the running host.
    pub fn current() -> Self {
        if cfg!(windows) { Self::Windows } else { Self::Posix }
    }

    /// File name of the update script inside `addon/scripts`.
    pub fn script_name(self) -> &'static str {
        match self {
            Self::Windows => "update-from-github.ps1",
            Self::Posix => "update-from-github.sh",
        }
    }

    fn program(self) -> &'static str {
        match self {
            Self::Windows => "powershell",
            Self::Posix => "/bin/sh",
        }
    }

    fn flags(self) -> ScriptFlags {
        match self {
            Self::Windows => ScriptFlags {
                repository: "-Repository",
                config: "-GrocyConfigPath",
                tag: "-ReleaseTag",
                allow_prerelease: "-AllowPrerelease",
                no_backup: "-NoBackup",
            },
            Self::Posix => ScriptFlags {
                repository: "--repository",
                config: "--config",
                tag: "--tag",
                allow_prerelease: "--allow-prerelease",
                no_backup: "--no-backup",
            },
        }
    }

    /// Interpreter arguments that precede the script path.
    fn interpreter_args(self) -> &'static [&'static str] {
        match self {
            Self::Windows => &["-NoProfile", "-ExecutionPolicy", "Bypass", "-File"],
            Self::Posix => &[],
        }
    }
}

struct ScriptFlags {
    repository: &'static str,
    config: &'static str,
    tag: &'static str,
    allow_prerelease: &'static str,
    no_backup: &'static str,
}

/// Semantic parameters of one update run, shared by every platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateParams {
    pub repository: NormalizedRepository,
    /// Normalized tag; empty selects the latest release.
    pub release_tag: String,
    pub include_prerelease: bool,
    pub no_backup: bool,
}

/// A concrete external process invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: PathBuf,
}

impl CommandSpec {
    /// Render for logging. Arguments are not shell-escaped.
    pub fn display(&self) -> String {
        let mut out = self.program.clone();
        for arg in &self.args {
            out.push(' ');
            out.push_str(arg);
        }
        out
    }
}

/// Build the script invocation for `platform`.
///
/// Fails when the platform's script is missing from `scripts_dir`.
pub fn build_command(
    platform: Platform,
    params: &UpdateParams,
    paths: &ResolvedPaths,
) -> Result<CommandSpec, ConfigurationError> {
    let script = paths.scripts_dir.join(platform.script_name());
    if !script.is_file() {
        return Err(ConfigurationError::ScriptNotFound(script));
    }

    let flags = platform.flags();
    let mut args: Vec<String> = platform
        .interpreter_args()
        .iter()
        .map(|arg| (*arg).to_string())
        .collect();
    args.push(script.display().to_string());
    args.push(flags.repository.to_string());
    args.push(params.repository.to_string());
    args.push(flags.config.to_string());
    args.push(paths.config_dir.display().to_string());
    if !params.release_tag.is_empty() {
        args.push(flags.tag.to_string());
        args.push(params.release_tag.clone());
    }
    if params.include_prerelease {
        args.push(flags.allow_prerelease.to_string());
    }
    if params.no_backup {
        args.push(flags.no_backup.to_string());
    }

    Ok(CommandSpec {
        program: platform.program().to_string(),
        args,
        cwd: paths.scripts_dir.clone(),
    })
}
