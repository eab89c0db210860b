//! Execution of the update script with a hard timeout and bounded output.
//!
//! The relay only ever talks to the script through [`ScriptRunner`], so tests
//! can swap in [`MockScriptRunner`] instead of spawning real processes.

use crate::command::CommandSpec;
use crate::output::{DEFAULT_OUTPUT_LIMIT, TailBuffer};
use async_trait::async_trait;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::sync::{Notify, Semaphore};
use tracing::{debug, info, warn};

#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

/// Outcome of a script that ran to completion, whatever its exit code.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessResult {
    /// Exit code; `-1` when the process was terminated by a signal.
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Runner-level failures. A non-zero exit is not one of them.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("Failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Update timeout after {}s", .elapsed.as_secs())]
    Timeout { elapsed: Duration },

    #[error("Failed to wait for update script: {0}")]
    Io(#[from] std::io::Error),
}

/// Capability to run an external command under a time budget.
#[async_trait]
pub trait ScriptRunner: Send + Sync {
    async fn run(&self, spec: &CommandSpec, timeout: Duration) -> Result<ProcessResult, RunError>;
}

/// Runs commands as real child processes.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    output_limit: usize,
}

impl ProcessRunner {
    pub fn new(output_limit: usize) -> Self {
        Self { output_limit }
    }
}

impl Default for ProcessRunner {
    fn default() -> Self {
        Self::new(DEFAULT_OUTPUT_LIMIT)
    }
}

async fn drain<R: AsyncRead + Unpin>(reader: Option<R>, limit: usize) -> String {
    let mut tail = TailBuffer::new(limit);
    if let Some(mut reader) = reader {
        let mut chunk = [0u8; 8192];
        loop {
            match reader.read(&mut chunk).await {
                Ok(0) => break,
                Ok(n) => tail.push(&chunk[..n]),
                Err(e) => {
                    debug!("Output stream closed with error: {}", e);
                    break;
                }
            }
        }
    }
    if tail.is_truncated() {
        debug!("Discarded {} bytes of script output", tail.discarded());
    }
    tail.into_string()
}

#[async_trait]
impl ScriptRunner for ProcessRunner {
    async fn run(&self, spec: &CommandSpec, timeout: Duration) -> Result<ProcessResult, RunError> {
        let started = Instant::now();
        let mut command = Command::new(&spec.program);
        command
            .args(&spec.args)
            .current_dir(&spec.cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(windows)]
        command.creation_flags(CREATE_NO_WINDOW);

        let mut child = command.spawn().map_err(|source| RunError::Spawn {
            program: spec.program.clone(),
            source,
        })?;
        debug!("Spawned update script (pid {:?})", child.id());

        let stdout = tokio::spawn(drain(child.stdout.take(), self.output_limit));
        let stderr = tokio::spawn(drain(child.stderr.take(), self.output_limit));
        let readers = [stdout.abort_handle(), stderr.abort_handle()];

        let outcome = tokio::time::timeout(timeout, async {
            let status = child.wait().await?;
            let stdout = stdout.await.unwrap_or_default();
            let stderr = stderr.await.unwrap_or_default();
            Ok::<_, std::io::Error>((status, stdout, stderr))
        })
        .await;

        match outcome {
            Ok(Ok((status, stdout, stderr))) => {
                let exit_code = status.code().unwrap_or(-1);
                info!(
                    "Update script exited with code {} after {:?}",
                    exit_code,
                    started.elapsed()
                );
                Ok(ProcessResult {
                    exit_code,
                    stdout,
                    stderr,
                })
            }
            Ok(Err(e)) => {
                readers.iter().for_each(|h| h.abort());
                Err(RunError::Io(e))
            }
            Err(_) => {
                readers.iter().for_each(|h| h.abort());
                if let Err(e) = child.start_kill() {
                    debug!("Kill after timeout failed: {}", e);
                }
                if let Err(e) = child.wait().await {
                    warn!("Failed to reap timed out update script: {}", e);
                }
                warn!("Update script killed after {:?}", started.elapsed());
                Err(RunError::Timeout { elapsed: timeout })
            }
        }
    }
}

/// Deterministic in-memory runner for tests.
///
/// Results are consumed FIFO. A held runner blocks every call after it
/// starts until [`MockScriptRunner::release`] is called, which lets tests
/// observe the relay while an update is in flight.
#[derive(Debug, Clone, Default)]
pub struct MockScriptRunner {
    scripted_results: Arc<Mutex<Vec<Result<ProcessResult, RunError>>>>,
    recorded_calls: Arc<Mutex<Vec<(CommandSpec, Duration)>>>,
    hold: Option<Arc<Semaphore>>,
    started: Arc<Notify>,
}

impl MockScriptRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// A runner whose calls wait for [`MockScriptRunner::release`].
    pub fn held() -> Self {
        Self {
            hold: Some(Arc::new(Semaphore::new(0))),
            ..Self::default()
        }
    }

    /// Append a scripted result.
    pub fn push_result(&self, result: Result<ProcessResult, RunError>) {
        self.scripted_results
            .lock()
            .expect("scripted_results mutex poisoned")
            .push(result);
    }

    /// Convenience for a run that exits with `exit_code`.
    pub fn push_exit(&self, exit_code: i32, stdout: &str, stderr: &str) {
        self.push_result(Ok(ProcessResult {
            exit_code,
            stdout: stdout.to_string(),
            stderr: stderr.to_string(),
        }));
    }

    /// Let one held call finish.
    pub fn release(&self) {
        if let Some(hold) = &self.hold {
            hold.add_permits(1);
        }
    }

    /// Wait until a call has entered `run`.
    pub async fn wait_started(&self) {
        self.started.notified().await;
    }

    /// Snapshot of every command received so far.
    #[must_use]
    pub fn calls(&self) -> Vec<(CommandSpec, Duration)> {
        self.recorded_calls
            .lock()
            .expect("recorded_calls mutex poisoned")
            .clone()
    }
}

#[async_trait]
impl ScriptRunner for MockScriptRunner {
    async fn run(&self, spec: &CommandSpec, timeout: Duration) -> Result<ProcessResult, RunError> {
        self.recorded_calls
            .lock()
            .expect("recorded_calls mutex poisoned")
            .push((spec.clone(), timeout));
        self.started.notify_one();

        if let Some(hold) = &self.hold {
            let permit = hold
                .acquire()
                .await
                .map_err(|e| RunError::Io(std::io::Error::other(e)))?;
            permit.forget();
        }

        let mut scripted = self
            .scripted_results
            .lock()
            .expect("scripted_results mutex poisoned");
        if scripted.is_empty() {
            return Err(RunError::Io(std::io::Error::other(
                "mock runner has no scripted results",
            )));
        }
        scripted.remove(0)
    }
}
