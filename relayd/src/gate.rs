//! Single-flight gate for update runs.
//!
//! The gate is either idle or running. Entering is a single compare-and-swap;
//! leaving happens when the returned [`RunGuard`] drops. The guard owns a
//! handle to the gate, so it can move into the task that drives the script
//! and outlive the request that started it.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Default)]
pub struct RunGate {
    running: AtomicBool,
}

impl RunGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Transition idle to running, or `None` when a run is in flight.
    pub fn try_enter(self: &Arc<Self>) -> Option<RunGuard> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| RunGuard { gate: self.clone() })
    }
}

/// Holds the gate in the running state until dropped.
#[derive(Debug)]
#[must_use = "the gate is released as soon as the guard is dropped"]
pub struct RunGuard {
    gate: Arc<RunGate>,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.gate.running.store(false, Ordering::Release);
    }
}
