//! Worker process orchestration
//!
//! The Orchestrator owns the worker processes of the current trial
//! generation. On a trial change it interrupts the current generation and
//! spawns a fresh one:
//! - **Launch:** one process per slot, trial appended as the last argument
//! - **Supervise:** a task per process forwards output and reports exit
//! - **Interrupt:** cooperative SIGINT, SIGKILL after the grace period

mod core;
mod generation;
mod launcher;
mod supervisor;

use thiserror::Error;

use crate::domain::Trial;

pub use core::Orchestrator;
pub use generation::{GenerationId, GenerationStatus, OrchestratorStatus, WorkerStatus};
pub use launcher::{CommandLauncher, SpawnedWorker, WorkerLauncher, WorkerSignaller};

/// Number of concurrent workers started for each trial
pub const WORKERS_PER_GENERATION: usize = 2;

/// Errors from launching or signalling workers
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("No worker command configured for slot {0}")]
    NoCommand(usize),

    #[error("Failed to spawn worker {slot} ({program}): {source}")]
    Spawn {
        slot: usize,
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to wait for worker: {0}")]
    Wait(#[source] std::io::Error),

    #[error("Failed to deliver {signal} to pid {pid}: {reason}")]
    Signal {
        signal: &'static str,
        pid: u32,
        reason: String,
    },

    #[error("Worker has no process id")]
    NoPid,
}

/// How a worker process ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WorkerExit {
    /// Exit code, if the process exited normally
    pub code: Option<i32>,
    /// Terminating signal, if the process was killed by one
    pub signal: Option<i32>,
}

impl WorkerExit {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Events sent from supervisor tasks back to the owning actor
#[derive(Debug, Clone)]
pub enum WorkerEvent {
    /// A worker process has exited and its handle can be cleared
    Exited {
        generation: GenerationId,
        slot: usize,
        trial: Trial,
        exit: WorkerExit,
    },
}
