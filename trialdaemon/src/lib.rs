//! TrialDaemon - experiment state coordinator
//!
//! TrialDaemon sits between a remote experiment-control client and the
//! data-collection workers running on the lab machine. The client submits
//! state changes and polls for the current state; whenever the trial changes
//! the workers are interrupted and relaunched with the new trial.
//!
//! # Modules
//!
//! - [`domain`] - ExperimentState, Trial and ControlSignal types
//! - [`control`] - Persisted cooperative signal polled by workers
//! - [`orchestrator`] - Worker generations: launch, interrupt, exit tracking
//! - [`state`] - StateStore and the StateManager actor
//! - [`server`] - HTTP coordination endpoint
//! - [`config`] - Configuration types and loading
//! - [`cli`] - Command-line interface

pub mod cli;
pub mod config;
pub mod control;
pub mod domain;
pub mod orchestrator;
pub mod server;
pub mod state;

// Re-export commonly used types
pub use config::Config;
pub use control::{FileSignalChannel, SignalChannel};
pub use domain::{ControlSignal, ExperimentState, Trial};
pub use orchestrator::{CommandLauncher, Orchestrator, WorkerLauncher};
pub use state::{StateManager, StateSubmission};
