//! Domain types for TrialDaemon
//!
//! Value types shared by the store, the orchestrator and the control channel:
//! ExperimentState, Trial and ControlSignal.

mod experiment;
mod signal;

pub use experiment::{ExperimentState, Trial};
pub use signal::{ControlSignal, TERMINATE_TOKEN};
