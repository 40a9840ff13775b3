//! State manager messages
//!
//! Commands and responses for the actor pattern.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::oneshot;

use super::store::{StateSubmission, StoreSnapshot, SubmitOutcome, ValidationError};
use crate::domain::{ExperimentState, Trial};
use crate::orchestrator::OrchestratorStatus;

/// Errors from state operations
#[derive(Debug, Error)]
pub enum StateError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Channel error")]
    ChannelError,
}

/// Response from state operations
pub type StateResponse<T> = Result<T, StateError>;

/// Acknowledgement of an accepted submission
///
/// Sent before the signal rewrite and any worker relaunch have finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack {
    pub state: ExperimentState,
    pub trial: Trial,
    /// Whether the submission changed the trial and relaunches workers
    pub transition: bool,
}

impl From<&SubmitOutcome> for Ack {
    fn from(outcome: &SubmitOutcome) -> Self {
        Self {
            state: outcome.state,
            trial: outcome.trial,
            transition: outcome.transition.is_some(),
        }
    }
}

/// Everything the daemon knows, for status output
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusReport {
    pub store: StoreSnapshot,
    /// Where the control signal is persisted
    pub control: String,
    pub workers: OrchestratorStatus,
}

/// Commands sent to the StateManager actor
#[derive(Debug)]
pub enum StateCommand {
    Submit {
        submission: StateSubmission,
        reply: oneshot::Sender<Result<Ack, ValidationError>>,
    },
    Fetch {
        reply: oneshot::Sender<ExperimentState>,
    },
    Status {
        reply: oneshot::Sender<StatusReport>,
    },

    // Stops workers, writes the terminate token, then replies
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}
