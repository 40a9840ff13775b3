//! Cooperative control signal shared with worker processes

use serde::{Deserialize, Serialize};

use super::ExperimentState;

/// Literal token workers look for to stop collecting
pub const TERMINATE_TOKEN: &str = "terminate";

/// Two-valued token persisted for external workers to poll
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlSignal {
    Continue,
    Terminate,
}

impl ControlSignal {
    /// Persisted text form: empty for continue, the sentinel for terminate
    pub fn token(self) -> &'static str {
        match self {
            Self::Continue => "",
            Self::Terminate => TERMINATE_TOKEN,
        }
    }

    /// Parse a persisted token, tolerating surrounding whitespace
    pub fn from_token(token: &str) -> Option<Self> {
        match token.trim() {
            "" => Some(Self::Continue),
            TERMINATE_TOKEN => Some(Self::Terminate),
            _ => None,
        }
    }
}

impl From<ExperimentState> for ControlSignal {
    fn from(state: ExperimentState) -> Self {
        match state {
            ExperimentState::Idle => Self::Terminate,
            ExperimentState::Active => Self::Continue,
        }
    }
}

impl std::fmt::Display for ControlSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Continue => write!(f, "continue"),
            Self::Terminate => write!(f, "terminate"),
        }
    }
}
