//! Request and response bodies for the HTTP endpoint

use serde::{Deserialize, Serialize};

use crate::domain::ExperimentState;

/// Body returned for an accepted submission
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitResponse {
    pub message: String,
}

impl SubmitResponse {
    pub fn received() -> Self {
        Self {
            message: "State received successfully".to_string(),
        }
    }
}

/// Body returned by `GET /api/state`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchResponse {
    #[serde(rename = "currentState")]
    pub current_state: ExperimentState,
}

/// Body returned for any rejected request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}
