//! StateStore - current experiment state and trial

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info};

use crate::domain::{ExperimentState, Trial};

/// Reasons a submission is rejected
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Invalid state value: missing (expected 0 or 1)")]
    MissingState,

    /// Carries the submitted value as JSON text
    #[error("Invalid state value: {0} (expected 0 or 1)")]
    InvalidState(String),

    #[error("Missing trial")]
    MissingTrial,

    #[error("Missing location")]
    MissingLocation,
}

/// A state change request as sent by the client
///
/// `state` and `location` stay raw JSON so that any value the client sends
/// reaches validation instead of failing body decoding.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateSubmission {
    pub state: Option<Value>,
    pub trial: Option<i64>,
    pub location: Option<Value>,
}

impl StateSubmission {
    pub fn new(state: i64, trial: i64, location: impl Into<String>) -> Self {
        Self {
            state: Some(Value::from(state)),
            trial: Some(trial),
            location: Some(Value::String(location.into())),
        }
    }
}

/// Decode a wire state: any number equal to 0 or 1, nothing else
fn parse_state(raw: Option<&Value>) -> Result<ExperimentState, ValidationError> {
    let value = match raw {
        None | Some(Value::Null) => return Err(ValidationError::MissingState),
        Some(value) => value,
    };
    match value.as_f64() {
        Some(n) if n == 0.0 => Ok(ExperimentState::Idle),
        Some(n) if n == 1.0 => Ok(ExperimentState::Active),
        _ => Err(ValidationError::InvalidState(value.to_string())),
    }
}

/// Display form of an opaque location; absent, null and blank strings are missing
fn parse_location(raw: Option<&Value>) -> Result<String, ValidationError> {
    match raw {
        None | Some(Value::Null) => Err(ValidationError::MissingLocation),
        Some(Value::String(s)) => match s.trim() {
            "" => Err(ValidationError::MissingLocation),
            trimmed => Ok(trimmed.to_string()),
        },
        Some(other) => Ok(other.to_string()),
    }
}

/// A change of trial detected by a submission
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrialTransition {
    /// Trial before the submission; `None` for the first one
    pub previous: Option<Trial>,
    pub next: Trial,
}

/// Result of an accepted submission
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmitOutcome {
    pub state: ExperimentState,
    pub trial: Trial,
    pub transition: Option<TrialTransition>,
}

/// Point-in-time copy of the store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreSnapshot {
    pub state: ExperimentState,
    pub trial: Option<Trial>,
    pub location: Option<String>,
    #[serde(rename = "updated-at")]
    pub updated_at: Option<DateTime<Utc>>,
    pub submissions: u64,
}

/// Single source of truth for the state the client polls
#[derive(Debug, Default)]
pub struct StateStore {
    state: ExperimentState,
    trial: Option<Trial>,
    location: Option<String>,
    updated_at: Option<DateTime<Utc>>,
    submissions: u64,
}

impl StateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and record a submission
    ///
    /// Nothing is changed when validation fails. A transition is reported
    /// whenever the trial differs from the stored one, including the first
    /// accepted submission.
    pub fn submit(&mut self, submission: &StateSubmission) -> Result<SubmitOutcome, ValidationError> {
        debug!(?submission, "StateStore::submit: called");
        let state = parse_state(submission.state.as_ref())?;
        let location = parse_location(submission.location.as_ref())?;
        let trial = Trial(submission.trial.ok_or(ValidationError::MissingTrial)?);

        let transition = (self.trial != Some(trial)).then_some(TrialTransition {
            previous: self.trial,
            next: trial,
        });

        info!(%state, %trial, %location, transition = transition.is_some(), "Received state");
        self.state = state;
        self.trial = Some(trial);
        self.location = Some(location);
        self.updated_at = Some(Utc::now());
        self.submissions += 1;

        Ok(SubmitOutcome {
            state,
            trial,
            transition,
        })
    }

    /// Last recorded state; `Idle` before any submission
    pub fn fetch_state(&self) -> ExperimentState {
        self.state
    }

    pub fn trial(&self) -> Option<Trial> {
        self.trial
    }

    pub fn snapshot(&self) -> StoreSnapshot {
        StoreSnapshot {
            state: self.state,
            trial: self.trial,
            location: self.location.clone(),
            updated_at: self.updated_at,
            submissions: self.submissions,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_fetch_before_submit_is_idle() {
        let store = StateStore::new();
        assert_eq!(store.fetch_state(), ExperimentState::Idle);
        assert_eq!(store.trial(), None);
    }

    #[test]
    fn test_first_submit_is_transition() {
        let mut store = StateStore::new();
        let outcome = store.submit(&StateSubmission::new(1, 1, "A")).unwrap();

        assert_eq!(outcome.state, ExperimentState::Active);
        assert_eq!(
            outcome.transition,
            Some(TrialTransition {
                previous: None,
                next: Trial(1)
            })
        );
        assert_eq!(store.fetch_state(), ExperimentState::Active);
    }

    #[test]
    fn test_same_trial_is_not_transition() {
        let mut store = StateStore::new();
        store.submit(&StateSubmission::new(1, 1, "A")).unwrap();
        let outcome = store.submit(&StateSubmission::new(0, 1, "A")).unwrap();

        assert_eq!(outcome.transition, None);
        assert_eq!(store.fetch_state(), ExperimentState::Idle);
    }

    #[test]
    fn test_changed_trial_is_transition() {
        let mut store = StateStore::new();
        store.submit(&StateSubmission::new(1, 1, "A")).unwrap();
        let outcome = store.submit(&StateSubmission::new(1, 2, "A")).unwrap();

        assert_eq!(
            outcome.transition,
            Some(TrialTransition {
                previous: Some(Trial(1)),
                next: Trial(2)
            })
        );
    }

    #[test]
    fn test_trials_need_not_be_monotonic() {
        let mut store = StateStore::new();
        store.submit(&StateSubmission::new(1, 5, "A")).unwrap();
        let outcome = store.submit(&StateSubmission::new(1, 2, "A")).unwrap();
        assert!(outcome.transition.is_some());
        let outcome = store.submit(&StateSubmission::new(1, 5, "A")).unwrap();
        assert!(outcome.transition.is_some());
    }

    #[test]
    fn test_out_of_range_state_leaves_store_unchanged() {
        let mut store = StateStore::new();
        store.submit(&StateSubmission::new(1, 1, "A")).unwrap();
        let before = store.snapshot();

        let err = store.submit(&StateSubmission::new(2, 3, "A")).unwrap_err();

        assert_eq!(err, ValidationError::InvalidState("2".to_string()));
        assert_eq!(store.snapshot(), before);
    }

    #[test]
    fn test_missing_fields_rejected() {
        let mut store = StateStore::new();

        let no_location = StateSubmission {
            location: None,
            ..StateSubmission::new(1, 1, "")
        };
        assert_eq!(store.submit(&no_location).unwrap_err(), ValidationError::MissingLocation);

        let blank_location = StateSubmission::new(1, 1, "   ");
        assert_eq!(store.submit(&blank_location).unwrap_err(), ValidationError::MissingLocation);

        let no_state = StateSubmission {
            state: None,
            ..StateSubmission::new(1, 1, "A")
        };
        assert_eq!(store.submit(&no_state).unwrap_err(), ValidationError::MissingState);

        let no_trial = StateSubmission {
            trial: None,
            ..StateSubmission::new(1, 1, "A")
        };
        assert_eq!(store.submit(&no_trial).unwrap_err(), ValidationError::MissingTrial);

        assert_eq!(store.snapshot().submissions, 0);
        assert_eq!(store.fetch_state(), ExperimentState::Idle);
    }

    #[test]
    fn test_snapshot_records_location() {
        let mut store = StateStore::new();
        store.submit(&StateSubmission::new(1, 4, " Lab B ")).unwrap();

        let snapshot = store.snapshot();
        assert_eq!(snapshot.location.as_deref(), Some("Lab B"));
        assert_eq!(snapshot.trial, Some(Trial(4)));
        assert_eq!(snapshot.submissions, 1);
        assert!(snapshot.updated_at.is_some());
    }

    fn raw(state: Value, location: Value) -> StateSubmission {
        StateSubmission {
            state: Some(state),
            trial: Some(1),
            location: Some(location),
        }
    }

    #[test]
    fn test_integral_float_state_accepted() {
        let mut store = StateStore::new();
        let outcome = store.submit(&raw(json!(1.0), json!("A"))).unwrap();
        assert_eq!(outcome.state, ExperimentState::Active);

        store.submit(&raw(json!(0.0), json!("A"))).unwrap();
        assert_eq!(store.fetch_state(), ExperimentState::Idle);
    }

    #[test]
    fn test_non_numeric_state_is_invalid() {
        let mut store = StateStore::new();

        for value in [json!("1"), json!(true), json!(0.5), json!([1]), json!({"state": 1})] {
            let err = store.submit(&raw(value.clone(), json!("A"))).unwrap_err();
            assert_eq!(err, ValidationError::InvalidState(value.to_string()));
            assert!(err.to_string().starts_with("Invalid state value"));
        }

        let err = store.submit(&raw(Value::Null, json!("A"))).unwrap_err();
        assert_eq!(err, ValidationError::MissingState);
        assert!(err.to_string().starts_with("Invalid state value"));
        assert_eq!(store.snapshot().submissions, 0);
    }

    #[test]
    fn test_location_is_opaque() {
        let mut store = StateStore::new();

        store.submit(&raw(json!(1), json!(5))).unwrap();
        assert_eq!(store.snapshot().location.as_deref(), Some("5"));

        store.submit(&raw(json!(1), json!({"x": 1}))).unwrap();
        assert_eq!(store.snapshot().location.as_deref(), Some(r#"{"x":1}"#));

        let err = store.submit(&raw(json!(1), Value::Null)).unwrap_err();
        assert_eq!(err, ValidationError::MissingLocation);
        assert_eq!(store.snapshot().submissions, 2);
    }

    #[test]
    fn test_submission_decodes_any_json_values() {
        let submission: StateSubmission =
            serde_json::from_str(r#"{"state": 1.0, "trial": 2, "location": 7}"#).unwrap();
        assert_eq!(submission.state, Some(json!(1.0)));
        assert_eq!(submission.location, Some(json!(7)));

        let empty: StateSubmission = serde_json::from_str("{}").unwrap();
        assert_eq!(empty, StateSubmission::default());
    }
}
