//! Experiment state and trial identifiers

use serde::{Deserialize, Serialize};

/// Binary experiment state as seen by the client
///
/// Travels on the wire as `0` (Idle) or `1` (Active).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "i64")]
pub enum ExperimentState {
    #[default]
    Idle,
    Active,
}

impl ExperimentState {
    /// Wire value of this state
    pub fn as_wire(self) -> u8 {
        match self {
            Self::Idle => 0,
            Self::Active => 1,
        }
    }
}

impl From<ExperimentState> for u8 {
    fn from(state: ExperimentState) -> Self {
        state.as_wire()
    }
}

impl TryFrom<i64> for ExperimentState {
    type Error = String;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Idle),
            1 => Ok(Self::Active),
            other => Err(format!("Invalid state value: {} (expected 0 or 1)", other)),
        }
    }
}

impl std::fmt::Display for ExperimentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Active => write!(f, "active"),
        }
    }
}

impl std::str::FromStr for ExperimentState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "idle" | "0" => Ok(Self::Idle),
            "active" | "1" => Ok(Self::Active),
            _ => Err(format!("Unknown experiment state: {}", s)),
        }
    }
}

/// Caller-supplied identifier for one experimental repetition
///
/// Only compared for equality; no ordering or uniqueness is assumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Trial(pub i64);

impl Trial {
    /// Text form passed to worker processes as their positional argument
    pub fn as_arg(&self) -> String {
        self.0.to_string()
    }
}

impl From<i64> for Trial {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl std::fmt::Display for Trial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_state_default_is_idle() {
        assert_eq!(ExperimentState::default(), ExperimentState::Idle);
    }

    #[test]
    fn test_state_try_from_wire() {
        assert_eq!(ExperimentState::try_from(0).unwrap(), ExperimentState::Idle);
        assert_eq!(ExperimentState::try_from(1).unwrap(), ExperimentState::Active);
        assert!(ExperimentState::try_from(2).is_err());
        assert!(ExperimentState::try_from(-1).is_err());
    }

    #[test]
    fn test_state_serde_uses_integers() {
        assert_eq!(serde_json::to_string(&ExperimentState::Active).unwrap(), "1");
        assert_eq!(serde_json::to_string(&ExperimentState::Idle).unwrap(), "0");

        let state: ExperimentState = serde_json::from_str("1").unwrap();
        assert_eq!(state, ExperimentState::Active);
        assert!(serde_json::from_str::<ExperimentState>("2").is_err());
    }

    #[test]
    fn test_state_parse() {
        assert_eq!("ACTIVE".parse::<ExperimentState>().unwrap(), ExperimentState::Active);
        assert_eq!("0".parse::<ExperimentState>().unwrap(), ExperimentState::Idle);
        assert!("paused".parse::<ExperimentState>().is_err());
    }

    #[test]
    fn test_trial_as_arg() {
        assert_eq!(Trial(7).as_arg(), "7");
        assert_eq!(Trial(-3).as_arg(), "-3");
        assert_eq!(Trial::from(12).to_string(), "12");
    }

    proptest! {
        #[test]
        fn prop_only_zero_and_one_are_states(value in any::<i64>()) {
            let parsed = ExperimentState::try_from(value);
            prop_assert_eq!(parsed.is_ok(), value == 0 || value == 1);
            if let Ok(state) = parsed {
                prop_assert_eq!(i64::from(state.as_wire()), value);
            }
        }
    }
}
