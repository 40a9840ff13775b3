//! State management with actor pattern
//!
//! StateManager owns the StateStore, the Orchestrator and the control channel
//! and processes messages via channels, so HTTP requests and worker exit
//! events are applied one at a time.

mod manager;
mod messages;
mod store;

pub use manager::StateManager;
pub use messages::{Ack, StateCommand, StateError, StateResponse, StatusReport};
pub use store::{StateStore, StateSubmission, StoreSnapshot, SubmitOutcome, TrialTransition, ValidationError};
