//! Control signal channel
//!
//! A tiny persisted key/value surface holding the cooperative signal that
//! worker processes poll on their own schedule. Last write wins; readers never
//! observe a partial write.

mod file;

use std::path::PathBuf;

use thiserror::Error;

use crate::domain::ControlSignal;

pub use file::FileSignalChannel;

/// Errors from the control channel
#[derive(Debug, Error)]
pub enum ControlError {
    #[error("Failed to write control signal to {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read control signal from {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Unknown control token in {path}: {token:?}")]
    UnknownToken { path: PathBuf, token: String },
}

/// Storage for the cooperative control signal
pub trait SignalChannel: Send + Sync {
    /// Overwrite the persisted signal
    fn write_signal(&self, signal: ControlSignal) -> Result<(), ControlError>;

    /// Read back the persisted signal
    fn read_signal(&self) -> Result<ControlSignal, ControlError>;

    /// Human readable location, for logs and status output
    fn location(&self) -> String;
}
