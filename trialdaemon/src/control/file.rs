//! File-backed control channel

use std::fs;
use std::io::Write;
use std::path::PathBuf;

use tempfile::NamedTempFile;
use tracing::debug;

use super::{ControlError, SignalChannel};
use crate::domain::ControlSignal;

/// Control signal stored as a single text token in a file
///
/// Writes go to a sibling temp file that is renamed over the target, so a
/// worker polling the file sees either the old token or the new one.
#[derive(Debug, Clone)]
pub struct FileSignalChannel {
    path: PathBuf,
}

impl FileSignalChannel {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        debug!(?path, "FileSignalChannel::new: called");
        Self { path }
    }

    fn write_err(&self, source: std::io::Error) -> ControlError {
        ControlError::Write {
            path: self.path.clone(),
            source,
        }
    }
}

impl SignalChannel for FileSignalChannel {
    fn write_signal(&self, signal: ControlSignal) -> Result<(), ControlError> {
        debug!(path = ?self.path, %signal, "FileSignalChannel::write_signal: called");
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir).map_err(|e| self.write_err(e))?;

        let mut tmp = NamedTempFile::new_in(&dir).map_err(|e| self.write_err(e))?;
        tmp.write_all(signal.token().as_bytes()).map_err(|e| self.write_err(e))?;
        tmp.as_file().sync_all().map_err(|e| self.write_err(e))?;
        tmp.persist(&self.path).map_err(|e| self.write_err(e.error))?;

        debug!(path = ?self.path, token = signal.token(), "Wrote control signal");
        Ok(())
    }

    fn read_signal(&self) -> Result<ControlSignal, ControlError> {
        debug!(path = ?self.path, "FileSignalChannel::read_signal: called");
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("FileSignalChannel::read_signal: no control file, treating as continue");
                return Ok(ControlSignal::Continue);
            }
            Err(source) => {
                return Err(ControlError::Read {
                    path: self.path.clone(),
                    source,
                });
            }
        };

        ControlSignal::from_token(&contents).ok_or_else(|| ControlError::UnknownToken {
            path: self.path.clone(),
            token: contents.trim().to_string(),
        })
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_write_creates_parent_dirs() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested").join("control.txt");
        let channel = FileSignalChannel::new(&path);

        channel.write_signal(ControlSignal::Terminate).unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "terminate");
    }

    #[test]
    fn test_continue_clears_token() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("control.txt");
        let channel = FileSignalChannel::new(&path);

        channel.write_signal(ControlSignal::Terminate).unwrap();
        channel.write_signal(ControlSignal::Continue).unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "");
        assert_eq!(channel.read_signal().unwrap(), ControlSignal::Continue);
    }

    #[test]
    fn test_last_write_wins() {
        let temp = TempDir::new().unwrap();
        let channel = FileSignalChannel::new(temp.path().join("control.txt"));

        channel.write_signal(ControlSignal::Continue).unwrap();
        channel.write_signal(ControlSignal::Terminate).unwrap();
        assert_eq!(channel.read_signal().unwrap(), ControlSignal::Terminate);
    }

    #[test]
    fn test_no_temp_files_left_behind() {
        let temp = TempDir::new().unwrap();
        let channel = FileSignalChannel::new(temp.path().join("control.txt"));

        for _ in 0..5 {
            channel.write_signal(ControlSignal::Terminate).unwrap();
            channel.write_signal(ControlSignal::Continue).unwrap();
        }

        let entries: Vec<_> = fs::read_dir(temp.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn test_read_missing_file_is_continue() {
        let temp = TempDir::new().unwrap();
        let channel = FileSignalChannel::new(temp.path().join("absent.txt"));
        assert_eq!(channel.read_signal().unwrap(), ControlSignal::Continue);
    }

    #[test]
    fn test_read_unknown_token_fails() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("control.txt");
        fs::write(&path, "pause").unwrap();

        let channel = FileSignalChannel::new(&path);
        let err = channel.read_signal().unwrap_err();
        assert!(matches!(err, ControlError::UnknownToken { ref token, .. } if token == "pause"));
    }
}
