//! Worker generations and their handles

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::debug;

use crate::domain::Trial;

/// Internal identifier of a worker generation
pub type GenerationId = u64;

/// Orchestrator-side handle for one spawned worker
#[derive(Debug)]
pub(crate) struct WorkerHandle {
    pub slot: usize,
    pub pid: Option<u32>,
    pub started_at: DateTime<Utc>,
    /// Cleared by the supervisor once the process has exited
    pub alive: Arc<AtomicBool>,
    stop_tx: mpsc::UnboundedSender<()>,
    stop_requested: bool,
}

impl WorkerHandle {
    pub fn new(slot: usize, pid: Option<u32>, alive: Arc<AtomicBool>, stop_tx: mpsc::UnboundedSender<()>) -> Self {
        Self {
            slot,
            pid,
            started_at: Utc::now(),
            alive,
            stop_tx,
            stop_requested: false,
        }
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    /// Ask the supervisor to interrupt the process; returns whether a request went out
    pub fn request_stop(&mut self) -> bool {
        debug!(slot = self.slot, pid = ?self.pid, "WorkerHandle::request_stop: called");
        if self.stop_requested || !self.is_alive() {
            debug!(slot = self.slot, "WorkerHandle::request_stop: already stopping or exited");
            return false;
        }
        self.stop_requested = true;
        // A closed channel means the supervisor already saw the exit
        self.stop_tx.send(()).is_ok()
    }

    fn status(&self) -> WorkerStatus {
        WorkerStatus {
            slot: self.slot,
            pid: self.pid,
            alive: self.is_alive(),
            stopping: self.stop_requested,
            started_at: self.started_at,
        }
    }
}

/// The set of workers started for one trial
#[derive(Debug)]
pub(crate) struct Generation {
    pub id: GenerationId,
    pub trial: Trial,
    pub started_at: DateTime<Utc>,
    pub workers: BTreeMap<usize, WorkerHandle>,
}

impl Generation {
    pub fn new(id: GenerationId, trial: Trial) -> Self {
        Self {
            id,
            trial,
            started_at: Utc::now(),
            workers: BTreeMap::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// Request a stop from every live worker, returning how many were asked
    pub fn request_stop(&mut self) -> usize {
        self.workers.values_mut().map(WorkerHandle::request_stop).filter(|sent| *sent).count()
    }

    pub fn status(&self) -> GenerationStatus {
        GenerationStatus {
            id: self.id,
            trial: self.trial,
            started_at: self.started_at,
            workers: self.workers.values().map(WorkerHandle::status).collect(),
        }
    }
}

/// Snapshot of one worker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerStatus {
    pub slot: usize,
    pub pid: Option<u32>,
    pub alive: bool,
    pub stopping: bool,
    #[serde(rename = "started-at")]
    pub started_at: DateTime<Utc>,
}

/// Snapshot of one generation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationStatus {
    pub id: GenerationId,
    pub trial: Trial,
    #[serde(rename = "started-at")]
    pub started_at: DateTime<Utc>,
    pub workers: Vec<WorkerStatus>,
}

/// Snapshot of everything the orchestrator owns
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrchestratorStatus {
    /// Generation for the current trial
    pub current: Option<GenerationStatus>,
    /// Superseded generations whose workers have not exited yet
    pub retiring: Vec<GenerationStatus>,
}

impl OrchestratorStatus {
    /// Workers still tracked across all generations
    pub fn tracked_workers(&self) -> usize {
        self.current.iter().chain(self.retiring.iter()).map(|g| g.workers.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle(slot: usize) -> (WorkerHandle, mpsc::UnboundedReceiver<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (WorkerHandle::new(slot, Some(100 + slot as u32), Arc::new(AtomicBool::new(true)), tx), rx)
    }

    #[test]
    fn test_request_stop_sends_once() {
        let (mut worker, mut rx) = handle(0);

        assert!(worker.request_stop());
        assert!(!worker.request_stop());

        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_request_stop_skips_exited_worker() {
        let (mut worker, mut rx) = handle(0);
        worker.alive.store(false, Ordering::SeqCst);

        assert!(!worker.request_stop());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_generation_request_stop_counts_live_workers() {
        let mut generation = Generation::new(1, Trial(4));
        let (w0, _rx0) = handle(0);
        let (w1, _rx1) = handle(1);
        w1.alive.store(false, Ordering::SeqCst);
        generation.workers.insert(0, w0);
        generation.workers.insert(1, w1);

        assert_eq!(generation.request_stop(), 1);

        let status = generation.status();
        assert_eq!(status.trial, Trial(4));
        assert!(status.workers[0].stopping);
        assert!(!status.workers[1].alive);
    }
}
