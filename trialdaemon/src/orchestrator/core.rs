//! Orchestrator implementation

use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::generation::{Generation, GenerationId, OrchestratorStatus, WorkerHandle};
use super::launcher::WorkerLauncher;
use super::supervisor::{Supervision, supervise};
use super::{WORKERS_PER_GENERATION, WorkerEvent};
use crate::domain::Trial;

/// Owns the current worker generation and any superseded ones still exiting
///
/// Not thread-safe on its own: it is owned by the state actor, which
/// serialises requests and exit events.
pub struct Orchestrator {
    launcher: Arc<dyn WorkerLauncher>,
    grace_period: Option<Duration>,
    current: Option<Generation>,
    retiring: Vec<Generation>,
    next_id: GenerationId,
    events_tx: mpsc::UnboundedSender<WorkerEvent>,
}

impl Orchestrator {
    /// Create an orchestrator whose supervisors report on `events_tx`
    pub fn new(
        launcher: Arc<dyn WorkerLauncher>,
        grace_period: Option<Duration>,
        events_tx: mpsc::UnboundedSender<WorkerEvent>,
    ) -> Self {
        debug!(?grace_period, "Orchestrator::new: called");
        Self {
            launcher,
            grace_period,
            current: None,
            retiring: Vec::new(),
            next_id: 1,
            events_tx,
        }
    }

    /// Trial of the current generation, if any
    pub fn current_trial(&self) -> Option<Trial> {
        self.current.as_ref().map(|g| g.trial)
    }

    /// Spawn the workers for `trial`
    ///
    /// No-op when the current generation already belongs to `trial`. A failed
    /// spawn is logged and leaves the generation partially started. Returns
    /// the number of workers spawned.
    pub fn start_generation(&mut self, trial: Trial) -> usize {
        debug!(%trial, "Orchestrator::start_generation: called");
        if self.current_trial() == Some(trial) {
            debug!(%trial, "Orchestrator::start_generation: generation already current, skipping");
            return 0;
        }
        if self.current.is_some() {
            debug!("Orchestrator::start_generation: superseding current generation first");
            self.terminate_generation();
        }

        let id = self.next_id;
        self.next_id += 1;
        let mut generation = Generation::new(id, trial);

        for slot in 0..WORKERS_PER_GENERATION {
            let worker = match self.launcher.launch(slot, trial) {
                Ok(worker) => worker,
                Err(e) => {
                    error!(generation = id, slot, %trial, error = %e, "Failed to start worker");
                    continue;
                }
            };

            let alive = Arc::new(AtomicBool::new(true));
            let (stop_tx, stop_rx) = mpsc::unbounded_channel();
            generation
                .workers
                .insert(slot, WorkerHandle::new(slot, worker.pid, alive.clone(), stop_tx));

            let ctx = Supervision {
                generation: id,
                slot,
                trial,
                grace_period: self.grace_period,
                alive,
                events: self.events_tx.clone(),
            };
            tokio::spawn(supervise(worker, stop_rx, ctx));
        }

        let spawned = generation.workers.len();
        if spawned < WORKERS_PER_GENERATION {
            warn!(
                generation = id,
                %trial,
                spawned,
                expected = WORKERS_PER_GENERATION,
                "Generation only partially started"
            );
        } else {
            info!(generation = id, %trial, spawned, "Started worker generation");
        }

        self.current = Some(generation);
        spawned
    }

    /// Interrupt every live worker of the current generation without waiting
    ///
    /// The generation is retired until its workers report exit. Returns the
    /// number of stop requests sent.
    pub fn terminate_generation(&mut self) -> usize {
        debug!("Orchestrator::terminate_generation: called");
        let Some(mut generation) = self.current.take() else {
            debug!("Orchestrator::terminate_generation: no current generation");
            return 0;
        };

        let requested = generation.request_stop();
        info!(generation = generation.id, trial = %generation.trial, requested, "Requested worker shutdown");

        if !generation.is_empty() {
            self.retiring.push(generation);
        }
        requested
    }

    /// Replace the current generation with one for `trial`
    pub fn transition(&mut self, trial: Trial) -> usize {
        debug!(%trial, previous = ?self.current_trial(), "Orchestrator::transition: called");
        self.terminate_generation();
        self.start_generation(trial)
    }

    /// Apply an event reported by a supervisor
    pub fn handle_event(&mut self, event: WorkerEvent) {
        debug!(?event, "Orchestrator::handle_event: called");
        match event {
            WorkerEvent::Exited { generation, slot, .. } => {
                if let Some(current) = self.current.as_mut()
                    && current.id == generation
                {
                    current.workers.remove(&slot);
                    return;
                }

                if let Some(idx) = self.retiring.iter().position(|g| g.id == generation) {
                    self.retiring[idx].workers.remove(&slot);
                    if self.retiring[idx].is_empty() {
                        let retired = self.retiring.remove(idx);
                        debug!(generation = retired.id, trial = %retired.trial, "Generation fully exited");
                    }
                } else {
                    debug!(generation, slot, "Orchestrator::handle_event: unknown generation");
                }
            }
        }
    }

    /// Whether any worker handle is still tracked
    pub fn has_workers(&self) -> bool {
        self.current.as_ref().is_some_and(|g| !g.is_empty()) || !self.retiring.is_empty()
    }

    pub fn grace_period(&self) -> Option<Duration> {
        self.grace_period
    }

    pub fn status(&self) -> OrchestratorStatus {
        OrchestratorStatus {
            current: self.current.as_ref().map(Generation::status),
            retiring: self.retiring.iter().map(Generation::status).collect(),
        }
    }
}
