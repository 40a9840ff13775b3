//! StateManager - actor that owns the StateStore and the Orchestrator
//!
//! Processes commands and worker exit events in a single task, so no locks
//! are needed around the store or the worker handles.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use super::messages::{Ack, StateCommand, StateError, StateResponse, StatusReport};
use super::store::{StateStore, StateSubmission};
use crate::control::{ControlError, SignalChannel};
use crate::domain::{ControlSignal, ExperimentState};
use crate::orchestrator::{Orchestrator, WorkerEvent, WorkerLauncher};

/// Extra time allowed after the grace period for killed workers to be reaped
const SHUTDOWN_SLACK: Duration = Duration::from_secs(1);

/// Handle to send commands to the StateManager
#[derive(Clone)]
pub struct StateManager {
    tx: mpsc::Sender<StateCommand>,
}

impl StateManager {
    /// Spawn a new StateManager actor
    ///
    /// The control channel is initialised to the terminate token, matching
    /// the default Idle state. Must be called from within a tokio runtime.
    pub fn spawn(
        launcher: Arc<dyn WorkerLauncher>,
        channel: Arc<dyn SignalChannel>,
        grace_period: Option<Duration>,
    ) -> Self {
        debug!(control = %channel.location(), ?grace_period, "spawn: called");
        let (tx, rx) = mpsc::channel(256);
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        // Initial token goes out before the actor starts
        let store = StateStore::new();
        let initial = ControlSignal::from(store.fetch_state());
        log_signal_write(initial, channel.write_signal(initial));
        let orchestrator = Orchestrator::new(launcher, grace_period, events_tx);

        tokio::spawn(actor_loop(store, orchestrator, channel, rx, events_rx));

        info!("StateManager spawned");
        Self { tx }
    }

    /// Submit a state change from the client
    ///
    /// Returns once the store has recorded it; the control signal rewrite and
    /// any worker relaunch happen afterwards in the actor.
    pub async fn submit_state(&self, submission: StateSubmission) -> StateResponse<Ack> {
        debug!(?submission, "submit_state: called");
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(StateCommand::Submit {
                submission,
                reply: reply_tx,
            })
            .await
            .map_err(|_| StateError::ChannelError)?;
        let ack = reply_rx.await.map_err(|_| StateError::ChannelError)??;
        Ok(ack)
    }

    /// Current experiment state; `Idle` until the first accepted submission
    pub async fn fetch_state(&self) -> StateResponse<ExperimentState> {
        debug!("fetch_state: called");
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(StateCommand::Fetch { reply: reply_tx })
            .await
            .map_err(|_| StateError::ChannelError)?;
        reply_rx.await.map_err(|_| StateError::ChannelError)
    }

    /// Snapshot of the store and the worker generations
    pub async fn status(&self) -> StateResponse<StatusReport> {
        debug!("status: called");
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(StateCommand::Status { reply: reply_tx })
            .await
            .map_err(|_| StateError::ChannelError)?;
        reply_rx.await.map_err(|_| StateError::ChannelError)
    }

    /// Stop all workers and the actor
    pub async fn shutdown(&self) -> StateResponse<()> {
        debug!("shutdown: called");
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(StateCommand::Shutdown { reply: reply_tx })
            .await
            .map_err(|_| StateError::ChannelError)?;
        reply_rx.await.map_err(|_| StateError::ChannelError)
    }
}

/// Rewrite the control signal for `state`; failures are logged only
///
/// The write (including its fsync) runs on the blocking pool. The actor still
/// awaits it, so the signal is in place before any worker is relaunched.
async fn write_signal(channel: &Arc<dyn SignalChannel>, state: ExperimentState) {
    let signal = ControlSignal::from(state);
    let writer = Arc::clone(channel);
    match tokio::task::spawn_blocking(move || writer.write_signal(signal)).await {
        Ok(result) => log_signal_write(signal, result),
        Err(e) => error!(%signal, error = %e, "Control signal write task failed"),
    }
}

fn log_signal_write(signal: ControlSignal, result: Result<(), ControlError>) {
    match result {
        Ok(()) => debug!(%signal, "write_signal: control signal updated"),
        Err(e) => error!(%signal, error = %e, "Failed to write control signal"),
    }
}

/// Wait for supervisors to report exits, bounded by the grace period
async fn drain_exits(orchestrator: &mut Orchestrator, events_rx: &mut mpsc::UnboundedReceiver<WorkerEvent>) {
    let Some(grace) = orchestrator.grace_period() else {
        debug!("drain_exits: no grace period, not waiting for workers");
        return;
    };

    let deadline = tokio::time::Instant::now() + grace + SHUTDOWN_SLACK;
    while orchestrator.has_workers() {
        match tokio::time::timeout_at(deadline, events_rx.recv()).await {
            Ok(Some(event)) => orchestrator.handle_event(event),
            Ok(None) => break,
            Err(_) => {
                warn!(remaining = orchestrator.status().tracked_workers(), "Workers still running at shutdown");
                break;
            }
        }
    }
}

/// The actor loop that processes commands and worker events
async fn actor_loop(
    mut store: StateStore,
    mut orchestrator: Orchestrator,
    channel: Arc<dyn SignalChannel>,
    mut rx: mpsc::Receiver<StateCommand>,
    mut events_rx: mpsc::UnboundedReceiver<WorkerEvent>,
) {
    debug!("actor_loop: started");

    loop {
        tokio::select! {
            cmd = rx.recv() => {
                let Some(cmd) = cmd else {
                    debug!("actor_loop: all handles dropped");
                    break;
                };

                match cmd {
                    StateCommand::Submit { submission, reply } => {
                        debug!(?submission, "actor_loop: Submit command");
                        let outcome = match store.submit(&submission) {
                            Ok(outcome) => outcome,
                            Err(e) => {
                                warn!(error = %e, "Rejected state submission");
                                let _ = reply.send(Err(e));
                                continue;
                            }
                        };

                        // Acknowledge first; side effects are not awaited by the client
                        let _ = reply.send(Ok(Ack::from(&outcome)));

                        // The signal goes out before new workers start, so they
                        // never read a stale terminate token
                        write_signal(&channel, outcome.state).await;

                        if let Some(transition) = outcome.transition {
                            info!(
                                previous = ?transition.previous,
                                next = %transition.next,
                                "Trial changed, relaunching workers"
                            );
                            orchestrator.transition(transition.next);
                        }
                    }

                    StateCommand::Fetch { reply } => {
                        let state = store.fetch_state();
                        debug!(%state, "actor_loop: Fetch command");
                        let _ = reply.send(state);
                    }

                    StateCommand::Status { reply } => {
                        debug!("actor_loop: Status command");
                        let _ = reply.send(StatusReport {
                            store: store.snapshot(),
                            control: channel.location(),
                            workers: orchestrator.status(),
                        });
                    }

                    StateCommand::Shutdown { reply } => {
                        debug!("actor_loop: Shutdown command");
                        info!("StateManager shutting down");
                        write_signal(&channel, ExperimentState::Idle).await;
                        orchestrator.terminate_generation();
                        drain_exits(&mut orchestrator, &mut events_rx).await;
                        let _ = reply.send(());
                        break;
                    }
                }
            }

            Some(event) = events_rx.recv() => {
                orchestrator.handle_event(event);
            }
        }
    }

    debug!("StateManager actor stopped");
}
