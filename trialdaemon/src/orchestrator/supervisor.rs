//! Per-worker supervisor task
//!
//! Owns the worker's exit future, turns stop requests into SIGINT, escalates
//! to SIGKILL after the grace period, and reports the exit back to the actor.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::launcher::SpawnedWorker;
use super::{GenerationId, WorkerEvent, WorkerExit};
use crate::domain::Trial;

/// Identity and wiring for one supervised worker
pub(crate) struct Supervision {
    pub generation: GenerationId,
    pub slot: usize,
    pub trial: Trial,
    pub grace_period: Option<Duration>,
    pub alive: Arc<AtomicBool>,
    pub events: mpsc::UnboundedSender<WorkerEvent>,
}

/// Run until the worker exits
pub(crate) async fn supervise(worker: SpawnedWorker, mut stop_rx: mpsc::UnboundedReceiver<()>, ctx: Supervision) {
    let SpawnedWorker { pid, signaller, mut exit } = worker;
    debug!(generation = ctx.generation, slot = ctx.slot, ?pid, "supervise: called");

    let mut stop_open = true;
    let mut interrupted = false;
    let mut kill_at: Option<Instant> = None;

    let result = loop {
        let kill_timer = async move {
            match kill_at {
                Some(at) => tokio::time::sleep_until(at).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            result = &mut exit => break result,

            request = stop_rx.recv(), if stop_open && !interrupted => {
                match request {
                    Some(()) => {
                        interrupted = true;
                        match signaller.interrupt() {
                            Ok(()) => debug!(slot = ctx.slot, ?pid, "supervise: interrupt delivered"),
                            // Best effort: the process may already be gone
                            Err(e) => debug!(slot = ctx.slot, ?pid, error = %e, "supervise: interrupt failed"),
                        }
                        kill_at = ctx.grace_period.map(|grace| Instant::now() + grace);
                    }
                    None => {
                        debug!(slot = ctx.slot, "supervise: stop channel closed");
                        stop_open = false;
                    }
                }
            }

            _ = kill_timer => {
                warn!(slot = ctx.slot, ?pid, trial = %ctx.trial, "Worker ignored interrupt, sending SIGKILL");
                if let Err(e) = signaller.kill() {
                    debug!(slot = ctx.slot, ?pid, error = %e, "supervise: kill failed");
                }
                kill_at = None;
            }
        }
    };

    ctx.alive.store(false, Ordering::SeqCst);

    let exit = match result {
        Ok(exit) => exit,
        Err(e) => {
            warn!(slot = ctx.slot, ?pid, error = %e, "Failed to observe worker exit");
            WorkerExit::default()
        }
    };

    if exit.success() {
        info!(generation = ctx.generation, slot = ctx.slot, trial = %ctx.trial, "Worker exited with code 0");
    } else {
        warn!(
            generation = ctx.generation,
            slot = ctx.slot,
            trial = %ctx.trial,
            code = ?exit.code,
            signal = ?exit.signal,
            "Worker exited unsuccessfully"
        );
    }

    let event = WorkerEvent::Exited {
        generation: ctx.generation,
        slot: ctx.slot,
        trial: ctx.trial,
        exit,
    };
    if ctx.events.send(event).is_err() {
        debug!(slot = ctx.slot, "supervise: event receiver gone");
    }
}
