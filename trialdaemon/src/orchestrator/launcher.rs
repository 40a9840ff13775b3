//! Worker launching
//!
//! `WorkerLauncher` is the seam between the orchestrator and the operating
//! system. `CommandLauncher` spawns real processes from configured commands.

use std::process::Stdio;

use futures::FutureExt;
use futures::future::BoxFuture;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tracing::{debug, info, warn};

use super::{OrchestratorError, WorkerExit};
use crate::config::WorkerCommand;
use crate::domain::Trial;

/// A freshly spawned worker, split into its capabilities
pub struct SpawnedWorker {
    /// OS process id, when known
    pub pid: Option<u32>,
    /// Delivers interrupt/kill to the process
    pub signaller: Box<dyn WorkerSignaller>,
    /// Resolves once the process has exited
    pub exit: BoxFuture<'static, Result<WorkerExit, OrchestratorError>>,
}

/// Signal delivery for one worker
pub trait WorkerSignaller: Send + Sync {
    /// Cooperative interrupt (SIGINT)
    fn interrupt(&self) -> Result<(), OrchestratorError>;

    /// Forced kill (SIGKILL)
    fn kill(&self) -> Result<(), OrchestratorError>;
}

/// Spawns the worker process for one slot of a generation
pub trait WorkerLauncher: Send + Sync {
    fn launch(&self, slot: usize, trial: Trial) -> Result<SpawnedWorker, OrchestratorError>;
}

/// Launches workers from the configured command lines
#[derive(Debug, Clone)]
pub struct CommandLauncher {
    commands: Vec<WorkerCommand>,
}

impl CommandLauncher {
    pub fn new(commands: Vec<WorkerCommand>) -> Self {
        debug!(count = commands.len(), "CommandLauncher::new: called");
        Self { commands }
    }
}

impl WorkerLauncher for CommandLauncher {
    fn launch(&self, slot: usize, trial: Trial) -> Result<SpawnedWorker, OrchestratorError> {
        debug!(slot, %trial, "CommandLauncher::launch: called");
        let worker_cmd = self.commands.get(slot).ok_or(OrchestratorError::NoCommand(slot))?;

        let mut command = tokio::process::Command::new(&worker_cmd.program);
        command
            .args(&worker_cmd.args)
            .arg(trial.as_arg())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = &worker_cmd.working_dir {
            debug!(?dir, "CommandLauncher::launch: setting working directory");
            command.current_dir(dir);
        }

        let mut child = command.spawn().map_err(|source| OrchestratorError::Spawn {
            slot,
            program: worker_cmd.program.clone(),
            source,
        })?;
        let pid = child.id();
        info!(slot, %trial, ?pid, program = %worker_cmd.program, "Spawned worker");

        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(forward_lines(stdout, slot, trial, OutputStream::Stdout));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(forward_lines(stderr, slot, trial, OutputStream::Stderr));
        }

        let exit = async move {
            let status = child.wait().await.map_err(OrchestratorError::Wait)?;
            Ok(exit_from_status(status))
        }
        .boxed();

        Ok(SpawnedWorker {
            pid,
            signaller: Box::new(PidSignaller { pid }),
            exit,
        })
    }
}

fn exit_from_status(status: std::process::ExitStatus) -> WorkerExit {
    #[cfg(unix)]
    let signal = {
        use std::os::unix::process::ExitStatusExt;
        status.signal()
    };
    #[cfg(not(unix))]
    let signal = None;

    WorkerExit {
        code: status.code(),
        signal,
    }
}

/// Signals a worker by process id
struct PidSignaller {
    pid: Option<u32>,
}

impl PidSignaller {
    #[cfg(unix)]
    fn send(&self, signal: nix::sys::signal::Signal, name: &'static str) -> Result<(), OrchestratorError> {
        use nix::sys::signal::kill;
        use nix::unistd::Pid;

        let pid = self.pid.ok_or(OrchestratorError::NoPid)?;
        debug!(pid, signal = name, "PidSignaller::send: delivering signal");
        kill(Pid::from_raw(pid as i32), signal).map_err(|e| OrchestratorError::Signal {
            signal: name,
            pid,
            reason: e.to_string(),
        })
    }
}

impl WorkerSignaller for PidSignaller {
    #[cfg(unix)]
    fn interrupt(&self) -> Result<(), OrchestratorError> {
        self.send(nix::sys::signal::Signal::SIGINT, "SIGINT")
    }

    #[cfg(unix)]
    fn kill(&self) -> Result<(), OrchestratorError> {
        self.send(nix::sys::signal::Signal::SIGKILL, "SIGKILL")
    }

    #[cfg(not(unix))]
    fn interrupt(&self) -> Result<(), OrchestratorError> {
        let pid = self.pid.ok_or(OrchestratorError::NoPid)?;
        Err(OrchestratorError::Signal {
            signal: "SIGINT",
            pid,
            reason: "unsupported platform".to_string(),
        })
    }

    #[cfg(not(unix))]
    fn kill(&self) -> Result<(), OrchestratorError> {
        let pid = self.pid.ok_or(OrchestratorError::NoPid)?;
        std::process::Command::new("taskkill")
            .args(["/PID", &pid.to_string(), "/F"])
            .output()
            .map(|_| ())
            .map_err(|e| OrchestratorError::Signal {
                signal: "SIGKILL",
                pid,
                reason: e.to_string(),
            })
    }
}

#[derive(Debug, Clone, Copy)]
enum OutputStream {
    Stdout,
    Stderr,
}

/// Forward a worker's output to the log, one line per event
async fn forward_lines<R>(reader: R, slot: usize, trial: Trial, stream: OutputStream)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => match stream {
                OutputStream::Stdout => info!(target: "trialdaemon::worker", slot, %trial, "{}", line),
                OutputStream::Stderr => warn!(target: "trialdaemon::worker", slot, %trial, "{}", line),
            },
            Ok(None) => break,
            Err(e) => {
                debug!(slot, ?stream, error = %e, "forward_lines: read failed");
                break;
            }
        }
    }
    debug!(slot, ?stream, "forward_lines: stream closed");
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::time::Duration;

    fn sh(script: &str) -> WorkerCommand {
        WorkerCommand {
            program: "sh".to_string(),
            args: vec!["-c".to_string(), script.to_string(), "worker".to_string()],
            working_dir: None,
        }
    }

    #[tokio::test]
    async fn test_launch_passes_trial_as_last_argument() {
        let launcher = CommandLauncher::new(vec![sh("exit $1")]);

        let worker = launcher.launch(0, Trial(3)).unwrap();
        assert!(worker.pid.is_some());

        let exit = tokio::time::timeout(Duration::from_secs(5), worker.exit)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(exit.code, Some(3));
        assert!(!exit.success());
    }

    #[tokio::test]
    async fn test_launch_missing_slot() {
        let launcher = CommandLauncher::new(vec![sh("true")]);
        let err = launcher.launch(1, Trial(1)).err().unwrap();
        assert!(matches!(err, OrchestratorError::NoCommand(1)));
    }

    #[tokio::test]
    async fn test_launch_bad_program() {
        let launcher = CommandLauncher::new(vec![WorkerCommand {
            program: "/nonexistent/worker-binary".to_string(),
            args: vec![],
            working_dir: None,
        }]);
        let err = launcher.launch(0, Trial(1)).err().unwrap();
        assert!(matches!(err, OrchestratorError::Spawn { slot: 0, .. }));
    }

    #[tokio::test]
    async fn test_interrupt_is_cooperative() {
        // The worker traps SIGINT and exits with a recognisable code
        let launcher = CommandLauncher::new(vec![sh("trap 'exit 7' INT; while true; do sleep 0.05; done")]);
        let worker = launcher.launch(0, Trial(1)).unwrap();

        tokio::time::sleep(Duration::from_millis(200)).await;
        worker.signaller.interrupt().unwrap();

        let exit = tokio::time::timeout(Duration::from_secs(5), worker.exit)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(exit.code, Some(7));
    }

    #[tokio::test]
    async fn test_kill_terminates_process() {
        let launcher = CommandLauncher::new(vec![sh("trap '' INT; while true; do sleep 0.05; done")]);
        let worker = launcher.launch(0, Trial(1)).unwrap();

        worker.signaller.kill().unwrap();

        let exit = tokio::time::timeout(Duration::from_secs(5), worker.exit)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(exit.code, None);
        assert_eq!(exit.signal, Some(9));
    }
}
