//! External command run under the lock

use anyhow::Context;
use async_trait::async_trait;
use tokio::process::Command;
use tokio::sync::watch;
use tracing::{info, warn};

use clusterlock_core::{CancellationSignal, LockedJob};

/// How the command ended
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JobExit {
    /// The process exited on its own; `None` when it was ended by a signal
    Completed(Option<i32>),
    /// The process was killed after the lock signal fired
    Killed,
}

impl JobExit {
    /// Process exit code to report for this outcome
    pub fn exit_code(&self) -> u8 {
        match self {
            JobExit::Completed(Some(code)) => u8::try_from(*code).unwrap_or(1),
            JobExit::Completed(None) | JobExit::Killed => 1,
        }
    }
}

/// Spawns a child process once the lock is acquired
///
/// The child is killed when the cancellation signal fires. The outcome is
/// published on a watch channel so the binary can exit with the child's code.
pub struct CommandJob {
    program: String,
    args: Vec<String>,
    exit_tx: watch::Sender<Option<JobExit>>,
}

impl CommandJob {
    pub fn new(command: Vec<String>) -> anyhow::Result<Self> {
        let mut parts = command.into_iter();
        let program = parts.next().context("empty command")?;
        let (exit_tx, _) = watch::channel(None);
        Ok(Self {
            program,
            args: parts.collect(),
            exit_tx,
        })
    }

    /// Receiver that observes the command's outcome
    pub fn subscribe(&self) -> watch::Receiver<Option<JobExit>> {
        self.exit_tx.subscribe()
    }

    async fn execute(&self, cancel: CancellationSignal) -> anyhow::Result<JobExit> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("failed to spawn '{}'", self.program))?;
        info!(program = %self.program, pid = ?child.id(), "Command started");

        tokio::select! {
            status = child.wait() => {
                let status = status.context("failed to wait for command")?;
                info!(program = %self.program, status = %status, "Command exited");
                Ok(JobExit::Completed(status.code()))
            }
            _ = cancel.cancelled() => {
                warn!(program = %self.program, pid = ?child.id(), "Lock signal fired, killing command");
                child.kill().await.context("failed to kill command")?;
                Ok(JobExit::Killed)
            }
        }
    }
}

#[async_trait]
impl LockedJob for CommandJob {
    async fn run(&self, cancel: CancellationSignal) -> anyhow::Result<()> {
        let exit = match self.execute(cancel).await {
            Ok(exit) => exit,
            Err(e) => {
                self.exit_tx.send_replace(Some(JobExit::Completed(None)));
                return Err(e);
            }
        };
        self.exit_tx.send_replace(Some(exit));

        match exit {
            JobExit::Completed(Some(0)) | JobExit::Killed => Ok(()),
            JobExit::Completed(code) => {
                anyhow::bail!("'{}' exited with status {:?}", self.program, code)
            }
        }
    }
}
