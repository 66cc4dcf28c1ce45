//! Main entry point for the clusterlock binary.
//!
//! Runs one external command while holding a named lock in the shared lock
//! table. The command is killed if the lease is lost or the process is asked
//! to stop.

use std::process::ExitCode;

use tokio::sync::mpsc;
use tracing::{error, info, warn};

use clusterlock_common::ClusterLockError;
use clusterlock_core::{LockManager, LockState};
use clusterlock_server::{CommandJob, Configuration, JobExit, startup};

enum Stop {
    Signal,
    LeaseLost,
    JobExited(JobExit),
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let configuration = Configuration::new()?;

    let _logging_guard = startup::init_logging(&configuration.logging_config()?)?;

    clusterlock_core::metrics::init_metrics();

    let name = configuration.lock_name()?;
    let class = configuration.lock_class()?;
    let job = CommandJob::new(configuration.job_command()?)?;
    let mut job_exit = job.subscribe();

    let store = startup::record_store(&configuration).await?;
    let (error_tx, mut error_rx) = mpsc::channel(configuration.error_channel_capacity()?);
    let manager = LockManager::new(store, configuration.lock_manager_options()?, error_tx)?;
    manager.prepare().await?;

    manager.run_under_lock(&name, class, job).await?;
    info!(lock = %name, class = %class, owner = %manager.identity(), "Waiting for lock");

    let shutdown = startup::wait_for_shutdown_signal();
    let mut shutdown_rx = shutdown.subscribe();

    let stop = tokio::select! {
        _ = shutdown_rx.recv() => Stop::Signal,
        Some(lost) = error_rx.recv() => {
            let code = ClusterLockError::from(lost.clone()).code();
            error!(code = code.code, "{}", lost);
            Stop::LeaseLost
        }
        exit = job_exit.wait_for(Option::is_some) => match exit {
            Ok(exit) => (*exit).map(Stop::JobExited).unwrap_or(Stop::Signal),
            Err(_) => Stop::Signal,
        },
    };

    let held = manager.state(&name) == LockState::Held;
    manager.shutdown();

    if held && !matches!(stop, Stop::JobExited(_)) {
        let waited = startup::run_with_timeout(
            job_exit.wait_for(Option::is_some),
            configuration.shutdown_timeout()?,
            "command to exit",
        )
        .await;
        if !matches!(waited, Some(Ok(_))) {
            warn!(lock = %name, "Command did not report an exit status");
        }
    }

    let code = match stop {
        Stop::Signal => 0,
        Stop::LeaseLost => 1,
        Stop::JobExited(exit) => exit.exit_code(),
    };

    info!(lock = %name, code, "Shutdown complete");
    Ok(ExitCode::from(code))
}
