//! Inference server process supervision
//!
//! Spawns the local model server as a child process and tears it down when
//! the application exits: ask it to stop, wait a bounded time for the exit,
//! then force-kill and reap. An inference request abandoned mid-flight at
//! shutdown is not cancelled cleanly; teardown is best-effort.

use crate::config::ServerConfig;
use crate::inference::InferenceError;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::{Child, Command};
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Handle to a spawned inference server process
///
/// The chat core never owns one of these; only the composing binary does.
pub struct ServerProcess {
    child: Option<Child>,
    command: String,
}

impl ServerProcess {
    /// Spawn the server and wait for it to come up
    pub async fn spawn(config: &ServerConfig) -> Result<Self, InferenceError> {
        debug!(command = %config.command, args = ?config.args, "Spawning inference server");

        let child = Command::new(&config.command)
            .args(&config.args)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()?;

        info!(
            command = %config.command,
            pid = child.id(),
            "Inference server spawned"
        );

        // Give the server a moment to open its port before the first request
        tokio::time::sleep(Duration::from_secs(config.startup_wait_secs)).await;

        Ok(Self {
            child: Some(child),
            command: config.command.clone(),
        })
    }

    /// Stop the server, escalating to a forced kill after `grace`
    ///
    /// Idempotent: calling shutdown on an already-stopped server is a no-op.
    pub async fn shutdown(&mut self, grace: Duration) -> Result<(), InferenceError> {
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };

        debug!(command = %self.command, "Stopping inference server");

        child.start_kill()?;
        match timeout(grace, child.wait()).await {
            Ok(Ok(status)) => {
                info!(
                    command = %self.command,
                    exit_status = ?status,
                    "Inference server stopped"
                );
            }
            Ok(Err(e)) => {
                warn!(
                    command = %self.command,
                    error = %e,
                    "Failed waiting for inference server exit"
                );
            }
            Err(_) => {
                warn!(
                    command = %self.command,
                    grace_secs = grace.as_secs(),
                    "Inference server is taking too long to stop, killing it"
                );
                child.kill().await?;
            }
        }

        Ok(())
    }

    /// Check whether the server process is still alive
    pub fn is_running(&mut self) -> bool {
        match self.child.as_mut() {
            Some(child) => matches!(child.try_wait(), Ok(None)),
            None => false,
        }
    }
}

impl Drop for ServerProcess {
    fn drop(&mut self) {
        // Best-effort cleanup if shutdown was never called; start_kill is
        // synchronous and the runtime reaps the process afterwards
        if let Some(child) = self.child.as_mut() {
            let _ = child.start_kill();
        }
    }
}
