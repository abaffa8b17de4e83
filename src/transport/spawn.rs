//! Agent process spawning
//!
//! The driver reaches the agent through a child process whose stdin/stdout
//! carry the protocol and whose stderr merges into the driver's. Locally the
//! child is this same executable running the `agent` subcommand; remotely it
//! is an ssh session invoking the deployed agent binary.

use crate::config::TransferConfig;
use crate::error::{BlockSyncError, Result};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use tracing::debug;

/// A spawned agent child process
pub struct AgentProcess {
    child: Child,
}

impl AgentProcess {
    /// Spawn the agent for the given transfer configuration
    pub fn spawn(config: &TransferConfig) -> Result<Self> {
        let mut command = if config.is_local() {
            // Prefer re-invoking the running binary so local transfers work
            // without an installed copy on PATH
            let program = std::env::current_exe()
                .map(|p| p.into_os_string())
                .unwrap_or_else(|_| config.remote_program.clone().into());
            let mut cmd = Command::new(program);
            cmd.arg("agent");
            cmd
        } else {
            let mut cmd = Command::new(&config.ssh_program);
            cmd.arg("--")
                .arg(&config.host)
                .arg(format!("{} agent", config.remote_program));
            cmd
        };

        command
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit());

        debug!(host = %config.host, "spawning agent: {:?}", command);

        let child = command
            .spawn()
            .map_err(|e| BlockSyncError::spawn(format!("{:?}", command.get_program()), e))?;

        Ok(Self { child })
    }

    /// Take ownership of the child's stdio pair (stdin to write to the
    /// agent, stdout to read from it). Panics if called twice.
    pub fn take_streams(&mut self) -> (ChildStdin, ChildStdout) {
        let stdin = self.child.stdin.take().expect("agent stdin already taken");
        let stdout = self.child.stdout.take().expect("agent stdout already taken");
        (stdin, stdout)
    }

    /// Wait for the agent to exit after a completed session
    pub fn wait(mut self) -> Result<()> {
        let status = self
            .child
            .wait()
            .map_err(|e| BlockSyncError::spawn("agent", e))?;
        debug!(?status, "agent exited");
        Ok(())
    }

    /// Tear the agent down after a failed session
    pub fn abort(mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}
