//! Owns exactly one backend child process.
//!
//! Spawning follows `helix_lsp::Client::start` (`helix-lsp/src/client.rs`):
//! resolve the binary on `$PATH` with `gateway_stdx::env::which`, no shell
//! interpretation, piped stdio, working directory set to the workspace.
//! `kill_on_drop` is intentionally NOT set: the gateway drives an explicit
//! SIGTERM/SIGKILL grace sequence on every exit path, so an implicit
//! drop-time kill would race with it instead of replacing it.

use std::ffi::OsStr;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::{BufReader, BufWriter};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};

use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitStatus {
    pub code: Option<i32>,
    pub signal: Option<i32>,
}

impl ExitStatus {
    /// True if this looks like the outcome of our own graceful shutdown:
    /// exit code 0, or terminated by SIGTERM (signal 15) specifically
    /// because that's the first signal our own kill sequence sends.
    pub fn is_clean_or_expected_sigterm(&self) -> bool {
        self.code == Some(0) || self.signal == Some(15)
    }
}

/// Owns the spawned child and its three stdio pipes.
pub struct ProcessHandle {
    child: Child,
    pub pid: Option<u32>,
    stdout: Option<BufReader<ChildStdout>>,
    stdin: Option<BufWriter<ChildStdin>>,
    stderr: Option<BufReader<ChildStderr>>,
}

impl ProcessHandle {
    /// Spawns `command` with `args` and `env` in `workspace`. No shell is
    /// invoked: `command` is resolved via `$PATH` lookup and exec'd directly.
    pub fn spawn<I, K, V>(
        command: &str,
        args: &[String],
        env: I,
        workspace: &Path,
    ) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<OsStr>,
        V: AsRef<OsStr>,
    {
        let resolved = gateway_stdx::env::which(command)
            .map_err(|err| Error::Connection(err.to_string()))?;

        let mut child = Command::new(resolved)
            .args(args)
            .envs(env)
            .current_dir(workspace)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|err| Error::Connection(format!("failed to spawn '{command}': {err}")))?;

        let pid = child.id();
        let stdin = BufWriter::new(child.stdin.take().expect("piped stdin"));
        let stdout = BufReader::new(child.stdout.take().expect("piped stdout"));
        let stderr = BufReader::new(child.stderr.take().expect("piped stderr"));

        Ok(ProcessHandle {
            child,
            pid,
            stdout: Some(stdout),
            stdin: Some(stdin),
            stderr: Some(stderr),
        })
    }

    /// Takes ownership of the three stdio handles; may only be called once.
    pub fn take_stdio(
        &mut self,
    ) -> (
        BufReader<ChildStdout>,
        BufWriter<ChildStdin>,
        BufReader<ChildStderr>,
    ) {
        (
            self.stdout.take().expect("stdio already taken"),
            self.stdin.take().expect("stdio already taken"),
            self.stderr.take().expect("stdio already taken"),
        )
    }

    /// Waits for the child to exit on its own, with no time limit. Intended
    /// to be raced against a deadline by the caller.
    pub async fn wait(&mut self) -> std::io::Result<ExitStatus> {
        let status = self.child.wait().await?;
        Ok(ExitStatus {
            code: status.code(),
            #[cfg(unix)]
            signal: {
                use std::os::unix::process::ExitStatusExt;
                status.signal()
            },
            #[cfg(not(unix))]
            signal: None,
        })
    }

    /// SIGTERM, then SIGKILL after `grace` if the child hasn't exited.
    /// Idempotent: safe to call on an already-exited child.
    pub async fn terminate(&mut self, grace: Duration) -> ExitStatus {
        #[cfg(unix)]
        {
            if let Some(pid) = self.pid {
                use nix::sys::signal::{kill, Signal};
                use nix::unistd::Pid;
                let _ = kill(Pid::from_raw(pid as i32), Signal::SIGTERM);
            }
        }
        #[cfg(not(unix))]
        {
            let _ = self.child.start_kill();
        }

        match tokio::time::timeout(grace, self.wait()).await {
            Ok(Ok(status)) => return status,
            Ok(Err(_)) | Err(_) => {}
        }

        let _ = self.child.start_kill();
        match self.wait().await {
            Ok(status) => status,
            Err(_) => ExitStatus {
                code: None,
                signal: None,
            },
        }
    }
}
