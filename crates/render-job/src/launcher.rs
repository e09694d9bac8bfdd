//! Subprocess launching and termination.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncRead;
use tokio::process::{Child, Command};

/// How a subprocess ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessExit {
    /// Exit code, `None` when the process was ended by a signal.
    pub code: Option<i32>,
}

impl ProcessExit {
    pub fn code(code: i32) -> Self {
        Self { code: Some(code) }
    }

    pub fn crashed() -> Self {
        Self { code: None }
    }

    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

impl std::fmt::Display for ProcessExit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.code {
            Some(code) => write!(f, "exit code {code}"),
            None => write!(f, "terminated by signal"),
        }
    }
}

/// Control over a running subprocess.
#[async_trait]
pub trait ProcessHandle: Send {
    /// OS process id, if still known.
    fn id(&self) -> Option<u32>;

    /// Wait for the process to exit. Must be cancel-safe.
    async fn wait(&mut self) -> std::io::Result<ProcessExit>;

    /// Ask the process to quit (SIGTERM on unix).
    fn terminate(&mut self) -> std::io::Result<()>;

    /// Force-kill the process and reap it.
    async fn kill(&mut self) -> std::io::Result<()>;
}

/// A freshly spawned subprocess: its stderr stream and its handle.
pub struct SpawnedProcess {
    pub stderr: Box<dyn AsyncRead + Send + Unpin>,
    pub handle: Box<dyn ProcessHandle>,
}

/// Starts subprocesses for a render job.
pub trait ProcessLauncher: Send + Sync {
    fn spawn(&self, program: &Path, args: &[String]) -> std::io::Result<SpawnedProcess>;
}

/// Launcher backed by `tokio::process`.
#[derive(Debug, Default, Clone)]
pub struct TokioLauncher;

impl ProcessLauncher for TokioLauncher {
    fn spawn(&self, program: &Path, args: &[String]) -> std::io::Result<SpawnedProcess> {
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let stderr = child.stderr.take().ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::BrokenPipe, "stderr was not captured")
        })?;

        tracing::debug!(
            program = %program.display(),
            pid = child.id(),
            args_len = args.len(),
            "Subprocess spawned"
        );

        Ok(SpawnedProcess {
            stderr: Box::new(stderr),
            handle: Box::new(TokioProcess { child }),
        })
    }
}

struct TokioProcess {
    child: Child,
}

#[async_trait]
impl ProcessHandle for TokioProcess {
    fn id(&self) -> Option<u32> {
        self.child.id()
    }

    async fn wait(&mut self) -> std::io::Result<ProcessExit> {
        let status = self.child.wait().await?;
        Ok(ProcessExit {
            code: status.code(),
        })
    }

    #[cfg(unix)]
    fn terminate(&mut self) -> std::io::Result<()> {
        let Some(pid) = self.child.id() else {
            // Already reaped
            return Ok(());
        };
        let rc = unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) };
        if rc == 0 {
            Ok(())
        } else {
            Err(std::io::Error::last_os_error())
        }
    }

    #[cfg(not(unix))]
    fn terminate(&mut self) -> std::io::Result<()> {
        self.child.start_kill()
    }

    async fn kill(&mut self) -> std::io::Result<()> {
        self.child.kill().await
    }
}

/// Terminate a process, escalating to a kill if it outlives `grace`.
pub async fn terminate_gracefully(
    handle: &mut dyn ProcessHandle,
    grace: Duration,
) -> std::io::Result<ProcessExit> {
    let pid = handle.id();
    if let Err(e) = handle.terminate() {
        tracing::warn!(?pid, error = %e, "Terminate request failed; killing");
        handle.kill().await?;
        return handle.wait().await;
    }

    match tokio::time::timeout(grace, handle.wait()).await {
        Ok(exit) => exit,
        Err(_) => {
            tracing::warn!(
                ?pid,
                grace_ms = grace.as_millis() as u64,
                "Subprocess ignored terminate request; killing"
            );
            handle.kill().await?;
            handle.wait().await
        }
    }
}

/// Resolve an executable on `PATH` (or accept an explicit path).
pub fn resolve_program(program: &Path) -> Option<std::path::PathBuf> {
    which::which(program).ok()
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use tokio::io::{AsyncBufReadExt, BufReader};

    #[tokio::test]
    async fn test_spawn_captures_stderr_and_exit_code() {
        let args = vec!["-c".to_string(), "echo frame=5 >&2; exit 3".to_string()];
        let mut spawned = TokioLauncher.spawn(Path::new("/bin/sh"), &args).unwrap();

        let mut lines = BufReader::new(spawned.stderr).lines();
        assert_eq!(lines.next_line().await.unwrap().as_deref(), Some("frame=5"));
        assert_eq!(lines.next_line().await.unwrap(), None);

        let exit = spawned.handle.wait().await.unwrap();
        assert_eq!(exit, ProcessExit::code(3));
        assert!(!exit.success());
    }

    #[tokio::test]
    async fn test_spawn_missing_program_fails() {
        let result = TokioLauncher.spawn(Path::new("/nonexistent/renderer"), &[]);
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_terminate_gracefully_stops_sleeper() {
        let args = vec!["-c".to_string(), "exec sleep 30".to_string()];
        let mut spawned = TokioLauncher.spawn(Path::new("/bin/sh"), &args).unwrap();

        let exit = terminate_gracefully(spawned.handle.as_mut(), Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(exit, ProcessExit::crashed());
    }

    #[tokio::test]
    async fn test_terminate_gracefully_escalates_to_kill() {
        let args = vec![
            "-c".to_string(),
            "trap '' TERM; while true; do sleep 0.05; done".to_string(),
        ];
        let mut spawned = TokioLauncher.spawn(Path::new("/bin/sh"), &args).unwrap();
        // Let the shell install its trap
        tokio::time::sleep(Duration::from_millis(200)).await;

        let exit = terminate_gracefully(spawned.handle.as_mut(), Duration::from_millis(200))
            .await
            .unwrap();
        assert!(!exit.success());
    }
}
