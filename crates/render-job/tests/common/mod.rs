//! Scripted collaborators for render job tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, DuplexStream};
use tokio::sync::watch;

use cutroom_render_job::{
    AbortHandle, LogSink, ProcessExit, ProcessHandle, ProcessLauncher, SpawnedProcess,
};

/// What one scripted subprocess does.
#[derive(Debug, Clone, Default)]
pub struct Script {
    pub stderr: Vec<String>,
    /// Exit status; `None` keeps the process running until terminated.
    pub exit: Option<ProcessExit>,
    /// File written at spawn time, with its size.
    pub output: Option<(PathBuf, usize)>,
    pub ignore_terminate: bool,
    pub spawn_error: bool,
    /// Aborted as the process is reaped, after its exit status is known.
    pub abort_on_exit: Option<AbortHandle>,
}

impl Script {
    pub fn exits(code: i32) -> Self {
        Self {
            exit: Some(ProcessExit::code(code)),
            ..Self::default()
        }
    }

    pub fn hangs() -> Self {
        Self::default()
    }

    pub fn cannot_spawn() -> Self {
        Self {
            spawn_error: true,
            ..Self::default()
        }
    }

    pub fn stderr(mut self, lines: &[&str]) -> Self {
        self.stderr = lines.iter().map(|l| l.to_string()).collect();
        self
    }

    pub fn writes(mut self, path: &Path, size: usize) -> Self {
        self.output = Some((path.to_path_buf(), size));
        self
    }

    pub fn ignoring_terminate(mut self) -> Self {
        self.ignore_terminate = true;
        self
    }

    pub fn aborting_on_exit(mut self, abort: AbortHandle) -> Self {
        self.abort_on_exit = Some(abort);
        self
    }
}

#[derive(Debug, Default)]
pub struct LauncherStats {
    pub spawned: Mutex<Vec<(PathBuf, Vec<String>)>>,
    pub terminate_calls: AtomicUsize,
    pub kill_calls: AtomicUsize,
}

/// Launcher that plays back scripts in order.
#[derive(Debug, Clone, Default)]
pub struct ScriptedLauncher {
    scripts: Arc<Mutex<VecDeque<Script>>>,
    pub stats: Arc<LauncherStats>,
}

impl ScriptedLauncher {
    pub fn new(scripts: Vec<Script>) -> Self {
        Self {
            scripts: Arc::new(Mutex::new(scripts.into())),
            stats: Arc::new(LauncherStats::default()),
        }
    }

    /// Queue another script after the ones given at construction.
    pub fn push(&self, script: Script) {
        self.scripts.lock().unwrap().push_back(script);
    }

    pub fn spawn_count(&self) -> usize {
        self.stats.spawned.lock().unwrap().len()
    }

    pub fn spawned(&self) -> Vec<(PathBuf, Vec<String>)> {
        self.stats.spawned.lock().unwrap().clone()
    }

    pub fn terminate_calls(&self) -> usize {
        self.stats.terminate_calls.load(Ordering::SeqCst)
    }

    pub fn kill_calls(&self) -> usize {
        self.stats.kill_calls.load(Ordering::SeqCst)
    }

    /// Yield until `n` processes have been spawned.
    pub async fn wait_for_spawns(&self, n: usize) {
        while self.spawn_count() < n {
            tokio::task::yield_now().await;
        }
    }
}

impl ProcessLauncher for ScriptedLauncher {
    fn spawn(&self, program: &Path, args: &[String]) -> std::io::Result<SpawnedProcess> {
        let script = self
            .scripts
            .lock()
            .unwrap()
            .pop_front()
            .expect("launcher called more often than scripted");

        if script.spawn_error {
            return Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "No such file or directory",
            ));
        }
        self.stats
            .spawned
            .lock()
            .unwrap()
            .push((program.to_path_buf(), args.to_vec()));

        if let Some((path, size)) = &script.output {
            std::fs::write(path, vec![0u8; *size]).unwrap();
        }

        let mut text = String::new();
        for line in &script.stderr {
            text.push_str(line);
            text.push('\n');
        }
        let head = Cursor::new(text.into_bytes());
        let (writer, tail) = tokio::io::duplex(64);
        let writer = if script.exit.is_some() {
            drop(writer);
            None
        } else {
            Some(writer)
        };

        let (exit_tx, _) = watch::channel(script.exit);
        Ok(SpawnedProcess {
            stderr: Box::new(head.chain(tail)),
            handle: Box::new(ScriptedProcess {
                exit_tx,
                stderr_writer: writer,
                ignore_terminate: script.ignore_terminate,
                abort_on_exit: script.abort_on_exit,
                stats: self.stats.clone(),
            }),
        })
    }
}

struct ScriptedProcess {
    exit_tx: watch::Sender<Option<ProcessExit>>,
    stderr_writer: Option<DuplexStream>,
    ignore_terminate: bool,
    abort_on_exit: Option<AbortHandle>,
    stats: Arc<LauncherStats>,
}

impl ScriptedProcess {
    fn end(&mut self) {
        self.stderr_writer = None;
        self.exit_tx.send_if_modified(|exit| {
            if exit.is_none() {
                *exit = Some(ProcessExit::crashed());
                true
            } else {
                false
            }
        });
    }
}

#[async_trait]
impl ProcessHandle for ScriptedProcess {
    fn id(&self) -> Option<u32> {
        Some(4242)
    }

    async fn wait(&mut self) -> std::io::Result<ProcessExit> {
        let mut rx = self.exit_tx.subscribe();
        let exit = rx
            .wait_for(|exit| exit.is_some())
            .await
            .map_err(std::io::Error::other)?;
        let exit = exit.unwrap_or_else(ProcessExit::crashed);
        if let Some(abort) = &self.abort_on_exit {
            abort.abort();
        }
        Ok(exit)
    }

    fn terminate(&mut self) -> std::io::Result<()> {
        self.stats.terminate_calls.fetch_add(1, Ordering::SeqCst);
        if !self.ignore_terminate {
            self.end();
        }
        Ok(())
    }

    async fn kill(&mut self) -> std::io::Result<()> {
        self.stats.kill_calls.fetch_add(1, Ordering::SeqCst);
        self.end();
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct LogRecord {
    pub lines: Vec<String>,
    pub closed: bool,
    pub writes_after_close: usize,
}

/// Log sink that records lines in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryLog {
    pub record: Arc<Mutex<LogRecord>>,
}

impl MemoryLog {
    pub fn lines(&self) -> Vec<String> {
        self.record.lock().unwrap().lines.clone()
    }

    /// Lines that did not come from the supervisor's own header/footer.
    pub fn output_lines(&self) -> Vec<String> {
        self.lines()
            .into_iter()
            .filter(|l| !l.starts_with("# "))
            .collect()
    }
}

impl LogSink for MemoryLog {
    fn append(&mut self, line: &str) -> std::io::Result<()> {
        let mut record = self.record.lock().unwrap();
        if record.closed {
            record.writes_after_close += 1;
            return Err(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "closed",
            ));
        }
        record.lines.push(line.to_string());
        Ok(())
    }

    fn close(&mut self) -> std::io::Result<()> {
        self.record.lock().unwrap().closed = true;
        Ok(())
    }
}
