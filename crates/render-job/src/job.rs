//! Render job lifecycle: subtitle pass, render pass, and terminal outcome.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use cutroom_common::clock::{format_eta, RateController, RenderClock, Throughput};
use cutroom_common::config::RenderDefaults;
use cutroom_common::error::{CutroomError, CutroomResult};

use crate::abort::AbortHandle;
use crate::launcher::{terminate_gracefully, ProcessExit, ProcessLauncher, TokioLauncher};
use crate::log_sink::{FileLogSink, LogSink};
use crate::progress::{parse_progress_line, ProgressTracker};
use crate::reporter::{ProgressReporter, TracingReporter};
use crate::request::RenderRequest;

/// Lifecycle state of a render job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderState {
    /// Created, nothing launched yet.
    Idle,
    /// Subtitle conversion subprocess running.
    SubtitleRunning,
    /// Renderer subprocess running.
    Rendering,
    /// Renderer exited; checking its output.
    Finishing,
    /// Terminal state.
    Finished(RenderStatus),
}

impl RenderState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finished(_))
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::SubtitleRunning => "subtitle_running",
            Self::Rendering => "rendering",
            Self::Finishing => "finishing",
            Self::Finished(status) => status.as_str(),
        }
    }
}

/// Why a render failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// A subprocess could not be started.
    Launch,
    /// The renderer exited non-zero, crashed, or left no output.
    Subprocess,
    /// The subtitle pass failed; the renderer never ran.
    Subtitle,
}

/// Terminal status of a render job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderStatus {
    Success,
    Failed(FailureKind),
    Aborted,
}

impl RenderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failed(_) => "failed",
            Self::Aborted => "aborted",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

/// The single completion notification of a render job.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderOutcome {
    pub status: RenderStatus,
    /// Human-readable message; never empty.
    pub message: String,
    pub destination: PathBuf,
    /// Frames rendered, relative to the in point.
    pub frames_rendered: u64,
    pub elapsed: Duration,
}

impl RenderOutcome {
    /// One-line summary for progress services.
    pub fn summary(&self) -> String {
        match self.status {
            RenderStatus::Success => format!("Rendering finished: {}", self.message),
            RenderStatus::Failed(_) => format!("Rendering failed: {}", self.message),
            RenderStatus::Aborted => format!("Rendering aborted: {}", self.message),
        }
    }
}

/// Tunables for supervision.
#[derive(Debug, Clone)]
pub struct RenderSettings {
    /// Time a subprocess gets to exit after a terminate request.
    pub grace_period: Duration,
    /// Minimum interval between description updates.
    pub description_interval: Duration,
    /// Unparsed stderr lines kept for error messages.
    pub error_tail_lines: usize,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self::from(&RenderDefaults::default())
    }
}

impl From<&RenderDefaults> for RenderSettings {
    fn from(defaults: &RenderDefaults) -> Self {
        Self {
            grace_period: defaults.grace_period(),
            description_interval: defaults.description_interval(),
            error_tail_lines: defaults.error_tail_lines.max(1),
        }
    }
}

/// A render job supervisor.
///
/// Collaborators are injected; by default the job launches real processes,
/// reports through tracing and logs to `<destination>.log`.
pub struct RenderJob {
    request: RenderRequest,
    settings: RenderSettings,
    launcher: Arc<dyn ProcessLauncher>,
    reporter: Box<dyn ProgressReporter>,
    log: Option<Box<dyn LogSink>>,
    abort: AbortHandle,
    state_tx: watch::Sender<RenderState>,
}

/// Handle to a job running on the tokio runtime.
pub struct RunningRender {
    abort: AbortHandle,
    state: watch::Receiver<RenderState>,
    task: JoinHandle<RenderOutcome>,
}

impl RunningRender {
    pub fn abort_handle(&self) -> AbortHandle {
        self.abort.clone()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> RenderState {
        *self.state.borrow()
    }

    /// Receiver for lifecycle transitions.
    pub fn subscribe(&self) -> watch::Receiver<RenderState> {
        self.state.clone()
    }

    /// Wait for the completion notification.
    pub async fn wait(self) -> RenderOutcome {
        let destination = self.abort.destination().to_path_buf();
        match self.task.await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(error = %e, "Render supervision task did not complete");
                RenderOutcome {
                    status: RenderStatus::Failed(FailureKind::Subprocess),
                    message: format!("render supervision task failed: {e}"),
                    destination,
                    frames_rendered: 0,
                    elapsed: Duration::ZERO,
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pass {
    Subtitle,
    Render,
}

impl RenderJob {
    pub fn new(request: RenderRequest) -> Self {
        let abort = AbortHandle::new(request.destination.clone());
        let (state_tx, _) = watch::channel(RenderState::Idle);
        let job_name = display_name(&request.destination);
        Self {
            request,
            settings: RenderSettings::default(),
            launcher: Arc::new(TokioLauncher),
            reporter: Box::new(TracingReporter::new(job_name)),
            log: None,
            abort,
            state_tx,
        }
    }

    pub fn with_settings(mut self, settings: RenderSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_launcher(mut self, launcher: Arc<dyn ProcessLauncher>) -> Self {
        self.launcher = launcher;
        self
    }

    pub fn with_reporter(mut self, reporter: Box<dyn ProgressReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn with_log_sink(mut self, log: Box<dyn LogSink>) -> Self {
        self.log = Some(log);
        self
    }

    pub fn request(&self) -> &RenderRequest {
        &self.request
    }

    pub fn abort_handle(&self) -> AbortHandle {
        self.abort.clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<RenderState> {
        self.state_tx.subscribe()
    }

    /// Spawn the supervision task and return immediately.
    pub fn start(self) -> RunningRender {
        let abort = self.abort.clone();
        let state = self.state_tx.subscribe();
        let task = tokio::spawn(self.run());
        RunningRender { abort, state, task }
    }

    /// Drive the job to its terminal state.
    pub async fn run(self) -> RenderOutcome {
        let RenderJob {
            request,
            settings,
            launcher,
            reporter,
            log,
            abort,
            state_tx,
        } = self;

        let (log, owned_log_path) = match log {
            Some(log) => (Some(log), None),
            None => {
                let path = request.effective_log_path();
                match FileLogSink::open(&path) {
                    Ok(sink) => (Some(Box::new(sink) as Box<dyn LogSink>), Some(path)),
                    Err(e) => {
                        tracing::warn!(error = %e, path = %path.display(), "Cannot open render log; continuing without it");
                        (None, None)
                    }
                }
            }
        };

        let tracker = ProgressTracker::new(
            request.in_frame,
            request.out_frame,
            request.known_total_frames(),
        );

        let mut supervisor = Supervisor {
            description_rate: RateController::new(settings.description_interval),
            error_tail: VecDeque::with_capacity(settings.error_tail_lines),
            clock: RenderClock::start(),
            request,
            settings,
            launcher,
            reporter,
            log,
            owned_log_path,
            abort,
            state_tx,
            tracker,
            render_started: false,
        };

        let result = supervisor.drive().await;
        supervisor.finish(result).await
    }
}

struct Supervisor {
    request: RenderRequest,
    settings: RenderSettings,
    launcher: Arc<dyn ProcessLauncher>,
    reporter: Box<dyn ProgressReporter>,
    log: Option<Box<dyn LogSink>>,
    owned_log_path: Option<PathBuf>,
    abort: AbortHandle,
    state_tx: watch::Sender<RenderState>,
    tracker: ProgressTracker,
    error_tail: VecDeque<String>,
    description_rate: RateController,
    clock: RenderClock,
    /// Set once the renderer has been spawned; only then can the destination be partial output.
    render_started: bool,
}

impl Supervisor {
    fn transition(&mut self, next: RenderState) {
        let previous = *self.state_tx.borrow();
        tracing::info!(
            destination = %self.request.destination.display(),
            from = previous.as_str(),
            to = next.as_str(),
            "Render state transition"
        );
        self.state_tx.send_replace(next);
    }

    async fn drive(&mut self) -> CutroomResult<()> {
        self.write_log_header();

        if self.request.has_subtitle_pass() {
            self.transition(RenderState::SubtitleRunning);
            self.reporter.set_description(&format!(
                "Preparing subtitles for {}",
                display_name(&self.request.destination)
            ));

            let tool = self.request.subtitle_tool.clone();
            let args = self.request.subtitle_args();
            let exit = self.run_pass(Pass::Subtitle, &tool, &args).await?;
            if !exit.success() {
                return Err(CutroomError::subtitle(
                    self.tail_message(format!("subtitle conversion ended with {exit}")),
                ));
            }
            // Lines from the subtitle pass must not explain a render failure
            self.error_tail.clear();
        }

        self.transition(RenderState::Rendering);
        self.reporter.set_description(&format!(
            "Rendering {}",
            display_name(&self.request.destination)
        ));

        let renderer = self.request.renderer.clone();
        let args = self.request.render_args();
        let exit = self.run_pass(Pass::Render, &renderer, &args).await?;

        self.transition(RenderState::Finishing);
        if self.abort.is_aborted() {
            return Err(CutroomError::Aborted);
        }
        if !exit.success() {
            return Err(CutroomError::subprocess(
                self.tail_message(format!("renderer ended with {exit}")),
            ));
        }

        let output_ok = tokio::fs::metadata(&self.request.destination)
            .await
            .map(|m| m.is_file() && m.len() > 0)
            .unwrap_or(false);
        if !output_ok {
            return Err(CutroomError::subprocess(self.tail_message(format!(
                "output file {} is missing or empty",
                self.request.destination.display()
            ))));
        }
        if self.abort.is_aborted() {
            return Err(CutroomError::Aborted);
        }

        Ok(())
    }

    /// Run one subprocess until it exits or the job is aborted.
    async fn run_pass(
        &mut self,
        pass: Pass,
        program: &Path,
        args: &[String],
    ) -> CutroomResult<ProcessExit> {
        let mut abort_rx = self.abort.subscribe();
        if *abort_rx.borrow() {
            return Err(CutroomError::Aborted);
        }

        let spawned = self
            .launcher
            .spawn(program, args)
            .map_err(|e| CutroomError::launch(program, e))?;
        if pass == Pass::Render {
            self.render_started = true;
        }
        let mut handle = spawned.handle;
        let mut lines = BufReader::new(spawned.stderr).lines();

        tracing::info!(
            pass = ?pass,
            program = %program.display(),
            pid = handle.id(),
            "Subprocess started"
        );

        let mut stderr_open = true;
        let mut abort_open = true;
        loop {
            tokio::select! {
                biased;

                requested = async { abort_rx.wait_for(|aborted| *aborted).await.is_ok() }, if abort_open => {
                    if !requested {
                        abort_open = false;
                        continue;
                    }
                    tracing::info!(pass = ?pass, pid = handle.id(), "Terminating subprocess");
                    match terminate_gracefully(handle.as_mut(), self.settings.grace_period).await {
                        Ok(exit) => tracing::info!(pass = ?pass, %exit, "Subprocess stopped after abort"),
                        Err(e) => tracing::warn!(pass = ?pass, error = %e, "Failed to stop subprocess"),
                    }
                    return Err(CutroomError::Aborted);
                }

                line = lines.next_line(), if stderr_open => match line {
                    Ok(Some(line)) => self.handle_line(pass, &line),
                    Ok(None) => stderr_open = false,
                    Err(e) => {
                        tracing::warn!(pass = ?pass, error = %e, "Failed reading subprocess stderr");
                        stderr_open = false;
                    }
                },

                exit = handle.wait(), if !stderr_open => {
                    let exit = exit?;
                    tracing::info!(pass = ?pass, %exit, "Subprocess exited");
                    return Ok(exit);
                }
            }
        }
    }

    fn handle_line(&mut self, pass: Pass, line: &str) {
        if pass == Pass::Render {
            if let Some(token) = parse_progress_line(line) {
                if let Some(percent) = self.tracker.apply(token) {
                    self.reporter.set_percent(percent);
                    self.maybe_update_description(percent);
                }
                return;
            }
        }

        self.append_log(line);
        if self.error_tail.len() == self.settings.error_tail_lines {
            self.error_tail.pop_front();
        }
        self.error_tail.push_back(line.to_string());
    }

    fn maybe_update_description(&mut self, percent: u8) {
        if !self.description_rate.should_tick(Instant::now()) {
            return;
        }
        let throughput = Throughput {
            frames_done: self.tracker.frames_done(),
            elapsed_secs: self.clock.elapsed_secs(),
        };
        let mut text = format!(
            "Rendering {}: {percent}%",
            display_name(&self.request.destination)
        );
        if let Some(eta) = self
            .tracker
            .total_frames()
            .and_then(|total| throughput.eta_secs(total))
        {
            text.push_str(&format!(
                " ({:.1} fps, {} left)",
                throughput.fps(),
                format_eta(eta)
            ));
        }
        self.reporter.set_description(&text);
    }

    fn append_log(&mut self, line: &str) {
        if let Some(log) = self.log.as_mut() {
            if let Err(e) = log.append(line) {
                tracing::warn!(error = %e, "Failed to append to render log");
            }
        }
    }

    fn write_log_header(&mut self) {
        let header = [
            format!("# render started {}", self.clock.epoch_wall()),
            format!("# command: {}", self.request.render_command_line()),
            format!("# destination: {}", self.request.destination.display()),
        ];
        for line in header {
            self.append_log(&line);
        }
    }

    /// Last captured stderr, or `fallback` when nothing was captured.
    fn tail_message(&self, fallback: String) -> String {
        let tail = self
            .error_tail
            .iter()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join("\n");
        let tail = tail.trim();
        if tail.is_empty() {
            fallback
        } else {
            tail.to_string()
        }
    }

    async fn finish(mut self, result: CutroomResult<()>) -> RenderOutcome {
        let elapsed = self.clock.elapsed();
        let destination = self.request.destination.clone();

        let (status, message) = match result {
            Ok(()) => (
                RenderStatus::Success,
                format!("{} rendered in {}", destination.display(), format_eta(elapsed.as_secs_f64())),
            ),
            Err(CutroomError::Aborted) => (
                RenderStatus::Aborted,
                "render aborted by user".to_string(),
            ),
            Err(err @ CutroomError::Launch { .. }) => {
                (RenderStatus::Failed(FailureKind::Launch), err.to_string())
            }
            Err(err @ CutroomError::Subtitle { .. }) => {
                (RenderStatus::Failed(FailureKind::Subtitle), err.detail())
            }
            Err(err) => (RenderStatus::Failed(FailureKind::Subprocess), err.detail()),
        };
        let message = if message.trim().is_empty() {
            "render failed without diagnostic output".to_string()
        } else {
            message
        };

        cleanup_files(&self.request, status, self.render_started).await;

        match status {
            RenderStatus::Success => self.append_log(&format!("# render finished: {message}")),
            RenderStatus::Failed(_) => self.append_log(&format!("# render failed: {message}")),
            RenderStatus::Aborted => self.append_log("# render aborted"),
        }
        if let Some(mut log) = self.log.take() {
            if let Err(e) = log.close() {
                tracing::warn!(error = %e, "Failed to close render log");
            }
        }
        if status.is_success() && self.request.remove_log_on_success {
            if let Some(path) = &self.owned_log_path {
                remove_if_exists(path, "render log").await;
            }
        }

        let outcome = RenderOutcome {
            status,
            message,
            destination,
            frames_rendered: self.tracker.frames_done(),
            elapsed,
        };

        match status {
            RenderStatus::Success => tracing::info!(
                destination = %outcome.destination.display(),
                elapsed_secs = elapsed.as_secs_f64(),
                frames = outcome.frames_rendered,
                "Render finished"
            ),
            RenderStatus::Failed(kind) => tracing::warn!(
                destination = %outcome.destination.display(),
                ?kind,
                message = %outcome.message,
                "Render failed"
            ),
            RenderStatus::Aborted => tracing::info!(
                destination = %outcome.destination.display(),
                "Render aborted"
            ),
        }

        self.reporter.finished(&outcome);
        self.transition(RenderState::Finished(status));
        outcome
    }
}

async fn cleanup_files(request: &RenderRequest, status: RenderStatus, render_started: bool) {
    if request.has_subtitle_pass() {
        remove_if_exists(&request.subtitle_intermediate(), "subtitle intermediate").await;
    }
    match status {
        RenderStatus::Success if request.erase_scene_list => {
            remove_if_exists(&request.scene_list, "scene list").await;
        }
        RenderStatus::Aborted if request.erase_on_abort && render_started => {
            remove_if_exists(&request.destination, "partial output").await;
        }
        _ => {}
    }
}

async fn remove_if_exists(path: &Path, what: &str) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => tracing::debug!(path = %path.display(), "Removed {what}"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(path = %path.display(), error = %e, "Failed to remove {what}"),
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}
