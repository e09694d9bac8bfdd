//! Run one render job and map its outcome to an exit code.

use std::path::PathBuf;
use std::process::ExitCode;

use cutroom_common::config::{progress_socket_path, AppConfig};
use cutroom_render_job::{
    AbortHandle, ProgressReporter, RenderJob, RenderRequest, RenderSettings, RenderStatus,
    SocketReporter, TracingReporter,
};

pub struct RenderArgs {
    pub renderer: PathBuf,
    pub scene_list: PathBuf,
    pub destination: PathBuf,
    pub pid: Option<u32>,
    pub in_frame: Option<u64>,
    pub out_frame: Option<u64>,
    pub total_frames: Option<u64>,
    pub subtitle: Option<PathBuf>,
    pub subtitle_tool: Option<PathBuf>,
    pub log: Option<PathBuf>,
    pub socket: Option<PathBuf>,
    pub erase: bool,
    pub erase_on_abort: bool,
    pub remove_log: bool,
    pub extra: Vec<String>,
}

pub async fn run(args: RenderArgs, config: &AppConfig) -> anyhow::Result<ExitCode> {
    if !args.scene_list.exists() {
        anyhow::bail!("Scene list not found: {}", args.scene_list.display());
    }

    let request = build_request(&args, config);
    let reporter = connect_reporter(&args, config);

    println!("Rendering: {}", request.destination.display());
    println!("  Renderer: {}", request.renderer.display());
    println!("  Scene list: {}", request.scene_list.display());
    if let Some(subtitle) = &request.subtitle_file {
        println!("  Subtitles: {}", subtitle.display());
    }

    let running = RenderJob::new(request)
        .with_settings(RenderSettings::from(&config.render))
        .with_reporter(reporter)
        .start();

    let signal_task = tokio::spawn(abort_on_signal(running.abort_handle()));
    let outcome = running.wait().await;
    signal_task.abort();

    let code = match outcome.status {
        RenderStatus::Success => {
            println!("Render complete: {}", outcome.message);
            ExitCode::SUCCESS
        }
        RenderStatus::Failed(kind) => {
            eprintln!("Render failed ({kind:?}): {}", outcome.message);
            ExitCode::from(1)
        }
        RenderStatus::Aborted => {
            eprintln!("Render aborted");
            ExitCode::from(130)
        }
    };
    Ok(code)
}

fn build_request(args: &RenderArgs, config: &AppConfig) -> RenderRequest {
    let mut request = RenderRequest::new(&args.renderer, &args.scene_list, &args.destination)
        .subtitle_tool(
            args.subtitle_tool
                .as_ref()
                .unwrap_or(&config.render.subtitle_tool),
        )
        .extra_args(args.extra.iter().cloned())
        .erase_scene_list(args.erase)
        .erase_on_abort(args.erase_on_abort)
        .remove_log_on_success(args.remove_log);

    request.caller_pid = args.pid;
    request.in_frame = args.in_frame;
    request.out_frame = args.out_frame;
    request.total_frames = args.total_frames;
    request.subtitle_file = args.subtitle.clone();
    request.log_path = args.log.clone();
    request
}

/// Use the host's progress socket when one answers, tracing otherwise.
fn connect_reporter(args: &RenderArgs, config: &AppConfig) -> Box<dyn ProgressReporter> {
    let socket = args
        .socket
        .clone()
        .or_else(|| args.pid.map(progress_socket_path));

    if let Some(socket) = socket {
        match SocketReporter::connect(
            &socket,
            &args.destination,
            config.render.handshake_timeout(),
        ) {
            Ok(reporter) => {
                tracing::info!(socket = %socket.display(), "Reporting progress to host");
                return Box::new(reporter);
            }
            Err(e) => {
                tracing::warn!(
                    socket = %socket.display(),
                    error = %e,
                    "Host progress socket unavailable; reporting through logs"
                );
            }
        }
    }

    let job = args
        .destination
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    Box::new(TracingReporter::new(job))
}

async fn abort_on_signal(abort: AbortHandle) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut term = match signal(SignalKind::terminate()) {
            Ok(term) => term,
            Err(e) => {
                tracing::warn!(error = %e, "Cannot listen for SIGTERM");
                if tokio::signal::ctrl_c().await.is_ok() {
                    abort.abort();
                }
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = term.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
    }

    tracing::info!("Signal received; aborting render");
    abort.abort();
}
