//! cutroom-render — standalone render runner.
//!
//! Usage:
//!   cutroom-render render [OPTIONS] <RENDERER> <SCENE_LIST> <DESTINATION> [-- ARGS...]
//!   cutroom-render check [RENDERER]

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use cutroom_common::config::AppConfig;

mod commands;

#[derive(Parser)]
#[command(
    name = "cutroom-render",
    about = "Supervise one engine render out of process",
    version,
    author
)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    /// Configuration file (defaults to $XDG_CONFIG_HOME/cutroom/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render a scene list to a media file
    Render {
        /// Engine command-line renderer
        renderer: PathBuf,

        /// Scene list handed to the renderer
        scene_list: PathBuf,

        /// Output media file
        destination: PathBuf,

        /// Process id of the host application
        #[arg(long)]
        pid: Option<u32>,

        /// First frame to render
        #[arg(long = "in")]
        in_frame: Option<u64>,

        /// Last frame to render (inclusive)
        #[arg(long = "out")]
        out_frame: Option<u64>,

        /// Total frame count, when the range is not given
        #[arg(long)]
        total_frames: Option<u64>,

        /// Subtitle file to convert and burn in
        #[arg(long)]
        subtitle: Option<PathBuf>,

        /// Subtitle conversion executable
        #[arg(long)]
        subtitle_tool: Option<PathBuf>,

        /// Render log file (defaults to <DESTINATION>.log)
        #[arg(long)]
        log: Option<PathBuf>,

        /// Host progress socket (defaults to one derived from --pid)
        #[arg(long)]
        socket: Option<PathBuf>,

        /// Remove the scene list after a successful render
        #[arg(long)]
        erase: bool,

        /// Remove the partial output after an abort
        #[arg(long)]
        erase_on_abort: bool,

        /// Remove the render log after a successful render
        #[arg(long)]
        remove_log: bool,

        /// Extra renderer arguments
        #[arg(last = true)]
        extra: Vec<String>,
    },

    /// Check that the renderer and subtitle tool can be found
    Check {
        /// Renderer to look for (defaults to the configured one)
        renderer: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => AppConfig::load_from(path),
        None => AppConfig::load(),
    };

    // Initialize logging
    let mut logging = config.logging.clone();
    if cli.verbose {
        logging.level = "debug".to_string();
    }
    logging.json |= cli.json_logs;
    cutroom_common::logging::init_logging(&logging);

    match cli.command {
        Commands::Render {
            renderer,
            scene_list,
            destination,
            pid,
            in_frame,
            out_frame,
            total_frames,
            subtitle,
            subtitle_tool,
            log,
            socket,
            erase,
            erase_on_abort,
            remove_log,
            extra,
        } => {
            let args = commands::render::RenderArgs {
                renderer,
                scene_list,
                destination,
                pid,
                in_frame,
                out_frame,
                total_frames,
                subtitle,
                subtitle_tool,
                log,
                socket,
                erase,
                erase_on_abort,
                remove_log,
                extra,
            };
            commands::render::run(args, &config).await
        }
        Commands::Check { renderer } => commands::check::run(renderer, &config),
    }
}
