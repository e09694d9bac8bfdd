//! cutroom render job supervisor
//!
//! Drives one render request end-to-end: an optional subtitle conversion
//! pass, then the engine's command-line renderer. Stderr is turned into a
//! normalized progress percentage for a [`ProgressReporter`], and exactly
//! one [`RenderOutcome`] is produced however the subprocesses end.
//!
//! ```text
//!   Idle ──(subtitle file)──▶ SubtitleRunning ──exit 0──▶ Rendering
//!     │                            │                         │ stderr lines
//!     └──────────(none)────────────┼────────────────────────▶│ (self-loop)
//!                                  │ failure                 ▼
//!                                  ▼                     Finishing
//!                          Finished{Failed}      exit 0 + output ──▶ Finished{Success}
//!                                                otherwise ───────▶ Finished{Failed}
//!
//!   abort (any non-terminal state) ─────────────────────────▶ Finished{Aborted}
//! ```

pub mod abort;
pub mod job;
pub mod launcher;
pub mod log_sink;
pub mod progress;
pub mod reporter;
pub mod request;
pub mod socket;

pub use abort::AbortHandle;
pub use job::*;
pub use launcher::{ProcessExit, ProcessHandle, ProcessLauncher, SpawnedProcess, TokioLauncher};
pub use log_sink::{FileLogSink, LogSink};
pub use progress::{parse_progress_line, ProgressToken, ProgressTracker};
pub use reporter::{ChannelReporter, ProgressEvent, ProgressReporter, TracingReporter};
pub use request::RenderRequest;
pub use socket::SocketReporter;
