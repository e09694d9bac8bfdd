//! Local-socket progress reporter used by the standalone runner.
//!
//! Wire format is JSON lines. The runner sends `hello`, then waits (bounded
//! by a timeout) for the host's `ready` before sending any update:
//!
//! ```text
//! runner -> host  {"event":"hello","pid":1234,"destination":"/tmp/out.mp4"}
//! host -> runner  {"event":"ready"}
//! runner -> host  {"event":"percent","value":42}
//! runner -> host  {"event":"finished","status":"success","message":"..."}
//! runner -> host  {"event":"close"}
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use cutroom_common::error::{CutroomError, CutroomResult};

use crate::job::RenderOutcome;
use crate::reporter::{ProgressEvent, ProgressReporter};

/// Longest a single progress update may block once the handshake is done.
/// A host that stops reading costs at most this much before updates are dropped.
pub const UPDATE_WRITE_TIMEOUT: Duration = Duration::from_millis(100);

/// Handshake messages exchanged before progress updates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Handshake {
    Hello { pid: u32, destination: String },
    Ready,
}

/// Progress reporter writing JSON lines to a host's Unix socket.
#[derive(Debug)]
pub struct SocketReporter {
    #[cfg(unix)]
    stream: Option<std::os::unix::net::UnixStream>,
}

#[cfg(unix)]
impl SocketReporter {
    /// Connect to `path` and complete the handshake within `timeout`.
    pub fn connect(path: &Path, destination: &Path, timeout: Duration) -> CutroomResult<Self> {
        use std::io::{BufRead, BufReader, Write};
        use std::os::unix::net::UnixStream;

        let mut stream = UnixStream::connect(path).map_err(|e| {
            CutroomError::reporter(format!("connect to {} failed: {e}", path.display()))
        })?;
        stream.set_read_timeout(Some(timeout))?;
        stream.set_write_timeout(Some(timeout))?;

        let hello = Handshake::Hello {
            pid: std::process::id(),
            destination: destination.to_string_lossy().to_string(),
        };
        let mut line = serde_json::to_string(&hello)?;
        line.push('\n');
        stream.write_all(line.as_bytes())?;

        let mut reply = String::new();
        BufReader::new(&stream).read_line(&mut reply).map_err(|e| {
            CutroomError::reporter(format!("host did not answer handshake: {e}"))
        })?;
        match serde_json::from_str::<Handshake>(reply.trim()) {
            Ok(Handshake::Ready) => {}
            Ok(other) => {
                return Err(CutroomError::reporter(format!(
                    "unexpected handshake reply: {other:?}"
                )))
            }
            Err(e) => {
                return Err(CutroomError::reporter(format!(
                    "malformed handshake reply {:?}: {e}",
                    reply.trim()
                )))
            }
        }

        stream.set_read_timeout(None)?;
        stream.set_write_timeout(Some(timeout.min(UPDATE_WRITE_TIMEOUT)))?;
        tracing::debug!(socket = %path.display(), "Progress socket handshake complete");
        Ok(Self {
            stream: Some(stream),
        })
    }

    fn send(&mut self, event: &ProgressEvent) {
        use std::io::Write;

        let Some(stream) = self.stream.as_mut() else {
            return;
        };
        let result = serde_json::to_string(event)
            .map_err(std::io::Error::other)
            .and_then(|mut line| {
                line.push('\n');
                stream.write_all(line.as_bytes())
            });
        if let Err(e) = result {
            tracing::warn!(error = %e, "Progress socket write failed; disabling socket updates");
            self.stream = None;
        }
    }

    fn shutdown(&mut self) {
        if let Some(stream) = self.stream.take() {
            stream.shutdown(std::net::Shutdown::Both).ok();
        }
    }
}

#[cfg(not(unix))]
impl SocketReporter {
    pub fn connect(path: &Path, _destination: &Path, _timeout: Duration) -> CutroomResult<Self> {
        Err(CutroomError::reporter(format!(
            "local progress sockets are not supported on this platform ({})",
            path.display()
        )))
    }

    fn send(&mut self, _event: &ProgressEvent) {}

    fn shutdown(&mut self) {}
}

impl ProgressReporter for SocketReporter {
    fn set_description(&mut self, text: &str) {
        self.send(&ProgressEvent::Description {
            text: text.to_string(),
        });
    }

    fn set_percent(&mut self, percent: u8) {
        self.send(&ProgressEvent::Percent { value: percent });
    }

    fn close(&mut self) {
        self.send(&ProgressEvent::Close);
        self.shutdown();
    }

    fn finished(&mut self, outcome: &RenderOutcome) {
        self.send(&ProgressEvent::Finished {
            status: outcome.status.as_str().to_string(),
            message: outcome.message.clone(),
        });
        self.close();
    }
}
