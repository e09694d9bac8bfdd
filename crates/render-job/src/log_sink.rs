//! Append-only render log.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Destination for renderer output that is not progress.
pub trait LogSink: Send {
    /// Append one line.
    fn append(&mut self, line: &str) -> std::io::Result<()>;

    /// Flush and release the sink. Later appends fail.
    fn close(&mut self) -> std::io::Result<()>;
}

impl<S: LogSink + ?Sized> LogSink for Box<S> {
    fn append(&mut self, line: &str) -> std::io::Result<()> {
        (**self).append(line)
    }

    fn close(&mut self) -> std::io::Result<()> {
        (**self).close()
    }
}

/// Log sink backed by a file opened in append mode.
#[derive(Debug)]
pub struct FileLogSink {
    path: PathBuf,
    writer: Option<BufWriter<File>>,
}

impl FileLogSink {
    /// Open (or create) the log file at `path`, creating parent directories.
    pub fn open(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)?;
        Ok(Self {
            path,
            writer: Some(BufWriter::new(file)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_closed(&self) -> bool {
        self.writer.is_none()
    }
}

impl LogSink for FileLogSink {
    fn append(&mut self, line: &str) -> std::io::Result<()> {
        let writer = self.writer.as_mut().ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::BrokenPipe, "render log is closed")
        })?;
        writer.write_all(line.as_bytes())?;
        writer.write_all(b"\n")
    }

    fn close(&mut self) -> std::io::Result<()> {
        match self.writer.take() {
            Some(mut writer) => writer.flush(),
            None => Ok(()),
        }
    }
}

impl Drop for FileLogSink {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::warn!(error = %e, path = %self.path.display(), "Failed to flush render log");
        }
    }
}
