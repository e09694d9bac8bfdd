//! Error types shared across cutroom crates.

use std::path::PathBuf;

/// Top-level error type for cutroom operations.
#[derive(Debug, thiserror::Error)]
pub enum CutroomError {
    #[error("Failed to launch {program}: {source}")]
    Launch {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Render failed: {message}")]
    Subprocess { message: String },

    #[error("Subtitle conversion failed: {message}")]
    Subtitle { message: String },

    #[error("Render aborted")]
    Aborted,

    #[error("Progress reporter error: {message}")]
    Reporter { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("File not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias using CutroomError.
pub type CutroomResult<T> = Result<T, CutroomError>;

impl CutroomError {
    pub fn launch(program: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Launch {
            program: program.into(),
            source,
        }
    }

    pub fn subprocess(msg: impl Into<String>) -> Self {
        Self::Subprocess {
            message: msg.into(),
        }
    }

    pub fn subtitle(msg: impl Into<String>) -> Self {
        Self::Subtitle {
            message: msg.into(),
        }
    }

    pub fn reporter(msg: impl Into<String>) -> Self {
        Self::Reporter {
            message: msg.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Human-readable message without the variant prefix.
    pub fn detail(&self) -> String {
        match self {
            Self::Subprocess { message }
            | Self::Subtitle { message }
            | Self::Reporter { message }
            | Self::Config { message } => message.clone(),
            other => other.to_string(),
        }
    }
}
