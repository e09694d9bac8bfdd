//! cutroom common utilities
//!
//! Shared infrastructure for all cutroom crates:
//! - Error types and result aliases
//! - Render clock, throughput estimation and update throttling
//! - Tracing/logging initialization
//! - Configuration loading

pub mod clock;
pub mod config;
pub mod error;
pub mod logging;

pub use clock::*;
pub use config::*;
pub use error::*;
