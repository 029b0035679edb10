//! # SkinLens Diagnostics
//!
//! Troubleshooting aids for the SkinLens capture pipeline.
//! Provides the bounded diagnostic log surfaced on debug screens and
//! the `tracing` subscriber setup shared by the other crates.

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod debug_logger;

// Re-export main types
pub use debug_logger::{init_logging, DiagnosticLog, DiagnosticLogEntry, DEFAULT_LOG_CAPACITY};
