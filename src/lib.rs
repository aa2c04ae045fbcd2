// ffdroid - FFmpeg multi-architecture cross-compilation orchestrator for Android
//
// This is the library crate containing the orchestration core and its
// external interfaces. The binary crate (main.rs) provides the CLI entry
// point.

pub mod classify;
pub mod cleaner;
pub mod cli;
pub mod config;
pub mod env;
pub mod logging;
pub mod models;
pub mod orchestrator;
pub mod process;
pub mod script;
pub mod web;

// Re-export commonly used types for convenience
pub use config::ConfigManager;
pub use models::{Abi, BuildConfig, LogEntry, OptimizationFlags, OutputKind, PipelineState, Severity};
pub use orchestrator::Orchestrator;

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
