//! Command-line build path.
//!
//! Resolves a configuration (preset, file, or defaults), prints a summary,
//! and runs the pipeline synchronously while echoing log entries to the
//! terminal. The printer is just another subscriber of the orchestrator's
//! log stream; the pipeline does not know it exists.

use crate::config::ConfigManager;
use crate::models::{BuildConfig, Severity};
use crate::orchestrator::Orchestrator;
use anyhow::{Result, bail};
use camino::Utf8Path;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Where the CLI build gets its configuration from.
pub enum ConfigSource<'a> {
    Preset(&'a str),
    File(&'a Utf8Path),
    Default,
}

/// Resolve the configuration, run the build to completion, and report
/// whether it succeeded.
pub async fn run_build(
    orchestrator: Arc<Orchestrator>,
    config_manager: &ConfigManager,
    source: ConfigSource<'_>,
) -> Result<bool> {
    let config = match source {
        ConfigSource::Preset(name) => {
            println!("Using preset: {}", name);
            match config_manager.load_preset_config(name)? {
                Some(config) => config,
                None => bail!("preset '{}' not found in the catalog", name),
            }
        }
        ConfigSource::File(path) => {
            println!("Using config file: {}", path);
            config_manager.load_config(Some(path))?
        }
        ConfigSource::Default => {
            println!("Using saved or default configuration");
            config_manager.load_config(None)?
        }
    };

    print_summary(&config);

    // Echo every log entry as it is produced; the subscription ends with
    // the printer task when the build is done.
    let mut receiver = orchestrator.subscribe();
    let printer = tokio::spawn(async move {
        loop {
            match receiver.recv().await {
                Ok(entry) => match entry.severity {
                    Severity::Error => eprintln!("[{}] {}", entry.timestamp, entry.message),
                    _ => println!("[{}] {}", entry.timestamp, entry.message),
                },
                // A lagged terminal skips entries instead of stopping.
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    let success = orchestrator.run_blocking(config).await?;
    printer.abort();

    if success {
        println!("\nBuild finished successfully.");
    } else {
        let status = orchestrator.status();
        eprintln!(
            "\nBuild failed: {}",
            status.error.as_deref().unwrap_or("unknown error")
        );
    }

    Ok(success)
}

/// Print the configuration summary shown before a CLI build.
pub fn print_summary(config: &BuildConfig) {
    let arch_names: Vec<&str> = config.architectures.iter().map(|a| a.name()).collect();

    println!("\nBuild configuration:");
    println!("==============================");
    println!("Android API: {}", config.api);
    println!("Output type: {}", config.output);
    println!("Architectures: {}", arch_names.join(", "));
    println!("Decoders: {}", config.decoders.join(", "));
    println!("Encoders: {}", config.encoders.join(", "));
    println!("Muxers: {}", config.muxers.join(", "));
    println!("Demuxers: {}", config.demuxers.join(", "));
    println!("Protocols: {}", config.protocols.join(", "));
    println!("Filters: {}", config.filters.join(", "));
    println!("==============================");
}
