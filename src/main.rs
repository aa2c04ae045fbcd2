//! ffdroid - FFmpeg multi-architecture cross-compilation orchestrator for
//! Android.
//!
//! Entry point for both surfaces:
//! - `ffdroid serve`: web configuration interface with live build logs
//! - `ffdroid build`: synchronous command-line build from a preset or a
//!   config file
//! - `ffdroid clean`: remove generated outputs and cached state
//!
//! The binary initializes logging (rotating file + console), constructs one
//! [`Orchestrator`] for the process lifetime, and dispatches to the chosen
//! surface. All build work runs on the tokio runtime; the CLI path simply
//! blocks on it.

use anyhow::Result;
use camino::Utf8PathBuf;
use clap::{Parser, Subcommand};
use ffdroid::cleaner::ProjectCleaner;
use ffdroid::cli::{ConfigSource, run_build};
use ffdroid::{APP_NAME, ConfigManager, Orchestrator, VERSION, logging, web};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "ffdroid")]
#[command(version)]
#[command(about = "FFmpeg Android build configurator", long_about = None)]
struct Cli {
    /// Work directory holding sources, toolchain and outputs
    #[arg(long, default_value = ".")]
    work_dir: Utf8PathBuf,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Launch the web configuration interface
    Serve {
        /// Port to listen on
        #[arg(long, short, default_value_t = 5000)]
        port: u16,
    },

    /// Run a build from the command line
    Build {
        /// Path to a configuration file
        #[arg(long, short, conflicts_with = "preset")]
        config: Option<Utf8PathBuf>,

        /// Name of a preset from the catalog
        #[arg(long, short)]
        preset: Option<String>,
    },

    /// Remove build outputs, temp files and cached state
    Clean {
        /// Also remove the cached FFmpeg checkout
        #[arg(long)]
        all: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let _guard = logging::setup_logging("logs", "ffdroid", cli.debug, true)?;
    tracing::info!("Starting {} v{}", APP_NAME, VERSION);

    let work_dir = cli.work_dir;
    let config_manager = Arc::new(ConfigManager::new(&work_dir));
    let orchestrator = Arc::new(Orchestrator::new(&work_dir));

    match cli.command {
        Command::Serve { port } => {
            let static_dir = work_dir.join("static");
            web::serve(orchestrator, config_manager, static_dir, port).await?;
        }

        Command::Build { config, preset } => {
            let source = match (&preset, &config) {
                (Some(name), _) => ConfigSource::Preset(name),
                (None, Some(path)) => ConfigSource::File(path),
                (None, None) => ConfigSource::Default,
            };

            let success = run_build(orchestrator, &config_manager, source).await?;
            if !success {
                std::process::exit(1);
            }
        }

        Command::Clean { all } => {
            ProjectCleaner::new(&work_dir).clean_all(all)?;
            println!("Cleanup complete.");
        }
    }

    Ok(())
}
