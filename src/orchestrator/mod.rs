//! Build pipeline orchestration.
//!
//! The [`Orchestrator`] composes the environment preparer, script renderer,
//! process supervisor and output classifier into one staged pipeline, owns
//! the [`PipelineState`] and the bounded log buffer, and publishes every
//! [`LogEntry`] on a broadcast channel for independent subscribers (the CLI
//! printer, the web event stream).
//!
//! It is the single writer of the pipeline state and the log store; the
//! composed components communicate with it only through return values and
//! the process line stream.

mod log_buffer;

pub use log_buffer::{DEFAULT_LOG_CAPACITY, LogBuffer};

use crate::classify::{OutputClassifier, ProgressEvent};
use crate::env::{Environment, EnvironmentManager};
use crate::models::{BuildConfig, ConfigError, LogEntry, PipelineState, Severity};
use crate::process::{ProcessSupervisor, SupervisorError};
use crate::script::{RenderError, ScriptRenderer};
use camino::{Utf8Path, Utf8PathBuf};
use std::sync::{Arc, Mutex, RwLock};
use thiserror::Error;
use tokio::sync::broadcast;

/// Progress percentage reached when a compile stage is observed.
fn stage_progress(event: ProgressEvent) -> u8 {
    match event {
        ProgressEvent::Compiling(_) => 60,
        ProgressEvent::Configuring => 70,
        ProgressEvent::Building => 85,
        ProgressEvent::Installing => 95,
        ProgressEvent::Completed => 100,
    }
}

/// Human-readable status text for a compile stage.
fn stage_status(event: ProgressEvent) -> String {
    match event {
        ProgressEvent::Compiling(abi) => format!("Building architecture: {}", abi),
        ProgressEvent::Configuring => "Configuring FFmpeg...".to_string(),
        ProgressEvent::Building => "Compiling...".to_string(),
        ProgressEvent::Installing => "Installing libraries...".to_string(),
        ProgressEvent::Completed => "Build complete".to_string(),
    }
}

/// Rejection reasons for a start request. Not pipeline failures: the
/// pipeline state is untouched when these are returned.
#[derive(Error, Debug)]
pub enum StartError {
    #[error("a build is already running")]
    AlreadyRunning,

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(#[from] ConfigError),
}

/// Failures that terminate a running pipeline.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("preparation step '{step}' failed: {message}")]
    StepFailed { step: &'static str, message: String },

    #[error("failed to render build script: {0}")]
    Render(#[from] RenderError),

    #[error("no build shell available to run the script")]
    NoShell,

    #[error(transparent)]
    Supervisor(#[from] SupervisorError),

    #[error("build process failed with exit code {exit_code}")]
    ProcessFailed { exit_code: i32 },
}

/// Owns one build pipeline: state, logs, and the composed components.
///
/// Constructed once per process lifetime; there are no module-level
/// singletons. At most one build runs per instance at any time; a second
/// start request is rejected with [`StartError::AlreadyRunning`].
pub struct Orchestrator {
    work_dir: Utf8PathBuf,
    state: RwLock<PipelineState>,
    logs: Mutex<LogBuffer>,
    log_tx: broadcast::Sender<LogEntry>,
    env: Arc<dyn Environment>,
    renderer: ScriptRenderer,
    supervisor: ProcessSupervisor,
    classifier: OutputClassifier,
}

impl Orchestrator {
    /// Create an orchestrator rooted at the work directory, with the
    /// production environment preparer.
    pub fn new(work_dir: impl AsRef<Utf8Path>) -> Self {
        let work_dir = work_dir.as_ref().to_path_buf();
        let env = Arc::new(EnvironmentManager::new(&work_dir));
        Self::with_environment(work_dir, env)
    }

    /// Create an orchestrator with a custom environment implementation.
    /// This is the seam integration tests use to script step outcomes.
    pub fn with_environment(
        work_dir: impl AsRef<Utf8Path>,
        env: Arc<dyn Environment>,
    ) -> Self {
        let work_dir = work_dir.as_ref().to_path_buf();
        let build_dir = work_dir.join("build");
        let (log_tx, _) = broadcast::channel(100);

        Self {
            renderer: ScriptRenderer::new(&build_dir),
            state: RwLock::new(PipelineState::default()),
            logs: Mutex::new(LogBuffer::default()),
            log_tx,
            env,
            supervisor: ProcessSupervisor::new(),
            classifier: OutputClassifier::new(),
            work_dir,
        }
    }

    /// Snapshot of the current pipeline state.
    pub fn status(&self) -> PipelineState {
        self.state.read().unwrap().clone()
    }

    /// Snapshot of the bounded log buffer, oldest first.
    pub fn logs(&self) -> Vec<LogEntry> {
        self.logs.lock().unwrap().entries()
    }

    /// Clear the log buffer. Live subscribers are unaffected.
    pub fn clear_logs(&self) {
        self.logs.lock().unwrap().clear();
    }

    /// Subscribe to the live log stream. Entries arrive in production order.
    pub fn subscribe(&self) -> broadcast::Receiver<LogEntry> {
        self.log_tx.subscribe()
    }

    /// Start a build on a background task and return immediately.
    ///
    /// Rejected without side effects when the configuration is invalid or a
    /// build is already running.
    pub fn start(self: Arc<Self>, config: BuildConfig) -> Result<(), StartError> {
        self.begin_run(&config)?;

        tokio::spawn(async move {
            self.run_pipeline(config).await;
        });

        Ok(())
    }

    /// Run a build to completion on the caller's task (the CLI path).
    /// Returns whether the build succeeded.
    pub async fn run_blocking(&self, config: BuildConfig) -> Result<bool, StartError> {
        self.begin_run(&config)?;
        self.run_pipeline(config).await;
        Ok(self.status().success)
    }

    /// Validate and atomically claim the pipeline. The state flips to
    /// running here so a concurrent start observes it immediately.
    fn begin_run(&self, config: &BuildConfig) -> Result<(), StartError> {
        config.validate()?;

        let mut state = self.state.write().unwrap();
        if state.running {
            return Err(StartError::AlreadyRunning);
        }
        state.begin_run();
        Ok(())
    }

    /// The full pipeline: preparation, render, compile. Any error lands in
    /// the terminal failure state with a log entry emitted first.
    async fn run_pipeline(&self, config: BuildConfig) {
        self.clear_logs();
        self.push_log(Severity::Info, "Starting FFmpeg Android build");

        match self.execute(&config).await {
            Ok(()) => {
                self.push_log(Severity::Success, "Build finished successfully");
                self.state.write().unwrap().finish_success();
            }
            Err(e) => {
                let message = e.to_string();
                self.push_log(Severity::Error, format!("Build failed: {}", message));
                self.state.write().unwrap().finish_failure(message);
            }
        }
    }

    async fn execute(&self, config: &BuildConfig) -> Result<(), PipelineError> {
        self.prepare_environment().await?;
        self.compile(config).await
    }

    /// Drive the preparation steps in order with the uniform failure policy:
    /// soft steps warn and continue, fatal steps abort naming the step.
    async fn prepare_environment(&self) -> Result<(), PipelineError> {
        for step in self.env.steps() {
            self.advance(step.progress, format!("{}...", step.name));
            self.push_log(Severity::Info, format!("{}...", step.name));

            match self.env.run_step(&step).await {
                Ok(()) => {
                    self.push_log(Severity::Success, format!("{} done", step.name));
                }
                Err(e) if !step.fatal => {
                    self.push_log(
                        Severity::Warning,
                        format!("{} failed ({:#}), continuing", step.name, e),
                    );
                }
                Err(e) => {
                    return Err(PipelineError::StepFailed {
                        step: step.name,
                        message: format!("{:#}", e),
                    });
                }
            }
        }
        Ok(())
    }

    /// Render the script, launch it, and fold the classified output into
    /// log entries and monotonic progress until the process exits.
    async fn compile(&self, config: &BuildConfig) -> Result<(), PipelineError> {
        self.advance(60, "Generating build script...".to_string());
        let script = self.renderer.render(config)?;
        self.push_log(
            Severity::Info,
            format!("Build script generated: {}", script.path),
        );

        let shell = self.env.shell_path().ok_or(PipelineError::NoShell)?;

        self.advance(60, "Starting compilation...".to_string());
        self.push_log(Severity::Info, "Starting compilation...");
        let mut handle = self.supervisor.launch(&shell, &self.work_dir, &script.path)?;

        while let Some(line) = handle.next_line().await {
            if line.is_empty() {
                continue;
            }

            let classified = self.classifier.classify(&line);
            self.push_log(classified.severity, line);

            if let Some(event) = classified.progress {
                self.advance(stage_progress(event), stage_status(event));
            }
        }

        let exit_code = handle.wait().await?;
        if exit_code == 0 {
            Ok(())
        } else {
            Err(PipelineError::ProcessFailed { exit_code })
        }
    }

    /// Record progress (never backwards) and the current status text.
    fn advance(&self, progress: u8, status: String) {
        self.state.write().unwrap().advance(progress, status);
    }

    /// Append a log entry to the ring and publish it to subscribers.
    fn push_log(&self, severity: Severity, message: impl Into<String>) {
        let entry = LogEntry::new(severity, message);
        self.logs.lock().unwrap().push(entry.clone());
        // A send error only means no one is listening right now.
        let _ = self.log_tx.send(entry);
    }
}
