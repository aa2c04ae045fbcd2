use serde::Serialize;

/// Snapshot of one build pipeline's externally visible state.
///
/// Single-writer record: only the [`Orchestrator`](crate::orchestrator::Orchestrator)
/// mutates it, behind a lock; every other party (web status endpoint, CLI)
/// observes cloned snapshots. Serialized flat for the status query.
///
/// Lifecycle: created idle (`running` and `completed` both false); flips to
/// running when a build starts; terminates as either completed-success or
/// completed-failure. A new build may only start while not running.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PipelineState {
    pub running: bool,
    pub completed: bool,
    pub success: bool,
    /// 0-100, monotonically non-decreasing within one run.
    pub progress: u8,
    /// Human-readable description of the current stage.
    pub status: String,
    /// Human-readable failure message, present only in the failed state.
    pub error: Option<String>,
}

impl PipelineState {
    /// Reset to the initial running state for a fresh build.
    pub fn begin_run(&mut self) {
        self.running = true;
        self.completed = false;
        self.success = false;
        self.progress = 0;
        self.status = "Initializing build environment...".to_string();
        self.error = None;
    }

    /// Transition to the terminal success state. Progress is forced to 100.
    pub fn finish_success(&mut self) {
        self.running = false;
        self.completed = true;
        self.success = true;
        self.progress = 100;
        self.status = "Build complete".to_string();
        self.error = None;
    }

    /// Transition to the terminal failure state with a message.
    pub fn finish_failure(&mut self, error: String) {
        self.running = false;
        self.completed = true;
        self.success = false;
        self.status = "Build failed".to_string();
        self.error = Some(error);
    }

    /// Record progress, never letting the percentage move backwards.
    pub fn advance(&mut self, progress: u8, status: String) {
        self.progress = self.progress.max(progress.min(100));
        self.status = status;
    }
}
