//! Supervision of the external build process.
//!
//! Launches the rendered script inside the host's login shell, merges its
//! stdout and stderr into one decoded line stream, and enforces that at most
//! one build process is in flight per supervisor. The native build tools
//! (make, configure, vendored probes) emit mixed and occasionally broken
//! encodings; decoding therefore degrades gracefully instead of failing.

use camino::Utf8Path;
use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;

/// Errors from launching or waiting on the build process.
#[derive(Error, Debug)]
pub enum SupervisorError {
    /// A second launch was requested while a process is still in flight.
    #[error("a build process is already running")]
    AlreadyRunning,

    /// The shell or the script could not be started, or waiting failed.
    #[error("process error: {0}")]
    Process(#[from] std::io::Error),
}

/// Launches the build script and enforces single-flight execution.
///
/// Cloning shares the in-flight flag, so every clone observes the same
/// single-flight guarantee.
#[derive(Debug, Clone, Default)]
pub struct ProcessSupervisor {
    in_flight: Arc<AtomicBool>,
}

impl ProcessSupervisor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start the rendered script through the login shell.
    ///
    /// The script is made executable and run from `work_dir`; stdout and
    /// stderr are merged into the handle's line stream. Rejected with
    /// [`SupervisorError::AlreadyRunning`] while a previous handle is alive.
    pub fn launch(
        &self,
        shell: &Utf8Path,
        work_dir: &Utf8Path,
        script_path: &Utf8Path,
    ) -> Result<ProcessHandle, SupervisorError> {
        if self.in_flight.swap(true, Ordering::SeqCst) {
            return Err(SupervisorError::AlreadyRunning);
        }

        let script_name = script_path.file_name().unwrap_or("build_ffmpeg.sh");
        let command_line = format!(
            "cd '{}' && chmod +x build/{} && ./build/{}",
            work_dir, script_name, script_name
        );

        tracing::info!("Launching build process: {} -lc \"{}\"", shell, command_line);

        let spawned = Command::new(shell.as_std_path())
            .arg("-lc")
            .arg(&command_line)
            .current_dir(work_dir.as_std_path())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .stdin(Stdio::null())
            .spawn();

        let mut child = match spawned {
            Ok(child) => child,
            Err(e) => {
                // Release the flag so the failed launch does not wedge the
                // supervisor.
                self.in_flight.store(false, Ordering::SeqCst);
                return Err(SupervisorError::Process(e));
            }
        };

        let (tx, rx) = mpsc::channel(256);
        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(pump_lines(stdout, tx.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(pump_lines(stderr, tx.clone()));
        }
        drop(tx);

        Ok(ProcessHandle {
            child,
            lines: rx,
            in_flight: Arc::clone(&self.in_flight),
        })
    }

    /// Whether a launched process is still alive.
    pub fn is_running(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }
}

/// Handle to one supervised build process.
///
/// Dropping the handle releases the supervisor's single-flight slot.
pub struct ProcessHandle {
    child: Child,
    lines: mpsc::Receiver<String>,
    in_flight: Arc<AtomicBool>,
}

impl ProcessHandle {
    /// Next decoded output line, or `None` once the process has exited and
    /// both streams are drained.
    pub async fn next_line(&mut self) -> Option<String> {
        self.lines.recv().await
    }

    /// Wait for the process to terminate and return its exit code.
    ///
    /// A non-zero code is a reported build failure, not a supervisor error.
    /// A termination without a code (killed by signal) is reported as -1.
    pub async fn wait(&mut self) -> Result<i32, SupervisorError> {
        let status = self.child.wait().await?;
        Ok(status.code().unwrap_or(-1))
    }
}

impl Drop for ProcessHandle {
    fn drop(&mut self) {
        self.in_flight.store(false, Ordering::SeqCst);
    }
}

/// Read raw lines from one stream, decode them, and forward them into the
/// merged channel until EOF.
async fn pump_lines<R>(stream: R, tx: mpsc::Sender<String>)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(stream);
    let mut buf = Vec::new();

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let line = decode_line(&buf);
                if tx.send(line).await.is_err() {
                    break;
                }
            }
            Err(e) => {
                tracing::warn!("Failed to read build output: {}", e);
                break;
            }
        }
    }
}

/// Decode one raw output line, tolerating foreign encodings.
///
/// Tries strict UTF-8 first; on failure falls back to Latin-1, which maps
/// every byte to a scalar value and so cannot fail - unrepresentable input
/// degrades to substituted characters instead of a crash. Control characters
/// other than newline, tab and carriage return are stripped, and trailing
/// line terminators removed.
fn decode_line(raw: &[u8]) -> String {
    let decoded: String = match std::str::from_utf8(raw) {
        Ok(s) => s.to_string(),
        Err(_) => raw.iter().map(|&b| b as char).collect(),
    };

    decoded
        .chars()
        .filter(|c| !c.is_control() || matches!(c, '\n' | '\t' | '\r'))
        .collect::<String>()
        .trim_end_matches(['\n', '\r'])
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8PathBuf;
    use std::fs;

    #[test]
    fn test_decode_utf8_line() {
        assert_eq!(decode_line("hello world\n".as_bytes()), "hello world");
    }

    #[test]
    fn test_decode_non_utf8_falls_back() {
        // GBK-encoded text; invalid as UTF-8. Must decode without panicking
        // and keep the line printable.
        let raw = [0xd6, 0xd0, 0xce, 0xc4, b' ', b'o', b'k', b'\n'];
        let decoded = decode_line(&raw);
        assert!(decoded.ends_with("ok"));
        assert!(!decoded.is_empty());
    }

    #[test]
    fn test_control_characters_stripped() {
        let raw = b"progress\x1b[32m done\x07\n";
        let decoded = decode_line(raw);
        assert_eq!(decoded, "progress[32m done");
    }

    #[test]
    fn test_tab_is_preserved() {
        assert_eq!(decode_line(b"a\tb\r\n"), "a\tb");
    }

    #[tokio::test]
    async fn test_launch_streams_merged_output() {
        let temp = tempfile::tempdir().unwrap();
        let work_dir = Utf8PathBuf::try_from(temp.path().to_path_buf()).unwrap();
        let build_dir = work_dir.join("build");
        fs::create_dir_all(&build_dir).unwrap();

        let script = build_dir.join("build_ffmpeg.sh");
        fs::write(&script, "#!/bin/sh\necho out-line\necho err-line 1>&2\n").unwrap();

        let supervisor = ProcessSupervisor::new();
        let mut handle = supervisor
            .launch(Utf8Path::new("/bin/sh"), &work_dir, &script)
            .unwrap();

        let mut lines = Vec::new();
        while let Some(line) = handle.next_line().await {
            lines.push(line);
        }
        let code = handle.wait().await.unwrap();

        assert_eq!(code, 0);
        assert!(lines.iter().any(|l| l == "out-line"));
        assert!(lines.iter().any(|l| l == "err-line"));
    }

    #[tokio::test]
    async fn test_second_launch_rejected_while_running() {
        let temp = tempfile::tempdir().unwrap();
        let work_dir = Utf8PathBuf::try_from(temp.path().to_path_buf()).unwrap();
        let build_dir = work_dir.join("build");
        fs::create_dir_all(&build_dir).unwrap();

        let script = build_dir.join("build_ffmpeg.sh");
        fs::write(&script, "#!/bin/sh\nsleep 2\n").unwrap();

        let supervisor = ProcessSupervisor::new();
        let handle = supervisor
            .launch(Utf8Path::new("/bin/sh"), &work_dir, &script)
            .unwrap();

        let second = supervisor.launch(Utf8Path::new("/bin/sh"), &work_dir, &script);
        assert!(matches!(second, Err(SupervisorError::AlreadyRunning)));

        drop(handle);
        assert!(!supervisor.is_running());
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_reported_not_fatal() {
        let temp = tempfile::tempdir().unwrap();
        let work_dir = Utf8PathBuf::try_from(temp.path().to_path_buf()).unwrap();
        let build_dir = work_dir.join("build");
        fs::create_dir_all(&build_dir).unwrap();

        let script = build_dir.join("build_ffmpeg.sh");
        fs::write(&script, "#!/bin/sh\nexit 7\n").unwrap();

        let supervisor = ProcessSupervisor::new();
        let mut handle = supervisor
            .launch(Utf8Path::new("/bin/sh"), &work_dir, &script)
            .unwrap();

        while handle.next_line().await.is_some() {}
        assert_eq!(handle.wait().await.unwrap(), 7);
    }
}
