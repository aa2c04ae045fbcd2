//! Environment preparation.
//!
//! An ordered sequence of idempotent setup steps run before every build:
//! host checks, locating the build shell, installing build packages, fetching
//! the FFmpeg sources, and verifying the Android NDK. Each step is tagged
//! with an explicit `fatal` attribute; the orchestrator drives the list with
//! one uniform policy (soft failure: warn and continue; fatal failure: abort
//! naming the step) instead of per-step error handling.
//!
//! The [`Environment`] trait is the seam between the orchestrator and the
//! host: production uses [`EnvironmentManager`], tests substitute scripted
//! environments.

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use camino::{Utf8Path, Utf8PathBuf};
use std::fs;
use tokio::process::Command;

/// Upstream locations for the FFmpeg sources, tried in priority order.
const FFMPEG_MIRRORS: &[&str] = &[
    "https://gitee.com/mirrors/ffmpeg.git",
    "https://github.com/FFmpeg/FFmpeg.git",
];

/// Build tool packages installed through the MSYS2 package manager.
const BUILD_PACKAGES: &[&str] = &[
    "base-devel",
    "mingw-w64-x86_64-toolchain",
    "mingw-w64-x86_64-yasm",
    "mingw-w64-x86_64-nasm",
    "mingw-w64-x86_64-pkg-config",
    "make",
    "diffutils",
];

/// One tagged preparation step.
///
/// `fatal` is an explicit attribute, not inferred from the step name: the
/// driver loop aborts on a failed fatal step and only warns for soft ones.
/// `progress` is the pipeline percentage reached when the step starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrepStep {
    pub name: &'static str,
    pub fatal: bool,
    pub progress: u8,
    pub kind: StepKind,
}

/// What a preparation step does. Dispatch goes through this enum rather
/// than through step names, which are display strings only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepKind {
    CheckHost,
    LocateShell,
    InstallPackages,
    FetchSources,
    CheckNdk,
}

/// The seam between the orchestrator and the host environment.
///
/// Implementations expose the ordered step list and execute individual
/// steps; the single driver loop lives in the orchestrator.
#[async_trait]
pub trait Environment: Send + Sync {
    /// The preparation steps, in execution order.
    fn steps(&self) -> Vec<PrepStep>;

    /// Execute one step. Idempotent: re-running after partial completion
    /// detects existing state and skips redundant work.
    async fn run_step(&self, step: &PrepStep) -> Result<()>;

    /// Path of the login shell used to run the build script, once located.
    fn shell_path(&self) -> Option<Utf8PathBuf>;
}

/// Production environment preparer rooted at the work directory.
#[derive(Debug, Clone)]
pub struct EnvironmentManager {
    work_dir: Utf8PathBuf,
    ffmpeg_dir: Utf8PathBuf,
    ndk_dir: Utf8PathBuf,
    msys2_dir: Utf8PathBuf,
    mirrors: Vec<String>,
}

impl EnvironmentManager {
    pub fn new(work_dir: impl AsRef<Utf8Path>) -> Self {
        let work_dir = work_dir.as_ref().to_path_buf();
        Self {
            ffmpeg_dir: work_dir.join("ffmpeg"),
            ndk_dir: work_dir.join("android-ndk"),
            msys2_dir: work_dir.join("msys64"),
            mirrors: FFMPEG_MIRRORS.iter().map(|m| m.to_string()).collect(),
            work_dir,
        }
    }

    /// Replace the upstream source locations, keeping their priority order.
    pub fn with_mirrors(mut self, mirrors: Vec<String>) -> Self {
        self.mirrors = mirrors;
        self
    }

    /// Verify git is installed and runnable.
    async fn check_host(&self) -> Result<()> {
        let output = Command::new("git")
            .arg("--version")
            .output()
            .await
            .context("git is not installed or not on PATH")?;

        if !output.status.success() {
            bail!("git --version exited with {}", output.status);
        }

        let version = String::from_utf8_lossy(&output.stdout);
        tracing::info!("Found {}", version.trim());
        Ok(())
    }

    /// Locate the login shell used to drive the build.
    ///
    /// On Windows hosts this is the MSYS2 bash (work-dir copy first, then
    /// the well-known install locations); elsewhere the system bash.
    fn locate_shell(&self) -> Result<Utf8PathBuf> {
        let candidates: Vec<Utf8PathBuf> = if cfg!(windows) {
            vec![
                self.msys2_dir.join("usr/bin/bash.exe"),
                Utf8PathBuf::from("C:/msys64/usr/bin/bash.exe"),
                Utf8PathBuf::from("C:/tools/msys64/usr/bin/bash.exe"),
            ]
        } else {
            vec![
                Utf8PathBuf::from("/bin/bash"),
                Utf8PathBuf::from("/usr/bin/bash"),
            ]
        };

        candidates
            .into_iter()
            .find(|path| path.exists())
            .ok_or_else(|| {
                anyhow::anyhow!("no build shell found; install bash (MSYS2 on Windows)")
            })
    }

    /// Install the build tool packages through pacman, via the build shell.
    ///
    /// This is the one soft step: hosts with a pre-provisioned toolchain work
    /// fine without a package manager, so failures here only warn.
    async fn install_packages(&self) -> Result<()> {
        let shell = self.locate_shell()?;

        self.run_in_shell(&shell, "pacman -Sy --noconfirm")
            .await
            .context("failed to refresh the package database")?;

        for package in BUILD_PACKAGES {
            self.run_in_shell(&shell, &format!("pacman -S --noconfirm {}", package))
                .await
                .with_context(|| format!("failed to install package {}", package))?;
        }

        tracing::info!("Build packages installed");
        Ok(())
    }

    /// Fetch or refresh the FFmpeg source tree.
    ///
    /// A valid existing checkout is updated in place (re-cloned if the
    /// update fails); a directory that is not a git repository is discarded
    /// and re-acquired. Fresh clones try each mirror in priority order.
    async fn fetch_sources(&self) -> Result<()> {
        if self.ffmpeg_dir.exists() {
            if self.ffmpeg_dir.join(".git").exists() {
                tracing::info!("Updating existing FFmpeg checkout");
                match self.run_git(&["pull"], Some(&self.ffmpeg_dir)).await {
                    Ok(()) => return Ok(()),
                    Err(e) => {
                        tracing::warn!("FFmpeg update failed ({}), re-cloning", e);
                        fs::remove_dir_all(&self.ffmpeg_dir)
                            .context("failed to remove stale FFmpeg checkout")?;
                    }
                }
            } else {
                tracing::warn!("FFmpeg directory exists but is not a git repository, discarding");
                fs::remove_dir_all(&self.ffmpeg_dir)
                    .context("failed to remove invalid FFmpeg directory")?;
            }
        }

        self.clone_sources().await
    }

    async fn clone_sources(&self) -> Result<()> {
        for mirror in &self.mirrors {
            tracing::info!("Cloning FFmpeg from {}", mirror);
            match self
                .run_git(
                    &["clone", mirror, "ffmpeg", "--depth", "1"],
                    Some(&self.work_dir),
                )
                .await
            {
                Ok(()) => return Ok(()),
                Err(e) => tracing::warn!("Clone from {} failed: {}", mirror, e),
            }
        }
        bail!("all FFmpeg mirrors failed; check the network connection")
    }

    /// Verify the Android NDK is unpacked in the work directory. Fetching
    /// the NDK itself is outside this tool; a missing directory is a named
    /// fatal failure with guidance.
    fn check_ndk(&self) -> Result<()> {
        if !self.ndk_dir.exists() {
            bail!(
                "Android NDK not found at {}; unpack an NDK release there",
                self.ndk_dir
            );
        }
        tracing::info!("Android NDK present at {}", self.ndk_dir);
        Ok(())
    }

    async fn run_git(&self, args: &[&str], cwd: Option<&Utf8Path>) -> Result<()> {
        let mut cmd = Command::new("git");
        cmd.args(args);
        if let Some(dir) = cwd {
            cmd.current_dir(dir.as_std_path());
        }

        let output = cmd.output().await.context("failed to run git")?;
        if !output.status.success() {
            bail!(
                "git {} exited with {}: {}",
                args.join(" "),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(())
    }

    async fn run_in_shell(&self, shell: &Utf8Path, command: &str) -> Result<()> {
        let output = Command::new(shell.as_std_path())
            .arg("-lc")
            .arg(command)
            .output()
            .await
            .with_context(|| format!("failed to run {} through {}", command, shell))?;

        if !output.status.success() {
            bail!("'{}' exited with {}", command, output.status);
        }
        Ok(())
    }
}

#[async_trait]
impl Environment for EnvironmentManager {
    fn steps(&self) -> Vec<PrepStep> {
        vec![
            PrepStep {
                name: "check host tools",
                fatal: true,
                progress: 10,
                kind: StepKind::CheckHost,
            },
            PrepStep {
                name: "locate build shell",
                fatal: true,
                progress: 20,
                kind: StepKind::LocateShell,
            },
            PrepStep {
                name: "install build packages",
                fatal: false,
                progress: 30,
                kind: StepKind::InstallPackages,
            },
            PrepStep {
                name: "fetch FFmpeg sources",
                fatal: true,
                progress: 40,
                kind: StepKind::FetchSources,
            },
            PrepStep {
                name: "check Android NDK",
                fatal: true,
                progress: 50,
                kind: StepKind::CheckNdk,
            },
        ]
    }

    async fn run_step(&self, step: &PrepStep) -> Result<()> {
        match step.kind {
            StepKind::CheckHost => self.check_host().await,
            StepKind::LocateShell => self.locate_shell().map(|_| ()),
            StepKind::InstallPackages => self.install_packages().await,
            StepKind::FetchSources => self.fetch_sources().await,
            StepKind::CheckNdk => self.check_ndk(),
        }
    }

    fn shell_path(&self) -> Option<Utf8PathBuf> {
        self.locate_shell().ok()
    }
}
