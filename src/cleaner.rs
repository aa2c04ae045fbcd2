//! Work-directory cleanup.
//!
//! Removes build outputs, the build directory, and log files, independent of
//! any pipeline state. With `deep` cleaning the cached FFmpeg checkout is
//! removed too, forcing a fresh acquisition on the next build.

use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use std::fs;

/// Prefix of the per-architecture install directories.
const OUTPUT_DIR_PREFIX: &str = "ffmpeg-android-";

/// Removes generated state from the work directory.
#[derive(Debug, Clone)]
pub struct ProjectCleaner {
    work_dir: Utf8PathBuf,
}

impl ProjectCleaner {
    pub fn new(work_dir: impl AsRef<Utf8Path>) -> Self {
        Self {
            work_dir: work_dir.as_ref().to_path_buf(),
        }
    }

    /// Remove the per-architecture install directories.
    pub fn clean_build_outputs(&self) -> Result<()> {
        tracing::info!("Cleaning build outputs");

        for entry in fs::read_dir(self.work_dir.as_std_path())
            .with_context(|| format!("Failed to read work directory: {}", self.work_dir))?
        {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };

            if name.starts_with(OUTPUT_DIR_PREFIX) && entry.path().is_dir() {
                tracing::info!("Removing {}", name);
                fs::remove_dir_all(entry.path())
                    .with_context(|| format!("Failed to remove {}", name))?;
            }
        }
        Ok(())
    }

    /// Remove the build directory (rendered script, saved config).
    pub fn clean_build_cache(&self) -> Result<()> {
        let build_dir = self.work_dir.join("build");
        if build_dir.exists() {
            tracing::info!("Removing {}", build_dir);
            fs::remove_dir_all(&build_dir)
                .with_context(|| format!("Failed to remove {}", build_dir))?;
        }
        Ok(())
    }

    /// Remove rotated log files.
    pub fn clean_logs(&self) -> Result<()> {
        let logs_dir = self.work_dir.join("logs");
        if logs_dir.exists() {
            tracing::info!("Removing {}", logs_dir);
            fs::remove_dir_all(&logs_dir)
                .with_context(|| format!("Failed to remove {}", logs_dir))?;
        }
        Ok(())
    }

    /// Remove the cached FFmpeg checkout.
    pub fn clean_sources(&self) -> Result<()> {
        let ffmpeg_dir = self.work_dir.join("ffmpeg");
        if ffmpeg_dir.exists() {
            tracing::info!("Removing {}", ffmpeg_dir);
            fs::remove_dir_all(&ffmpeg_dir)
                .with_context(|| format!("Failed to remove {}", ffmpeg_dir))?;
        }
        Ok(())
    }

    /// Remove everything generated: outputs, build cache, logs, and with
    /// `deep` also the cached sources.
    pub fn clean_all(&self, deep: bool) -> Result<()> {
        self.clean_logs()?;
        self.clean_build_cache()?;
        self.clean_build_outputs()?;
        if deep {
            self.clean_sources()?;
        }
        tracing::info!("Cleanup complete");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn work_dir() -> (Utf8PathBuf, TempDir) {
        let temp = TempDir::new().unwrap();
        let dir = Utf8PathBuf::try_from(temp.path().to_path_buf()).unwrap();
        (dir, temp)
    }

    #[test]
    fn test_clean_build_outputs_only_touches_output_dirs() {
        let (dir, _temp) = work_dir();
        fs::create_dir_all(dir.join("ffmpeg-android-arm64-v8a/lib")).unwrap();
        fs::create_dir_all(dir.join("ffmpeg-android-x86/lib")).unwrap();
        fs::create_dir_all(dir.join("ffmpeg")).unwrap();
        fs::write(dir.join("ffmpeg-android-notes.txt"), "keep").unwrap();

        ProjectCleaner::new(&dir).clean_build_outputs().unwrap();

        assert!(!dir.join("ffmpeg-android-arm64-v8a").exists());
        assert!(!dir.join("ffmpeg-android-x86").exists());
        // Non-output state survives.
        assert!(dir.join("ffmpeg").exists());
        assert!(dir.join("ffmpeg-android-notes.txt").exists());
    }

    #[test]
    fn test_clean_all_deep_removes_sources() {
        let (dir, _temp) = work_dir();
        fs::create_dir_all(dir.join("build")).unwrap();
        fs::create_dir_all(dir.join("logs")).unwrap();
        fs::create_dir_all(dir.join("ffmpeg")).unwrap();

        ProjectCleaner::new(&dir).clean_all(true).unwrap();

        assert!(!dir.join("build").exists());
        assert!(!dir.join("logs").exists());
        assert!(!dir.join("ffmpeg").exists());
    }

    #[test]
    fn test_clean_all_shallow_keeps_sources() {
        let (dir, _temp) = work_dir();
        fs::create_dir_all(dir.join("ffmpeg")).unwrap();

        ProjectCleaner::new(&dir).clean_all(false).unwrap();

        assert!(dir.join("ffmpeg").exists());
    }
}
