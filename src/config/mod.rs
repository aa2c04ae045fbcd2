//! Configuration loading and saving.
//!
//! Manages two JSON documents in the work directory:
//! - the active build configuration (`build/config.json`)
//! - the preset catalog (`config_presets.json`): named, described
//!   configurations selectable from the CLI and the web UI
//!
//! Deserialization ignores unknown fields throughout, so front-end payloads
//! carrying extra display-only keys (such as `preset`) load cleanly.

use crate::models::BuildConfig;
use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fs;

/// One catalog entry: a display name and description around a configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Preset {
    pub name: String,

    #[serde(default)]
    pub description: String,

    pub config: BuildConfig,
}

/// On-disk shape of the preset catalog.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct PresetFile {
    #[serde(default)]
    presets: IndexMap<String, Preset>,
}

/// Loads and saves build configurations and the preset catalog.
#[derive(Debug, Clone)]
pub struct ConfigManager {
    work_dir: Utf8PathBuf,
    config_path: Utf8PathBuf,
    presets_path: Utf8PathBuf,
}

impl ConfigManager {
    pub fn new(work_dir: impl AsRef<Utf8Path>) -> Self {
        let work_dir = work_dir.as_ref().to_path_buf();
        Self {
            config_path: work_dir.join("build").join("config.json"),
            presets_path: work_dir.join("config_presets.json"),
            work_dir,
        }
    }

    /// Load the active configuration, or the given file when `path` is set.
    ///
    /// A missing file yields the default configuration.
    pub fn load_config(&self, path: Option<&Utf8Path>) -> Result<BuildConfig> {
        let config_path = path.unwrap_or(&self.config_path);

        if !config_path.exists() {
            tracing::warn!("Config file not found at {}, using defaults", config_path);
            return Ok(BuildConfig::default());
        }

        let contents = fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config: {}", config_path))?;

        let config: BuildConfig = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse config: {}", config_path))?;

        tracing::info!("Loaded config from {}", config_path);
        Ok(config)
    }

    /// Persist the active configuration, creating parents as needed.
    pub fn save_config(&self, config: &BuildConfig) -> Result<()> {
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {}", parent))?;
        }

        let json =
            serde_json::to_string_pretty(config).context("Failed to serialize config to JSON")?;

        fs::write(&self.config_path, json)
            .with_context(|| format!("Failed to write config: {}", self.config_path))?;

        tracing::info!("Saved config to {}", self.config_path);
        Ok(())
    }

    /// The preset catalog, in file order. A missing catalog is empty.
    pub fn load_presets(&self) -> Result<IndexMap<String, Preset>> {
        if !self.presets_path.exists() {
            return Ok(IndexMap::new());
        }

        let contents = fs::read_to_string(&self.presets_path)
            .with_context(|| format!("Failed to read presets: {}", self.presets_path))?;

        let file: PresetFile = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse presets: {}", self.presets_path))?;

        Ok(file.presets)
    }

    /// The configuration of one named preset, if present in the catalog.
    pub fn load_preset_config(&self, preset_name: &str) -> Result<Option<BuildConfig>> {
        let presets = self.load_presets()?;
        Ok(presets.get(preset_name).map(|preset| preset.config.clone()))
    }

    pub fn work_dir(&self) -> &Utf8Path {
        &self.work_dir
    }
}
