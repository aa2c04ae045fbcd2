//! Integration tests for configuration loading and saving
//!
//! These tests verify:
//! - JSON round trips through the ConfigManager
//! - Default behavior for missing files
//! - Tolerance of unknown/display-only fields in the exchange format
//! - Preset catalog loading and ordering

use camino::Utf8PathBuf;
use ffdroid::models::{Abi, BuildConfig, ConfigError, OutputKind};
use ffdroid::ConfigManager;
use std::fs;
use tempfile::TempDir;

fn manager() -> (ConfigManager, TempDir) {
    let temp = TempDir::new().unwrap();
    let work_dir = Utf8PathBuf::try_from(temp.path().to_path_buf()).unwrap();
    (ConfigManager::new(&work_dir), temp)
}

#[test]
fn test_missing_config_falls_back_to_defaults() {
    let (manager, _temp) = manager();

    let config = manager.load_config(None).unwrap();

    assert_eq!(config.api, 21);
    assert_eq!(config.output, OutputKind::Shared);
    assert_eq!(config.architectures, vec![Abi::Arm64V8a, Abi::ArmeabiV7a]);
}

#[test]
fn test_save_then_load_round_trip() {
    let (manager, _temp) = manager();

    let config = BuildConfig {
        api: 29,
        output: OutputKind::Static,
        architectures: vec![Abi::X86, Abi::X86_64],
        decoders: vec!["hevc".into()],
        ..BuildConfig::default()
    };

    manager.save_config(&config).unwrap();
    let loaded = manager.load_config(None).unwrap();

    assert_eq!(loaded, config);
}

#[test]
fn test_exchange_format_field_names() {
    let (manager, _temp) = manager();
    let path = manager.work_dir().join("exchange.json");

    // The front end's JSON uses camelCase for the output type and
    // optimization flags.
    fs::write(
        &path,
        r#"{
            "api": 24,
            "outputType": "static",
            "architectures": ["x86_64"],
            "optimizations": {"disableAsm": false, "enableSmall": true}
        }"#,
    )
    .unwrap();

    let config = manager.load_config(Some(&path)).unwrap();

    assert_eq!(config.output, OutputKind::Static);
    assert_eq!(config.architectures, vec![Abi::X86_64]);
    assert!(!config.optimizations.disable_asm);
    assert!(config.optimizations.enable_small);
    // Unspecified flags keep their defaults.
    assert!(config.optimizations.enable_pic);
}

#[test]
fn test_unknown_and_display_fields_ignored() {
    let (manager, _temp) = manager();
    let path = manager.work_dir().join("extra.json");

    fs::write(
        &path,
        r#"{"api": 23, "preset": "streaming", "uiTheme": "dark"}"#,
    )
    .unwrap();

    let config = manager.load_config(Some(&path)).unwrap();
    assert_eq!(config.api, 23);
}

#[test]
fn test_unknown_architecture_rejected_at_parse() {
    let (manager, _temp) = manager();
    let path = manager.work_dir().join("bad.json");

    fs::write(&path, r#"{"architectures": ["mips64"]}"#).unwrap();

    assert!(manager.load_config(Some(&path)).is_err());
}

#[test]
fn test_malformed_json_is_an_error() {
    let (manager, _temp) = manager();
    let path = manager.work_dir().join("broken.json");
    fs::write(&path, "{not json").unwrap();

    assert!(manager.load_config(Some(&path)).is_err());
}

#[test]
fn test_validation_rejects_before_any_side_effect() {
    let config = BuildConfig {
        api: 14,
        ..BuildConfig::default()
    };
    assert_eq!(config.validate(), Err(ConfigError::InvalidApi(14)));

    let config = BuildConfig {
        architectures: Vec::new(),
        ..BuildConfig::default()
    };
    assert_eq!(config.validate(), Err(ConfigError::EmptyArchitectures));
}

#[test]
fn test_preset_catalog_preserves_order() {
    let (manager, _temp) = manager();

    let catalog = r#"{
        "presets": {
            "basic": {"name": "Basic", "description": "", "config": {}},
            "streaming": {"name": "Streaming", "config": {"protocols": ["rtmp"]}},
            "complete": {"name": "Complete", "config": {"api": 26}}
        }
    }"#;
    fs::write(manager.work_dir().join("config_presets.json"), catalog).unwrap();

    let presets = manager.load_presets().unwrap();
    let keys: Vec<&String> = presets.keys().collect();
    assert_eq!(keys, ["basic", "streaming", "complete"]);

    let streaming = manager.load_preset_config("streaming").unwrap().unwrap();
    assert_eq!(streaming.protocols, vec!["rtmp"]);
}

#[test]
fn test_preset_config_inherits_defaults() {
    let (manager, _temp) = manager();

    let catalog = r#"{
        "presets": {
            "tiny": {"name": "Tiny", "config": {"decoders": ["h264"]}}
        }
    }"#;
    fs::write(manager.work_dir().join("config_presets.json"), catalog).unwrap();

    let config = manager.load_preset_config("tiny").unwrap().unwrap();
    assert_eq!(config.decoders, vec!["h264"]);
    // Unspecified fields of a preset's config carry the defaults.
    assert_eq!(config.api, 21);
    assert_eq!(config.muxers, vec!["mp4"]);
}
