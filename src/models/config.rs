use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Minimum Android API level accepted by the NDK toolchains we target.
pub const MIN_API_LEVEL: u32 = 16;

/// Errors produced by configuration validation.
///
/// These are rejected before any side effect; an invalid configuration never
/// reaches the build pipeline. Unknown architecture names and output kinds are
/// rejected earlier, at deserialization, because both are closed enums.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Android API level must be at least {MIN_API_LEVEL}, got {0}")]
    InvalidApi(u32),

    #[error("at least one target architecture is required")]
    EmptyArchitectures,
}

/// Android ABI targeted by a build.
///
/// The four ABIs the NDK ships toolchains for. Serialized with the canonical
/// Android ABI names ("arm64-v8a", "armeabi-v7a", "x86", "x86_64") so the
/// JSON exchange format matches what the front end and presets use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Abi {
    #[serde(rename = "arm64-v8a")]
    Arm64V8a,
    #[serde(rename = "armeabi-v7a")]
    ArmeabiV7a,
    #[serde(rename = "x86")]
    X86,
    #[serde(rename = "x86_64")]
    X86_64,
}

/// Per-ABI toolchain parameters.
///
/// Immutable triple-plus-flags describing how one ABI is cross-compiled:
/// the clang target triple, the FFmpeg `--arch` name, the `--cpu` name, and
/// any extra compiler flags the ABI requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AbiSpec {
    pub target_triple: &'static str,
    pub arch_name: &'static str,
    pub cpu: &'static str,
    pub extra_cflags: &'static str,
}

impl Abi {
    /// Every supported ABI, in the fixed order used by the script's
    /// architecture table.
    pub const ALL: [Abi; 4] = [Abi::Arm64V8a, Abi::ArmeabiV7a, Abi::X86, Abi::X86_64];

    /// Canonical Android ABI name, as used in directory names and the
    /// rendered script.
    pub fn name(self) -> &'static str {
        match self {
            Abi::Arm64V8a => "arm64-v8a",
            Abi::ArmeabiV7a => "armeabi-v7a",
            Abi::X86 => "x86",
            Abi::X86_64 => "x86_64",
        }
    }

    /// Toolchain parameters for this ABI.
    pub fn spec(self) -> AbiSpec {
        match self {
            Abi::Arm64V8a => AbiSpec {
                target_triple: "aarch64-linux-android",
                arch_name: "aarch64",
                cpu: "armv8-a",
                extra_cflags: "",
            },
            Abi::ArmeabiV7a => AbiSpec {
                target_triple: "armv7a-linux-androideabi",
                arch_name: "arm",
                cpu: "armv7-a",
                extra_cflags: "-mfpu=neon -mfloat-abi=softfp",
            },
            Abi::X86 => AbiSpec {
                target_triple: "i686-linux-android",
                arch_name: "x86",
                cpu: "i686",
                extra_cflags: "",
            },
            Abi::X86_64 => AbiSpec {
                target_triple: "x86_64-linux-android",
                arch_name: "x86_64",
                cpu: "x86-64",
                extra_cflags: "",
            },
        }
    }

    /// Look an ABI up by its canonical name.
    pub fn from_name(name: &str) -> Option<Abi> {
        Abi::ALL.into_iter().find(|abi| abi.name() == name)
    }
}

impl std::fmt::Display for Abi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Whether built libraries are produced as shared or static artifacts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputKind {
    #[default]
    Shared,
    Static,
}

impl std::fmt::Display for OutputKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputKind::Shared => f.write_str("shared"),
            OutputKind::Static => f.write_str("static"),
        }
    }
}

/// Code-generation trade-offs passed to FFmpeg's configure.
///
/// Six independent booleans. Field names keep the camelCase spelling of the
/// JSON exchange format used by the front end and preset catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptimizationFlags {
    #[serde(rename = "disableAsm", default = "enabled")]
    pub disable_asm: bool,

    #[serde(rename = "enablePic", default = "enabled")]
    pub enable_pic: bool,

    #[serde(rename = "disableDebug", default = "enabled")]
    pub disable_debug: bool,

    #[serde(rename = "disableDoc", default = "enabled")]
    pub disable_doc: bool,

    #[serde(rename = "disablePrograms", default = "enabled")]
    pub disable_programs: bool,

    #[serde(rename = "enableSmall", default)]
    pub enable_small: bool,
}

fn enabled() -> bool {
    true
}

impl Default for OptimizationFlags {
    fn default() -> Self {
        Self {
            disable_asm: true,
            enable_pic: true,
            disable_debug: true,
            disable_doc: true,
            disable_programs: true,
            enable_small: false,
        }
    }
}

/// Immutable description of what to build.
///
/// The value object consumed by the script renderer and the orchestrator.
/// Deserialization ignores unknown fields, so the display-only `preset` tag
/// some front-end payloads carry is dropped without special handling.
///
/// Component lists (decoders, encoders, ...) are free-form strings matched
/// against FFmpeg's component names; they are not validated here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildConfig {
    #[serde(default = "default_api")]
    pub api: u32,

    #[serde(rename = "outputType", default)]
    pub output: OutputKind,

    #[serde(default = "default_architectures")]
    pub architectures: Vec<Abi>,

    #[serde(default = "default_decoders")]
    pub decoders: Vec<String>,

    #[serde(default)]
    pub encoders: Vec<String>,

    #[serde(default = "default_muxers")]
    pub muxers: Vec<String>,

    #[serde(default = "default_demuxers")]
    pub demuxers: Vec<String>,

    #[serde(default = "default_protocols")]
    pub protocols: Vec<String>,

    #[serde(default)]
    pub filters: Vec<String>,

    #[serde(default)]
    pub optimizations: OptimizationFlags,
}

fn default_api() -> u32 {
    21
}

fn default_architectures() -> Vec<Abi> {
    vec![Abi::Arm64V8a, Abi::ArmeabiV7a]
}

fn default_decoders() -> Vec<String> {
    vec!["h264".into(), "aac".into(), "mp3".into()]
}

fn default_muxers() -> Vec<String> {
    vec!["mp4".into()]
}

fn default_demuxers() -> Vec<String> {
    vec!["mov".into(), "mp4".into()]
}

fn default_protocols() -> Vec<String> {
    vec!["file".into(), "http".into(), "https".into()]
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            api: default_api(),
            output: OutputKind::Shared,
            architectures: default_architectures(),
            decoders: default_decoders(),
            encoders: Vec::new(),
            muxers: default_muxers(),
            demuxers: default_demuxers(),
            protocols: default_protocols(),
            filters: Vec::new(),
            optimizations: OptimizationFlags::default(),
        }
    }
}

impl BuildConfig {
    /// Validate the invariants the type system cannot express.
    ///
    /// Must pass before the configuration is handed to the pipeline.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.architectures.is_empty() {
            return Err(ConfigError::EmptyArchitectures);
        }
        if self.api < MIN_API_LEVEL {
            return Err(ConfigError::InvalidApi(self.api));
        }
        Ok(())
    }
}
