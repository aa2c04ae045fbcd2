//! Build-script rendering.
//!
//! Turns a [`BuildConfig`] into the self-contained bash script that performs
//! the actual multi-architecture FFmpeg compilation. Rendering is
//! deterministic: two calls with equal configurations produce byte-identical
//! script text, so the script can be diffed, cached, and tested as an
//! artifact.
//!
//! The configure invocation is assembled by [`ConfigureCommand`], which owns
//! the flag-ordering contract: toolchain flags, then the shared/static pair,
//! then optimization flags, then the always-on baseline, then one enable flag
//! per component in fixed category order. The ordering is load-bearing for
//! downstream tooling and is verified by tests against every permutation of
//! populated categories.

use crate::models::{Abi, BuildConfig, OptimizationFlags, OutputKind};
use camino::{Utf8Path, Utf8PathBuf};
use std::fs;
use thiserror::Error;

/// Fixed name of the rendered script inside the build directory.
pub const SCRIPT_FILE_NAME: &str = "build_ffmpeg.sh";

/// Errors from script rendering.
#[derive(Error, Debug)]
pub enum RenderError {
    /// An architecture name slipped past configuration validation. This is a
    /// programming-error-class failure and always fatal.
    #[error("unsupported architecture in configuration: {0}")]
    UnknownAbi(String),

    #[error("failed to write build script: {0}")]
    Io(#[from] std::io::Error),
}

/// A rendered build script: the text plus the path it was written to.
///
/// Produced fresh on every render call and never mutated afterwards.
#[derive(Debug, Clone)]
pub struct RenderedScript {
    pub path: Utf8PathBuf,
    pub contents: String,
}

/// The six component categories, in the fixed order they appear in the
/// configure invocation. The first element is FFmpeg's flag noun
/// (`--enable-<noun>=<name>`).
fn component_categories(config: &BuildConfig) -> [(&'static str, &[String]); 6] {
    [
        ("decoder", &config.decoders),
        ("encoder", &config.encoders),
        ("muxer", &config.muxers),
        ("demuxer", &config.demuxers),
        ("protocol", &config.protocols),
        ("filter", &config.filters),
    ]
}

/// Builder for the FFmpeg configure invocation.
///
/// Owns the flag-ordering contract; see the module docs. Construct with
/// [`ConfigureCommand::for_config`] and render into the script with
/// [`render`](Self::render), or inspect [`args`](Self::args) in tests.
#[derive(Debug, Clone)]
pub struct ConfigureCommand {
    args: Vec<String>,
}

impl ConfigureCommand {
    /// Assemble the full argument list for a configuration.
    pub fn for_config(config: &BuildConfig) -> Self {
        let mut cmd = Self { args: Vec::new() };
        cmd.push_toolchain();
        cmd.push_output_kind(config.output);
        cmd.push_optimizations(&config.optimizations);
        cmd.push_baseline();
        cmd.push_components(config);
        cmd
    }

    fn arg(&mut self, arg: impl Into<String>) {
        self.args.push(arg.into());
    }

    /// Cross-compile flags and toolchain paths. Always first.
    fn push_toolchain(&mut self) {
        self.arg("--prefix=\"$PREFIX\"");
        self.arg("--enable-cross-compile");
        self.arg("--target-os=android");
        self.arg("--arch=$ARCH_NAME");
        self.arg("--cpu=$CPU");
        self.arg("--cc=\"$CC\"");
        self.arg("--cxx=\"$CXX\"");
        self.arg("--ar=\"$AR\"");
        self.arg("--ranlib=\"$RANLIB\"");
        self.arg("--strip=\"$STRIP\"");
        self.arg("--nm=\"$NM\"");
        self.arg("--host-cc=\"$HOSTCC\"");
        self.arg("--sysroot=\"$TOOLCHAIN/sysroot\"");
        self.arg("--extra-cflags=\"$EXTRA_CFLAGS\"");
    }

    /// Exactly one of the shared/static pairs, derived from the output kind.
    fn push_output_kind(&mut self, output: OutputKind) {
        match output {
            OutputKind::Shared => {
                self.arg("--enable-shared");
                self.arg("--disable-static");
            }
            OutputKind::Static => {
                self.arg("--disable-shared");
                self.arg("--enable-static");
            }
        }
    }

    /// Each enabled optimization flag, in fixed order.
    fn push_optimizations(&mut self, opt: &OptimizationFlags) {
        if opt.disable_asm {
            self.arg("--disable-asm");
        }
        if opt.enable_pic {
            self.arg("--enable-pic");
        }
        if opt.disable_debug {
            self.arg("--disable-debug");
        }
        if opt.disable_doc {
            self.arg("--disable-doc");
        }
        if opt.disable_programs {
            self.arg("--disable-programs");
        }
        if opt.enable_small {
            self.arg("--enable-small");
        }
    }

    /// Always-on flags: no symbol versioning, and everything off by default
    /// so the component lists are the single source of what gets built.
    fn push_baseline(&mut self) {
        self.arg("--disable-symver");
        self.arg("--disable-everything");
    }

    /// One enable flag per listed component, category order fixed, list
    /// order preserved. Empty categories emit nothing.
    fn push_components(&mut self, config: &BuildConfig) {
        for (noun, components) in component_categories(config) {
            for component in components {
                self.arg(format!("--enable-{}={}", noun, component));
            }
        }
    }

    /// The assembled arguments, in invocation order.
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Render as a backslash-continued `./configure` block for the script.
    pub fn render(&self, indent: &str, continuation_indent: &str) -> String {
        let mut lines = vec![format!("{}./configure \\", indent)];
        for (i, arg) in self.args.iter().enumerate() {
            if i + 1 == self.args.len() {
                lines.push(format!("{}{}", continuation_indent, arg));
            } else {
                lines.push(format!("{}{} \\", continuation_indent, arg));
            }
        }
        lines.join("\n")
    }
}

/// Renders the multi-architecture build script.
///
/// Pure text assembly plus one atomic write: the script is written to a
/// temporary file in the build directory and renamed into place, so a crash
/// mid-render can never leave a truncated script for the supervisor to
/// launch.
#[derive(Debug, Clone)]
pub struct ScriptRenderer {
    build_dir: Utf8PathBuf,
}

impl ScriptRenderer {
    pub fn new(build_dir: impl AsRef<Utf8Path>) -> Self {
        Self {
            build_dir: build_dir.as_ref().to_path_buf(),
        }
    }

    /// Render the script for `config` and write it to the build directory.
    pub fn render(&self, config: &BuildConfig) -> Result<RenderedScript, RenderError> {
        let contents = self.render_contents(config)?;
        let path = self.build_dir.join(SCRIPT_FILE_NAME);
        write_executable_atomic(&path, &contents)?;

        tracing::info!("Build script written to {}", path);
        Ok(RenderedScript { path, contents })
    }

    /// Assemble the script text without touching the filesystem.
    ///
    /// Deterministic for any valid configuration; Unix newlines throughout.
    pub fn render_contents(&self, config: &BuildConfig) -> Result<String, RenderError> {
        // Defensive re-check: every requested architecture must resolve in
        // the static table even though the enum should make this impossible.
        for abi in &config.architectures {
            if Abi::from_name(abi.name()).is_none() {
                return Err(RenderError::UnknownAbi(abi.name().to_string()));
            }
        }

        let sections = [
            self.header(config),
            self.environment_setup(),
            self.build_function(config),
            self.footer(config),
        ];
        Ok(sections.join("\n"))
    }

    /// Shebang, architecture table, build parameters, and the banner.
    fn header(&self, config: &BuildConfig) -> String {
        let arch_list = config
            .architectures
            .iter()
            .map(|abi| abi.name())
            .collect::<Vec<_>>()
            .join(" ");

        let mut arch_table = vec!["declare -A ARCH_CONFIG".to_string()];
        for abi in Abi::ALL {
            let spec = abi.spec();
            arch_table.push(format!(
                "ARCH_CONFIG[{}]=\"{} {} {}\"",
                abi.name(),
                spec.target_triple,
                spec.arch_name,
                spec.cpu
            ));
        }

        format!(
            r#"#!/bin/bash
# FFmpeg Android multi-architecture build script (generated by ffdroid, do not edit)

set -e

# Architecture table
{arch_table}

# Architectures to build
ARCHS="{arch_list}"
API={api}

echo "========================================="
echo "FFmpeg Android build"
echo "========================================="
echo "Target architectures: $ARCHS"
echo "Android API: $API"
echo "Output type: {output}"
echo "Decoders: {decoders}"
echo "Encoders: {encoders}"
echo "Filters: {filters}"
echo "=========================================""#,
            arch_table = arch_table.join("\n"),
            arch_list = arch_list,
            api = config.api,
            output = config.output,
            decoders = config.decoders.join(", "),
            encoders = config.encoders.join(", "),
            filters = config.filters.join(", "),
        )
    }

    /// Work-dir/NDK/toolchain variables and fail-fast prerequisite checks.
    fn environment_setup(&self) -> String {
        r#"
# Base environment
export WORK_DIR="$(pwd)"
export NDK_ROOT="$WORK_DIR/android-ndk"

case "$(uname -s)" in
    Linux*)  HOST_TAG="linux-x86_64" ;;
    Darwin*) HOST_TAG="darwin-x86_64" ;;
    *)       HOST_TAG="windows-x86_64" ;;
esac
export TOOLCHAIN="$NDK_ROOT/toolchains/llvm/prebuilt/$HOST_TAG"

# Translate to POSIX paths when running under an MSYS-style shell
if command -v cygpath >/dev/null 2>&1; then
    export NDK_ROOT=$(cygpath -u "$NDK_ROOT")
    export TOOLCHAIN=$(cygpath -u "$TOOLCHAIN")
fi

# Prerequisite checks
if [ ! -d "$NDK_ROOT" ]; then
    echo "Error: Android NDK directory not found: $NDK_ROOT"
    exit 1
fi

if [ ! -d "$TOOLCHAIN" ]; then
    echo "Error: toolchain directory not found: $TOOLCHAIN"
    exit 1
fi

if [ ! -d "ffmpeg" ]; then
    echo "Error: FFmpeg source directory not found"
    exit 1
fi"#
        .to_string()
    }

    /// The per-architecture build routine.
    fn build_function(&self, config: &BuildConfig) -> String {
        let configure = ConfigureCommand::for_config(config).render("    ", "        ");

        // Per-arch extra compiler flags, generated from the ABI table so the
        // case arms cannot drift from it.
        let mut cflags_arms = Vec::new();
        for abi in Abi::ALL {
            let spec = abi.spec();
            if !spec.extra_cflags.is_empty() {
                cflags_arms.push(format!(
                    "        \"{}\")\n            EXTRA_CFLAGS=\"{}\"\n            ;;",
                    abi.name(),
                    spec.extra_cflags
                ));
            }
        }

        format!(
            r#"
# Build routine for one architecture
build_for_arch() {{
    local ARCH=$1
    local CONFIG=(${{ARCH_CONFIG[$ARCH]}})
    local TARGET=${{CONFIG[0]}}
    local ARCH_NAME=${{CONFIG[1]}}
    local CPU=${{CONFIG[2]}}

    echo "========================================="
    echo "Building architecture: $ARCH"
    echo "Target: $TARGET"
    echo "CPU: $CPU"
    echo "========================================="

    # Per-arch install prefix
    export PREFIX="$WORK_DIR/ffmpeg-android-$ARCH"

    # Cross toolchain
    export CC="$TOOLCHAIN/bin/${{TARGET}}${{API}}-clang"
    export CXX="$TOOLCHAIN/bin/${{TARGET}}${{API}}-clang++"
    export AR="$TOOLCHAIN/bin/llvm-ar"
    export RANLIB="$TOOLCHAIN/bin/llvm-ranlib"
    export STRIP="$TOOLCHAIN/bin/llvm-strip"
    export NM="$TOOLCHAIN/bin/llvm-nm"

    # Host compiler for configure's native helpers
    export HOSTCC="gcc"

    if [ ! -f "$CC" ]; then
        echo "Error: compiler not found: $CC"
        return 1
    fi

    echo "Using compiler: $CC"
    echo "Install prefix: $PREFIX"

    cd ffmpeg

    # Clean previous build state
    make distclean 2>/dev/null || true

    local EXTRA_CFLAGS=""
    case $ARCH in
{cflags_arms}
    esac

    echo "Running FFmpeg configure for $ARCH..."
{configure}

    echo "Configure finished, running make -j$(nproc) for $ARCH..."
    make -j$(nproc)
    echo "Running make install for $ARCH..."
    make install

    echo "$ARCH build done"
    echo "Libraries installed in: $PREFIX"
    ls -la "$PREFIX/lib/" 2>/dev/null || true

    cd ..
}}"#,
            cflags_arms = cflags_arms.join("\n"),
            configure = configure,
        )
    }

    /// The driver loop and the per-architecture result manifest.
    fn footer(&self, config: &BuildConfig) -> String {
        format!(
            r#"
# Build every requested architecture
for ARCH in $ARCHS; do
    if [[ ! ${{ARCH_CONFIG[$ARCH]+_}} ]]; then
        echo "Error: unsupported architecture $ARCH"
        echo "Supported architectures: ${{!ARCH_CONFIG[@]}}"
        exit 1
    fi

    build_for_arch $ARCH
    echo ""
done

echo "========================================="
echo "All architectures built successfully"
echo "========================================="

# Result manifest
for ARCH in $ARCHS; do
    PREFIX="$WORK_DIR/ffmpeg-android-$ARCH"
    if [ -d "$PREFIX" ]; then
        echo "$ARCH: $PREFIX"
        echo "  shared libraries: $(ls "$PREFIX/lib/"*.so 2>/dev/null | wc -l)"
        echo "  headers: $(find "$PREFIX/include" -name "*.h" 2>/dev/null | wc -l)"
    fi
done

echo ""
echo "Done: built {count} architecture(s)"
"#,
            count = config.architectures.len(),
        )
    }
}

/// Write `contents` to `path` atomically (temp file + rename) and mark the
/// result executable. Parent directories are created as needed.
fn write_executable_atomic(path: &Utf8Path, contents: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let tmp = path.with_extension("sh.tmp");
    fs::write(&tmp, contents.as_bytes())?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&tmp, fs::Permissions::from_mode(0o755))?;
    }

    fs::rename(&tmp, path)?;
    Ok(())
}
