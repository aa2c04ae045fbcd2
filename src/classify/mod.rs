//! Build-output classification.
//!
//! Maps one raw line of build output to a severity and, independently, an
//! optional progress event. Classification is stateless and table-driven:
//! severity comes from fixed keyword sets checked in precedence order, and
//! progress from an ordered marker table, so new markers are added by
//! extending the tables rather than the control flow.

use crate::models::{Abi, Severity};
use regex::Regex;

/// Keywords that mark a line as an error. Checked first; precedence over
/// every other set.
const ERROR_KEYWORDS: &[&str] = &["error", "failed", "fatal"];

/// Keywords that mark a line as a warning. Checked after errors.
const WARNING_KEYWORDS: &[&str] = &["warning", "warn"];

/// Keywords that mark a line as a success report.
const SUCCESS_KEYWORDS: &[&str] = &["success", "completed", "done"];

/// A stage transition recognized in the build output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressEvent {
    /// The per-architecture compile loop reached the named ABI.
    Compiling(Abi),
    Configuring,
    Building,
    Installing,
    Completed,
}

/// Result of classifying one line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub severity: Severity,
    pub progress: Option<ProgressEvent>,
}

/// One entry of the progress-marker table: a stage is recognized when every
/// needle occurs in the (lowercased) line.
struct MarkerRule {
    needles: &'static [&'static str],
    event: ProgressEvent,
}

/// Stateless classifier for build-output lines.
///
/// Patterns are compiled once at construction. Matching is case-insensitive
/// substring matching; the per-architecture marker is extracted with a regex
/// so the ABI name travels with the event.
pub struct OutputClassifier {
    /// Matches the compile-loop banner, capturing the architecture name.
    arch_marker: Regex,

    /// Stage markers, in priority order. First match wins.
    markers: Vec<MarkerRule>,
}

impl OutputClassifier {
    pub fn new() -> Self {
        Self {
            arch_marker: Regex::new(r"building architecture:\s*([a-z0-9_-]+)")
                .expect("invalid architecture marker regex"),
            markers: vec![
                MarkerRule {
                    needles: &["ffmpeg", "configure"],
                    event: ProgressEvent::Configuring,
                },
                MarkerRule {
                    needles: &["make -j"],
                    event: ProgressEvent::Building,
                },
                MarkerRule {
                    needles: &["compiling"],
                    event: ProgressEvent::Building,
                },
                MarkerRule {
                    needles: &["make install"],
                    event: ProgressEvent::Installing,
                },
                MarkerRule {
                    needles: &["installing"],
                    event: ProgressEvent::Installing,
                },
                MarkerRule {
                    needles: &["all architectures built"],
                    event: ProgressEvent::Completed,
                },
            ],
        }
    }

    /// Classify one line into a severity and an optional progress event.
    pub fn classify(&self, line: &str) -> Classification {
        let lowered = line.to_lowercase();
        Classification {
            severity: self.severity(&lowered),
            progress: self.progress(&lowered),
        }
    }

    /// Severity by keyword sets, in precedence order error > warning >
    /// success > info, so a line carrying both error and success keywords
    /// classifies as an error.
    fn severity(&self, lowered: &str) -> Severity {
        if ERROR_KEYWORDS.iter().any(|kw| lowered.contains(kw)) {
            Severity::Error
        } else if WARNING_KEYWORDS.iter().any(|kw| lowered.contains(kw)) {
            Severity::Warning
        } else if SUCCESS_KEYWORDS.iter().any(|kw| lowered.contains(kw)) {
            Severity::Success
        } else {
            Severity::Info
        }
    }

    /// Progress extraction, independent of severity. The per-architecture
    /// marker has priority over the generic stage markers.
    fn progress(&self, lowered: &str) -> Option<ProgressEvent> {
        if let Some(caps) = self.arch_marker.captures(lowered) {
            if let Some(abi) = Abi::from_name(&caps[1]) {
                return Some(ProgressEvent::Compiling(abi));
            }
        }

        self.markers
            .iter()
            .find(|rule| rule.needles.iter().all(|needle| lowered.contains(needle)))
            .map(|rule| rule.event)
    }
}

impl Default for OutputClassifier {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_keywords() {
        let c = OutputClassifier::new();
        assert_eq!(c.classify("undefined reference ERROR").severity, Severity::Error);
        assert_eq!(c.classify("link failed").severity, Severity::Error);
        assert_eq!(c.classify("fatal: not a git repository").severity, Severity::Error);
    }

    #[test]
    fn test_error_takes_precedence_over_success() {
        let c = OutputClassifier::new();
        // Both "failed" and "completed" present.
        assert_eq!(
            c.classify("build failed: 0 completed").severity,
            Severity::Error
        );
    }

    #[test]
    fn test_warning_after_error() {
        let c = OutputClassifier::new();
        assert_eq!(c.classify("Warning: deprecated option").severity, Severity::Warning);
        // Error keyword wins even when a warning keyword is present.
        assert_eq!(
            c.classify("warning treated as error").severity,
            Severity::Error
        );
    }

    #[test]
    fn test_success_and_info() {
        let c = OutputClassifier::new();
        assert_eq!(c.classify("arm64-v8a build done").severity, Severity::Success);
        assert_eq!(c.classify("checking for nasm").severity, Severity::Info);
    }

    #[test]
    fn test_matching_is_case_insensitive() {
        let c = OutputClassifier::new();
        assert_eq!(c.classify("FAILED").severity, Severity::Error);
        assert_eq!(c.classify("WARNING").severity, Severity::Warning);
    }

    #[test]
    fn test_arch_marker_extracts_abi() {
        let c = OutputClassifier::new();
        for abi in Abi::ALL {
            let line = format!("Building architecture: {}", abi.name());
            assert_eq!(
                c.classify(&line).progress,
                Some(ProgressEvent::Compiling(abi))
            );
        }
    }

    #[test]
    fn test_unknown_arch_marker_yields_no_event() {
        let c = OutputClassifier::new();
        assert_eq!(c.classify("Building architecture: mips").progress, None);
    }

    #[test]
    fn test_stage_markers() {
        let c = OutputClassifier::new();
        assert_eq!(
            c.classify("Running FFmpeg configure for arm64-v8a...").progress,
            Some(ProgressEvent::Configuring)
        );
        assert_eq!(
            c.classify("Configure finished, running make -j8 for arm64-v8a...").progress,
            Some(ProgressEvent::Building)
        );
        assert_eq!(
            c.classify("Running make install for arm64-v8a...").progress,
            Some(ProgressEvent::Installing)
        );
        assert_eq!(
            c.classify("All architectures built successfully").progress,
            Some(ProgressEvent::Completed)
        );
    }

    #[test]
    fn test_plain_lines_produce_no_progress() {
        let c = OutputClassifier::new();
        assert_eq!(c.classify("CC libavcodec/h264dec.o").progress, None);
        assert_eq!(c.classify("").progress, None);
    }

    #[test]
    fn test_progress_is_independent_of_severity() {
        let c = OutputClassifier::new();
        let result = c.classify("Running make install failed for x86");
        assert_eq!(result.severity, Severity::Error);
        assert_eq!(result.progress, Some(ProgressEvent::Installing));
    }
}
