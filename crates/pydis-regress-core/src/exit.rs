use std::fmt;

use serde::Serialize;

use crate::orchestrator::RunResult;

pub const EXIT_OK: u8 = 0;
pub const EXIT_FATAL: u8 = 1;
pub const EXIT_DECOMPILE_FAILED: u8 = 2;
pub const EXIT_VERIFY_FAILED: u8 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// A suite name that is not in the registry.
    UnknownSuite,
    /// Resolution left nothing to run.
    NoSuites,
    /// A suite selected zero input files.
    NoFiles,
    /// SIGINT while compiling, selecting, or decompiling.
    Interrupted,
    /// OS-level failure: spawn errors, unwritable output, compiler environment errors.
    Environment,
    DecompileFailed,
    VerifyFailed,
}

impl FailureKind {
    pub fn as_str(self) -> &'static str {
        match self {
            FailureKind::UnknownSuite => "unknown_suite",
            FailureKind::NoSuites => "no_suites",
            FailureKind::NoFiles => "no_files",
            FailureKind::Interrupted => "interrupted",
            FailureKind::Environment => "environment",
            FailureKind::DecompileFailed => "decompile_failed",
            FailureKind::VerifyFailed => "verify_failed",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A run-level failure. Every fatal condition ends the whole run.
#[derive(Debug, Clone, Serialize)]
pub struct RunFailure {
    pub kind: FailureKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suite: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub counts: Option<RunResult>,
    pub message: String,
}

impl RunFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            suite: None,
            counts: None,
            message: message.into(),
        }
    }

    pub fn in_suite(mut self, suite: impl Into<String>) -> Self {
        self.suite = Some(suite.into());
        self
    }

    pub fn with_counts(mut self, counts: RunResult) -> Self {
        self.counts = Some(counts);
        self
    }

    pub fn exit_code(&self) -> u8 {
        ExitFacts::from_outcome(Some(self)).exit_code()
    }

    /// Failure for a suite whose pipeline reported failed files, or `None` when it was
    /// clean. Decompile failures take precedence over verify failures.
    pub fn from_counts(suite: &str, counts: RunResult) -> Option<Self> {
        let kind = if counts.failed_decompile != 0 {
            FailureKind::DecompileFailed
        } else if counts.failed_verify != 0 {
            FailureKind::VerifyFailed
        } else {
            return None;
        };
        let message = format!(
            "suite {suite}: {} of {} files failed to decompile, {} failed verification",
            counts.failed_decompile, counts.files_attempted, counts.failed_verify
        );
        Some(
            RunFailure::new(kind, message)
                .in_suite(suite)
                .with_counts(counts),
        )
    }
}

impl fmt::Display for RunFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for RunFailure {}

/// The observable facts a run ends with; [`ExitFacts::exit_code`] is the whole exit
/// policy as a pure function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExitFacts {
    pub suites_resolved: bool,
    pub files_found: bool,
    pub failed_decompile: u64,
    pub failed_verify: u64,
    /// Interrupted, or stopped by an OS-level error.
    pub interrupted: bool,
}

impl ExitFacts {
    /// The facts a run outcome stands for; `None` is a run where every suite was clean.
    pub fn from_outcome(failure: Option<&RunFailure>) -> Self {
        let clean = ExitFacts {
            suites_resolved: true,
            files_found: true,
            ..ExitFacts::default()
        };
        let Some(failure) = failure else {
            return clean;
        };
        let counts = failure.counts.unwrap_or_default();
        match failure.kind {
            FailureKind::UnknownSuite | FailureKind::NoSuites => ExitFacts {
                suites_resolved: false,
                ..clean
            },
            FailureKind::NoFiles => ExitFacts {
                files_found: false,
                ..clean
            },
            FailureKind::Interrupted | FailureKind::Environment => ExitFacts {
                interrupted: true,
                ..clean
            },
            FailureKind::DecompileFailed => ExitFacts {
                failed_decompile: counts.failed_decompile.max(1),
                failed_verify: counts.failed_verify,
                ..clean
            },
            FailureKind::VerifyFailed => ExitFacts {
                failed_verify: counts.failed_verify.max(1),
                ..clean
            },
        }
    }

    pub fn exit_code(&self) -> u8 {
        if !self.suites_resolved || self.interrupted || !self.files_found {
            return EXIT_FATAL;
        }
        if self.failed_decompile != 0 {
            return EXIT_DECOMPILE_FAILED;
        }
        if self.failed_verify != 0 {
            return EXIT_VERIFY_FAILED;
        }
        EXIT_OK
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn facts(
        suites_resolved: bool,
        files_found: bool,
        failed_decompile: u64,
        failed_verify: u64,
        interrupted: bool,
    ) -> ExitFacts {
        ExitFacts {
            suites_resolved,
            files_found,
            failed_decompile,
            failed_verify,
            interrupted,
        }
    }

    #[test]
    fn exit_code_table() {
        assert_eq!(facts(true, true, 0, 0, false).exit_code(), 0);
        assert_eq!(facts(true, true, 3, 0, false).exit_code(), 2);
        assert_eq!(facts(true, true, 3, 5, false).exit_code(), 2);
        assert_eq!(facts(true, true, 0, 1, false).exit_code(), 3);
        assert_eq!(facts(true, false, 0, 0, false).exit_code(), 1);
        assert_eq!(facts(true, false, 4, 4, false).exit_code(), 1);
        assert_eq!(facts(false, true, 0, 0, false).exit_code(), 1);
        assert_eq!(facts(true, true, 2, 0, true).exit_code(), 1);
    }

    #[test]
    fn every_failure_kind_maps_through_the_table() {
        let cases = [
            (FailureKind::UnknownSuite, EXIT_FATAL),
            (FailureKind::NoSuites, EXIT_FATAL),
            (FailureKind::NoFiles, EXIT_FATAL),
            (FailureKind::Interrupted, EXIT_FATAL),
            (FailureKind::Environment, EXIT_FATAL),
            (FailureKind::DecompileFailed, EXIT_DECOMPILE_FAILED),
            (FailureKind::VerifyFailed, EXIT_VERIFY_FAILED),
        ];
        for (kind, want) in cases {
            let failure = RunFailure::new(kind, "x");
            assert_eq!(failure.exit_code(), want, "{kind}");
            assert_eq!(
                ExitFacts::from_outcome(Some(&failure)).exit_code(),
                want,
                "{kind}"
            );
        }
        assert_eq!(ExitFacts::from_outcome(None).exit_code(), EXIT_OK);
    }

    #[test]
    fn counted_failures_agree_with_facts_from_counts() {
        for (failed_decompile, failed_verify) in [(0, 0), (3, 0), (0, 1), (2, 5)] {
            let counts = RunResult {
                files_attempted: 10,
                okay: 10 - failed_decompile - failed_verify,
                failed_decompile,
                failed_verify,
            };
            let from_counts = RunFailure::from_counts("s", counts);
            let direct = facts(true, true, failed_decompile, failed_verify, false).exit_code();
            assert_eq!(
                ExitFacts::from_outcome(from_counts.as_ref()).exit_code(),
                direct
            );
        }
    }

    #[test]
    fn from_counts_prefers_decompile_failures() {
        let counts = RunResult {
            files_attempted: 4,
            okay: 1,
            failed_decompile: 2,
            failed_verify: 1,
        };
        let f = RunFailure::from_counts("s", counts).unwrap();
        assert_eq!(f.kind, FailureKind::DecompileFailed);
        assert_eq!(f.suite.as_deref(), Some("s"));

        let counts = RunResult {
            files_attempted: 4,
            okay: 3,
            failed_decompile: 0,
            failed_verify: 1,
        };
        assert_eq!(
            RunFailure::from_counts("s", counts).unwrap().kind,
            FailureKind::VerifyFailed
        );

        let clean = RunResult {
            files_attempted: 4,
            okay: 4,
            failed_decompile: 0,
            failed_verify: 0,
        };
        assert!(RunFailure::from_counts("s", clean).is_none());
    }
}
