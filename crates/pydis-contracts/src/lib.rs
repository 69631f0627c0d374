//! Shared, version-pinned protocol identifiers.
//!
//! These constants are the single source of truth for schema/version strings that
//! appear in machine-readable output, and for the exit statuses exchanged with the
//! external decompiler.

pub const PYDIS_RUN_REPORT_SCHEMA_VERSION: &str = "pydis.run.report@0.1.0";
pub const PYDIS_SUITE_LIST_SCHEMA_VERSION: &str = "pydis.suite.list@0.1.0";

/// Decompiler exit status for a file that decompiled and round-tripped.
pub const DECOMPILER_EXIT_OK: i32 = 0;

/// Decompiler exit status for a file that decompiled but failed verification.
///
/// Only meaningful when the decompiler was invoked with `--verify`; without it the
/// status is treated like any other failure.
pub const DECOMPILER_EXIT_VERIFY_FAILED: i32 = 3;
