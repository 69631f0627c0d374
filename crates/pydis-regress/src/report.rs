use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use pydis_contracts::{PYDIS_RUN_REPORT_SCHEMA_VERSION, PYDIS_SUITE_LIST_SCHEMA_VERSION};
use pydis_regress_core::{
    FailurePolicy, MissingSuite, Registry, RunFailure, RunSummary, SuiteRecord, VersionConflict,
};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct ToolInfo {
    pub name: String,
    pub version: String,
}

impl ToolInfo {
    fn current() -> Self {
        Self {
            name: "pydis-regress".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct InvocationInfo {
    pub argv: Vec<String>,
    pub cwd: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_base: Option<String>,
    pub compile: bool,
    pub verify: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_with: Option<String>,
    pub policy: FailurePolicy,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport<'a> {
    pub schema_version: &'static str,
    pub tool: ToolInfo,
    pub invocation: InvocationInfo,
    pub summary: RunSummary,
    pub exit_code: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<&'a RunFailure>,
    #[serde(skip_serializing_if = "is_empty_slice")]
    pub missing: &'a [MissingSuite],
    #[serde(skip_serializing_if = "is_empty_slice")]
    pub version_conflicts: &'a [VersionConflict],
    pub suites: &'a [SuiteRecord],
}

impl<'a> RunReport<'a> {
    pub fn new(
        invocation: InvocationInfo,
        summary: RunSummary,
        exit_code: u8,
        failure: Option<&'a RunFailure>,
        missing: &'a [MissingSuite],
        version_conflicts: &'a [VersionConflict],
        suites: &'a [SuiteRecord],
    ) -> Self {
        Self {
            schema_version: PYDIS_RUN_REPORT_SCHEMA_VERSION,
            tool: ToolInfo::current(),
            invocation,
            summary,
            exit_code,
            failure,
            missing,
            version_conflicts,
            suites,
        }
    }
}

fn is_empty_slice<T>(s: &&[T]) -> bool {
    s.is_empty()
}

pub fn write_report(path: &Path, report: &RunReport<'_>) -> Result<()> {
    let json = serde_json::to_string(report)? + "\n";
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create report dir: {}", parent.display()))?;
        }
    }
    std::fs::write(path, json.as_bytes())
        .with_context(|| format!("write report: {}", path.display()))
}

#[derive(Debug, Clone, Serialize)]
struct SuiteListEntry<'a> {
    name: &'a str,
    source_root: &'a PathBuf,
    exists: bool,
    file_patterns: &'a [String],
    output_subdir: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    required_version: Option<&'a str>,
}

#[derive(Debug, Clone, Serialize)]
struct SuiteList<'a> {
    schema_version: &'static str,
    suites: Vec<SuiteListEntry<'a>>,
}

pub fn suite_list_json(registry: &Registry) -> Result<String> {
    let suites = registry
        .iter()
        .map(|s| SuiteListEntry {
            name: &s.name,
            source_root: &s.source_root,
            exists: s.source_root.is_dir(),
            file_patterns: &s.file_patterns,
            output_subdir: &s.output_subdir,
            required_version: s.required_version.as_deref(),
        })
        .collect();
    let doc = SuiteList {
        schema_version: PYDIS_SUITE_LIST_SCHEMA_VERSION,
        suites,
    };
    Ok(serde_json::to_string(&doc)?)
}
