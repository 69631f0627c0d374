use std::path::{Path, PathBuf};
use std::time::Instant;

use serde::Serialize;

use crate::compile::{compile_tree, CompileError, CompileOutcome, Compiler};
use crate::exit::{FailureKind, RunFailure};
use crate::interrupt;
use crate::pipeline::{DecompilePipeline, PipelineError, PipelineJob};
use crate::registry::TestSuiteSpec;
use crate::select::{apply_start_with, select_files, StartWith};

/// What happens after a suite reports failed files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// The first failing suite ends the run.
    #[default]
    FailFast,
    /// Every suite runs; the run then fails with the worst outcome seen.
    KeepGoing,
}

#[derive(Debug, Clone)]
pub struct RunConfig {
    pub do_compile: bool,
    pub do_verify: bool,
    pub start_with: Option<String>,
    pub suites: Vec<TestSuiteSpec>,
    /// Process-lifetime temporary root; each suite writes to `output_base/<output_subdir>`.
    pub output_base: PathBuf,
    pub policy: FailurePolicy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct RunResult {
    pub files_attempted: u64,
    pub okay: u64,
    pub failed_decompile: u64,
    pub failed_verify: u64,
}

impl RunResult {
    fn add(&mut self, other: &RunResult) {
        self.files_attempted += other.files_attempted;
        self.okay += other.okay;
        self.failed_decompile += other.failed_decompile;
        self.failed_verify += other.failed_verify;
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SuiteRecord {
    pub name: String,
    pub source_root: PathBuf,
    pub output_dir: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compile: Option<CompileOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resumed_at: Option<String>,
    pub result: RunResult,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct RunSummary {
    pub suites: usize,
    #[serde(flatten)]
    pub totals: RunResult,
}

pub struct Orchestrator<'a> {
    config: RunConfig,
    compiler: &'a dyn Compiler,
    pipeline: &'a dyn DecompilePipeline,
    records: Vec<SuiteRecord>,
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        config: RunConfig,
        compiler: &'a dyn Compiler,
        pipeline: &'a dyn DecompilePipeline,
    ) -> Self {
        Self {
            config,
            compiler,
            pipeline,
            records: Vec::new(),
        }
    }

    /// Suites that ran to the end of the pipeline, including the one that failed the run.
    pub fn records(&self) -> &[SuiteRecord] {
        &self.records
    }

    pub fn summary(&self) -> RunSummary {
        let mut totals = RunResult::default();
        for r in &self.records {
            totals.add(&r.result);
        }
        RunSummary {
            suites: self.records.len(),
            totals,
        }
    }

    /// Runs every configured suite in order.
    pub fn run(&mut self) -> Result<RunSummary, RunFailure> {
        if self.config.suites.is_empty() {
            return Err(RunFailure::new(
                FailureKind::NoSuites,
                "No directories found to check",
            ));
        }

        let suites = self.config.suites.clone();
        for suite in &suites {
            let record = self.run_suite(suite)?;
            let failure = RunFailure::from_counts(&record.name, record.result);
            self.records.push(record);
            if let Some(failure) = failure {
                if self.config.policy == FailurePolicy::FailFast {
                    return Err(failure);
                }
            }
        }

        if let Some(failure) = self.aggregate_failure() {
            return Err(failure);
        }
        Ok(self.summary())
    }

    fn aggregate_failure(&self) -> Option<RunFailure> {
        let failed: Vec<&str> = self
            .records
            .iter()
            .filter(|r| r.result.failed_decompile != 0 || r.result.failed_verify != 0)
            .map(|r| r.name.as_str())
            .collect();
        if failed.is_empty() {
            return None;
        }
        let totals = self.summary().totals;
        let mut failure = RunFailure::from_counts(&failed.join(", "), totals)?;
        failure.message = format!(
            "{} of {} suites failed ({}): {} files failed to decompile, {} failed verification",
            failed.len(),
            self.records.len(),
            failed.join(", "),
            totals.failed_decompile,
            totals.failed_verify
        );
        if failed.len() > 1 {
            failure.suite = None;
        }
        Some(failure)
    }

    fn run_suite(&self, suite: &TestSuiteSpec) -> Result<SuiteRecord, RunFailure> {
        let started = Instant::now();
        let env_failure = |err: anyhow::Error| {
            RunFailure::new(FailureKind::Environment, format!("{err:#}")).in_suite(&suite.name)
        };

        let output_dir = prepare_output_dir(&self.config.output_base, &suite.output_subdir);
        let patterns = suite.patterns().map_err(env_failure)?;

        let compile = if self.config.do_compile {
            let outcome = compile_tree(
                &suite.source_root,
                suite.required_version.as_deref(),
                self.compiler,
            )
            .map_err(|err| match err {
                CompileError::Interrupted => interrupted(suite),
                CompileError::Io(err) => env_failure(err),
            })?;
            if let CompileOutcome::Skipped { required, running } = &outcome {
                eprintln!(
                    "Not compiling: desired Python version is {required} but we are running {running}"
                );
            }
            Some(outcome)
        } else {
            None
        };
        check_interrupt(suite)?;

        let files = select_files(&suite.source_root, &patterns);
        if files.is_empty() {
            return Err(RunFailure::new(
                FailureKind::NoFiles,
                format!(
                    "Didn't come up with any files to test in {}! Try with --compile?",
                    suite.source_root.display()
                ),
            )
            .in_suite(&suite.name));
        }
        let StartWith { files, resumed_at } =
            apply_start_with(files, self.config.start_with.as_deref());
        if let Some(first) = &resumed_at {
            println!(">>> starting with file {first}");
        }
        check_interrupt(suite)?;

        println!("Suite:             {}", suite.name);
        println!("Source directory:  {}", suite.source_root.display());
        println!("Output directory:  {}", output_dir.display());

        let job = PipelineJob {
            source_root: &suite.source_root,
            output_root: &output_dir,
            files: &files,
            verify: self.config.do_verify,
        };
        let summary = match self.pipeline.run(&job) {
            Ok(summary) => summary,
            Err(PipelineError::Interrupted) => return Err(interrupted(suite)),
            Err(PipelineError::Io(err)) => return Err(env_failure(err)),
        };
        check_interrupt(suite)?;

        Ok(SuiteRecord {
            name: suite.name.clone(),
            source_root: suite.source_root.clone(),
            output_dir,
            compile,
            resumed_at,
            result: RunResult {
                files_attempted: files.len() as u64,
                okay: summary.okay,
                failed_decompile: summary.failed_decompile,
                failed_verify: summary.failed_verify,
            },
            duration_ms: started.elapsed().as_millis() as u64,
        })
    }
}

/// `base/subdir`, with any previous contents removed. Removal is best-effort.
pub fn prepare_output_dir(base: &Path, subdir: &str) -> PathBuf {
    let dir = base.join(subdir);
    if dir.exists() {
        rm_rf(&dir);
    }
    dir
}

fn rm_rf(path: &Path) {
    let _ = std::fs::remove_dir_all(path);
}

fn interrupted(suite: &TestSuiteSpec) -> RunFailure {
    RunFailure::new(FailureKind::Interrupted, "interrupted").in_suite(&suite.name)
}

fn check_interrupt(suite: &TestSuiteSpec) -> Result<(), RunFailure> {
    if interrupt::requested() {
        return Err(interrupted(suite));
    }
    Ok(())
}
