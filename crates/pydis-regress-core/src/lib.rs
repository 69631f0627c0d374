//! Test-matrix orchestration for decompiler regression runs.
//!
//! A run resolves named corpora from the [`registry`], optionally recompiles their
//! sources ([`compile`]), selects bytecode inputs ([`select`]), and hands them to a
//! [`pipeline::DecompilePipeline`]. The [`orchestrator`] sequences those steps per
//! suite and reports the first failure (or the worst one, with
//! [`orchestrator::FailurePolicy::KeepGoing`]) as a [`exit::RunFailure`] whose kind
//! maps to the process exit status.

pub mod compile;
pub mod delegate;
pub mod exit;
pub mod interrupt;
pub mod orchestrator;
pub mod pipeline;
pub mod registry;
pub mod select;
pub mod versions;

pub use compile::{
    compile_tree, CompileError, CompileOutcome, CompileStatus, Compiler, PythonCompiler,
};
pub use exit::{ExitFacts, FailureKind, RunFailure};
pub use orchestrator::{FailurePolicy, Orchestrator, RunConfig, RunResult, RunSummary, SuiteRecord};
pub use pipeline::{
    CommandPipeline, DecompilePipeline, PipelineError, PipelineJob, PipelineSummary,
};
pub use registry::{MissingSuite, Registry, Resolved, TestSuiteSpec};
pub use select::{apply_start_with, select_files, FilePatterns, StartWith};
pub use versions::{check_versions, VersionConflict};
