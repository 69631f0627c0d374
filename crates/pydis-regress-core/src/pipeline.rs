use std::ffi::{OsStr, OsString};
use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::Context;
use pydis_contracts::{DECOMPILER_EXIT_OK, DECOMPILER_EXIT_VERIFY_FAILED};
use serde::Serialize;

use crate::delegate::{self, DelegateCaptured, Termination};
use crate::interrupt;

/// One suite's worth of work for the decompiler.
#[derive(Debug, Clone)]
pub struct PipelineJob<'a> {
    pub source_root: &'a Path,
    pub output_root: &'a Path,
    pub files: &'a [String],
    pub verify: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct PipelineSummary {
    pub total: u64,
    pub okay: u64,
    pub failed_decompile: u64,
    pub failed_verify: u64,
}

#[derive(Debug)]
pub enum PipelineError {
    Interrupted,
    Io(anyhow::Error),
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineError::Interrupted => f.write_str("interrupted"),
            PipelineError::Io(err) => write!(f, "{err:#}"),
        }
    }
}

impl std::error::Error for PipelineError {}

impl From<anyhow::Error> for PipelineError {
    fn from(err: anyhow::Error) -> Self {
        PipelineError::Io(err)
    }
}

/// Decompile+verify boundary. Per-file failures are counted in the summary; only
/// environment-level problems and interruption come back as `Err`.
pub trait DecompilePipeline {
    fn run(&self, job: &PipelineJob<'_>) -> Result<PipelineSummary, PipelineError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileStatus {
    Okay,
    DecompileFailed,
    VerifyFailed,
    Interrupted,
}

pub fn classify(term: Termination, verify: bool) -> FileStatus {
    match term {
        Termination::Code(DECOMPILER_EXIT_OK) => FileStatus::Okay,
        Termination::Code(DECOMPILER_EXIT_VERIFY_FAILED) if verify => FileStatus::VerifyFailed,
        Termination::Interrupted => FileStatus::Interrupted,
        Termination::Code(_) | Termination::Signal(_) => FileStatus::DecompileFailed,
    }
}

/// Where the decompiled source for `rel` lands: `x.pyc`/`x.pyo` become `x.py`, anything
/// else gets a `_dis` suffix.
pub fn output_rel_path(rel: &str) -> String {
    if let Some(stem) = rel
        .strip_suffix(".pyc")
        .or_else(|| rel.strip_suffix(".pyo"))
    {
        return format!("{stem}.py");
    }
    format!("{rel}_dis")
}

/// Runs an external decompiler once per file:
/// `<decompiler> [extra args] [--verify] -o <output> <input>`.
#[derive(Debug, Clone)]
pub struct CommandPipeline {
    decompiler: OsString,
    extra_args: Vec<OsString>,
    verbose: bool,
}

impl CommandPipeline {
    pub fn new(decompiler: impl Into<OsString>) -> Self {
        Self {
            decompiler: decompiler.into(),
            extra_args: Vec::new(),
            verbose: false,
        }
    }

    pub fn with_args(mut self, args: Vec<OsString>) -> Self {
        self.extra_args = args;
        self
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    fn run_one(
        &self,
        input: &Path,
        output: &Path,
        verify: bool,
    ) -> Result<(FileStatus, Vec<u8>), PipelineError> {
        let mut args: Vec<&OsStr> = self.extra_args.iter().map(OsString::as_os_str).collect();
        if verify {
            args.push(OsStr::new("--verify"));
        }
        args.push(OsStr::new("-o"));
        args.push(output.as_os_str());
        args.push(input.as_os_str());

        match delegate::run_capture(&self.decompiler, &args)? {
            DelegateCaptured::Output(out) => {
                let status = classify(delegate::termination(&out.status), verify);
                Ok((status, out.stderr))
            }
            DelegateCaptured::NotFound => Err(PipelineError::Io(anyhow::anyhow!(
                "decompiler not found: {} (pass --decompiler or set PYDIS_DECOMPILER)",
                self.decompiler.to_string_lossy()
            ))),
        }
    }
}

impl DecompilePipeline for CommandPipeline {
    fn run(&self, job: &PipelineJob<'_>) -> Result<PipelineSummary, PipelineError> {
        std::fs::create_dir_all(job.output_root)
            .with_context(|| format!("create output dir: {}", job.output_root.display()))?;

        let mut summary = PipelineSummary::default();
        for rel in job.files {
            if interrupt::requested() {
                return Err(PipelineError::Interrupted);
            }
            let input = job.source_root.join(rel);
            let output: PathBuf = job.output_root.join(output_rel_path(rel));
            if let Some(parent) = output.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("create output dir: {}", parent.display()))?;
            }

            let (status, stderr) = self.run_one(&input, &output, job.verify)?;
            // SIGINT reaches the decompiler too; its exit status no longer counts.
            if interrupt::requested() {
                return Err(PipelineError::Interrupted);
            }
            summary.total += 1;
            match status {
                FileStatus::Okay => {
                    summary.okay += 1;
                    if self.verbose {
                        eprintln!("ok\t{rel}");
                    }
                }
                FileStatus::DecompileFailed => {
                    summary.failed_decompile += 1;
                    eprintln!("# decompile failed\t{rel}");
                }
                FileStatus::VerifyFailed => {
                    summary.failed_verify += 1;
                    eprintln!("# verify failed\t{rel}");
                }
                FileStatus::Interrupted => return Err(PipelineError::Interrupted),
            }
            if self.verbose && status != FileStatus::Okay && !stderr.is_empty() {
                eprintln!("{}", delegate::tail_lines(&stderr, 20));
            }
        }

        println!(
            "# decompiled {} files: {} okay, {} failed, {} verify failed",
            summary.total, summary.okay, summary.failed_decompile, summary.failed_verify
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_names_follow_bytecode_suffix() {
        assert_eq!(output_rel_path("a.pyc"), "a.py");
        assert_eq!(output_rel_path("pkg/b.pyo"), "pkg/b.py");
        assert_eq!(output_rel_path("c.bin"), "c.bin_dis");
    }

    #[test]
    fn classify_exit_statuses() {
        assert_eq!(classify(Termination::Code(0), true), FileStatus::Okay);
        assert_eq!(classify(Termination::Code(3), true), FileStatus::VerifyFailed);
        assert_eq!(classify(Termination::Code(3), false), FileStatus::DecompileFailed);
        assert_eq!(classify(Termination::Code(1), true), FileStatus::DecompileFailed);
        assert_eq!(classify(Termination::Signal(9), true), FileStatus::DecompileFailed);
        assert_eq!(classify(Termination::Interrupted, false), FileStatus::Interrupted);
    }
}
