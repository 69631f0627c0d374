// The interrupt flag is process-wide, so this file holds a single test.

use std::cell::Cell;
use std::path::Path;

use anyhow::Result;
use pydis_regress_core::{
    interrupt, CompileStatus, Compiler, DecompilePipeline, FailureKind, FailurePolicy,
    Orchestrator, PipelineError, PipelineJob, PipelineSummary, RunConfig, TestSuiteSpec,
};

/// Compiles everything; optionally behaves like a child whose Ctrl-C turned into an
/// ordinary failing exit status.
#[derive(Default)]
struct FakeCompiler {
    signal_on_compile: bool,
    calls: Cell<usize>,
}

impl Compiler for FakeCompiler {
    fn interpreter_version(&self) -> Result<String> {
        Ok("3.11".to_string())
    }

    fn compile(&self, _source: &Path) -> Result<CompileStatus> {
        self.calls.set(self.calls.get() + 1);
        if self.signal_on_compile {
            interrupt::raise();
            return Ok(CompileStatus::Rejected {
                diagnostic: "KeyboardInterrupt".to_string(),
            });
        }
        Ok(CompileStatus::Compiled)
    }
}

struct InterruptedPipeline;

impl DecompilePipeline for InterruptedPipeline {
    fn run(&self, _job: &PipelineJob<'_>) -> Result<PipelineSummary, PipelineError> {
        interrupt::raise();
        Err(PipelineError::Interrupted)
    }
}

/// Sees SIGINT on its last file but still reports counts, as if the decompiler had
/// exited with a plain failure status.
struct LateSignalPipeline;

impl DecompilePipeline for LateSignalPipeline {
    fn run(&self, job: &PipelineJob<'_>) -> Result<PipelineSummary, PipelineError> {
        interrupt::raise();
        Ok(PipelineSummary {
            total: job.files.len() as u64,
            okay: 0,
            failed_decompile: job.files.len() as u64,
            failed_verify: 0,
        })
    }
}

struct CountingPipeline {
    calls: Cell<usize>,
}

impl DecompilePipeline for CountingPipeline {
    fn run(&self, job: &PipelineJob<'_>) -> Result<PipelineSummary, PipelineError> {
        self.calls.set(self.calls.get() + 1);
        Ok(PipelineSummary {
            total: job.files.len() as u64,
            okay: job.files.len() as u64,
            ..PipelineSummary::default()
        })
    }
}

fn config(base: &Path) -> RunConfig {
    let mut suites = Vec::new();
    for name in ["a", "b"] {
        let root = base.join(name);
        std::fs::create_dir_all(&root).unwrap();
        std::fs::write(root.join("x.pyc"), b"x").unwrap();
        for src in ["m1.py", "m2.py", "m3.py"] {
            std::fs::write(root.join(src), b"x = 1\n").unwrap();
        }
        suites.push(TestSuiteSpec {
            name: name.to_string(),
            source_root: root,
            file_patterns: vec!["*.pyc".to_string()],
            output_subdir: name.to_string(),
            required_version: None,
        });
    }
    RunConfig {
        do_compile: false,
        do_verify: false,
        start_with: None,
        suites,
        output_base: base.join("out"),
        policy: FailurePolicy::KeepGoing,
    }
}

#[test]
fn interruption_maps_to_exit_one_and_stops_the_run() {
    let tmp = tempfile::tempdir().unwrap();
    let cfg = config(tmp.path());
    let compiler = FakeCompiler::default();

    interrupt::clear();
    let pipeline = InterruptedPipeline;
    let mut orch = Orchestrator::new(cfg.clone(), &compiler, &pipeline);
    let err = orch.run().unwrap_err();
    assert_eq!(err.kind, FailureKind::Interrupted);
    assert_eq!(err.exit_code(), 1);
    assert_eq!(err.suite.as_deref(), Some("a"));

    // A raised flag stops the next run before its pipeline is reached.
    let mut orch = Orchestrator::new(cfg.clone(), &compiler, &pipeline);
    let err = orch.run().unwrap_err();
    assert_eq!(err.kind, FailureKind::Interrupted);

    // Counts from a pipeline that finished after SIGINT do not turn into a decompile failure.
    interrupt::clear();
    let pipeline = LateSignalPipeline;
    let mut orch = Orchestrator::new(cfg.clone(), &compiler, &pipeline);
    let err = orch.run().unwrap_err();
    assert_eq!(err.kind, FailureKind::Interrupted);
    assert_eq!(err.exit_code(), 1);
    assert!(orch.records().is_empty());

    // SIGINT during compilation stops the compile walk after the file in flight.
    interrupt::clear();
    let compiler = FakeCompiler {
        signal_on_compile: true,
        ..FakeCompiler::default()
    };
    let pipeline = CountingPipeline {
        calls: Cell::new(0),
    };
    let mut cfg = cfg;
    cfg.do_compile = true;
    let mut orch = Orchestrator::new(cfg, &compiler, &pipeline);
    let err = orch.run().unwrap_err();
    assert_eq!(err.kind, FailureKind::Interrupted);
    assert_eq!(err.suite.as_deref(), Some("a"));
    assert_eq!(compiler.calls.get(), 1);
    assert_eq!(pipeline.calls.get(), 0);

    interrupt::clear();
}
