use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Result;
use clap::error::ErrorKind;
use clap::{Arg, ArgAction, ArgMatches, CommandFactory, FromArgMatches, Parser};
use pydis_regress_core::exit::EXIT_FATAL;
use pydis_regress_core::registry::builtin_suite_names;
use pydis_regress_core::{
    check_versions, interrupt, CommandPipeline, ExitFacts, FailureKind, FailurePolicy,
    Orchestrator, PythonCompiler, Registry, Resolved, RunConfig, RunFailure, RunSummary,
    SuiteRecord, VersionConflict,
};

mod config;
mod report;

const SUITE_HEADING: &str = "Suites";

const USAGE_EXAMPLES: &str = "\
Examples:

  # decompile and verify the base set of Python 2.7 byte-compiled files
  pydis-regress --base-2.7 --verify

  # same, but compile the base set first
  pydis-regress --base-2.7 --verify --compile

  # decompile and verify a longer, known-good 2.7 library set
  pydis-regress --ok-2.7 --verify

  # resume a long run at a given file
  pydis-regress --2.7 --start-with=os.pyc";

#[derive(Parser, Debug)]
#[command(name = "pydis-regress")]
#[command(about = "Compile, decompile, and verify Python bytecode corpora.", long_about = None)]
#[command(version)]
#[command(after_help = USAGE_EXAMPLES)]
struct Cli {
    /// Select every registered suite.
    #[arg(long, action = ArgAction::Count)]
    all: u8,

    /// Recompile each corpus's sources before selecting bytecode.
    #[arg(long)]
    compile: bool,

    /// Round-trip verify decompiled output.
    #[arg(long)]
    verify: bool,

    /// Resume each selected suite at this relative path.
    #[arg(long, value_name = "PATH")]
    start_with: Option<String>,

    /// Run every suite even after one fails, then exit with the worst outcome.
    #[arg(long)]
    no_fail_fast: bool,

    /// Print the suite registry as JSON and exit.
    #[arg(long)]
    list: bool,

    #[arg(long)]
    verbose: bool,

    /// Directory the suite source roots are relative to [env: PYDIS_CORPUS_ROOT; default: cwd].
    #[arg(long, value_name = "DIR")]
    corpus_root: Option<PathBuf>,

    /// Directory for decompiled output [env: PYDIS_OUTPUT_BASE; default: fresh py-dis-* temp dir].
    #[arg(long, value_name = "DIR")]
    output_base: Option<PathBuf>,

    /// Decompiler executable [env: PYDIS_DECOMPILER; default: uncompyle6].
    #[arg(long, value_name = "CMD")]
    decompiler: Option<OsString>,

    /// Extra argument passed to the decompiler before the file arguments.
    /// May be passed multiple times.
    #[arg(long = "decompiler-arg", value_name = "ARG", allow_hyphen_values = true)]
    decompiler_args: Vec<OsString>,

    /// Python interpreter used by --compile [env: PYDIS_PYTHON; default: python3].
    #[arg(long, value_name = "CMD")]
    python: Option<OsString>,

    /// Write a JSON run report to this path.
    #[arg(long, value_name = "PATH")]
    report_out: Option<PathBuf>,
}

fn main() -> ExitCode {
    match try_main() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("pydis-regress: {err:#}");
            ExitCode::from(EXIT_FATAL)
        }
    }
}

fn build_command() -> clap::Command {
    let mut cmd = Cli::command();
    for name in builtin_suite_names() {
        cmd = cmd.arg(
            Arg::new(name)
                .long(name)
                .action(ArgAction::Count)
                .help_heading(SUITE_HEADING)
                .help(format!("Select the {name} corpus.")),
        );
    }
    cmd
}

fn try_main() -> Result<ExitCode> {
    let raw_args: Vec<OsString> = std::env::args_os().collect();
    let mut cmd = build_command();

    if raw_args.len() <= 1 {
        cmd.print_help()?;
        return Ok(ExitCode::from(EXIT_FATAL));
    }

    let matches = match cmd.try_get_matches_from_mut(raw_args.iter().cloned()) {
        Ok(m) => m,
        Err(err) => match err.kind() {
            ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
                err.print()?;
                return Ok(ExitCode::SUCCESS);
            }
            _ => {
                eprintln!("{}", err.render());
                eprintln!("{}", cmd.render_help());
                return Ok(ExitCode::from(EXIT_FATAL));
            }
        },
    };
    let cli = Cli::from_arg_matches(&matches)?;

    let corpus_root = config::corpus_root(cli.corpus_root.clone())?;
    let registry = Registry::builtin(&corpus_root)?;

    if cli.list {
        println!("{}", report::suite_list_json(&registry)?);
        return Ok(ExitCode::SUCCESS);
    }

    let names = selected_suite_names(&cli, &matches, &registry);
    let resolved = match registry.resolve(&names) {
        Ok(r) => r,
        Err(failure) => {
            eprintln!("{}", cmd.render_help());
            return finish(&cli, Finished::before_run(&Resolved::default(), &[], failure));
        }
    };
    for m in &resolved.missing {
        eprintln!(
            "pydis-regress: Can't find directory {}. Skipping",
            m.source_root.display()
        );
    }
    let conflicts = check_versions(&resolved.suites);
    for c in &conflicts {
        eprintln!(
            "pydis-regress: warning: mixed python version decompilation (suite {} wants {}, earlier suites want {})",
            c.suite, c.found, c.expected
        );
    }

    if resolved.suites.is_empty() {
        let failure = RunFailure::new(FailureKind::NoSuites, "No directories found to check");
        return finish(&cli, Finished::before_run(&resolved, &conflicts, failure));
    }

    let output_base = config::output_base(cli.output_base.clone())?;
    interrupt::install()?;

    let run_config = RunConfig {
        do_compile: cli.compile,
        do_verify: cli.verify,
        start_with: cli.start_with.clone(),
        suites: resolved.suites.clone(),
        output_base: output_base.clone(),
        policy: cli.policy(),
    };
    if cli.verbose {
        eprintln!(
            "pydis-regress: {} suites (compile={}, verify={}, output base {})",
            run_config.suites.len(),
            run_config.do_compile,
            run_config.do_verify,
            output_base.display()
        );
    }

    let compiler = PythonCompiler::new(config::python(cli.python.clone()));
    let pipeline = CommandPipeline::new(config::decompiler(cli.decompiler.clone()))
        .with_args(cli.decompiler_args.clone())
        .verbose(cli.verbose);
    let mut orchestrator = Orchestrator::new(run_config, &compiler, &pipeline);
    let failure = orchestrator.run().err();

    finish(
        &cli,
        Finished {
            output_base: Some(&output_base),
            resolved: &resolved,
            conflicts: &conflicts,
            records: orchestrator.records(),
            summary: orchestrator.summary(),
            failure,
        },
    )
}

impl Cli {
    fn policy(&self) -> FailurePolicy {
        if self.no_fail_fast {
            FailurePolicy::KeepGoing
        } else {
            FailurePolicy::FailFast
        }
    }
}

/// Suite names in command-line order; `--all` expands in place to every registered suite.
fn selected_suite_names(cli: &Cli, matches: &ArgMatches, registry: &Registry) -> Vec<String> {
    let mut picks: Vec<(usize, Vec<String>)> = Vec::new();
    for name in builtin_suite_names() {
        if matches.get_count(name) == 0 {
            continue;
        }
        let idx = matches.index_of(name).unwrap_or(usize::MAX);
        picks.push((idx, vec![name.to_string()]));
    }
    if cli.all != 0 {
        let idx = matches.index_of("all").unwrap_or(usize::MAX);
        picks.push((idx, registry.names().map(str::to_string).collect()));
    }
    picks.sort_by_key(|(idx, _)| *idx);
    picks.into_iter().flat_map(|(_, names)| names).collect()
}

struct Finished<'a> {
    output_base: Option<&'a Path>,
    resolved: &'a Resolved,
    conflicts: &'a [VersionConflict],
    records: &'a [SuiteRecord],
    summary: RunSummary,
    failure: Option<RunFailure>,
}

impl<'a> Finished<'a> {
    fn before_run(
        resolved: &'a Resolved,
        conflicts: &'a [VersionConflict],
        failure: RunFailure,
    ) -> Self {
        Self {
            output_base: None,
            resolved,
            conflicts,
            records: &[],
            summary: RunSummary::default(),
            failure: Some(failure),
        }
    }
}

fn finish(cli: &Cli, run: Finished<'_>) -> Result<ExitCode> {
    let exit_code = ExitFacts::from_outcome(run.failure.as_ref()).exit_code();

    if let Some(failure) = &run.failure {
        if failure.kind == FailureKind::Interrupted {
            println!();
        }
        eprintln!("pydis-regress: {failure}");
    }

    if let Some(path) = &cli.report_out {
        let invocation = report::InvocationInfo {
            argv: std::env::args_os()
                .map(|a| a.to_string_lossy().into_owned())
                .collect(),
            cwd: std::env::current_dir()
                .map(config::display_path)
                .unwrap_or_else(|_| ".".to_string()),
            output_base: run.output_base.map(config::display_path),
            compile: cli.compile,
            verify: cli.verify,
            start_with: cli.start_with.clone(),
            policy: cli.policy(),
        };
        let doc = report::RunReport::new(
            invocation,
            run.summary,
            exit_code,
            run.failure.as_ref(),
            &run.resolved.missing,
            run.conflicts,
            run.records,
        );
        if let Err(err) = report::write_report(path, &doc) {
            eprintln!("pydis-regress: {err:#}");
        }
    }

    println!(
        "summary: suites={} files={} okay={} failed={} verify_failed={} (exit={})",
        run.summary.suites,
        run.summary.totals.files_attempted,
        run.summary.totals.okay,
        run.summary.totals.failed_decompile,
        run.summary.totals.failed_verify,
        exit_code
    );
    Ok(ExitCode::from(exit_code))
}
