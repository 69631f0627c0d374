use std::cell::OnceCell;
use std::ffi::{OsStr, OsString};
use std::fmt;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;

use crate::delegate::{self, DelegateCaptured, Termination};
use crate::interrupt;
use crate::select::{select_files, FilePatterns};

const VERSION_PROBE: &str = "import sys; sys.stdout.write('%d.%d' % sys.version_info[:2])";

/// Source-to-bytecode compiler boundary.
pub trait Compiler {
    /// `major.minor` of the interpreter that compiles.
    fn interpreter_version(&self) -> Result<String>;

    /// Compiles one source file in place. `Err` is reserved for environment failures;
    /// a source the compiler refuses comes back as [`CompileStatus::Rejected`].
    fn compile(&self, source: &Path) -> Result<CompileStatus>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompileStatus {
    Compiled,
    Rejected { diagnostic: String },
    /// The compiler was stopped by SIGINT.
    Interrupted,
}

#[derive(Debug)]
pub enum CompileError {
    Interrupted,
    Io(anyhow::Error),
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompileError::Interrupted => f.write_str("interrupted"),
            CompileError::Io(err) => write!(f, "{err:#}"),
        }
    }
}

impl std::error::Error for CompileError {}

impl From<anyhow::Error> for CompileError {
    fn from(err: anyhow::Error) -> Self {
        CompileError::Io(err)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CompileOutcome {
    Skipped {
        required: String,
        running: String,
    },
    Compiled {
        compiled: usize,
        rejected: Vec<String>,
    },
}

/// Compiles every `*.py` under `root`, unless `required_version` names a different
/// interpreter than the one `compiler` runs. A version mismatch is a soft skip: the
/// bytecode already on disk stays valid input.
///
/// The interrupt flag is polled around every file; once it is up the walk stops with
/// [`CompileError::Interrupted`].
pub fn compile_tree(
    root: &Path,
    required_version: Option<&str>,
    compiler: &dyn Compiler,
) -> Result<CompileOutcome, CompileError> {
    if let Some(required) = required_version {
        let running = compiler
            .interpreter_version()
            .context("query interpreter version")?;
        if running != required {
            return Ok(CompileOutcome::Skipped {
                required: required.to_string(),
                running,
            });
        }
    }

    let sources = select_files(root, &FilePatterns::source()?);
    let mut compiled = 0usize;
    let mut rejected = Vec::new();
    for rel in sources {
        if interrupt::requested() {
            return Err(CompileError::Interrupted);
        }
        let path = root.join(&rel);
        let status = compiler
            .compile(&path)
            .with_context(|| format!("compile {}", path.display()))?;
        if interrupt::requested() {
            return Err(CompileError::Interrupted);
        }
        match status {
            CompileStatus::Interrupted => return Err(CompileError::Interrupted),
            CompileStatus::Compiled => compiled += 1,
            CompileStatus::Rejected { diagnostic } => {
                eprintln!("pydis-regress: compile rejected {rel}: {diagnostic}");
                rejected.push(rel);
            }
        }
    }
    Ok(CompileOutcome::Compiled { compiled, rejected })
}

/// Compiles with an external Python interpreter (`-m py_compile`).
#[derive(Debug)]
pub struct PythonCompiler {
    python: OsString,
    version: OnceCell<String>,
}

impl PythonCompiler {
    pub fn new(python: impl Into<OsString>) -> Self {
        Self {
            python: python.into(),
            version: OnceCell::new(),
        }
    }

    fn run(&self, args: &[&OsStr]) -> Result<std::process::Output> {
        match delegate::run_capture(&self.python, args)? {
            DelegateCaptured::Output(out) => Ok(out),
            DelegateCaptured::NotFound => anyhow::bail!(
                "python interpreter not found: {} (pass --python or set PYDIS_PYTHON)",
                self.python.to_string_lossy()
            ),
        }
    }
}

impl Compiler for PythonCompiler {
    fn interpreter_version(&self) -> Result<String> {
        if let Some(v) = self.version.get() {
            return Ok(v.clone());
        }
        let out = self.run(&[OsStr::new("-c"), OsStr::new(VERSION_PROBE)])?;
        if !out.status.success() {
            anyhow::bail!(
                "{} failed to report its version: {}",
                self.python.to_string_lossy(),
                delegate::tail_lines(&out.stderr, 5)
            );
        }
        let v = String::from_utf8_lossy(&out.stdout).trim().to_string();
        if v.is_empty() {
            anyhow::bail!(
                "{} reported an empty version",
                self.python.to_string_lossy()
            );
        }
        Ok(self.version.get_or_init(|| v).clone())
    }

    fn compile(&self, source: &Path) -> Result<CompileStatus> {
        let out = self.run(&[
            OsStr::new("-m"),
            OsStr::new("py_compile"),
            source.as_os_str(),
        ])?;
        if out.status.success() {
            return Ok(CompileStatus::Compiled);
        }
        if delegate::termination(&out.status) == Termination::Interrupted {
            return Ok(CompileStatus::Interrupted);
        }
        Ok(CompileStatus::Rejected {
            diagnostic: delegate::tail_lines(&out.stderr, 3),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;

    struct Recording {
        version: &'static str,
        seen: RefCell<Vec<String>>,
    }

    impl Compiler for Recording {
        fn interpreter_version(&self) -> Result<String> {
            Ok(self.version.to_string())
        }

        fn compile(&self, source: &Path) -> Result<CompileStatus> {
            let name = source.file_name().unwrap().to_string_lossy().into_owned();
            self.seen.borrow_mut().push(name.clone());
            if name.starts_with("bad") {
                return Ok(CompileStatus::Rejected {
                    diagnostic: "invalid syntax".to_string(),
                });
            }
            Ok(CompileStatus::Compiled)
        }
    }

    fn tree() -> tempfile::TempDir {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(tmp.path().join("pkg")).unwrap();
        std::fs::write(tmp.path().join("a.py"), b"x = 1\n").unwrap();
        std::fs::write(tmp.path().join("pkg/bad.py"), b"def\n").unwrap();
        std::fs::write(tmp.path().join("a.pyc"), b"old").unwrap();
        tmp
    }

    #[test]
    fn version_mismatch_skips_without_compiling() {
        let tmp = tree();
        let c = Recording {
            version: "3.11",
            seen: RefCell::new(Vec::new()),
        };
        let got = compile_tree(tmp.path(), Some("2.7"), &c).unwrap();
        assert_eq!(
            got,
            CompileOutcome::Skipped {
                required: "2.7".to_string(),
                running: "3.11".to_string(),
            }
        );
        assert!(c.seen.borrow().is_empty());
    }

    #[test]
    fn rejected_sources_are_counted_not_fatal() {
        let tmp = tree();
        let c = Recording {
            version: "2.7",
            seen: RefCell::new(Vec::new()),
        };
        let got = compile_tree(tmp.path(), Some("2.7"), &c).unwrap();
        assert_eq!(
            got,
            CompileOutcome::Compiled {
                compiled: 1,
                rejected: vec!["pkg/bad.py".to_string()],
            }
        );
        assert_eq!(*c.seen.borrow(), vec!["a.py", "bad.py"]);

        // No required version: compile regardless of the interpreter.
        let got = compile_tree(tmp.path(), None, &c).unwrap();
        assert!(matches!(got, CompileOutcome::Compiled { compiled: 1, .. }));
    }

    struct StopsOnSecond {
        calls: RefCell<usize>,
    }

    impl Compiler for StopsOnSecond {
        fn interpreter_version(&self) -> Result<String> {
            Ok("2.7".to_string())
        }

        fn compile(&self, _source: &Path) -> Result<CompileStatus> {
            let mut calls = self.calls.borrow_mut();
            *calls += 1;
            if *calls == 2 {
                return Ok(CompileStatus::Interrupted);
            }
            Ok(CompileStatus::Compiled)
        }
    }

    #[test]
    fn interrupted_compiler_ends_the_walk() {
        let tmp = tempfile::tempdir().unwrap();
        for name in ["a.py", "b.py", "c.py", "d.py"] {
            std::fs::write(tmp.path().join(name), b"x = 1\n").unwrap();
        }
        let c = StopsOnSecond {
            calls: RefCell::new(0),
        };
        let err = compile_tree(tmp.path(), None, &c).unwrap_err();
        assert!(matches!(err, CompileError::Interrupted));
        assert_eq!(*c.calls.borrow(), 2);
    }
}
