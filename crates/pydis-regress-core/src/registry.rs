use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;

use crate::exit::{FailureKind, RunFailure};
use crate::select::FilePatterns;

const PYC: &[&str] = &["*.pyc"];

struct SuiteDef {
    name: &'static str,
    root: &'static str,
    patterns: &'static [&'static str],
    output_subdir: &'static str,
    required_version: Option<&'static str>,
}

const BUILTIN_SUITES: &[SuiteDef] = &[
    SuiteDef {
        name: "test",
        root: "test",
        patterns: PYC,
        output_subdir: "test",
        required_version: None,
    },
    SuiteDef {
        name: "bytecode-2.5",
        root: "bytecode_2.5",
        patterns: PYC,
        output_subdir: "bytecode_2.5",
        required_version: Some("2.5"),
    },
    SuiteDef {
        name: "bytecode-2.7",
        root: "bytecode_2.7",
        patterns: PYC,
        output_subdir: "bytecode_2.7",
        required_version: Some("2.7"),
    },
    SuiteDef {
        name: "bytecode-3.4",
        root: "bytecode_3.4",
        patterns: PYC,
        output_subdir: "bytecode_3.4",
        required_version: Some("3.4"),
    },
    SuiteDef {
        name: "2.7",
        root: "python2.7",
        patterns: PYC,
        output_subdir: "python2.7",
        required_version: Some("2.7"),
    },
    SuiteDef {
        name: "ok-2.6",
        root: "ok_2.6",
        patterns: PYC,
        output_subdir: "ok-2.6",
        required_version: Some("2.6"),
    },
    SuiteDef {
        name: "ok-2.7",
        root: "ok_lib2.7",
        patterns: PYC,
        output_subdir: "ok-2.7",
        required_version: Some("2.7"),
    },
    SuiteDef {
        name: "base-2.7",
        root: "base_tests/python2.7",
        patterns: PYC,
        output_subdir: "base_2.7",
        required_version: Some("2.7"),
    },
];

/// Names of the built-in suites, in registration order.
pub fn builtin_suite_names() -> impl Iterator<Item = &'static str> {
    BUILTIN_SUITES.iter().map(|d| d.name)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TestSuiteSpec {
    pub name: String,
    pub source_root: PathBuf,
    pub file_patterns: Vec<String>,
    pub output_subdir: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required_version: Option<String>,
}

impl TestSuiteSpec {
    pub fn patterns(&self) -> Result<FilePatterns> {
        FilePatterns::new(&self.file_patterns)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MissingSuite {
    pub name: String,
    pub source_root: PathBuf,
}

#[derive(Debug, Clone, Default)]
pub struct Resolved {
    pub suites: Vec<TestSuiteSpec>,
    pub missing: Vec<MissingSuite>,
}

#[derive(Debug, Clone)]
pub struct Registry {
    suites: BTreeMap<String, TestSuiteSpec>,
}

impl Registry {
    pub fn new(specs: Vec<TestSuiteSpec>) -> Result<Self> {
        let mut suites = BTreeMap::new();
        for spec in specs {
            spec.patterns()
                .with_context(|| format!("suite {:?}", spec.name))?;
            if spec.output_subdir.is_empty() {
                anyhow::bail!("suite {:?}: empty output subdir", spec.name);
            }
            let name = spec.name.clone();
            if suites.insert(name.clone(), spec).is_some() {
                anyhow::bail!("duplicate suite name: {name:?}");
            }
        }
        Ok(Self { suites })
    }

    /// The built-in corpora, with source roots resolved under `corpus_root`.
    pub fn builtin(corpus_root: &Path) -> Result<Self> {
        let specs = BUILTIN_SUITES
            .iter()
            .map(|d| TestSuiteSpec {
                name: d.name.to_string(),
                source_root: corpus_root.join(d.root),
                file_patterns: d.patterns.iter().map(|p| p.to_string()).collect(),
                output_subdir: d.output_subdir.to_string(),
                required_version: d.required_version.map(str::to_string),
            })
            .collect();
        Self::new(specs)
    }

    /// Suite names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.suites.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &TestSuiteSpec> {
        self.suites.values()
    }

    /// Looks up `names` in caller order, dropping duplicates and suites whose source root
    /// is not a directory right now.
    pub fn resolve<S: AsRef<str>>(&self, names: &[S]) -> Result<Resolved, RunFailure> {
        let mut seen: HashSet<&str> = HashSet::new();
        let mut out = Resolved::default();
        for name in names {
            let name = name.as_ref();
            let Some(spec) = self.suites.get(name) else {
                return Err(RunFailure::new(
                    FailureKind::UnknownSuite,
                    format!("unknown test suite: {name:?}"),
                ));
            };
            if !seen.insert(spec.name.as_str()) {
                continue;
            }
            if spec.source_root.is_dir() {
                out.suites.push(spec.clone());
            } else {
                out.missing.push(MissingSuite {
                    name: spec.name.clone(),
                    source_root: spec.source_root.clone(),
                });
            }
        }
        Ok(out)
    }
}
