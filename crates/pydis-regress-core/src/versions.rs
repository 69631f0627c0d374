use serde::Serialize;

use crate::registry::TestSuiteSpec;

/// A suite whose required interpreter version differs from an earlier suite's.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VersionConflict {
    pub suite: String,
    pub expected: String,
    pub found: String,
}

/// Advisory check over the suites of one run: decompiling mixed-version bytecode is legal
/// but rarely intended.
///
/// The first declared version becomes the reference and stays the reference; every later
/// suite declaring a different one yields a conflict. Suites without a version are ignored.
pub fn check_versions(suites: &[TestSuiteSpec]) -> Vec<VersionConflict> {
    let mut last: Option<&str> = None;
    let mut out = Vec::new();
    for suite in suites {
        let Some(version) = suite.required_version.as_deref() else {
            continue;
        };
        match last {
            Some(prev) if prev != version => out.push(VersionConflict {
                suite: suite.name.clone(),
                expected: prev.to_string(),
                found: version.to_string(),
            }),
            _ => last = Some(version),
        }
    }
    out
}
