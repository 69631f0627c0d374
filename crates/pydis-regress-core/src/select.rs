use std::path::{Component, Path};

use anyhow::{Context, Result};
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use walkdir::WalkDir;

pub const SOURCE_PATTERNS: &[&str] = &["*.py"];

/// A compiled set of base-name patterns (`*`, `?`, `[seq]`, `[!seq]`).
#[derive(Debug, Clone)]
pub struct FilePatterns {
    raw: Vec<String>,
    set: GlobSet,
}

impl FilePatterns {
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Result<Self> {
        if patterns.is_empty() {
            anyhow::bail!("file pattern set must not be empty");
        }
        let mut builder = GlobSetBuilder::new();
        let mut raw = Vec::with_capacity(patterns.len());
        for p in patterns {
            let p = p.as_ref();
            let glob = GlobBuilder::new(p)
                .literal_separator(true)
                .build()
                .with_context(|| format!("invalid file pattern: {p:?}"))?;
            builder.add(glob);
            raw.push(p.to_string());
        }
        let set = builder.build().context("build file pattern set")?;
        Ok(Self { raw, set })
    }

    pub fn source() -> Result<Self> {
        Self::new(SOURCE_PATTERNS)
    }

    pub fn patterns(&self) -> &[String] {
        &self.raw
    }

    pub fn matches_name(&self, name: &str) -> bool {
        self.set.is_match(name)
    }
}

/// Walks `root` and returns the sorted `/`-separated paths (relative to `root`) of every
/// file whose base name matches `patterns`.
///
/// Nothing matching is not an error: the result is simply empty. Directory symlinks are
/// not followed and unreadable subtrees are skipped.
pub fn select_files(root: &Path, patterns: &FilePatterns) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for entry in WalkDir::new(root)
        .follow_links(false)
        .min_depth(1)
        .into_iter()
        .flatten()
    {
        let ft = entry.file_type();
        if ft.is_dir() {
            continue;
        }
        if ft.is_symlink() && entry.path().is_dir() {
            continue;
        }
        let Some(name) = entry.file_name().to_str() else {
            continue;
        };
        if !patterns.matches_name(name) {
            continue;
        }
        let Ok(rel) = entry.path().strip_prefix(root) else {
            continue;
        };
        if let Some(rel) = rel_path_slash(rel) {
            out.push(rel);
        }
    }
    out.sort();
    out
}

fn rel_path_slash(path: &Path) -> Option<String> {
    let mut parts: Vec<&str> = Vec::new();
    for c in path.components() {
        match c {
            Component::Normal(s) => parts.push(s.to_str()?),
            Component::CurDir => {}
            _ => return None,
        }
    }
    if parts.is_empty() {
        return None;
    }
    Some(parts.join("/"))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartWith {
    pub files: Vec<String>,
    pub resumed_at: Option<String>,
}

/// Truncates a sorted file list so that it begins at `token`.
///
/// An unknown token leaves the list untouched; a resume typo must never abort a run.
pub fn apply_start_with(files: Vec<String>, token: Option<&str>) -> StartWith {
    let Some(token) = token else {
        return StartWith {
            files,
            resumed_at: None,
        };
    };
    match files.iter().position(|f| f == token) {
        Some(idx) => StartWith {
            files: files[idx..].to_vec(),
            resumed_at: Some(token.to_string()),
        },
        None => StartWith {
            files,
            resumed_at: None,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn patterns_match_base_names_with_fnmatch_syntax() {
        let p = FilePatterns::new(&["*.pyc", "*.pyo"]).unwrap();
        assert!(p.matches_name("a.pyc"));
        assert!(p.matches_name("c.pyo"));
        assert!(!p.matches_name("b.txt"));
        assert!(!p.matches_name("a.py"));

        let p = FilePatterns::new(&["test_?.py[co]"]).unwrap();
        assert!(p.matches_name("test_1.pyc"));
        assert!(p.matches_name("test_x.pyo"));
        assert!(!p.matches_name("test_12.pyc"));
    }

    #[test]
    fn empty_pattern_set_is_rejected() {
        let empty: [&str; 0] = [];
        assert!(FilePatterns::new(&empty).is_err());
    }

    #[test]
    fn start_with_truncates_at_exact_match() {
        let files = names(&["a.pyc", "b.pyc", "c.pyc"]);
        let got = apply_start_with(files, Some("b.pyc"));
        assert_eq!(got.files, names(&["b.pyc", "c.pyc"]));
        assert_eq!(got.resumed_at.as_deref(), Some("b.pyc"));
    }

    #[test]
    fn start_with_unknown_token_keeps_full_list() {
        let files = names(&["a.pyc", "b.pyc", "c.pyc"]);
        let got = apply_start_with(files.clone(), Some("z.pyc"));
        assert_eq!(got.files, files);
        assert_eq!(got.resumed_at, None);

        let got = apply_start_with(files.clone(), None);
        assert_eq!(got.files, files);
    }

    #[test]
    fn rel_paths_use_forward_slashes() {
        let p = Path::new("sub").join("dir").join("x.pyc");
        assert_eq!(rel_path_slash(&p).as_deref(), Some("sub/dir/x.pyc"));
        assert_eq!(rel_path_slash(Path::new("./x.pyc")).as_deref(), Some("x.pyc"));
        assert_eq!(rel_path_slash(Path::new("../x.pyc")), None);
    }
}
