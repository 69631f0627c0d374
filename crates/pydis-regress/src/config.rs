use std::ffi::OsString;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

pub const ENV_DECOMPILER: &str = "PYDIS_DECOMPILER";
pub const ENV_PYTHON: &str = "PYDIS_PYTHON";
pub const ENV_CORPUS_ROOT: &str = "PYDIS_CORPUS_ROOT";
pub const ENV_OUTPUT_BASE: &str = "PYDIS_OUTPUT_BASE";

const DEFAULT_DECOMPILER: &str = "uncompyle6";
const DEFAULT_PYTHON: &str = "python3";
const OUTPUT_BASE_PREFIX: &str = "py-dis-";

/// Flag value, else a non-empty environment value, else nothing.
fn pick(flag: Option<OsString>, env: Option<OsString>) -> Option<OsString> {
    flag.or_else(|| env.filter(|v| !v.is_empty()))
}

fn env_os(name: &str) -> Option<OsString> {
    std::env::var_os(name)
}

pub fn decompiler(flag: Option<OsString>) -> OsString {
    pick(flag, env_os(ENV_DECOMPILER)).unwrap_or_else(|| DEFAULT_DECOMPILER.into())
}

pub fn python(flag: Option<OsString>) -> OsString {
    pick(flag, env_os(ENV_PYTHON)).unwrap_or_else(|| DEFAULT_PYTHON.into())
}

pub fn corpus_root(flag: Option<PathBuf>) -> Result<PathBuf> {
    let picked = pick(flag.map(PathBuf::into_os_string), env_os(ENV_CORPUS_ROOT));
    match picked {
        Some(p) => Ok(PathBuf::from(p)),
        None => std::env::current_dir().context("get current dir"),
    }
}

/// The process-lifetime output root. An explicit directory is created if needed; otherwise
/// a fresh `py-dis-*` temp directory is created and left in place after exit.
pub fn output_base(flag: Option<PathBuf>) -> Result<PathBuf> {
    if let Some(dir) = pick(flag.map(PathBuf::into_os_string), env_os(ENV_OUTPUT_BASE)) {
        let dir = PathBuf::from(dir);
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("create output base: {}", dir.display()))?;
        return Ok(dir);
    }
    let tmp = tempfile::Builder::new()
        .prefix(OUTPUT_BASE_PREFIX)
        .tempdir()
        .context("create temporary output base")?;
    Ok(tmp.keep())
}

pub fn display_path<P: AsRef<Path>>(p: P) -> String {
    p.as_ref().display().to_string()
}
