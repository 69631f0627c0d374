use std::ffi::OsStr;
use std::process::{Command, ExitStatus, Output, Stdio};

use anyhow::{Context, Result};

#[derive(Debug)]
pub enum DelegateCaptured {
    Output(Output),
    NotFound,
}

/// How an external tool ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    Code(i32),
    Interrupted,
    Signal(i32),
}

pub fn termination(status: &ExitStatus) -> Termination {
    if let Some(code) = status.code() {
        return Termination::Code(code);
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt as _;
        if let Some(sig) = status.signal() {
            if sig == libc::SIGINT {
                return Termination::Interrupted;
            }
            return Termination::Signal(sig);
        }
    }
    Termination::Signal(-1)
}

/// Runs `program` with `args`, capturing stdout/stderr. A missing executable is reported as
/// [`DelegateCaptured::NotFound`] rather than an error so callers can name the setting to fix.
pub fn run_capture<S: AsRef<OsStr>>(program: &OsStr, args: &[S]) -> Result<DelegateCaptured> {
    let mut cmd = Command::new(program);
    cmd.args(args);
    cmd.stdin(Stdio::null());

    match cmd.output() {
        Ok(out) => Ok(DelegateCaptured::Output(out)),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(DelegateCaptured::NotFound),
        Err(err) => Err(err).with_context(|| format!("run {}", program.to_string_lossy())),
    }
}

/// Last `max_lines` lines of a captured stream, lossily decoded.
pub fn tail_lines(bytes: &[u8], max_lines: usize) -> String {
    let text = String::from_utf8_lossy(bytes);
    let lines: Vec<&str> = text.trim_end().lines().collect();
    let start = lines.len().saturating_sub(max_lines);
    lines[start..].join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tail_keeps_last_lines() {
        assert_eq!(tail_lines(b"a\nb\nc\n", 2), "b\nc");
        assert_eq!(tail_lines(b"a\n", 5), "a");
        assert_eq!(tail_lines(b"", 3), "");
    }

    #[cfg(unix)]
    #[test]
    fn termination_classifies_codes_and_signals() {
        use std::os::unix::process::ExitStatusExt as _;
        assert_eq!(termination(&ExitStatus::from_raw(0)), Termination::Code(0));
        assert_eq!(termination(&ExitStatus::from_raw(3 << 8)), Termination::Code(3));
        assert_eq!(
            termination(&ExitStatus::from_raw(libc::SIGINT)),
            Termination::Interrupted
        );
        assert_eq!(
            termination(&ExitStatus::from_raw(libc::SIGKILL)),
            Termination::Signal(libc::SIGKILL)
        );
    }
}
