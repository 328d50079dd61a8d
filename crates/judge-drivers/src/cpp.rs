use std::path::Path;

use anyhow::{Context, Result};
use judge_core::{Reason, Submission};
use judge_process::{ExecutionResult, Termination};
use tokio::process::Command;

use crate::{line_trim_eq, DriverOutput, PrepareOutcome, Toolchain};

pub async fn prepare(
    scratch: &Path,
    submission: &Submission,
    toolchain: &Toolchain,
) -> Result<PrepareOutcome> {
    let source_path = scratch.join("sol.cpp");
    tokio::fs::write(&source_path, &submission.solution)
        .await
        .context("writing sol.cpp")?;

    let binary_path = scratch.join("sol");
    let compile = Command::new(&toolchain.cpp_compiler)
        .args(&toolchain.cpp_flags)
        .arg(&source_path)
        .arg("-o")
        .arg(&binary_path)
        .current_dir(scratch)
        .output()
        .await
        .context("invoking compiler")?;

    if !compile.status.success() {
        return Ok(PrepareOutcome::CompileError {
            stderr: String::from_utf8_lossy(&compile.stderr).into_owned(),
        });
    }

    let mut run = Command::new(&binary_path);
    run.current_dir(scratch);
    Ok(PrepareOutcome::Ready(run))
}

pub fn postprocess(raw: &ExecutionResult, expected_output: &str) -> DriverOutput {
    debug_assert_eq!(raw.termination, Termination::Normal);
    let reason = if raw.exit_code != 0 {
        Some(Reason::RuntimeError)
    } else {
        None
    };
    let output_match = raw.exit_code == 0 && line_trim_eq(&raw.stdout, expected_output);
    DriverOutput {
        stdout: raw.stdout.clone(),
        stderr: raw.stderr.clone(),
        reason,
        output_match,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trailing_newline_differences_do_not_fail_the_match() {
        assert!(line_trim_eq("42\n", "42"));
        assert!(line_trim_eq("42", "42\n"));
        assert!(!line_trim_eq("42", "43"));
    }

    #[test]
    fn trailing_whitespace_on_individual_lines_is_stripped() {
        assert!(line_trim_eq("foo \nbar", "foo\nbar "));
        assert!(!line_trim_eq("foo\nbar", "foo\nbaz"));
        assert!(!line_trim_eq("foo\nbar", "foo"));
    }

    #[test]
    fn nonzero_exit_is_runtime_error() {
        let raw = ExecutionResult {
            stdout: String::new(),
            stderr: "segfault".into(),
            exit_code: 139,
            termination: Termination::Normal,
            wall_seconds: 0.01,
        };
        let out = postprocess(&raw, "");
        assert_eq!(out.reason, Some(Reason::RuntimeError));
        assert!(!out.output_match);
    }

    #[test]
    fn zero_exit_with_matching_output_has_no_reason() {
        let raw = ExecutionResult {
            stdout: "42\n".into(),
            stderr: String::new(),
            exit_code: 0,
            termination: Termination::Normal,
            wall_seconds: 0.01,
        };
        let out = postprocess(&raw, "42");
        assert_eq!(out.reason, None);
        assert!(out.output_match);
    }
}
