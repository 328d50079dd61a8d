use std::path::Path;

use anyhow::{Context, Result};
use judge_core::{Reason, Submission};
use judge_process::{ExecutionResult, Termination};
use tokio::process::Command;

use crate::{line_trim_eq, DriverOutput, PrepareOutcome, Toolchain};

pub fn prepare(
    scratch: &Path,
    submission: &Submission,
    toolchain: &Toolchain,
) -> Result<PrepareOutcome> {
    let source_path = scratch.join("sol.py");
    std::fs::write(&source_path, &submission.solution).context("writing sol.py")?;

    let mut run = Command::new(&toolchain.python_bin);
    run.arg(&source_path).current_dir(scratch);
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
    fn traceback_on_stderr_with_nonzero_exit_is_runtime_error() {
        let raw = ExecutionResult {
            stdout: String::new(),
            stderr: "Traceback (most recent call last):\nZeroDivisionError".into(),
            exit_code: 1,
            termination: Termination::Normal,
            wall_seconds: 0.02,
        };
        let out = postprocess(&raw, "");
        assert_eq!(out.reason, Some(Reason::RuntimeError));
        assert!(out.stderr.contains("ZeroDivisionError"));
    }

    #[test]
    fn per_line_trailing_whitespace_does_not_fail_the_match() {
        let raw = ExecutionResult {
            stdout: "foo \nbar".into(),
            stderr: String::new(),
            exit_code: 0,
            termination: Termination::Normal,
            wall_seconds: 0.01,
        };
        let out = postprocess(&raw, "foo\nbar ");
        assert!(out.output_match);
    }

    #[test]
    fn missing_input_line_still_counts_as_runtime_error() {
        let raw = ExecutionResult {
            stdout: String::new(),
            stderr: "EOFError: EOF when reading a line".into(),
            exit_code: 1,
            termination: Termination::Normal,
            wall_seconds: 0.02,
        };
        let out = postprocess(&raw, "anything");
        assert_eq!(out.reason, Some(Reason::RuntimeError));
        assert!(!out.output_match);
    }
}
