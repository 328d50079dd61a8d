use std::path::Path;

use anyhow::{Context, Result};
use judge_core::{Reason, Submission};
use judge_process::{ExecutionResult, Termination};
use serde::Deserialize;
use tokio::process::Command;

use crate::{DriverOutput, PrepareOutcome, Toolchain};

const PRELUDE: &str = "import Mathlib";

pub async fn prepare(
    scratch: &Path,
    submission: &Submission,
    toolchain: &Toolchain,
) -> Result<PrepareOutcome> {
    let source_path = scratch.join("code.lean");
    let contents = format!("{PRELUDE}\n{}", submission.solution);
    tokio::fs::write(&source_path, contents)
        .await
        .context("writing code.lean")?;

    let mut run = Command::new(&toolchain.lean_repl);
    run.current_dir(scratch);
    Ok(PrepareOutcome::Ready(run))
}

/// Build the JSON request body the REPL expects on stdin for the file
/// written by [`prepare`].
pub fn repl_request(scratch: &Path) -> Vec<u8> {
    let path = scratch.join("code.lean");
    serde_json::json!({ "path": path.to_string_lossy(), "allTactics": false }).to_string().into_bytes()
}

#[derive(Debug, Deserialize)]
struct ReplMessage {
    severity: String,
}

#[derive(Debug, Deserialize)]
struct ReplReport {
    #[serde(default)]
    sorries: Vec<serde_json::Value>,
    #[serde(default)]
    messages: Vec<ReplMessage>,
}

pub fn postprocess(raw: &ExecutionResult) -> DriverOutput {
    debug_assert_eq!(raw.termination, Termination::Normal);

    if raw.stdout.trim().is_empty() && raw.stderr.trim().is_empty() {
        return DriverOutput {
            stdout: String::new(),
            stderr: "empty stdout from REPL".to_string(),
            reason: Some(Reason::RuntimeError),
            output_match: false,
        };
    }

    let report: ReplReport = match serde_json::from_str(&raw.stdout) {
        Ok(r) => r,
        Err(e) => {
            return DriverOutput {
                stdout: String::new(),
                stderr: format!("malformed REPL report: {e}"),
                reason: Some(Reason::RuntimeError),
                output_match: false,
            };
        }
    };

    let has_sorry = !report.sorries.is_empty();
    let has_error = report.messages.iter().any(|m| m.severity == "error");

    if has_sorry || has_error {
        DriverOutput {
            stdout: "fail".to_string(),
            stderr: raw.stdout.clone(),
            reason: None,
            output_match: false,
        }
    } else {
        DriverOutput {
            stdout: "pass".to_string(),
            stderr: String::new(),
            reason: None,
            output_match: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exec(stdout: &str) -> ExecutionResult {
        ExecutionResult {
            stdout: stdout.to_string(),
            stderr: String::new(),
            exit_code: 0,
            termination: Termination::Normal,
            wall_seconds: 1.0,
        }
    }

    #[test]
    fn empty_stdout_and_stderr_is_runtime_error() {
        let out = postprocess(&exec(""));
        assert_eq!(out.reason, Some(Reason::RuntimeError));
        assert_eq!(out.stderr, "empty stdout from REPL");
    }

    #[test]
    fn clean_report_with_no_sorries_or_errors_passes() {
        let out = postprocess(&exec(r#"{"sorries":[],"messages":[]}"#));
        assert_eq!(out.stdout, "pass");
        assert!(out.output_match);
        assert_eq!(out.reason, None);
    }

    #[test]
    fn nonempty_sorries_fails_with_json_in_stderr() {
        let report = r#"{"sorries":[{"goal":"True"}],"messages":[]}"#;
        let out = postprocess(&exec(report));
        assert_eq!(out.stdout, "fail");
        assert_eq!(out.stderr, report);
        assert!(!out.output_match);
    }

    #[test]
    fn error_severity_message_fails_even_without_sorries() {
        let report = r#"{"sorries":[],"messages":[{"severity":"error","data":"unknown identifier"}]}"#;
        let out = postprocess(&exec(report));
        assert_eq!(out.stdout, "fail");
    }

    #[test]
    fn warning_severity_alone_does_not_fail() {
        let report = r#"{"sorries":[],"messages":[{"severity":"warning","data":"unused variable"}]}"#;
        let out = postprocess(&exec(report));
        assert_eq!(out.stdout, "pass");
    }

    #[test]
    fn malformed_json_is_runtime_error_not_panic() {
        let out = postprocess(&exec("not json"));
        assert_eq!(out.reason, Some(Reason::RuntimeError));
    }
}
