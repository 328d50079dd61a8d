//! Pure verdict classifier: termination x compile outcome x output match
//! maps onto the wire `Verdict` schema, per the truth table described
//! alongside the batch orchestrator.

use judge_core::{Reason, Verdict, VerdictForm};
use judge_drivers::DriverOutput;
use judge_process::Termination;

/// Classify a completed driver prepare/run/postprocess pipeline into a
/// `Verdict`. `compile_error` short-circuits before a driver output even
/// exists (the process was never spawned).
pub fn classify_compile_error(stderr: String) -> Verdict {
    Verdict {
        run_success: false,
        success: false,
        stdout: String::new(),
        stderr,
        reason: Some(Reason::CompileError),
        cost: None,
    }
}

/// Classify a spawn failure (scratch dir creation, `exec` itself failing).
pub fn classify_spawn_error(message: impl Into<String>) -> Verdict {
    Verdict::sandbox_error(message)
}

/// Classify a completed run: the process terminated somehow and, for
/// `Termination::Normal`, a driver had a chance to interpret stdout/stderr.
pub fn classify_run(
    termination: Termination,
    form: VerdictForm,
    wall_seconds: f64,
    driver_output: Option<DriverOutput>,
) -> Verdict {
    match termination {
        Termination::Timeout => Verdict::timeout(form, wall_seconds),
        Termination::Oom => Verdict {
            run_success: false,
            success: false,
            stdout: String::new(),
            stderr: String::new(),
            reason: Some(Reason::MemoryExceeded),
            cost: Some(wall_seconds),
        },
        Termination::Killed => Verdict {
            run_success: false,
            success: false,
            stdout: String::new(),
            stderr: String::new(),
            reason: Some(Reason::RuntimeError),
            cost: Some(wall_seconds),
        },
        Termination::SpawnError => Verdict::sandbox_error("submission process could not be spawned"),
        Termination::Normal => {
            let out = driver_output.expect("normal termination always carries a driver output");
            let stdout = match form {
                VerdictForm::Run => out.stdout,
                VerdictForm::Judge if out.reason.is_none() && out.output_match => String::new(),
                VerdictForm::Judge => out.stdout,
            };
            Verdict {
                run_success: out.reason.is_none(),
                success: out.reason.is_none() && out.output_match,
                stdout,
                stderr: out.stderr,
                reason: out.reason,
                cost: Some(wall_seconds),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn driver_out(reason: Option<Reason>, output_match: bool) -> DriverOutput {
        DriverOutput {
            stdout: "output".to_string(),
            stderr: String::new(),
            reason,
            output_match,
        }
    }

    #[test]
    fn normal_with_matching_output_is_success() {
        let v = classify_run(Termination::Normal, VerdictForm::Judge, 0.1, Some(driver_out(None, true)));
        assert!(v.run_success);
        assert!(v.success);
        assert_eq!(v.reason, None);
    }

    #[test]
    fn normal_with_mismatched_output_runs_but_does_not_succeed() {
        let v = classify_run(Termination::Normal, VerdictForm::Judge, 0.1, Some(driver_out(None, false)));
        assert!(v.run_success);
        assert!(!v.success);
        assert_eq!(v.reason, None);
    }

    #[test]
    fn compile_error_is_never_a_run() {
        let v = classify_compile_error("syntax error".to_string());
        assert!(!v.run_success);
        assert!(!v.success);
        assert_eq!(v.reason, Some(Reason::CompileError));
    }

    #[test]
    fn timeout_reports_worker_timeout() {
        let v = classify_run(Termination::Timeout, VerdictForm::Run, 5.0, None);
        assert_eq!(v.reason, Some(Reason::WorkerTimeout));
        assert_eq!(v.stdout, judge_core::SUICIDE_SENTINEL);
    }

    #[test]
    fn oom_reports_memory_exceeded() {
        let v = classify_run(Termination::Oom, VerdictForm::Judge, 2.0, None);
        assert_eq!(v.reason, Some(Reason::MemoryExceeded));
        assert!(!v.run_success);
    }

    #[test]
    fn killed_reports_runtime_error() {
        let v = classify_run(Termination::Killed, VerdictForm::Judge, 2.0, None);
        assert_eq!(v.reason, Some(Reason::RuntimeError));
    }

    #[test]
    fn spawn_error_reports_sandbox_error() {
        let v = classify_run(Termination::SpawnError, VerdictForm::Judge, 0.0, None);
        assert_eq!(v.reason, Some(Reason::SandboxError));
    }

    #[test]
    fn judge_form_hides_stdout_on_clean_success() {
        let v = classify_run(Termination::Normal, VerdictForm::Judge, 0.1, Some(driver_out(None, true)));
        assert_eq!(v.stdout, "");
    }

    #[test]
    fn judge_form_still_surfaces_stdout_on_mismatch() {
        let v = classify_run(Termination::Normal, VerdictForm::Judge, 0.1, Some(driver_out(None, false)));
        assert_eq!(v.stdout, "output");
    }

    #[test]
    fn run_form_always_surfaces_stdout() {
        let v = classify_run(Termination::Normal, VerdictForm::Run, 0.1, Some(driver_out(None, true)));
        assert_eq!(v.stdout, "output");
    }
}
