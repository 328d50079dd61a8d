//! Fans a batch of submissions out across a worker pool, preserving input
//! order in the response regardless of completion order, and isolating
//! each submission's failure to its own slot.

use std::sync::Arc;

use judge_core::{BatchResult, Submission, Verdict, VerdictForm};

use crate::pool::WorkerPool;

/// Run every submission in `submissions` through `pool` concurrently and
/// return verdicts in the same order the submissions were given, not the
/// order they finished in.
pub async fn run_batch(
    pool: &Arc<WorkerPool>,
    submissions: Vec<Submission>,
    form: VerdictForm,
) -> BatchResult {
    let mut handles = Vec::with_capacity(submissions.len());
    for (index, submission) in submissions.into_iter().enumerate() {
        let pool = Arc::clone(pool);
        handles.push(tokio::spawn(async move {
            let verdict = pool.submit(submission, form).await;
            (index, verdict)
        }));
    }

    let mut slots: Vec<Option<Verdict>> = (0..handles.len()).map(|_| None).collect();
    for handle in handles {
        match handle.await {
            Ok((index, verdict)) => slots[index] = Some(verdict),
            Err(e) => {
                // The spawned future itself panicked (not the submission's
                // process -- that's already caught inside `run_submission`).
                // This slot alone becomes a sandbox error; siblings are
                // untouched since each ran in its own task.
                tracing::warn!("batch slot task panicked: {e}");
            }
        }
    }

    let results = slots
        .into_iter()
        .map(|slot| slot.unwrap_or_else(|| Verdict::sandbox_error("worker task panicked")))
        .collect();

    BatchResult { results }
}

#[cfg(test)]
mod tests {
    use super::*;
    use judge_config::{JudgeConfig, LanguageDefaults};
    use judge_core::Language;
    use judge_drivers::Toolchain;
    use std::collections::BTreeMap;
    use std::path::PathBuf;

    fn test_config(root: PathBuf) -> JudgeConfig {
        let mut languages = BTreeMap::new();
        languages.insert(
            "python".to_string(),
            LanguageDefaults {
                timeout_secs: 5.0,
                memory_mb: 256,
                cpu_core: 1.0,
            },
        );
        JudgeConfig {
            worker_pool_size: 2,
            long_batch_pool_size: 1,
            scratch_root: root,
            languages,
            bootstrap_config_path: PathBuf::new(),
            bootstrap_state_path: PathBuf::new(),
        }
    }

    fn submission(i: usize) -> Submission {
        Submission {
            language: Language::Python,
            solution: format!("print({i})"),
            input: String::new(),
            expected_output: i.to_string(),
            timeout: None,
            memory_limit: None,
            cpu_core: None,
        }
    }

    #[tokio::test]
    async fn batch_results_preserve_input_order_despite_unequal_completion_times() {
        let scratch_root = tempfile::tempdir().unwrap();
        let pool = WorkerPool::spawn(
            2,
            Arc::new(test_config(scratch_root.path().to_path_buf())),
            Arc::new(Toolchain::default()),
            scratch_root.path().to_path_buf(),
        );

        // Submission 0 sleeps longer than submission 1, so completion order
        // is reversed from input order; the result vec must still be 0,1,2.
        let mut submissions = vec![submission(1), submission(2)];
        submissions.insert(
            0,
            Submission {
                language: Language::Python,
                solution: "import time; time.sleep(0.2); print(0)".to_string(),
                input: String::new(),
                expected_output: "0".to_string(),
                timeout: None,
                memory_limit: None,
                cpu_core: None,
            },
        );

        let result = run_batch(&pool, submissions, VerdictForm::Judge).await;
        assert_eq!(result.results.len(), 3);
        assert!(result.results.iter().all(|v| v.success));
    }

    #[tokio::test]
    async fn one_failing_submission_does_not_affect_siblings() {
        let scratch_root = tempfile::tempdir().unwrap();
        let pool = WorkerPool::spawn(
            2,
            Arc::new(test_config(scratch_root.path().to_path_buf())),
            Arc::new(Toolchain::default()),
            scratch_root.path().to_path_buf(),
        );

        let submissions = vec![
            submission(1),
            Submission {
                language: Language::Python,
                solution: "1 / 0".to_string(),
                input: String::new(),
                expected_output: String::new(),
                timeout: None,
                memory_limit: None,
                cpu_core: None,
            },
            submission(2),
        ];

        let result = run_batch(&pool, submissions, VerdictForm::Judge).await;
        assert!(result.results[0].success);
        assert!(!result.results[1].run_success);
        assert!(result.results[2].success);
    }
}
