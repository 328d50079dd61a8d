//! Fixed-size worker pool: N `tokio::spawn`ed tasks pull one submission at a
//! time off a shared queue, run it to a verdict, and hand the verdict back
//! over a oneshot channel. One pool instance backs one of the two batch
//! modes (short/long) described by the dispatcher.

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use judge_config::{JudgeConfig, LanguageDefaults};
use judge_core::{Submission, Verdict, VerdictForm};
use judge_drivers::Toolchain;
use tokio::sync::{mpsc, oneshot, Mutex};

struct Job {
    submission: Submission,
    form: VerdictForm,
    reply: oneshot::Sender<Verdict>,
}

/// A fixed pool of workers draining one shared queue.
///
/// The queue is an `UnboundedSender`/`UnboundedReceiver` pair; the receiver
/// is wrapped in a `Mutex` so every worker task can take turns calling
/// `recv().await`, but the mutex is only ever held for the instant that
/// call resolves — never across a submission's execution.
pub struct WorkerPool {
    sender: mpsc::UnboundedSender<Job>,
    num_workers: usize,
    queue_depth: Arc<AtomicUsize>,
}

impl WorkerPool {
    /// Spawn `num_workers` tasks sharing `scratch_root` as their common
    /// parent scratch directory (each submission still gets its own unique
    /// subdirectory within it).
    pub fn spawn(
        num_workers: usize,
        config: Arc<JudgeConfig>,
        toolchain: Arc<Toolchain>,
        scratch_root: PathBuf,
    ) -> Arc<Self> {
        let (sender, receiver) = mpsc::unbounded_channel::<Job>();
        let receiver = Arc::new(Mutex::new(receiver));
        let queue_depth = Arc::new(AtomicUsize::new(0));

        for worker_id in 0..num_workers.max(1) {
            let receiver = Arc::clone(&receiver);
            let config = Arc::clone(&config);
            let toolchain = Arc::clone(&toolchain);
            let scratch_root = scratch_root.clone();
            let queue_depth = Arc::clone(&queue_depth);
            tokio::spawn(async move {
                worker_loop(worker_id, receiver, config, toolchain, scratch_root, queue_depth).await;
            });
        }

        Arc::new(Self {
            sender,
            num_workers: num_workers.max(1),
            queue_depth,
        })
    }

    /// Queue a submission and await its verdict. The queue itself is
    /// unbounded: admission never rejects, callers only see latency.
    pub async fn submit(&self, submission: Submission, form: VerdictForm) -> Verdict {
        let (reply_tx, reply_rx) = oneshot::channel();
        let job = Job {
            submission,
            form,
            reply: reply_tx,
        };
        self.queue_depth.fetch_add(1, Ordering::SeqCst);
        if self.sender.send(job).is_err() {
            self.queue_depth.fetch_sub(1, Ordering::SeqCst);
            return Verdict::sandbox_error("worker pool has shut down");
        }
        reply_rx
            .await
            .unwrap_or_else(|_| Verdict::sandbox_error("worker dropped without replying"))
    }

    pub fn num_workers(&self) -> usize {
        self.num_workers
    }

    /// Jobs currently queued or in flight. A worker decrements this the
    /// instant it pulls a job off the channel, before it starts running it.
    pub fn queue_depth(&self) -> usize {
        self.queue_depth.load(Ordering::SeqCst)
    }
}

async fn worker_loop(
    worker_id: usize,
    receiver: Arc<Mutex<mpsc::UnboundedReceiver<Job>>>,
    config: Arc<JudgeConfig>,
    toolchain: Arc<Toolchain>,
    scratch_root: PathBuf,
    queue_depth: Arc<AtomicUsize>,
) {
    loop {
        let job = {
            let mut rx = receiver.lock().await;
            rx.recv().await
        };
        let Some(job) = job else {
            tracing::debug!(worker_id, "worker pool channel closed, exiting");
            return;
        };
        queue_depth.fetch_sub(1, Ordering::SeqCst);

        let language = job.submission.language.as_str();
        let defaults = language_defaults(&config, language);
        let verdict = crate::dispatch::run_submission(
            &job.submission,
            &defaults,
            &toolchain,
            &scratch_root,
            job.form,
        )
        .await;

        if job.reply.send(verdict).is_err() {
            tracing::debug!(worker_id, "caller dropped before verdict was delivered");
        }
    }
}

fn language_defaults(config: &JudgeConfig, language: &str) -> LanguageDefaults {
    config
        .languages
        .get(language)
        .cloned()
        .unwrap_or(LanguageDefaults {
            timeout_secs: 5.0,
            memory_mb: 256,
            cpu_core: 1.0,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use judge_core::Language;
    use std::collections::BTreeMap;

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

    #[tokio::test]
    async fn submit_returns_a_verdict_for_a_trivial_submission() {
        let scratch_root = tempfile::tempdir().unwrap();
        let pool = WorkerPool::spawn(
            2,
            Arc::new(test_config(scratch_root.path().to_path_buf())),
            Arc::new(Toolchain::default()),
            scratch_root.path().to_path_buf(),
        );

        let submission = Submission {
            language: Language::Python,
            solution: "print('ok')".to_string(),
            input: String::new(),
            expected_output: "ok".to_string(),
            timeout: None,
            memory_limit: None,
            cpu_core: None,
        };

        let verdict = pool.submit(submission, VerdictForm::Judge).await;
        assert!(verdict.success);
    }

    #[tokio::test]
    async fn pool_reports_its_configured_worker_count() {
        let scratch_root = tempfile::tempdir().unwrap();
        let pool = WorkerPool::spawn(
            3,
            Arc::new(test_config(scratch_root.path().to_path_buf())),
            Arc::new(Toolchain::default()),
            scratch_root.path().to_path_buf(),
        );
        assert_eq!(pool.num_workers(), 3);
    }

    #[tokio::test]
    async fn concurrent_submissions_all_complete() {
        let scratch_root = tempfile::tempdir().unwrap();
        let pool = WorkerPool::spawn(
            4,
            Arc::new(test_config(scratch_root.path().to_path_buf())),
            Arc::new(Toolchain::default()),
            scratch_root.path().to_path_buf(),
        );

        let mut handles = Vec::new();
        for i in 0..8 {
            let pool = Arc::clone(&pool);
            handles.push(tokio::spawn(async move {
                let submission = Submission {
                    language: Language::Python,
                    solution: format!("print({i})"),
                    input: String::new(),
                    expected_output: i.to_string(),
                    timeout: None,
                    memory_limit: None,
                    cpu_core: None,
                };
                pool.submit(submission, VerdictForm::Judge).await
            }));
        }

        for handle in handles {
            let verdict = handle.await.unwrap();
            assert!(verdict.success);
        }
    }
}
