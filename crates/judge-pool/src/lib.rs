//! Owns the two worker pools (short and long-batch) and the dispatch and
//! classification logic that turns a submission into a verdict. This is
//! the crate the HTTP façade and the `judged` binary talk to.

mod batch;
mod classify;
mod dispatch;
mod pool;

pub use batch::run_batch;
pub use dispatch::run_submission;
pub use pool::WorkerPool;

use std::sync::Arc;

use judge_config::JudgeConfig;
use judge_core::{StatusResponse, Submission, Verdict, VerdictForm};
use judge_drivers::Toolchain;

/// The two independently-sized pools backing short (default) and long-batch
/// (Lean-oriented) traffic. Both share the same dispatch/driver/sandbox
/// code path; only `N` differs, so short jobs are never head-of-line
/// blocked behind long-running proof checks.
pub struct JudgeService {
    short_pool: Arc<WorkerPool>,
    long_pool: Arc<WorkerPool>,
}

impl JudgeService {
    pub fn start(config: Arc<JudgeConfig>, toolchain: Arc<Toolchain>) -> Self {
        let short_pool = WorkerPool::spawn(
            config.worker_pool_size,
            Arc::clone(&config),
            Arc::clone(&toolchain),
            config.scratch_root.clone(),
        );
        let long_pool = WorkerPool::spawn(
            config.long_batch_pool_size,
            config,
            toolchain,
            std::env::temp_dir().join("judge-scratch-long"),
        );
        Self {
            short_pool,
            long_pool,
        }
    }

    pub async fn judge_one(&self, submission: Submission, form: VerdictForm) -> Verdict {
        self.short_pool.submit(submission, form).await
    }

    pub async fn judge_batch(&self, submissions: Vec<Submission>, form: VerdictForm) -> Vec<Verdict> {
        batch::run_batch(&self.short_pool, submissions, form).await.results
    }

    pub async fn judge_long_batch(
        &self,
        submissions: Vec<Submission>,
        form: VerdictForm,
    ) -> Vec<Verdict> {
        batch::run_batch(&self.long_pool, submissions, form).await.results
    }

    pub fn status(&self) -> StatusResponse {
        StatusResponse {
            queue: self.short_pool.queue_depth(),
            num_workers: self.short_pool.num_workers(),
        }
    }

    pub fn long_status(&self) -> StatusResponse {
        StatusResponse {
            queue: self.long_pool.queue_depth(),
            num_workers: self.long_pool.num_workers(),
        }
    }
}
