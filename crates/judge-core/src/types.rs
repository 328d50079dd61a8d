//! Submission, verdict, and batch request types shared by every judge crate.

use serde::{Deserialize, Serialize};

/// Language family a submission is written in. `Unknown` absorbs any wire
/// value that isn't one of the recognized tags, so an unrecognized
/// `submission.type` still deserializes cleanly and reaches the dispatcher
/// as a `sandbox_error` verdict instead of failing the request at the HTTP
/// boundary.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Cpp,
    Python,
    Lean,
    #[serde(other)]
    Unknown,
}

impl Language {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cpp => "cpp",
            Self::Python => "python",
            Self::Lean => "lean",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single code submission to judge.
///
/// Immutable once constructed: a worker owns it for the lifetime of one run.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Submission {
    #[serde(rename = "type")]
    pub language: Language,
    pub solution: String,
    #[serde(default)]
    pub input: String,
    #[serde(default)]
    pub expected_output: String,
    /// Wall-clock timeout in seconds. `None` defers to the driver's default.
    #[serde(default)]
    pub timeout: Option<f64>,
    /// Memory cap in MiB. `None` defers to the configured default.
    #[serde(default)]
    pub memory_limit: Option<u64>,
    /// Fractional CPU core allowance, e.g. `1.5` = 150%.
    #[serde(default)]
    pub cpu_core: Option<f64>,
}

/// Which response shape the caller wants: `judge` hides stdout on timeout,
/// `run` always includes it (with the suicide sentinel when it applies).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerdictForm {
    Judge,
    Run,
}

/// Batch execution mode. Both share the verdict schema; only throughput
/// characteristics differ (see the worker pool's two pool sizes).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchMode {
    Short,
    Long,
}

/// An ordered batch of submissions.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BatchRequest {
    pub submissions: Vec<Submission>,
}

/// Reason a submission did not run to success, mirrored 1:1 onto the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reason {
    WorkerTimeout,
    MemoryExceeded,
    CompileError,
    RuntimeError,
    SandboxError,
}

impl Reason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WorkerTimeout => "worker_timeout",
            Self::MemoryExceeded => "memory_exceeded",
            Self::CompileError => "compile_error",
            Self::RuntimeError => "runtime_error",
            Self::SandboxError => "sandbox_error",
        }
    }
}

impl std::fmt::Display for Reason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The literal line appended to stdout when wall-clock enforcement kills a
/// submission. Stable contract — callers match on it verbatim.
pub const SUICIDE_SENTINEL: &str = "Suicide from timeout.";

/// Uniform verdict schema returned by every language driver.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Verdict {
    pub run_success: bool,
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
    pub reason: Option<Reason>,
    pub cost: Option<f64>,
}

impl Verdict {
    /// Build a verdict for a timed-out submission, attaching the sentinel
    /// to `stdout` only when the caller asked for the `run` response form.
    pub fn timeout(form: VerdictForm, wall_seconds: f64) -> Self {
        let stdout = match form {
            VerdictForm::Run => SUICIDE_SENTINEL.to_string(),
            VerdictForm::Judge => String::new(),
        };
        Self {
            run_success: false,
            success: false,
            stdout,
            stderr: String::new(),
            reason: Some(Reason::WorkerTimeout),
            cost: Some(wall_seconds),
        }
    }

    pub fn sandbox_error(message: impl Into<String>) -> Self {
        Self {
            run_success: false,
            success: false,
            stdout: String::new(),
            stderr: message.into(),
            reason: Some(Reason::SandboxError),
            cost: None,
        }
    }
}

/// Aggregated response for a batch request, verdicts kept in input order.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BatchResult {
    pub results: Vec<Verdict>,
}

/// `GET /status` response.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub queue: usize,
    pub num_workers: usize,
}
