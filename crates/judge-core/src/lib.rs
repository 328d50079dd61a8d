pub mod error;
pub mod types;

pub use error::JudgeError;
pub use types::{
    BatchMode, BatchRequest, BatchResult, Language, Reason, StatusResponse, Submission, Verdict,
    VerdictForm, SUICIDE_SENTINEL,
};
