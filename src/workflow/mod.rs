pub mod retry;
pub mod stage_ctx;
pub mod stage_flow;

pub use retry::{with_retry, AttemptRecord, Jitter, RetryPolicy, RetryableError};
pub use stage_ctx::StageCtx;
pub use stage_flow::{StageArtifact, StageFlow};
