pub mod fill_flow;
pub mod job_ctx;

pub use fill_flow::{AttemptResult, AttemptRun, FillFlow};
pub use job_ctx::JobCtx;
