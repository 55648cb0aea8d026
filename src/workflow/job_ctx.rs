//! 任务处理上下文
//!
//! 封装"哪个 worker 正在处理哪条记录的第几次尝试"这一信息

use std::fmt::Display;

/// 任务处理上下文（仅用于日志）
#[derive(Debug, Clone)]
pub struct JobCtx {
    /// 记录 ID
    pub job_id: String,

    /// 当前尝试序号（从1开始）
    pub attempt: u32,

    /// 尝试上限
    pub max_attempts: u32,

    /// worker 编号
    pub worker_id: usize,
}

impl JobCtx {
    /// 创建新的任务上下文
    pub fn new(job_id: impl Into<String>, attempt: u32, max_attempts: u32, worker_id: usize) -> Self {
        Self {
            job_id: job_id.into(),
            attempt,
            max_attempts,
            worker_id,
        }
    }
}

impl Display for JobCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[记录 {} 尝试 {}/{} worker#{}]",
            self.job_id, self.attempt, self.max_attempts, self.worker_id
        )
    }
}
