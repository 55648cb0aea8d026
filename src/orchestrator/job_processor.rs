//! 单个任务处理器 - 编排层
//!
//! ## 职责
//!
//! 把一个出队的任务推进一步：执行一次尝试、记录证据、按结果迁移状态。
//!
//! ```text
//! InProgress ──成功──→ Succeeded
//!     │
//!     ├──可重试且未达上限──→ Retrying（退避后重新入队）
//!     ├──不可重试 / 达到上限──→ DeadLettered
//!     └──取消 / 系统错误──→ Retrying（尝试不提交，不留证据）
//! ```
//!
//! 证据总是在重试调度之前写入。

use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::error::AppResult;
use crate::models::{ErrorKind, Job};
use crate::orchestrator::evidence_recorder::{AttemptReport, EvidenceRecorder};
use crate::orchestrator::job_queue::JobQueue;
use crate::orchestrator::reporter::BatchReporter;
use crate::orchestrator::retry::{RetryDecision, RetryPolicy};
use crate::services::ActionExecutor;
use crate::workflow::{AttemptRun, FillFlow, JobCtx};

/// 一次处理后任务的去向
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobDisposition {
    Succeeded,
    Requeued { delay: Duration },
    DeadLettered(ErrorKind),
    /// 取消导致的放弃，任务已无延迟放回队列
    Abandoned,
}

/// 任务处理器（所有 worker 共享）
pub struct JobProcessor {
    flow: FillFlow,
    recorder: EvidenceRecorder,
    policy: RetryPolicy,
    queue: Arc<JobQueue>,
    reporter: Arc<BatchReporter>,
}

impl JobProcessor {
    pub fn new(
        flow: FillFlow,
        recorder: EvidenceRecorder,
        policy: RetryPolicy,
        queue: Arc<JobQueue>,
        reporter: Arc<BatchReporter>,
    ) -> Self {
        Self {
            flow,
            recorder,
            policy,
            queue,
            reporter,
        }
    }

    pub fn queue(&self) -> &Arc<JobQueue> {
        &self.queue
    }

    pub fn reporter(&self) -> &Arc<BatchReporter> {
        &self.reporter
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// 处理一个刚出队的任务
    ///
    /// 返回 Err 只表示系统级错误（如证据无法落盘）；此时任务已放回队列。
    pub async fn process(
        &self,
        executor: &dyn ActionExecutor,
        mut job: Job,
        worker_id: usize,
        cancel: &CancellationToken,
    ) -> AppResult<JobDisposition> {
        // 已用尽尝试次数的任务不再执行
        if job.attempt_count() >= self.policy.max_attempts {
            let reason = self.policy.exhausted(job.attempt_count(), job.last_error());
            warn!("[记录 {}] 尝试次数已用尽，直接进入死信", job.id());
            let snapshot = self.queue.dead_letter(job, reason).await;
            self.reporter.record_terminal(snapshot).await;
            return Ok(JobDisposition::DeadLettered(ErrorKind::MaxAttemptsExceeded));
        }

        let attempt = job.begin_attempt();
        let ctx = JobCtx::new(job.id(), attempt, self.policy.max_attempts, worker_id);
        info!("{} ▶ 开始录入 ({})", ctx, executor.name());

        let run = self.flow.run(executor, job.record(), &ctx, cancel).await;
        let result = match run {
            AttemptRun::Finished(result) => result,
            AttemptRun::Abandoned => {
                job.abandon_attempt();
                self.queue.requeue_with_delay(job, Duration::ZERO).await;
                return Ok(JobDisposition::Abandoned);
            }
        };

        // ========== 先写证据 ==========
        let report = AttemptReport {
            record: job.record(),
            attempt,
            result: &result,
        };
        let recorded = self.recorder.record(report).await;
        match recorded {
            Ok(evidence_id) => job.commit_attempt(evidence_id),
            Err(e) => {
                error!("{} ❌ 证据写入失败，中止批次: {}", ctx, e);
                job.abandon_attempt();
                self.queue.requeue_with_delay(job, Duration::ZERO).await;
                return Err(e);
            }
        }

        // ========== 再迁移状态 ==========
        let Some(failure) = result.failure else {
            job.mark_succeeded(result.elapsed);
            info!("{} ✅ 录入成功，用时 {}ms", ctx, result.elapsed.as_millis());
            self.queue.complete(&job).await;
            self.reporter.record_terminal(job).await;
            return Ok(JobDisposition::Succeeded);
        };

        let decision = self.policy.decide(job.attempt_count(), &failure);
        job.set_last_error(failure);

        match decision {
            RetryDecision::Requeue { delay } => {
                info!("{} 🔁 {}ms 后重试", ctx, delay.as_millis());
                self.queue.requeue_with_delay(job, delay).await;
                Ok(JobDisposition::Requeued { delay })
            }
            RetryDecision::DeadLetter(reason) => {
                let kind = reason.kind;
                warn!("{} ☠️ 进入死信: {}", ctx, reason);
                let snapshot = self.queue.dead_letter(job, reason).await;
                self.reporter.record_terminal(snapshot).await;
                Ok(JobDisposition::DeadLettered(kind))
            }
        }
    }
}
