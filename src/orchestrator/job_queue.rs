//! 任务队列 - 编排层
//!
//! ## 职责
//!
//! - FIFO 入队；出队时只挑已过退避期的任务（还在退避中的跳过，不移除）
//! - 带延迟的重新入队
//! - 独立的死信区，进入即终态
//! - 关闭且所有任务都到终态后，出队返回 `Dequeued::Closed`
//!
//! 出队是 worker 之间唯一的交接点，任务不会同时被两个 worker 持有。

use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tokio::time::{sleep_until, Instant};
use tracing::debug;

use crate::error::{AppResult, QueueError};
use crate::models::{DeadLetterReason, Job, JobState};

/// 出队结果
#[derive(Debug)]
pub enum Dequeued {
    Job(Job),
    /// 队列已永久关闭且没有未完成的任务
    Closed,
}

#[derive(Default)]
struct QueueState {
    ready: VecDeque<Job>,
    dead_letters: Vec<Job>,
    /// 尚未到达终态的任务数（队列中 + worker 手中）
    outstanding: usize,
    closed: bool,
}

impl QueueState {
    fn is_drained(&self) -> bool {
        self.closed && self.outstanding == 0 && self.ready.is_empty()
    }
}

/// 任务队列
#[derive(Default)]
pub struct JobQueue {
    state: Mutex<QueueState>,
    changed: Notify,
}

impl JobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// 接收一个新任务
    pub async fn enqueue(&self, job: Job) -> AppResult<()> {
        let mut state = self.state.lock().await;
        if state.closed {
            return Err(QueueError::Closed {
                job_id: job.id().to_string(),
            }
            .into());
        }
        let duplicate = state.ready.iter().any(|j| j.id() == job.id())
            || state.dead_letters.iter().any(|j| j.id() == job.id());
        if duplicate {
            return Err(QueueError::DuplicateJob {
                job_id: job.id().to_string(),
            }
            .into());
        }

        state.ready.push_back(job);
        state.outstanding += 1;
        drop(state);

        self.changed.notify_waiters();
        Ok(())
    }

    /// 阻塞直到有可执行的任务，或队列永久关闭
    ///
    /// 取消安全：任务弹出后在同一次 poll 内返回，select! 丢弃该 future 不会丢任务。
    pub async fn dequeue(&self) -> Dequeued {
        loop {
            let notified = self.changed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let next_wake = {
                let mut state = self.state.lock().await;
                let now = Instant::now();

                if let Some(pos) = state.ready.iter().position(|j| j.is_eligible_at(now)) {
                    if let Some(job) = state.ready.remove(pos) {
                        return Dequeued::Job(job);
                    }
                }
                if state.is_drained() {
                    return Dequeued::Closed;
                }
                state.ready.iter().map(Job::next_eligible_time).min()
            };

            match next_wake {
                Some(at) => {
                    tokio::select! {
                        _ = &mut notified => {}
                        _ = sleep_until(at) => {}
                    }
                }
                None => notified.await,
            }
        }
    }

    /// 设置退避期后重新入队，状态置为 Retrying
    pub async fn requeue_with_delay(&self, mut job: Job, delay: Duration) {
        debug!("[记录 {}] 重新入队，{}ms 后可再次执行", job.id(), delay.as_millis());
        job.mark_retrying(Instant::now() + delay);
        self.state.lock().await.ready.push_back(job);
        self.changed.notify_waiters();
    }

    /// 移入死信区（终态，不可逆），返回终态任务的快照
    pub async fn dead_letter(&self, mut job: Job, reason: DeadLetterReason) -> Job {
        job.mark_dead_lettered(reason);
        let snapshot = job.clone();

        let mut state = self.state.lock().await;
        state.dead_letters.push(job);
        state.outstanding = state.outstanding.saturating_sub(1);
        drop(state);

        self.changed.notify_waiters();
        snapshot
    }

    /// 任务成功完成（由 worker 调用，只做计数）
    pub async fn complete(&self, job: &Job) {
        debug_assert_eq!(job.state(), JobState::Succeeded);
        let mut state = self.state.lock().await;
        state.outstanding = state.outstanding.saturating_sub(1);
        drop(state);
        self.changed.notify_waiters();
    }

    /// 不再接收新任务；所有任务到达终态后出队返回 Closed
    pub async fn close(&self) {
        self.state.lock().await.closed = true;
        self.changed.notify_waiters();
    }

    // ========== 只读查询 ==========

    /// 队列中（含退避中）的任务快照
    pub async fn queued_jobs(&self) -> Vec<Job> {
        self.state.lock().await.ready.iter().cloned().collect()
    }

    /// 死信区快照
    pub async fn dead_letters(&self) -> Vec<Job> {
        self.state.lock().await.dead_letters.clone()
    }

    /// 队列中等待的任务数
    pub async fn len(&self) -> usize {
        self.state.lock().await.ready.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// 未到终态的任务数
    pub async fn outstanding(&self) -> usize {
        self.state.lock().await.outstanding
    }

    pub async fn is_closed(&self) -> bool {
        self.state.lock().await.closed
    }
}
