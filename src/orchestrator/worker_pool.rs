//! 固定大小的 worker 池 - 编排层
//!
//! 每个 worker 是一个顺序循环：出队 → 执行 → 回报。
//! worker 数量是唯一的准入控制；每个 worker 独占一个执行器会话。
//!
//! 任一 worker 遇到系统级错误时，其余 worker 放弃手中的尝试并退出。
//! 执行器 panic 也按系统级错误处理，崩溃时持有的任务先放回队列。

use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::error::{AppError, AppResult};
use crate::orchestrator::job_processor::JobProcessor;
use crate::orchestrator::job_queue::Dequeued;
use crate::services::ExecutorFactory;

/// 池的退出方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolExit {
    /// 队列已关闭且全部任务到达终态
    Drained,
    /// 收到取消信号，未完成的任务留在队列中（Retrying）
    Cancelled,
}

pub struct WorkerPool {
    size: usize,
    processor: Arc<JobProcessor>,
    factory: Arc<dyn ExecutorFactory>,
}

impl WorkerPool {
    pub fn new(size: usize, processor: Arc<JobProcessor>, factory: Arc<dyn ExecutorFactory>) -> Self {
        Self {
            size: size.max(1),
            processor,
            factory,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// 运行直到队列排空、收到取消信号或出现系统级错误
    pub async fn run(&self, cancel: &CancellationToken) -> AppResult<PoolExit> {
        // 外部取消会传递给 halt；系统错误只取消 halt
        let halt = cancel.child_token();
        let mut workers = JoinSet::new();

        for worker_id in 1..=self.size {
            let processor = self.processor.clone();
            let factory = self.factory.clone();
            let halt = halt.clone();
            workers.spawn(async move { run_worker(worker_id, processor, factory, halt).await });
        }
        info!("👷 已启动 {} 个 worker", self.size);

        let mut first_error: Option<AppError> = None;
        while let Some(joined) = workers.join_next().await {
            let failure = match joined {
                Ok(Ok(())) => continue,
                Ok(Err(e)) => e,
                Err(join_error) => AppError::Other(format!("worker 异常退出: {}", join_error)),
            };
            error!("❌ 系统级错误，停止所有 worker: {}", failure);
            halt.cancel();
            first_error.get_or_insert(failure);
        }

        if let Some(e) = first_error {
            return Err(e);
        }

        let queue = self.processor.queue();
        if queue.is_closed().await && queue.outstanding().await == 0 {
            Ok(PoolExit::Drained)
        } else {
            Ok(PoolExit::Cancelled)
        }
    }
}

async fn run_worker(
    worker_id: usize,
    processor: Arc<JobProcessor>,
    factory: Arc<dyn ExecutorFactory>,
    halt: CancellationToken,
) -> AppResult<()> {
    let executor = factory.create(worker_id).await?;
    let queue = processor.queue().clone();

    loop {
        let next = tokio::select! {
            biased;
            _ = halt.cancelled() => break,
            next = queue.dequeue() => next,
        };

        let job = match next {
            Dequeued::Job(job) => job,
            Dequeued::Closed => break,
        };

        // 崩溃时用出队时的快照放回队列，本次尝试不计数
        let snapshot = job.clone();
        let processed = AssertUnwindSafe(processor.process(executor.as_ref(), job, worker_id, &halt))
            .catch_unwind()
            .await;

        match processed {
            Ok(result) => {
                result?;
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                let job_id = snapshot.id().to_string();
                error!("[记录 {}] 💥 worker {} 崩溃，任务放回队列: {}", job_id, worker_id, message);
                queue.requeue_with_delay(snapshot, Duration::ZERO).await;
                return Err(AppError::WorkerPanicked {
                    worker_id,
                    job_id,
                    message,
                });
            }
        }
    }

    Ok(())
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "未知 panic".to_string())
}
