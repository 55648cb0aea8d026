//! 批次 - 编排层
//!
//! ## 职责
//!
//! 1. **准入**：逐条校验记录，合格的入队，不合格的计入 rejected
//! 2. **运行**：启动 worker 池直到排空或取消；同一个批次可以多次运行
//! 3. **观察**：通过 watch 通道推送汇总快照
//!
//! ```text
//! start_batch(records)
//!     ↓
//! Batch::prepare  ── Validator ──→ rejected
//!     ↓
//! JobQueue → WorkerPool → JobProcessor → FillFlow → ActionExecutor
//!     ↓
//! BatchReporter ──watch──→ BatchHandle
//! ```

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::infrastructure::AuditStore;
use crate::models::{Job, Record, ValidationResult};
use crate::orchestrator::evidence_recorder::EvidenceRecorder;
use crate::orchestrator::job_processor::JobProcessor;
use crate::orchestrator::job_queue::JobQueue;
use crate::orchestrator::reporter::{BatchReporter, BatchSummary};
use crate::orchestrator::retry::RetryPolicy;
use crate::orchestrator::worker_pool::{PoolExit, WorkerPool};
use crate::services::{ExecutorFactory, FieldMasker, Validator};
use crate::workflow::FillFlow;

/// 批次运行参数
#[derive(Debug, Clone)]
pub struct BatchOptions {
    pub concurrency: usize,
    pub retry: RetryPolicy,
    pub fill_timeout: Duration,
    pub mask_patterns: Vec<String>,
    pub verbose_logging: bool,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            concurrency: 2,
            retry: RetryPolicy::default(),
            fill_timeout: Duration::from_secs(5),
            mask_patterns: Vec::new(),
            verbose_logging: false,
        }
    }
}

impl BatchOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            concurrency: config.max_concurrent_jobs,
            retry: RetryPolicy::from_config(config),
            fill_timeout: config.fill_timeout(),
            mask_patterns: config.mask_patterns.clone(),
            verbose_logging: config.verbose_logging,
        }
    }
}

/// 一次运行的结果
#[derive(Debug, Clone)]
pub struct BatchRun {
    pub exit: PoolExit,
    pub summary: BatchSummary,
}

/// 已准入的批次
pub struct Batch {
    queue: Arc<JobQueue>,
    reporter: Arc<BatchReporter>,
    pool: WorkerPool,
    store: Arc<dyn AuditStore>,
}

impl Batch {
    /// 校验并入队所有记录，然后关闭队列
    pub async fn prepare(
        records: Vec<Record>,
        validator: &dyn Validator,
        options: BatchOptions,
        factory: Arc<dyn ExecutorFactory>,
        store: Arc<dyn AuditStore>,
    ) -> AppResult<Self> {
        let masker = FieldMasker::new(&options.mask_patterns)?;
        let queue = Arc::new(JobQueue::new());
        let reporter = Arc::new(BatchReporter::new());

        let mut admitted = 0;
        for record in records {
            let result = validator.validate(&record);
            for warning in &result.warnings {
                warn!("[记录 {}] ⚠️ {}", record.id(), warning);
            }
            if !result.valid {
                warn!("[记录 {}] 校验未通过: {}", record.id(), result.summary());
                reporter.record_rejected(result).await;
                continue;
            }

            let id = record.id().to_string();
            match queue.enqueue(Job::new(record)).await {
                Ok(()) => admitted += 1,
                Err(AppError::Queue(e)) => {
                    warn!("[记录 {}] 未入队: {}", id, e);
                    let mut rejected = ValidationResult::valid(id);
                    rejected.valid = false;
                    rejected.reasons.push(e.to_string());
                    reporter.record_rejected(rejected).await;
                }
                Err(e) => return Err(e),
            }
        }
        queue.close().await;
        reporter.record_admitted(admitted).await;

        let processor = Arc::new(JobProcessor::new(
            FillFlow::new(options.fill_timeout, options.verbose_logging),
            EvidenceRecorder::new(store.clone(), masker),
            options.retry.clone(),
            queue.clone(),
            reporter.clone(),
        ));
        let pool = WorkerPool::new(options.concurrency, processor, factory);

        Ok(Self {
            queue,
            reporter,
            pool,
            store,
        })
    }

    pub fn queue(&self) -> &Arc<JobQueue> {
        &self.queue
    }

    pub fn reporter(&self) -> &Arc<BatchReporter> {
        &self.reporter
    }

    pub fn store(&self) -> &Arc<dyn AuditStore> {
        &self.store
    }

    pub fn summaries(&self) -> watch::Receiver<BatchSummary> {
        self.reporter.subscribe()
    }

    /// 运行 worker 池
    ///
    /// 取消后可以用新的取消令牌再次调用，继续处理队列中剩余（Retrying）的任务。
    pub async fn run(&self, cancel: &CancellationToken) -> AppResult<BatchRun> {
        info!(
            "📦 批次开始运行: 待处理 {} / 并发 {}",
            self.queue.outstanding().await,
            self.pool.size()
        );

        let exit = self.pool.run(cancel).await?;
        let summary = match exit {
            PoolExit::Drained => self.reporter.finish().await,
            PoolExit::Cancelled => {
                info!("⏸️ 批次已取消，{} 个任务留在队列中", self.queue.len().await);
                self.reporter.summary().await
            }
        };

        Ok(BatchRun { exit, summary })
    }
}

/// 后台运行中的批次
pub struct BatchHandle {
    batch: Arc<Batch>,
    summaries: watch::Receiver<BatchSummary>,
    cancel: CancellationToken,
    task: JoinHandle<AppResult<BatchRun>>,
}

impl BatchHandle {
    pub fn batch(&self) -> &Arc<Batch> {
        &self.batch
    }

    /// 汇总快照流；最后一个快照 `complete = true`
    pub fn summaries(&self) -> watch::Receiver<BatchSummary> {
        self.summaries.clone()
    }

    /// 发出协作式取消信号
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// 等待批次结束
    pub async fn wait(self) -> AppResult<BatchRun> {
        self.task
            .await
            .map_err(|e| AppError::Other(format!("批次任务异常退出: {}", e)))?
    }
}

/// 准入记录并在后台启动批次
pub async fn start_batch(
    records: Vec<Record>,
    validator: &dyn Validator,
    options: BatchOptions,
    factory: Arc<dyn ExecutorFactory>,
    store: Arc<dyn AuditStore>,
) -> AppResult<BatchHandle> {
    let batch = Arc::new(Batch::prepare(records, validator, options, factory, store).await?);
    let summaries = batch.summaries();
    let cancel = CancellationToken::new();

    let task = {
        let batch = batch.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { batch.run(&cancel).await })
    };

    Ok(BatchHandle {
        batch,
        summaries,
        cancel,
        task,
    })
}
