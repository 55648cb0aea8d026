//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 本层负责任务调度和状态迁移，是整个系统的"指挥中心"。
//!
//! ## 模块划分
//!
//! ### `batch_processor` - 应用入口
//! - 管理应用生命周期（初始化、运行、收尾）
//! - 选择执行器、打开审计存储
//! - 输出全局统计信息
//!
//! ### `batch` - 批次
//! - 校验准入、入队、关闭队列
//! - `start_batch` 后台运行，`BatchHandle` 提供汇总流和取消
//!
//! ### `worker_pool` / `job_processor` - 并发执行
//! - 固定数量的 worker，各自顺序处理
//! - 单个任务的状态机（成功 / 重试 / 死信 / 放弃）
//!
//! ### `job_queue` / `retry` / `evidence_recorder` / `reporter`
//! - 队列与死信区、重试决策、证据落盘、批次汇总
//!
//! ## 层次关系
//!
//! ```text
//! batch_processor (App)
//!     ↓
//! batch (准入 + 运行)
//!     ↓
//! worker_pool → job_processor (处理单个 Job)
//!     ↓
//! workflow::FillFlow (一次尝试)
//!     ↓
//! services (能力层：executor / validator / masking)
//!     ↓
//! infrastructure (基础设施：JsExecutor / AuditStore)
//! ```
//!
//! ## 设计原则
//!
//! 1. **单一职责**：队列只管排队，策略只管决定，记录器只管落盘
//! 2. **唯一交接点**：worker 之间只通过 JobQueue 交接任务
//! 3. **向下依赖**：编排层 → workflow → services → infrastructure
//! 4. **不做分类**：失败类型由执行器给出，编排层只执行策略

pub mod batch;
pub mod batch_processor;
pub mod evidence_recorder;
pub mod job_processor;
pub mod job_queue;
pub mod reporter;
pub mod retry;
pub mod worker_pool;

// 重新导出主要类型
pub use batch::{start_batch, Batch, BatchHandle, BatchOptions, BatchRun};
pub use batch_processor::App;
pub use evidence_recorder::{AttemptReport, EvidenceRecorder};
pub use job_processor::{JobDisposition, JobProcessor};
pub use job_queue::{Dequeued, JobQueue};
pub use reporter::{
    summarize, BatchReport, BatchReporter, BatchSummary, DeadLetterEntry, Disposition,
    DispositionState, KindCount, ReasonCount,
};
pub use retry::{RetryDecision, RetryPolicy};
pub use worker_pool::{PoolExit, WorkerPool};
