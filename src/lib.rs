//! # Case Autofill
//!
//! 把表格形式的病例记录并发录入网页表单的 Rust 应用程序
//!
//! ## 架构设计
//!
//! 本系统采用严格的四层架构：
//!
//! ### ① 基础设施层（Infrastructure）
//! - `infrastructure/` - 持有稀缺资源（Page、审计存储），只暴露能力
//! - `JsExecutor` - 唯一的 page owner，提供 eval() 能力
//! - `AuditStore` - 证据和报告的持久化（文件 / 内存）
//!
//! ### ② 业务能力层（Services）
//! - `services/` - 描述"我能做什么"，只处理单条记录的单个动作
//! - `Validator` - 入队前的数据校验
//! - `SelectorCatalog` - 字段 → 选择器降级链
//! - `ActionExecutor` - 打开表单 / 录入字段 / 提交（Chromium、试运行）
//! - `FieldMasker` - 证据脱敏
//!
//! ### ③ 流程层（Workflow）
//! - `workflow/` - 定义"一次尝试"的完整流程
//! - `JobCtx` - 上下文封装（记录 ID + 尝试序号 + worker）
//! - `FillFlow` - 流程编排（open → 逐字段 fill → submit）
//!
//! ### ④ 编排层（Orchestration）
//! - `orchestrator/job_queue` - 任务队列与死信区
//! - `orchestrator/worker_pool` - 固定大小的 worker 池
//! - `orchestrator/job_processor` - 单个任务的状态机
//! - `orchestrator/batch` - 批次准入、运行、汇总流
//!
//! ## 模块结构

pub mod browser;
pub mod config;
pub mod error;
pub mod infrastructure;

pub mod models;
pub mod orchestrator;
pub mod services;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use config::{Config, ExecutorKind};
pub use error::{AppError, AppResult};
pub use infrastructure::{AuditStore, FileAuditStore, JsExecutor, MemoryAuditStore};
pub use models::{ErrorKind, Job, JobState, Record, ValidationResult};
pub use orchestrator::{start_batch, App, Batch, BatchHandle, BatchOptions, BatchSummary};
pub use services::{ActionExecutor, ExecutorFactory, RuleValidator, SelectorCatalog, Validator};
pub use workflow::{FillFlow, JobCtx};
