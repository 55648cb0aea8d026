//! 动作执行器接口 - 业务能力层
//!
//! 编排层只通过这个接口接触外部页面。具体实现（Chromium / 试运行）在批次启动时选定。

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::AppResult;
use crate::models::{AttemptOutcome, Record, SelectorCandidate};

/// 动作执行器
///
/// 约定：
/// - 失败分类由执行器给出（`FillStatus::Failed { kind, .. }`），编排层不推断
/// - `fill` 必须按优先级依次尝试候选选择器，并回报命中的那个
/// - 每个方法内部都要有超时，编排层另外再包一层超时兜底
#[async_trait]
pub trait ActionExecutor: Send + Sync {
    /// 执行器名称（日志用）
    fn name(&self) -> &str;

    /// 按录入顺序列出所有映射字段
    fn mapped_fields(&self) -> Vec<String>;

    /// 解析字段的选择器降级链
    fn resolve_selectors(&self, field: &str) -> Vec<SelectorCandidate>;

    /// 开始一次尝试：打开一张干净的表单
    async fn open(&self, _record: &Record) -> AttemptOutcome {
        AttemptOutcome::confirmed()
    }

    /// 录入一个字段并等待外部确认
    async fn fill(
        &self,
        field: &str,
        value: &str,
        candidates: &[SelectorCandidate],
    ) -> AttemptOutcome;

    /// 所有字段完成后提交表单
    async fn submit(&self, _record: &Record) -> AttemptOutcome {
        AttemptOutcome::confirmed()
    }
}

/// 为每个 worker 创建执行器
///
/// 每个 worker 独占一个会话（浏览器页面），所以由工厂按 worker 创建。
#[async_trait]
pub trait ExecutorFactory: Send + Sync {
    async fn create(&self, worker_id: usize) -> AppResult<Arc<dyn ActionExecutor>>;
}

/// 所有 worker 共用同一个执行器（试运行、测试）
pub struct SharedExecutor {
    executor: Arc<dyn ActionExecutor>,
}

impl SharedExecutor {
    pub fn new(executor: Arc<dyn ActionExecutor>) -> Self {
        Self { executor }
    }
}

#[async_trait]
impl ExecutorFactory for SharedExecutor {
    async fn create(&self, _worker_id: usize) -> AppResult<Arc<dyn ActionExecutor>> {
        Ok(self.executor.clone())
    }
}
