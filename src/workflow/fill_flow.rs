//! 单次尝试的录入流程 - 流程层
//!
//! 流程顺序：
//! 1. open → 打开干净的表单
//! 2. 按映射目录顺序逐个字段 fill，每个字段等到确认才进入下一个
//! 3. submit
//!
//! 任一步失败即整条记录失败；重试总是从第一个字段重新开始。

use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::models::{AttemptOutcome, ErrorKind, EvidenceBlob, FillStatus, JobError, Record};
use crate::services::ActionExecutor;
use crate::utils::truncate_text;
use crate::workflow::job_ctx::JobCtx;

/// 一次尝试的结果
#[derive(Debug, Clone)]
pub struct AttemptResult {
    /// None 表示整条记录录入成功
    pub failure: Option<JobError>,
    /// 字段 → 命中的选择器
    pub matched_selectors: Vec<(String, String)>,
    pub evidence: Option<EvidenceBlob>,
    pub elapsed: Duration,
}

impl AttemptResult {
    pub fn is_success(&self) -> bool {
        self.failure.is_none()
    }
}

/// 尝试的走向
#[derive(Debug, Clone)]
pub enum AttemptRun {
    /// 尝试走完（成功或失败），需要记录证据
    Finished(AttemptResult),
    /// 收到取消信号，中途放弃
    Abandoned,
}

/// 录入流程
///
/// - 不持有任何资源（页面在执行器里）
/// - 不做失败分类，只补充出错字段
/// - 每一步都有超时，不允许无限等待
pub struct FillFlow {
    fill_timeout: Duration,
    verbose_logging: bool,
}

impl FillFlow {
    pub fn new(fill_timeout: Duration, verbose_logging: bool) -> Self {
        Self {
            fill_timeout,
            verbose_logging,
        }
    }

    pub async fn run(
        &self,
        executor: &dyn ActionExecutor,
        record: &Record,
        ctx: &JobCtx,
        cancel: &CancellationToken,
    ) -> AttemptRun {
        let started = Instant::now();
        let mut matched_selectors = Vec::new();

        if cancel.is_cancelled() {
            return AttemptRun::Abandoned;
        }

        // ========== 步骤 1: 打开表单 ==========
        let outcome = self.step(executor.open(record)).await;
        if let FillStatus::Failed { kind, message } = outcome.status {
            warn!("{} ⚠️ 打开表单失败: {}", ctx, message);
            return AttemptRun::Finished(AttemptResult {
                failure: Some(JobError::new(kind, message, None)),
                matched_selectors,
                evidence: outcome.evidence,
                elapsed: started.elapsed(),
            });
        }

        // ========== 步骤 2: 逐字段录入 ==========
        for field in executor.mapped_fields() {
            let Some(value) = record.get(&field) else {
                continue;
            };

            if cancel.is_cancelled() {
                info!("{} 收到取消信号，放弃本次尝试", ctx);
                return AttemptRun::Abandoned;
            }

            let candidates = executor.resolve_selectors(&field);
            if candidates.is_empty() {
                return AttemptRun::Finished(AttemptResult {
                    failure: Some(JobError::new(
                        ErrorKind::PermanentUi,
                        "没有可用的选择器",
                        Some(field),
                    )),
                    matched_selectors,
                    evidence: None,
                    elapsed: started.elapsed(),
                });
            }

            if self.verbose_logging {
                debug!("{} 录入 {} = {}", ctx, field, truncate_text(value, 40));
            }

            let outcome = self.step(executor.fill(&field, value, &candidates)).await;
            match outcome.status {
                FillStatus::Confirmed => {
                    if let Some(selector) = outcome.matched_selector {
                        matched_selectors.push((field, selector));
                    }
                }
                FillStatus::Failed { kind, message } => {
                    warn!("{} ⚠️ 字段 {} 失败: {} ({})", ctx, field, message, kind);
                    return AttemptRun::Finished(AttemptResult {
                        failure: Some(JobError::new(kind, message, Some(field))),
                        matched_selectors,
                        evidence: outcome.evidence,
                        elapsed: started.elapsed(),
                    });
                }
            }
        }

        if cancel.is_cancelled() {
            info!("{} 收到取消信号，放弃提交", ctx);
            return AttemptRun::Abandoned;
        }

        // ========== 步骤 3: 提交 ==========
        let outcome = self.step(executor.submit(record)).await;
        let failure = match outcome.status {
            FillStatus::Confirmed => None,
            FillStatus::Failed { kind, message } => {
                warn!("{} ⚠️ 提交失败: {}", ctx, message);
                Some(JobError::new(kind, message, None))
            }
        };

        AttemptRun::Finished(AttemptResult {
            failure,
            matched_selectors,
            evidence: outcome.evidence,
            elapsed: started.elapsed(),
        })
    }

    /// 给执行器调用包上超时；超时算作临时失败
    async fn step(&self, call: impl Future<Output = AttemptOutcome>) -> AttemptOutcome {
        match tokio::time::timeout(self.fill_timeout, call).await {
            Ok(outcome) => outcome,
            Err(_) => AttemptOutcome::failed(
                ErrorKind::Timeout,
                format!("等待确认超时 ({}ms)", self.fill_timeout.as_millis()),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::{DryRunExecutor, SelectorCatalog};
    use std::sync::Arc;

    fn record() -> Record {
        Record::new(
            "C-1",
            [
                ("onset_date", "2024-03-01"),
                ("reaction_reported_term", "headache"),
                ("unknown_column", "ignored"),
            ],
        )
    }

    fn ctx() -> JobCtx {
        JobCtx::new("C-1", 1, 3, 1)
    }

    fn finished(run: AttemptRun) -> AttemptResult {
        match run {
            AttemptRun::Finished(result) => result,
            AttemptRun::Abandoned => panic!("不应放弃"),
        }
    }

    #[tokio::test]
    async fn test_fills_in_catalog_order_and_submits() {
        let executor = DryRunExecutor::new(Arc::new(SelectorCatalog::default()));
        let flow = FillFlow::new(Duration::from_secs(1), true);

        let result = finished(flow.run(&executor, &record(), &ctx(), &CancellationToken::new()).await);

        assert!(result.is_success());
        let fields: Vec<&str> = result.matched_selectors.iter().map(|(f, _)| f.as_str()).collect();
        assert_eq!(fields, vec!["reaction_reported_term", "onset_date"]);
        let snapshot = result.evidence.and_then(|e| e.dom_snapshot).unwrap();
        assert!(snapshot.contains("<unmapped>"));
    }

    #[tokio::test]
    async fn test_slow_confirmation_times_out() {
        let executor = DryRunExecutor::new(Arc::new(SelectorCatalog::default()))
            .with_step_delay(Duration::from_millis(200));
        let flow = FillFlow::new(Duration::from_millis(20), false);

        let result = finished(flow.run(&executor, &record(), &ctx(), &CancellationToken::new()).await);

        let failure = result.failure.unwrap();
        assert_eq!(failure.kind, ErrorKind::Timeout);
        assert_eq!(failure.field.as_deref(), Some("reaction_reported_term"));
        assert!(result.matched_selectors.is_empty());
    }

    #[tokio::test]
    async fn test_field_without_selectors_is_permanent() {
        let no_selectors: &[&str] = &[];
        let catalog = SelectorCatalog::from_pairs([("onset_date", no_selectors)]);
        let executor = DryRunExecutor::new(Arc::new(catalog));
        let flow = FillFlow::new(Duration::from_secs(1), false);

        let result = finished(flow.run(&executor, &record(), &ctx(), &CancellationToken::new()).await);

        let failure = result.failure.unwrap();
        assert_eq!(failure.kind, ErrorKind::PermanentUi);
        assert_eq!(failure.field.as_deref(), Some("onset_date"));
    }

    #[tokio::test]
    async fn test_cancelled_attempt_is_abandoned() {
        let executor = DryRunExecutor::new(Arc::new(SelectorCatalog::default()));
        let flow = FillFlow::new(Duration::from_secs(1), false);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let run = flow.run(&executor, &record(), &ctx(), &cancel).await;
        assert!(matches!(run, AttemptRun::Abandoned));
    }
}
