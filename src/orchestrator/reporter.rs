//! 批次汇总 - 编排层
//!
//! 汇总永远从终态任务集合重新计算，不单独维护计数器。
//! 聚合器显式传给需要它的地方，内部自行串行化访问。

use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{watch, Mutex};

use crate::error::AppResult;
use crate::infrastructure::AuditStore;
use crate::models::{ErrorKind, EvidenceId, Job, JobError, JobState, ValidationResult};

const TOP_N: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KindCount {
    pub kind: ErrorKind,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReasonCount {
    pub reason: String,
    pub count: usize,
}

/// 批次汇总快照
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchSummary {
    /// 入队的任务数
    pub total: usize,
    /// 校验未通过、未入队的记录数
    pub rejected: usize,
    pub succeeded: usize,
    pub dead_lettered: usize,
    /// 尚未到终态
    pub pending: usize,
    /// 终态任务累计尝试次数
    pub total_attempts: u64,
    pub mean_fill_time_ms: u64,
    pub median_fill_time_ms: u64,
    pub throughput_per_sec: f64,
    pub elapsed_ms: u64,
    /// 按类型分组的死信直方图（前 5）
    pub failure_kinds: Vec<KindCount>,
    /// 出现最多的死信原因（前 5）
    pub top_reasons: Vec<ReasonCount>,
    /// 批次结束标志
    pub complete: bool,
}

/// 死信明细
#[derive(Debug, Clone, Serialize)]
pub struct DeadLetterEntry {
    pub job_id: String,
    pub attempts: u32,
    pub kind: Option<ErrorKind>,
    pub reason: Option<String>,
    pub last_error: Option<JobError>,
    pub evidence_refs: Vec<EvidenceId>,
}

/// 可持久化的完整报告
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub summary: BatchSummary,
    pub dead_letters: Vec<DeadLetterEntry>,
    pub rejected: Vec<ValidationResult>,
}

/// 记录的最终去向类别
///
/// 校验未通过的记录从未成为任务，单独归为 `Rejected`。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DispositionState {
    Succeeded,
    DeadLettered,
    Rejected,
}

/// 某条记录的最终去向
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Disposition {
    pub job_id: String,
    pub state: DispositionState,
    pub attempts: u32,
    pub reason: Option<String>,
}

/// 从终态任务集合计算汇总（纯函数）
pub fn summarize(total: usize, rejected: usize, terminal: &[Job], elapsed: Duration) -> BatchSummary {
    let succeeded = terminal
        .iter()
        .filter(|j| j.state() == JobState::Succeeded)
        .count();
    let dead: Vec<&Job> = terminal
        .iter()
        .filter(|j| j.state() == JobState::DeadLettered)
        .collect();

    let mut fill_times: Vec<u64> = terminal
        .iter()
        .filter_map(Job::fill_time)
        .map(|d| d.as_millis() as u64)
        .collect();
    fill_times.sort_unstable();
    let mean_fill_time_ms = if fill_times.is_empty() {
        0
    } else {
        fill_times.iter().sum::<u64>() / fill_times.len() as u64
    };
    let median_fill_time_ms = median(&fill_times);

    let mut kinds: HashMap<ErrorKind, usize> = HashMap::new();
    let mut reasons: HashMap<String, usize> = HashMap::new();
    for job in &dead {
        if let Some(reason) = job.dead_letter_reason() {
            *kinds.entry(reason.kind).or_default() += 1;
            let key = match job.last_error() {
                Some(e) => format!("{}: {}", reason.kind, e.message),
                None => reason.to_string(),
            };
            *reasons.entry(key).or_default() += 1;
        }
    }

    let mut failure_kinds: Vec<KindCount> = kinds
        .into_iter()
        .map(|(kind, count)| KindCount { kind, count })
        .collect();
    failure_kinds.sort_by(|a, b| b.count.cmp(&a.count).then(a.kind.cmp(&b.kind)));
    failure_kinds.truncate(TOP_N);

    let mut top_reasons: Vec<ReasonCount> = reasons
        .into_iter()
        .map(|(reason, count)| ReasonCount { reason, count })
        .collect();
    top_reasons.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.reason.cmp(&b.reason)));
    top_reasons.truncate(TOP_N);

    let elapsed_secs = elapsed.as_secs_f64().max(1e-3);

    BatchSummary {
        total,
        rejected,
        succeeded,
        dead_lettered: dead.len(),
        pending: total.saturating_sub(terminal.len()),
        total_attempts: terminal.iter().map(|j| u64::from(j.attempt_count())).sum(),
        mean_fill_time_ms,
        median_fill_time_ms,
        throughput_per_sec: succeeded as f64 / elapsed_secs,
        elapsed_ms: elapsed.as_millis() as u64,
        failure_kinds,
        top_reasons,
        complete: false,
    }
}

fn median(sorted: &[u64]) -> u64 {
    match sorted.len() {
        0 => 0,
        n if n % 2 == 1 => sorted[n / 2],
        n => (sorted[n / 2 - 1] + sorted[n / 2]) / 2,
    }
}

#[derive(Default)]
struct ReporterState {
    total: usize,
    rejected: Vec<ValidationResult>,
    terminal: Vec<Job>,
}

/// 批次汇总器
pub struct BatchReporter {
    state: Mutex<ReporterState>,
    started: Instant,
    updates: watch::Sender<BatchSummary>,
}

impl Default for BatchReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl BatchReporter {
    pub fn new() -> Self {
        let (updates, _) = watch::channel(BatchSummary::default());
        Self {
            state: Mutex::new(ReporterState::default()),
            started: Instant::now(),
            updates,
        }
    }

    /// 订阅汇总快照（每次终态迁移推送一次，结束时推送 complete = true）
    pub fn subscribe(&self) -> watch::Receiver<BatchSummary> {
        self.updates.subscribe()
    }

    pub async fn record_admitted(&self, count: usize) {
        self.state.lock().await.total += count;
        self.publish(false).await;
    }

    pub async fn record_rejected(&self, result: ValidationResult) {
        self.state.lock().await.rejected.push(result);
    }

    /// 登记一个终态任务
    pub async fn record_terminal(&self, job: Job) {
        debug_assert!(job.state().is_terminal());
        {
            let mut state = self.state.lock().await;
            match state.terminal.iter().position(|j| j.id() == job.id()) {
                Some(pos) => state.terminal[pos] = job,
                None => state.terminal.push(job),
            }
        }
        self.publish(false).await;
    }

    /// 当前汇总
    pub async fn summary(&self) -> BatchSummary {
        let state = self.state.lock().await;
        summarize(
            state.total,
            state.rejected.len(),
            &state.terminal,
            self.started.elapsed(),
        )
    }

    /// 推送最终汇总
    pub async fn finish(&self) -> BatchSummary {
        self.publish(true).await
    }

    async fn publish(&self, complete: bool) -> BatchSummary {
        let mut summary = self.summary().await;
        summary.complete = complete;
        self.updates.send_replace(summary.clone());
        summary
    }

    /// 回答"记录 X 为什么失败"
    pub async fn explain(&self, job_id: &str) -> Option<Disposition> {
        let state = self.state.lock().await;
        if let Some(job) = state.terminal.iter().find(|j| j.id() == job_id) {
            // 终态只有成功和死信两种
            let state = match job.state() {
                JobState::Succeeded => DispositionState::Succeeded,
                _ => DispositionState::DeadLettered,
            };
            return Some(Disposition {
                job_id: job.id().to_string(),
                state,
                attempts: job.attempt_count(),
                reason: job.dead_letter_reason().map(ToString::to_string),
            });
        }
        state
            .rejected
            .iter()
            .find(|r| r.record_id == job_id)
            .map(|r| Disposition {
                job_id: r.record_id.clone(),
                state: DispositionState::Rejected,
                attempts: 0,
                reason: Some(format!("校验未通过: {}", r.reasons.join("; "))),
            })
    }

    /// 完整报告
    pub async fn report(&self) -> BatchReport {
        let summary = self.summary().await;
        let state = self.state.lock().await;
        let dead_letters = state
            .terminal
            .iter()
            .filter(|j| j.state() == JobState::DeadLettered)
            .map(|j| DeadLetterEntry {
                job_id: j.id().to_string(),
                attempts: j.attempt_count(),
                kind: j.dead_letter_reason().map(|r| r.kind),
                reason: j.dead_letter_reason().map(|r| r.detail.clone()),
                last_error: j.last_error().cloned(),
                evidence_refs: j.evidence_refs().to_vec(),
            })
            .collect();

        BatchReport {
            summary,
            dead_letters,
            rejected: state.rejected.clone(),
        }
    }

    /// 把完整报告追加到审计存储
    pub async fn persist(&self, store: &Arc<dyn AuditStore>) -> AppResult<BatchReport> {
        let report = self.report().await;
        let json = serde_json::to_value(&report)?;
        store.append_report(&json).await?;
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DeadLetterReason, Record};

    fn succeeded(id: &str, ms: u64) -> Job {
        let mut job = Job::new(Record::new(id, [("f", "v")]));
        job.begin_attempt();
        job.commit_attempt(EvidenceId::new());
        job.mark_succeeded(Duration::from_millis(ms));
        job
    }

    fn dead(id: &str, kind: ErrorKind, message: &str) -> Job {
        let mut job = Job::new(Record::new(id, [("f", "v")]));
        job.begin_attempt();
        job.commit_attempt(EvidenceId::new());
        job.set_last_error(JobError::new(kind, message, None));
        job.mark_dead_lettered(DeadLetterReason {
            kind,
            detail: message.to_string(),
        });
        job
    }

    #[test]
    fn test_summarize_counts_and_fill_times() {
        let terminal = vec![
            succeeded("a", 100),
            succeeded("b", 300),
            succeeded("c", 200),
            succeeded("d", 1_000),
            dead("e", ErrorKind::PermanentUi, "no such field"),
        ];
        let summary = summarize(6, 1, &terminal, Duration::from_secs(2));

        assert_eq!(summary.succeeded, 4);
        assert_eq!(summary.dead_lettered, 1);
        assert_eq!(summary.pending, 1);
        assert_eq!(summary.rejected, 1);
        assert_eq!(summary.total_attempts, 5);
        assert_eq!(summary.mean_fill_time_ms, 400);
        assert_eq!(summary.median_fill_time_ms, 250);
        assert!((summary.throughput_per_sec - 2.0).abs() < 1e-9);
        assert!(!summary.complete);
    }

    #[test]
    fn test_failure_histogram_sorted_and_truncated() {
        let mut terminal = Vec::new();
        for i in 0..3 {
            terminal.push(dead(&format!("p{}", i), ErrorKind::PermanentUi, "layout"));
        }
        terminal.push(dead("v0", ErrorKind::DataValidation, "bad date"));
        let summary = summarize(4, 0, &terminal, Duration::from_millis(10));

        assert_eq!(summary.failure_kinds[0].kind, ErrorKind::PermanentUi);
        assert_eq!(summary.failure_kinds[0].count, 3);
        assert_eq!(summary.failure_kinds[1].count, 1);
        assert_eq!(summary.top_reasons[0].reason, "PermanentUi: layout");
        assert_eq!(summary.top_reasons[0].count, 3);
    }

    #[test]
    fn test_zero_elapsed_does_not_divide_by_zero() {
        let summary = summarize(1, 0, &[succeeded("a", 5)], Duration::ZERO);
        assert!(summary.throughput_per_sec.is_finite());
    }

    #[tokio::test]
    async fn test_explain_and_finish() {
        let reporter = BatchReporter::new();
        let mut updates = reporter.subscribe();
        reporter.record_admitted(2).await;
        reporter.record_terminal(dead("x", ErrorKind::DataValidation, "bad date")).await;

        let disposition = reporter.explain("x").await.unwrap();
        assert_eq!(disposition.state, DispositionState::DeadLettered);
        assert_eq!(disposition.attempts, 1);
        assert!(disposition.reason.unwrap().contains("bad date"));
        assert!(reporter.explain("unknown").await.is_none());

        reporter
            .record_rejected(ValidationResult {
                record_id: "r".to_string(),
                valid: false,
                reasons: vec!["缺少必填字段 term".to_string()],
                warnings: vec![],
            })
            .await;
        let rejected = reporter.explain("r").await.unwrap();
        assert_eq!(rejected.state, DispositionState::Rejected);
        assert_eq!(rejected.attempts, 0);
        assert!(rejected.reason.unwrap().contains("term"));

        let last = reporter.finish().await;
        assert!(last.complete);
        assert_eq!(last.pending, 1);
        assert!(updates.borrow_and_update().complete);
    }
}
