//! 任务：一条记录 + 跨尝试的可变处理状态
//!
//! 状态迁移只在 crate 内部发生（队列、worker），外部只读。

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use crate::models::evidence::EvidenceId;
use crate::models::outcome::ErrorKind;
use crate::models::record::Record;

/// 任务状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Queued,
    InProgress,
    Succeeded,
    Retrying,
    DeadLettered,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Succeeded | JobState::DeadLettered)
    }
}

/// 结构化的任务错误（类型 + 消息 + 出错字段）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobError {
    pub kind: ErrorKind,
    pub message: String,
    pub field: Option<String>,
}

impl JobError {
    pub fn new(kind: ErrorKind, message: impl Into<String>, field: Option<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            field,
        }
    }
}

impl fmt::Display for JobError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.field {
            Some(field) => write!(f, "{} @ {}: {}", self.kind, field, self.message),
            None => write!(f, "{}: {}", self.kind, self.message),
        }
    }
}

/// 进入死信的原因
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeadLetterReason {
    pub kind: ErrorKind,
    pub detail: String,
}

impl fmt::Display for DeadLetterReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.detail)
    }
}

/// 任务
///
/// 任意时刻只被队列、某个 worker、死信区三者之一持有。
#[derive(Debug, Clone)]
pub struct Job {
    record: Arc<Record>,
    attempt_count: u32,
    state: JobState,
    last_error: Option<JobError>,
    evidence_refs: Vec<EvidenceId>,
    next_eligible_time: Instant,
    dead_letter_reason: Option<DeadLetterReason>,
    fill_time: Option<Duration>,
}

impl Job {
    pub fn new(record: Record) -> Self {
        Self {
            record: Arc::new(record),
            attempt_count: 0,
            state: JobState::Queued,
            last_error: None,
            evidence_refs: Vec::new(),
            next_eligible_time: Instant::now(),
            dead_letter_reason: None,
            fill_time: None,
        }
    }

    /// 任务 ID 即记录 ID
    pub fn id(&self) -> &str {
        self.record.id()
    }

    pub fn record(&self) -> &Record {
        &self.record
    }

    pub fn attempt_count(&self) -> u32 {
        self.attempt_count
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    pub fn last_error(&self) -> Option<&JobError> {
        self.last_error.as_ref()
    }

    pub fn evidence_refs(&self) -> &[EvidenceId] {
        &self.evidence_refs
    }

    pub fn next_eligible_time(&self) -> Instant {
        self.next_eligible_time
    }

    pub fn dead_letter_reason(&self) -> Option<&DeadLetterReason> {
        self.dead_letter_reason.as_ref()
    }

    /// 成功那次尝试的耗时
    pub fn fill_time(&self) -> Option<Duration> {
        self.fill_time
    }

    pub fn is_eligible_at(&self, now: Instant) -> bool {
        self.next_eligible_time <= now
    }

    // ========== 状态迁移 ==========

    /// 开始一次尝试，返回本次尝试的序号
    ///
    /// 计数在证据落盘后由 `commit_attempt` 提交，只增不减。
    pub(crate) fn begin_attempt(&mut self) -> u32 {
        self.state = JobState::InProgress;
        self.attempt_count + 1
    }

    /// 提交本次尝试：计数加一并挂上它的证据
    pub(crate) fn commit_attempt(&mut self, evidence: EvidenceId) {
        self.attempt_count += 1;
        self.evidence_refs.push(evidence);
    }

    /// 放弃尚未提交的尝试：计数不变，不留证据，立即可再出队
    pub(crate) fn abandon_attempt(&mut self) {
        self.state = JobState::Retrying;
        self.next_eligible_time = Instant::now();
    }

    pub(crate) fn set_last_error(&mut self, error: JobError) {
        self.last_error = Some(error);
    }

    pub(crate) fn mark_succeeded(&mut self, fill_time: Duration) {
        self.state = JobState::Succeeded;
        self.fill_time = Some(fill_time);
    }

    pub(crate) fn mark_retrying(&mut self, eligible_at: Instant) {
        self.state = JobState::Retrying;
        self.next_eligible_time = eligible_at;
    }

    pub(crate) fn mark_dead_lettered(&mut self, reason: DeadLetterReason) {
        self.state = JobState::DeadLettered;
        self.dead_letter_reason = Some(reason);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job() -> Job {
        Job::new(Record::new("J-1", [("f", "v")]))
    }

    #[test]
    fn test_attempt_counted_only_when_committed() {
        let mut job = job();
        assert_eq!(job.begin_attempt(), 1);
        assert_eq!(job.state(), JobState::InProgress);
        assert_eq!(job.attempt_count(), 0);

        job.commit_attempt(EvidenceId::new());
        assert_eq!(job.attempt_count(), 1);
        assert_eq!(job.evidence_refs().len(), 1);
        assert_eq!(job.begin_attempt(), 2);
    }

    #[test]
    fn test_abandon_never_decreases_attempt_count() {
        let mut job = job();
        job.begin_attempt();
        job.commit_attempt(EvidenceId::new());

        job.begin_attempt();
        job.abandon_attempt();

        assert_eq!(job.attempt_count(), 1);
        assert_eq!(job.evidence_refs().len(), 1);
        assert_eq!(job.state(), JobState::Retrying);
        assert!(job.is_eligible_at(Instant::now()));
    }
}
