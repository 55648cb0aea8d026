//! 审计证据记录
//!
//! 每次尝试恰好一条，写入后不可修改，只追加。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::models::outcome::ErrorKind;

/// 证据 ID（即 attempt_id）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EvidenceId(Uuid);

impl EvidenceId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for EvidenceId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EvidenceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceOutcome {
    Success,
    Failure,
}

/// 一次尝试的审计记录
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceRecord {
    pub attempt_id: EvidenceId,
    pub job_id: String,
    /// 第几次尝试（从 1 开始）
    pub attempt: u32,
    pub timestamp: DateTime<Utc>,
    pub outcome: EvidenceOutcome,
    pub error_kind: Option<ErrorKind>,
    pub failed_field: Option<String>,
    pub message: Option<String>,
    /// 字段 → 命中的选择器
    pub matched_selectors: Vec<(String, String)>,
    pub screenshot_ref: Option<String>,
    pub dom_snapshot_ref: Option<String>,
    /// 已应用脱敏的字段名
    pub masked_fields: Vec<String>,
    /// 脱敏是否完整应用（失败时放行但置为 false）
    pub masking_applied: bool,
}
