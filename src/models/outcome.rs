//! 执行器回报的单步结果
//!
//! 失败分类由执行器给出，编排层只信任这个分类，不做推断。

use serde::{Deserialize, Serialize};
use std::fmt;

/// 失败类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// 选择器未命中
    ElementNotFound,
    /// 元素尚不可交互等临时 UI 问题
    TransientUi,
    /// 外部页面无响应
    Network,
    /// 字段确认超时
    Timeout,
    /// 执行时才发现的数据规则问题
    DataValidation,
    /// 选择器降级链耗尽后确认的结构性不匹配
    PermanentUi,
    /// 尝试次数达到上限（由编排层判定）
    MaxAttemptsExceeded,
}

/// 错误大类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    TransientExecution,
    PermanentExecution,
    DataValidation,
}

impl ErrorKind {
    pub fn category(self) -> ErrorCategory {
        match self {
            ErrorKind::ElementNotFound
            | ErrorKind::TransientUi
            | ErrorKind::Network
            | ErrorKind::Timeout => ErrorCategory::TransientExecution,
            ErrorKind::DataValidation => ErrorCategory::DataValidation,
            ErrorKind::PermanentUi | ErrorKind::MaxAttemptsExceeded => {
                ErrorCategory::PermanentExecution
            }
        }
    }

    /// 是否允许重试
    pub fn is_retryable(self) -> bool {
        self.category() == ErrorCategory::TransientExecution
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::ElementNotFound => "ElementNotFound",
            ErrorKind::TransientUi => "TransientUi",
            ErrorKind::Network => "Network",
            ErrorKind::Timeout => "Timeout",
            ErrorKind::DataValidation => "DataValidation",
            ErrorKind::PermanentUi => "PermanentUi",
            ErrorKind::MaxAttemptsExceeded => "MaxAttemptsExceeded",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 选择器候选项，priority 越小越优先
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectorCandidate {
    pub selector: String,
    pub priority: u8,
}

impl SelectorCandidate {
    pub fn new(selector: impl Into<String>, priority: u8) -> Self {
        Self {
            selector: selector.into(),
            priority,
        }
    }
}

/// 执行器捕获的原始证据（尚未脱敏）
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EvidenceBlob {
    pub screenshot: Option<Vec<u8>>,
    pub dom_snapshot: Option<String>,
}

impl EvidenceBlob {
    pub fn is_empty(&self) -> bool {
        self.screenshot.is_none() && self.dom_snapshot.is_none()
    }
}

/// 单步执行状态
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FillStatus {
    /// 外部页面已确认
    Confirmed,
    Failed { kind: ErrorKind, message: String },
}

/// 执行器对一次 fill / open / submit 调用的回报
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptOutcome {
    pub status: FillStatus,
    /// 实际命中的选择器（供选择器健康度观测）
    pub matched_selector: Option<String>,
    pub evidence: Option<EvidenceBlob>,
}

impl AttemptOutcome {
    pub fn confirmed() -> Self {
        Self {
            status: FillStatus::Confirmed,
            matched_selector: None,
            evidence: None,
        }
    }

    pub fn confirmed_with(selector: impl Into<String>) -> Self {
        Self {
            matched_selector: Some(selector.into()),
            ..Self::confirmed()
        }
    }

    pub fn failed(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            status: FillStatus::Failed {
                kind,
                message: message.into(),
            },
            matched_selector: None,
            evidence: None,
        }
    }

    pub fn with_evidence(mut self, evidence: EvidenceBlob) -> Self {
        if !evidence.is_empty() {
            self.evidence = Some(evidence);
        }
        self
    }

    pub fn is_success(&self) -> bool {
        matches!(self.status, FillStatus::Confirmed)
    }
}
