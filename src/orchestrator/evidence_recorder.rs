//! 证据 / 审计记录器 - 编排层
//!
//! 每次尝试恰好调用一次，且在重试调度之前调用。
//!
//! - 脱敏失败：放行（产物照存，`masking_applied = false`）
//! - 写入失败：拒绝静默，返回系统级错误，批次中止

use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::AppResult;
use crate::infrastructure::AuditStore;
use crate::models::{EvidenceId, EvidenceOutcome, EvidenceRecord, Record};
use crate::services::FieldMasker;
use crate::workflow::AttemptResult;

/// 记录器的输入：一次已完成尝试的全部信息
pub struct AttemptReport<'a> {
    pub record: &'a Record,
    pub attempt: u32,
    pub result: &'a AttemptResult,
}

pub struct EvidenceRecorder {
    store: Arc<dyn AuditStore>,
    masker: FieldMasker,
}

impl EvidenceRecorder {
    pub fn new(store: Arc<dyn AuditStore>, masker: FieldMasker) -> Self {
        Self { store, masker }
    }

    pub fn store(&self) -> &Arc<dyn AuditStore> {
        &self.store
    }

    /// 持久化一次尝试的证据，返回证据 ID
    pub async fn record(&self, report: AttemptReport<'_>) -> AppResult<EvidenceId> {
        let attempt_id = EvidenceId::new();
        let record = report.record;
        let result = report.result;
        let prefix = format!("{}-{}-{}", sanitize(record.id()), report.attempt, attempt_id);

        let mut masked_fields = Vec::new();
        let mut masking_applied = true;
        let mut screenshot_ref = None;
        let mut dom_snapshot_ref = None;

        if let Some(blob) = &result.evidence {
            if let Some(html) = &blob.dom_snapshot {
                let (masked, fields) = self.masker.mask_text(html, record);
                masked_fields = fields;
                let name = format!("{}.html", prefix);
                dom_snapshot_ref = Some(self.store.put_artifact(&name, masked.as_bytes()).await?);
            }

            if let Some(png) = &blob.screenshot {
                if let Err(e) = self.masker.mask_binary(record) {
                    warn!("[记录 {}] 脱敏未生效，证据照常保存: {}", record.id(), e);
                    masking_applied = false;
                }
                let name = format!("{}.png", prefix);
                screenshot_ref = Some(self.store.put_artifact(&name, png).await?);
            }
        }

        let (outcome, error_kind, failed_field, message) = match &result.failure {
            None => (EvidenceOutcome::Success, None, None, None),
            Some(e) => (
                EvidenceOutcome::Failure,
                Some(e.kind),
                e.field.clone(),
                Some(e.message.clone()),
            ),
        };

        let evidence = EvidenceRecord {
            attempt_id,
            job_id: record.id().to_string(),
            attempt: report.attempt,
            timestamp: Utc::now(),
            outcome,
            error_kind,
            failed_field,
            message,
            matched_selectors: result.matched_selectors.clone(),
            screenshot_ref,
            dom_snapshot_ref,
            masked_fields,
            masking_applied,
        };

        self.store.append_evidence(&evidence).await?;
        debug!(
            "[记录 {}] 证据已记录: 尝试 {} -> {:?} ({})",
            record.id(),
            report.attempt,
            evidence.outcome,
            attempt_id
        );

        Ok(attempt_id)
    }
}

/// 产物文件名只保留安全字符
fn sanitize(id: &str) -> String {
    id.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}
