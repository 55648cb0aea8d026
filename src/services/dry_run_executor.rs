//! 试运行执行器
//!
//! 不操作任何页面，只记录"将要做什么"。每次提交都生成一份文本快照，
//! 这样试运行时证据与脱敏流程也会完整走一遍。

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::models::{AttemptOutcome, EvidenceBlob, Record, SelectorCandidate};
use crate::services::action_executor::ActionExecutor;
use crate::services::mapping::SelectorCatalog;
use crate::utils::truncate_text;

pub struct DryRunExecutor {
    catalog: Arc<SelectorCatalog>,
    /// 模拟每个字段的确认耗时
    step_delay: Duration,
}

impl DryRunExecutor {
    pub fn new(catalog: Arc<SelectorCatalog>) -> Self {
        Self {
            catalog,
            step_delay: Duration::ZERO,
        }
    }

    pub fn with_step_delay(mut self, delay: Duration) -> Self {
        self.step_delay = delay;
        self
    }

    fn render_snapshot(&self, record: &Record) -> String {
        let mut lines = vec![format!("<form data-case=\"{}\">", record.id())];
        for (field, value) in record.fields() {
            let selector = self
                .catalog
                .resolve(field)
                .first()
                .map(|c| c.selector.clone())
                .unwrap_or_else(|| "<unmapped>".to_string());
            lines.push(format!(
                "  <!-- {} --> <output name=\"{}\">{}</output>",
                selector, field, value
            ));
        }
        lines.push("</form>".to_string());
        lines.join("\n")
    }
}

#[async_trait]
impl ActionExecutor for DryRunExecutor {
    fn name(&self) -> &str {
        "dry-run"
    }

    fn mapped_fields(&self) -> Vec<String> {
        self.catalog.field_order()
    }

    fn resolve_selectors(&self, field: &str) -> Vec<SelectorCandidate> {
        self.catalog.resolve(field)
    }

    async fn open(&self, record: &Record) -> AttemptOutcome {
        info!("[记录 {}] (试运行) 打开表单", record.id());
        for (field, _) in record.fields() {
            if !self.catalog.contains(field) {
                debug!("[记录 {}] (试运行) 字段 {} 未映射: <unmapped>", record.id(), field);
            }
        }
        AttemptOutcome::confirmed()
    }

    async fn fill(
        &self,
        field: &str,
        value: &str,
        candidates: &[SelectorCandidate],
    ) -> AttemptOutcome {
        if !self.step_delay.is_zero() {
            tokio::time::sleep(self.step_delay).await;
        }
        match candidates.first() {
            Some(candidate) => {
                debug!(
                    "(试运行) 将在 {} 输入 {} = {:?}",
                    candidate.selector,
                    field,
                    truncate_text(value, 40)
                );
                AttemptOutcome::confirmed_with(candidate.selector.clone())
            }
            None => {
                debug!("(试运行) 字段 {} 没有候选选择器", field);
                AttemptOutcome::confirmed()
            }
        }
    }

    async fn submit(&self, record: &Record) -> AttemptOutcome {
        info!("[记录 {}] (试运行) 提交表单", record.id());
        AttemptOutcome::confirmed().with_evidence(EvidenceBlob {
            screenshot: None,
            dom_snapshot: Some(self.render_snapshot(record)),
        })
    }
}
