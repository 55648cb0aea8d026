//! Chromium 执行器 - 业务能力层
//!
//! 通过注入 JS 操作表单：按优先级尝试选择器、写值、触发 input/change 事件，
//! 然后在页面内轮询字段的有效性作为"确认信号"。

use async_trait::async_trait;
use chromiumoxide::Browser;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::browser::open_form_page;
use crate::config::Config;
use crate::error::AppResult;
use crate::infrastructure::JsExecutor;
use crate::models::{AttemptOutcome, ErrorKind, EvidenceBlob, Record, SelectorCandidate};
use crate::services::action_executor::{ActionExecutor, ExecutorFactory};
use crate::services::mapping::SelectorCatalog;

/// 页面脚本的回报
#[derive(Debug, Deserialize)]
struct ScriptResponse {
    status: String,
    selector: Option<String>,
    message: Option<String>,
}

impl ScriptResponse {
    fn into_outcome(self) -> AttemptOutcome {
        let message = self.message.unwrap_or_default();
        let outcome = match self.status.as_str() {
            "confirmed" => AttemptOutcome::confirmed(),
            "not_found" => AttemptOutcome::failed(ErrorKind::ElementNotFound, message),
            "not_interactive" => AttemptOutcome::failed(ErrorKind::TransientUi, message),
            "invalid" => AttemptOutcome::failed(ErrorKind::DataValidation, message),
            "mismatch" => AttemptOutcome::failed(ErrorKind::PermanentUi, message),
            "timeout" => AttemptOutcome::failed(ErrorKind::Timeout, message),
            other => AttemptOutcome::failed(
                ErrorKind::TransientUi,
                format!("未知的页面回报 '{}': {}", other, message),
            ),
        };
        AttemptOutcome {
            matched_selector: self.selector,
            ..outcome
        }
    }
}

/// 页面行为参数
#[derive(Debug, Clone)]
pub struct FormSettings {
    pub target_url: String,
    pub submit_selector: String,
    pub success_selector: Option<String>,
    /// 页面内等待确认的时长，应小于编排层的字段超时
    pub confirm_timeout: Duration,
    pub capture_screenshots: bool,
}

impl FormSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            target_url: config.target_url.clone(),
            submit_selector: config.submit_selector.clone(),
            success_selector: config.success_selector.clone(),
            confirm_timeout: config.fill_timeout() * 4 / 5,
            capture_screenshots: config.capture_screenshots,
        }
    }
}

/// Chromium 执行器（每个 worker 一个页面）
pub struct ChromiumExecutor {
    js: JsExecutor,
    catalog: Arc<SelectorCatalog>,
    settings: FormSettings,
}

impl ChromiumExecutor {
    pub fn new(js: JsExecutor, catalog: Arc<SelectorCatalog>, settings: FormSettings) -> Self {
        Self {
            js,
            catalog,
            settings,
        }
    }

    async fn run_script(&self, js_code: String) -> AttemptOutcome {
        match self.js.eval_as::<ScriptResponse>(js_code).await {
            Ok(response) => response.into_outcome(),
            Err(e) => AttemptOutcome::failed(ErrorKind::Network, format!("页面无响应: {}", e)),
        }
    }

    /// 抓取证据；失败不影响结果
    async fn capture(&self) -> EvidenceBlob {
        let screenshot = if self.settings.capture_screenshots {
            match self.js.screenshot().await {
                Ok(bytes) => Some(bytes),
                Err(e) => {
                    warn!("截图失败: {}", e);
                    None
                }
            }
        } else {
            None
        };
        let dom_snapshot = match self.js.dom_snapshot().await {
            Ok(html) => Some(html),
            Err(e) => {
                warn!("DOM 快照失败: {}", e);
                None
            }
        };
        EvidenceBlob {
            screenshot,
            dom_snapshot,
        }
    }

    fn fill_script(&self, value: &str, candidates: &[SelectorCandidate]) -> AppResult<String> {
        let selectors: Vec<&str> = candidates.iter().map(|c| c.selector.as_str()).collect();
        Ok(format!(
            r#"
            (async () => {{
                const selectors = {selectors};
                const value = {value};
                const deadline = Date.now() + {timeout};
                let mismatched = null;
                for (const sel of selectors) {{
                    let el = null;
                    try {{ el = document.querySelector(sel); }} catch (e) {{ continue; }}
                    if (!el) continue;
                    const tag = el.tagName;
                    if (tag !== 'INPUT' && tag !== 'SELECT' && tag !== 'TEXTAREA') {{
                        mismatched = sel;
                        continue;
                    }}
                    if (el.disabled || el.readOnly) {{
                        return {{ status: 'not_interactive', selector: sel, message: '元素不可交互' }};
                    }}
                    el.focus();
                    if (el.type === 'checkbox') {{
                        el.checked = /^(serious|true|yes|1)$/i.test(value);
                    }} else {{
                        el.value = value;
                    }}
                    el.dispatchEvent(new Event('input', {{ bubbles: true }}));
                    el.dispatchEvent(new Event('change', {{ bubbles: true }}));
                    el.blur();
                    while (Date.now() < deadline) {{
                        if (el.checkValidity && !el.checkValidity()) {{
                            return {{ status: 'invalid', selector: sel, message: el.validationMessage }};
                        }}
                        if (el.type === 'checkbox' || tag === 'SELECT' || el.value === value) {{
                            return {{ status: 'confirmed', selector: sel }};
                        }}
                        await new Promise(r => setTimeout(r, 50));
                    }}
                    return {{ status: 'timeout', selector: sel, message: '字段未确认' }};
                }}
                if (mismatched) {{
                    return {{ status: 'mismatch', selector: mismatched, message: '选择器命中的不是表单控件' }};
                }}
                return {{ status: 'not_found', message: '所有候选选择器均未命中' }};
            }})()
            "#,
            selectors = serde_json::to_string(&selectors)?,
            value = serde_json::to_string(value)?,
            timeout = self.settings.confirm_timeout.as_millis(),
        ))
    }

    fn submit_script(&self) -> AppResult<String> {
        Ok(format!(
            r#"
            (async () => {{
                const button = document.querySelector({submit});
                if (!button) {{
                    return {{ status: 'not_found', message: '未找到提交按钮' }};
                }}
                button.click();
                const successSel = {success};
                if (!successSel) {{
                    return {{ status: 'confirmed', selector: {submit} }};
                }}
                const deadline = Date.now() + {timeout};
                while (Date.now() < deadline) {{
                    const el = document.querySelector(successSel);
                    if (el && !el.hidden && el.textContent.trim().length > 0) {{
                        return {{ status: 'confirmed', selector: {submit} }};
                    }}
                    await new Promise(r => setTimeout(r, 100));
                }}
                return {{ status: 'timeout', selector: {submit}, message: '未等到提交成功提示' }};
            }})()
            "#,
            submit = serde_json::to_string(&self.settings.submit_selector)?,
            success = serde_json::to_string(&self.settings.success_selector)?,
            timeout = self.settings.confirm_timeout.as_millis(),
        ))
    }
}

#[async_trait]
impl ActionExecutor for ChromiumExecutor {
    fn name(&self) -> &str {
        "chromium"
    }

    fn mapped_fields(&self) -> Vec<String> {
        self.catalog.field_order()
    }

    fn resolve_selectors(&self, field: &str) -> Vec<SelectorCandidate> {
        self.catalog.resolve(field)
    }

    async fn open(&self, record: &Record) -> AttemptOutcome {
        debug!("[记录 {}] 打开表单: {}", record.id(), self.settings.target_url);
        match self.js.goto(&self.settings.target_url).await {
            Ok(()) => AttemptOutcome::confirmed(),
            Err(e) => AttemptOutcome::failed(ErrorKind::Network, format!("打开表单失败: {}", e)),
        }
    }

    async fn fill(
        &self,
        field: &str,
        value: &str,
        candidates: &[SelectorCandidate],
    ) -> AttemptOutcome {
        let script = match self.fill_script(value, candidates) {
            Ok(script) => script,
            Err(e) => return AttemptOutcome::failed(ErrorKind::DataValidation, e.to_string()),
        };

        let outcome = self.run_script(script).await;
        if outcome.is_success() {
            debug!("字段 {} 已确认 (选择器: {:?})", field, outcome.matched_selector);
            outcome
        } else {
            let evidence = self.capture().await;
            outcome.with_evidence(evidence)
        }
    }

    async fn submit(&self, record: &Record) -> AttemptOutcome {
        debug!("[记录 {}] 提交表单", record.id());
        let outcome = match self.submit_script() {
            Ok(script) => self.run_script(script).await,
            Err(e) => AttemptOutcome::failed(ErrorKind::PermanentUi, e.to_string()),
        };
        let evidence = self.capture().await;
        outcome.with_evidence(evidence)
    }
}

/// Chromium 执行器工厂：为每个 worker 打开一个独立页面
pub struct ChromiumExecutorFactory {
    browser: Arc<Browser>,
    catalog: Arc<SelectorCatalog>,
    settings: FormSettings,
}

impl ChromiumExecutorFactory {
    pub fn new(browser: Arc<Browser>, catalog: Arc<SelectorCatalog>, settings: FormSettings) -> Self {
        Self {
            browser,
            catalog,
            settings,
        }
    }
}

#[async_trait]
impl ExecutorFactory for ChromiumExecutorFactory {
    async fn create(&self, worker_id: usize) -> AppResult<Arc<dyn ActionExecutor>> {
        debug!("[worker {}] 打开独立页面", worker_id);
        let page = open_form_page(&self.browser, &self.settings.target_url).await?;
        Ok(Arc::new(ChromiumExecutor::new(
            JsExecutor::new(page),
            self.catalog.clone(),
            self.settings.clone(),
        )))
    }
}
