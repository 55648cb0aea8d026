//! 集成测试共用的脚本化执行器与故障存储
#![allow(dead_code)]

use async_trait::async_trait;
use case_autofill::error::{AppError, AppResult, StoreError};
use case_autofill::models::{
    AttemptOutcome, ErrorKind, EvidenceBlob, EvidenceRecord, Record, SelectorCandidate,
};
use case_autofill::orchestrator::{BatchOptions, RetryPolicy};
use case_autofill::services::{ActionExecutor, ExecutorFactory, RuleValidator};
use case_autofill::AuditStore;
use serde_json::Value as JsonValue;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const FIELDS: &[&str] = &["reaction_reported_term", "onset_date", "narrative"];

/// 一次尝试的剧本
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attempt {
    Succeed,
    /// 第一个字段就失败
    Fail(ErrorKind),
    /// 第一个字段时执行器崩溃
    Panic,
}

struct ScriptState {
    scripts: Mutex<HashMap<String, VecDeque<Attempt>>>,
    step_delay: Duration,
    screenshots: bool,
    in_flight: Mutex<HashSet<String>>,
    max_in_flight: AtomicUsize,
    violations: AtomicUsize,
    opens: AtomicUsize,
    fills: AtomicUsize,
}

/// 脚本化、可观测的执行器工厂；每个 worker 拿到独立的执行器
#[derive(Clone)]
pub struct ScriptedFactory {
    state: Arc<ScriptState>,
}

impl ScriptedFactory {
    pub fn new(step_delay: Duration) -> Self {
        Self {
            state: Arc::new(ScriptState {
                scripts: Mutex::new(HashMap::new()),
                step_delay,
                screenshots: false,
                in_flight: Mutex::new(HashSet::new()),
                max_in_flight: AtomicUsize::new(0),
                violations: AtomicUsize::new(0),
                opens: AtomicUsize::new(0),
                fills: AtomicUsize::new(0),
            }),
        }
    }

    /// 额外产出截图证据
    pub fn with_screenshots(step_delay: Duration) -> Self {
        let mut factory = Self::new(step_delay);
        if let Some(state) = Arc::get_mut(&mut factory.state) {
            state.screenshots = true;
        }
        factory
    }

    /// 为某条记录安排逐次尝试的结果；剧本用完后一律成功
    pub fn script(&self, id: &str, attempts: &[Attempt]) -> &Self {
        self.state
            .scripts
            .lock()
            .unwrap()
            .insert(id.to_string(), attempts.iter().copied().collect());
        self
    }

    pub fn max_in_flight(&self) -> usize {
        self.state.max_in_flight.load(Ordering::SeqCst)
    }

    /// 同一条记录被两个 worker 同时处理的次数
    pub fn violations(&self) -> usize {
        self.state.violations.load(Ordering::SeqCst)
    }

    pub fn opens(&self) -> usize {
        self.state.opens.load(Ordering::SeqCst)
    }

    pub fn fills(&self) -> usize {
        self.state.fills.load(Ordering::SeqCst)
    }

    pub fn into_factory(self) -> Arc<dyn ExecutorFactory> {
        Arc::new(self)
    }
}

#[async_trait]
impl ExecutorFactory for ScriptedFactory {
    async fn create(&self, _worker_id: usize) -> AppResult<Arc<dyn ActionExecutor>> {
        Ok(Arc::new(ScriptedExecutor {
            state: self.state.clone(),
            current: Mutex::new(None),
        }))
    }
}

struct ScriptedExecutor {
    state: Arc<ScriptState>,
    current: Mutex<Option<(Record, Attempt)>>,
}

impl ScriptedExecutor {
    fn release(&self) {
        if let Some((record, _)) = self.current.lock().unwrap().take() {
            self.state.in_flight.lock().unwrap().remove(record.id());
        }
    }

    fn snapshot(&self, record: &Record) -> EvidenceBlob {
        let body: String = record
            .fields()
            .map(|(k, v)| format!("<input name=\"{}\" value=\"{}\">", k, v))
            .collect();
        EvidenceBlob {
            screenshot: self.state.screenshots.then(|| vec![0x89, b'P', b'N', b'G']),
            dom_snapshot: Some(format!("<form id=\"{}\">{}</form>", record.id(), body)),
        }
    }
}

impl Drop for ScriptedExecutor {
    fn drop(&mut self) {
        self.release();
    }
}

#[async_trait]
impl ActionExecutor for ScriptedExecutor {
    fn name(&self) -> &str {
        "scripted"
    }

    fn mapped_fields(&self) -> Vec<String> {
        FIELDS.iter().map(|f| f.to_string()).collect()
    }

    fn resolve_selectors(&self, field: &str) -> Vec<SelectorCandidate> {
        vec![SelectorCandidate::new(format!("#{}", field), 0)]
    }

    async fn open(&self, record: &Record) -> AttemptOutcome {
        // 上一次尝试被放弃时不会走到 submit
        self.release();
        self.state.opens.fetch_add(1, Ordering::SeqCst);

        let attempt = self
            .state
            .scripts
            .lock()
            .unwrap()
            .get_mut(record.id())
            .and_then(VecDeque::pop_front)
            .unwrap_or(Attempt::Succeed);

        {
            let mut in_flight = self.state.in_flight.lock().unwrap();
            if !in_flight.insert(record.id().to_string()) {
                self.state.violations.fetch_add(1, Ordering::SeqCst);
            }
            self.state
                .max_in_flight
                .fetch_max(in_flight.len(), Ordering::SeqCst);
        }
        *self.current.lock().unwrap() = Some((record.clone(), attempt));
        AttemptOutcome::confirmed()
    }

    async fn fill(
        &self,
        _field: &str,
        _value: &str,
        candidates: &[SelectorCandidate],
    ) -> AttemptOutcome {
        self.state.fills.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.state.step_delay).await;

        let current = self.current.lock().unwrap().clone();
        match current {
            Some((record, Attempt::Fail(kind))) => {
                self.release();
                AttemptOutcome::failed(kind, format!("scripted {}", kind))
                    .with_evidence(self.snapshot(&record))
            }
            Some((_, Attempt::Panic)) => panic!("scripted executor crashed"),
            _ => AttemptOutcome::confirmed_with(candidates[0].selector.clone()),
        }
    }

    async fn submit(&self, record: &Record) -> AttemptOutcome {
        self.release();
        AttemptOutcome::confirmed().with_evidence(self.snapshot(record))
    }
}

/// 证据写入总是失败的存储
#[derive(Default)]
pub struct FailingStore;

#[async_trait]
impl AuditStore for FailingStore {
    async fn put_artifact(&self, name: &str, _bytes: &[u8]) -> AppResult<String> {
        Ok(format!("void://{}", name))
    }

    async fn append_evidence(&self, _record: &EvidenceRecord) -> AppResult<()> {
        Err(AppError::Store(StoreError::Unavailable {
            reason: "disk full".to_string(),
        }))
    }

    async fn append_report(&self, _report: &JsonValue) -> AppResult<()> {
        Ok(())
    }
}

pub fn record(id: &str) -> Record {
    Record::new(
        id,
        [
            ("reaction_reported_term", "headache"),
            ("onset_date", "2024-03-01"),
            ("narrative", "Jane Roe reported headache after dose two"),
        ],
    )
}

pub fn records(count: usize) -> Vec<Record> {
    (1..=count).map(|i| record(&format!("R-{:03}", i))).collect()
}

pub fn validator() -> RuleValidator {
    RuleValidator::new(vec!["reaction_reported_term".to_string()], vec![], vec![])
}

pub fn options(concurrency: usize, max_attempts: u32) -> BatchOptions {
    BatchOptions {
        concurrency,
        retry: RetryPolicy {
            max_attempts,
            backoff_base: Duration::from_millis(5),
            backoff_cap: Duration::from_millis(20),
            jitter: false,
        },
        fill_timeout: Duration::from_secs(2),
        mask_patterns: vec!["^narrative$".to_string()],
        verbose_logging: false,
    }
}
