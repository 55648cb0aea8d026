//! 审计存储 - 基础设施层
//!
//! 只追加写入：证据产物、证据记录、批次报告。编排层不依赖同一次运行内的回读。

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::{AppError, AppResult};
use crate::models::EvidenceRecord;

/// 持久化存储接口
#[async_trait]
pub trait AuditStore: Send + Sync {
    /// 保存一个证据产物（截图 / DOM 快照），返回引用
    async fn put_artifact(&self, name: &str, bytes: &[u8]) -> AppResult<String>;

    /// 追加一条证据记录
    async fn append_evidence(&self, record: &EvidenceRecord) -> AppResult<()>;

    /// 追加一份批次报告
    async fn append_report(&self, report: &JsonValue) -> AppResult<()>;
}

/// 基于文件目录的存储
///
/// 目录结构：
/// ```text
/// <root>/artifacts/<name>
/// <root>/evidence.jsonl
/// <root>/reports.jsonl
/// ```
pub struct FileAuditStore {
    root: PathBuf,
    // 串行化对 jsonl 的追加
    write_lock: Mutex<()>,
}

impl FileAuditStore {
    /// 创建存储并确保目录存在
    pub async fn open(root: impl Into<PathBuf>) -> AppResult<Self> {
        let root = root.into();
        let artifacts = root.join("artifacts");
        fs::create_dir_all(&artifacts)
            .await
            .map_err(|e| AppError::store_write_failed(artifacts.display().to_string(), e))?;
        Ok(Self {
            root,
            write_lock: Mutex::new(()),
        })
    }

    pub fn root(&self) -> &PathBuf {
        &self.root
    }

    async fn append_line(&self, file_name: &str, line: String) -> AppResult<()> {
        let path = self.root.join(file_name);
        let _guard = self.write_lock.lock().await;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| AppError::store_write_failed(path.display().to_string(), e))?;

        file.write_all(format!("{}\n", line).as_bytes())
            .await
            .map_err(|e| AppError::store_write_failed(path.display().to_string(), e))?;
        file.flush()
            .await
            .map_err(|e| AppError::store_write_failed(path.display().to_string(), e))?;
        Ok(())
    }
}

#[async_trait]
impl AuditStore for FileAuditStore {
    async fn put_artifact(&self, name: &str, bytes: &[u8]) -> AppResult<String> {
        let path = self.root.join("artifacts").join(name);
        fs::write(&path, bytes)
            .await
            .map_err(|e| AppError::store_write_failed(path.display().to_string(), e))?;
        debug!("已保存证据产物: {}", path.display());
        Ok(path.display().to_string())
    }

    async fn append_evidence(&self, record: &EvidenceRecord) -> AppResult<()> {
        let line = serde_json::to_string(record)?;
        self.append_line("evidence.jsonl", line).await
    }

    async fn append_report(&self, report: &JsonValue) -> AppResult<()> {
        self.append_line("reports.jsonl", report.to_string()).await
    }
}

/// 内存存储（试运行与测试使用）
#[derive(Default)]
pub struct MemoryAuditStore {
    inner: Mutex<MemoryState>,
}

#[derive(Default)]
struct MemoryState {
    artifacts: HashMap<String, Vec<u8>>,
    evidence: Vec<EvidenceRecord>,
    reports: Vec<JsonValue>,
}

impl MemoryAuditStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 全部证据记录（按写入顺序）
    pub async fn evidence(&self) -> Vec<EvidenceRecord> {
        self.inner.lock().await.evidence.clone()
    }

    /// 某条任务的证据记录
    pub async fn evidence_for(&self, job_id: &str) -> Vec<EvidenceRecord> {
        self.inner
            .lock()
            .await
            .evidence
            .iter()
            .filter(|e| e.job_id == job_id)
            .cloned()
            .collect()
    }

    pub async fn artifact(&self, reference: &str) -> Option<Vec<u8>> {
        self.inner.lock().await.artifacts.get(reference).cloned()
    }

    pub async fn reports(&self) -> Vec<JsonValue> {
        self.inner.lock().await.reports.clone()
    }
}

#[async_trait]
impl AuditStore for MemoryAuditStore {
    async fn put_artifact(&self, name: &str, bytes: &[u8]) -> AppResult<String> {
        let reference = format!("mem://{}", name);
        self.inner
            .lock()
            .await
            .artifacts
            .insert(reference.clone(), bytes.to_vec());
        Ok(reference)
    }

    async fn append_evidence(&self, record: &EvidenceRecord) -> AppResult<()> {
        self.inner.lock().await.evidence.push(record.clone());
        Ok(())
    }

    async fn append_report(&self, report: &JsonValue) -> AppResult<()> {
        self.inner.lock().await.reports.push(report.clone());
        Ok(())
    }
}
