use crate::models::record::Record;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use tokio::fs;

/// TOML 文件结构
#[derive(Debug, Deserialize)]
struct RecordFile {
    #[serde(default)]
    records: Vec<RawRecord>,
}

#[derive(Debug, Deserialize)]
struct RawRecord {
    id: String,
    #[serde(default)]
    fields: BTreeMap<String, toml::Value>,
}

/// 从单个 TOML 文件加载记录
pub async fn load_toml_records(toml_file_path: &Path) -> Result<Vec<Record>> {
    let content = fs::read_to_string(toml_file_path)
        .await
        .with_context(|| format!("无法读取TOML文件: {}", toml_file_path.display()))?;

    parse_records(&content)
        .with_context(|| format!("无法解析TOML文件: {}", toml_file_path.display()))
}

/// 解析 TOML 文本为记录列表
///
/// 非字符串的值（数字、日期、布尔）按 TOML 字面量转成字符串。
pub fn parse_records(content: &str) -> Result<Vec<Record>> {
    let file: RecordFile = toml::from_str(content)?;

    let records = file
        .records
        .into_iter()
        .map(|raw| {
            let fields = raw.fields.into_iter().map(|(k, v)| {
                let value = match v {
                    toml::Value::String(s) => s,
                    other => other.to_string(),
                };
                (k, value)
            });
            Record::new(raw.id, fields)
        })
        .collect();

    Ok(records)
}

/// 从文件夹中加载所有 TOML 文件中的记录
///
/// 同一批次内 ID 重复或为空的记录会被丢弃并告警。
pub async fn load_all_toml_files(folder_path: &str) -> Result<Vec<Record>> {
    let folder = PathBuf::from(folder_path);

    if !folder.exists() {
        anyhow::bail!("文件夹不存在: {}", folder_path);
    }

    let mut paths = Vec::new();
    let mut entries = fs::read_dir(&folder)
        .await
        .with_context(|| format!("无法读取文件夹: {}", folder_path))?;

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().and_then(|s| s.to_str()) == Some("toml") {
            paths.push(path);
        }
    }
    // read_dir 顺序不稳定
    paths.sort();

    let mut seen = HashSet::new();
    let mut records = Vec::new();

    for path in paths {
        tracing::info!(
            "正在加载: {}",
            path.file_name().unwrap_or_default().to_string_lossy()
        );

        match load_toml_records(&path).await {
            Ok(loaded) => {
                tracing::info!("成功加载 {} 条记录", loaded.len());
                for record in loaded {
                    if record.id().is_empty() {
                        tracing::warn!("跳过缺少 ID 的记录 ({})", path.display());
                        continue;
                    }
                    if !seen.insert(record.id().to_string()) {
                        tracing::warn!("跳过重复的记录 ID: {}", record.id());
                        continue;
                    }
                    records.push(record);
                }
            }
            Err(e) => {
                tracing::warn!("加载文件失败 {}: {:#}", path.display(), e);
            }
        }
    }

    Ok(records)
}
