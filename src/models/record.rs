//! 输入记录与校验结果
//!
//! `Record` 一经创建便不可修改，整个批次运行期间都保留用于审计。

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// 一条待录入的案例记录
///
/// 字段名 → 原始值。ID 在同一批次内唯一。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    id: String,
    fields: BTreeMap<String, String>,
}

impl Record {
    /// 创建新记录，空白值会被丢弃，其余值去除首尾空格
    pub fn new<K, V>(id: impl Into<String>, fields: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        let fields = fields
            .into_iter()
            .filter_map(|(k, v)| {
                let value: String = v.into();
                let trimmed = value.trim();
                if trimmed.is_empty() {
                    None
                } else {
                    Some((k.into(), trimmed.to_string()))
                }
            })
            .collect();

        Self {
            id: id.into().trim().to_string(),
            fields,
        }
    }

    /// 记录 ID
    pub fn id(&self) -> &str {
        &self.id
    }

    /// 读取字段值
    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields.get(field).map(String::as_str)
    }

    /// 遍历所有字段（按字段名排序）
    pub fn fields(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// 校验结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub record_id: String,
    pub valid: bool,
    pub reasons: Vec<String>,
    /// 警告不阻止入队
    pub warnings: Vec<String>,
}

impl ValidationResult {
    pub fn valid(record_id: impl Into<String>) -> Self {
        Self {
            record_id: record_id.into(),
            valid: true,
            reasons: Vec::new(),
            warnings: Vec::new(),
        }
    }

    /// 一行可读的摘要
    pub fn summary(&self) -> String {
        match (self.valid, self.warnings.is_empty()) {
            (true, true) => format!("{}: 校验通过", self.record_id),
            (true, false) => format!(
                "{}: 校验通过（警告: {}）",
                self.record_id,
                self.warnings.join("; ")
            ),
            (false, _) => format!("{}: 校验失败 - {}", self.record_id, self.reasons.join("; ")),
        }
    }
}
