//! 字段 → 选择器映射目录
//!
//! 目录里的字段顺序就是表单的 Tab 顺序，也是录入顺序，跨尝试保持不变。

use serde::Deserialize;
use std::path::Path;

use crate::error::{AppError, AppResult, FileError};
use crate::models::SelectorCandidate;

/// 单个字段的映射
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldMapping {
    pub field: String,
    /// 按优先级排好序的降级链
    pub candidates: Vec<SelectorCandidate>,
}

/// 选择器目录
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectorCatalog {
    fields: Vec<FieldMapping>,
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    fields: Vec<CatalogEntry>,
}

#[derive(Debug, Deserialize)]
struct CatalogEntry {
    name: String,
    selectors: Vec<String>,
}

/// 默认的案例表单映射（字段, 降级链）
const DEFAULT_FORM: &[(&str, &[&str])] = &[
    ("case_id", &["#caseId", "input[name=\"caseId\"]"]),
    (
        "reaction_reported_term",
        &["input[name=\"reportedTerm\"]", "#reportedTerm"],
    ),
    ("meddra_level", &["select#meddraLevel", "select[name=\"meddraLevel\"]"]),
    ("meddra_term_text", &["input[name=\"meddraText\"]", "#meddraText"]),
    ("meddra_code", &["input[name=\"meddraCode\"]", "#meddraCode"]),
    ("meddra_version", &["input[name=\"meddraVersion\"]", "#meddraVersion"]),
    ("onset_date", &["input[name=\"onsetDate\"]", "#onsetDate"]),
    ("seriousness", &["input[name=\"serious\"]", "#serious"]),
    ("suspect_drug", &["input[name=\"suspectDrug\"]", "#suspectDrug"]),
    ("dose_text", &["input[name=\"dose\"]", "#dose"]),
    ("outcome", &["select#outcome", "select[name=\"outcome\"]"]),
    ("narrative", &["textarea#narrative", "textarea[name=\"narrative\"]"]),
];

impl SelectorCatalog {
    pub fn new(fields: Vec<FieldMapping>) -> Self {
        let fields = fields
            .into_iter()
            .map(|mut m| {
                m.candidates.sort_by_key(|c| c.priority);
                m
            })
            .collect();
        Self { fields }
    }

    /// 从 (字段, [选择器...]) 列表构建，优先级按列表位置
    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a [&'a str])>) -> Self {
        let fields = pairs
            .into_iter()
            .map(|(field, selectors)| FieldMapping {
                field: field.to_string(),
                candidates: selectors
                    .iter()
                    .enumerate()
                    .map(|(i, s)| SelectorCandidate::new(*s, i as u8))
                    .collect(),
            })
            .collect();
        Self::new(fields)
    }

    /// 从 TOML 文件加载
    pub fn from_toml_file(path: &Path) -> AppResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AppError::file_read_failed(path.display().to_string(), e))?;
        let file: CatalogFile = toml::from_str(&content).map_err(|e| {
            AppError::File(FileError::TomlParseFailed {
                path: path.display().to_string(),
                source: Box::new(e),
            })
        })?;

        let fields = file
            .fields
            .into_iter()
            .map(|entry| FieldMapping {
                field: entry.name,
                candidates: entry
                    .selectors
                    .into_iter()
                    .enumerate()
                    .map(|(i, s)| SelectorCandidate::new(s, i as u8))
                    .collect(),
            })
            .collect();
        Ok(Self::new(fields))
    }

    /// 解析某个字段的选择器候选（按优先级）
    pub fn resolve(&self, field: &str) -> Vec<SelectorCandidate> {
        self.fields
            .iter()
            .find(|m| m.field == field)
            .map(|m| m.candidates.clone())
            .unwrap_or_default()
    }

    /// 录入顺序
    pub fn field_order(&self) -> Vec<String> {
        self.fields.iter().map(|m| m.field.clone()).collect()
    }

    pub fn contains(&self, field: &str) -> bool {
        self.fields.iter().any(|m| m.field == field)
    }
}

impl Default for SelectorCatalog {
    fn default() -> Self {
        Self::from_pairs(DEFAULT_FORM.iter().copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_catalog_order() {
        let catalog = SelectorCatalog::default();
        let order = catalog.field_order();
        assert_eq!(order.len(), 12);
        assert_eq!(order.first().map(String::as_str), Some("case_id"));
        assert_eq!(order.last().map(String::as_str), Some("narrative"));
    }

    #[test]
    fn test_candidates_sorted_by_priority() {
        let catalog = SelectorCatalog::new(vec![FieldMapping {
            field: "dose_text".into(),
            candidates: vec![
                SelectorCandidate::new("#fallback", 2),
                SelectorCandidate::new("#primary", 0),
            ],
        }]);
        let resolved = catalog.resolve("dose_text");
        assert_eq!(resolved[0].selector, "#primary");
        assert_eq!(resolved[1].selector, "#fallback");
    }

    #[test]
    fn test_unknown_field_resolves_empty() {
        let catalog = SelectorCatalog::default();
        assert!(catalog.resolve("not_a_field").is_empty());
        assert!(!catalog.contains("not_a_field"));
    }

    #[test]
    fn test_load_from_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mapping.toml");
        std::fs::write(
            &path,
            r##"
[[fields]]
name = "onset_date"
selectors = ["#onset", "input[name=onset]"]

[[fields]]
name = "narrative"
selectors = ["textarea#narrative"]
"##,
        )
        .unwrap();

        let catalog = SelectorCatalog::from_toml_file(&path).unwrap();
        assert_eq!(catalog.field_order(), vec!["onset_date", "narrative"]);
        assert_eq!(catalog.resolve("onset_date")[1].selector, "input[name=onset]");
    }
}
