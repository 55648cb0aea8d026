//! 证据脱敏 - 业务能力层
//!
//! 按字段名正则找出敏感字段，再把这些字段的值从证据产物中抹掉。

use regex::Regex;
use thiserror::Error;

use crate::error::{AppResult, ConfigError};
use crate::models::Record;

const REDACTED: &str = "[REDACTED]";

/// 短于该长度的值只在完整的属性值或元素文本中替换
const MIN_FREE_MATCH_CHARS: usize = 4;

/// 脱敏失败
#[derive(Debug, Error)]
pub enum MaskingError {
    /// 二进制产物无法按文本脱敏
    #[error("二进制产物无法脱敏（敏感字段: {fields:?}）")]
    BinaryArtifact { fields: Vec<String> },
}

/// 字段脱敏器
#[derive(Debug, Clone, Default)]
pub struct FieldMasker {
    patterns: Vec<Regex>,
}

impl FieldMasker {
    /// 编译字段名正则，任何一条无法编译都视为配置错误
    pub fn new(patterns: &[String]) -> AppResult<Self> {
        let patterns = patterns
            .iter()
            .map(|p| {
                Regex::new(p).map_err(|source| ConfigError::InvalidMaskPattern {
                    pattern: p.clone(),
                    source,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { patterns })
    }

    /// 记录中命中规则且有值的字段
    pub fn sensitive_fields(&self, record: &Record) -> Vec<String> {
        record
            .fields()
            .filter(|(name, _)| self.patterns.iter().any(|re| re.is_match(name)))
            .map(|(name, _)| name.to_string())
            .collect()
    }

    /// 对文本产物脱敏，返回脱敏后的文本和处理过的字段
    pub fn mask_text(&self, text: &str, record: &Record) -> (String, Vec<String>) {
        let fields = self.sensitive_fields(record);
        let mut masked = text.to_string();

        // 先替换长值，避免短值是长值子串时留下残片
        let mut values: Vec<&str> = fields.iter().filter_map(|f| record.get(f)).collect();
        values.sort_by_key(|v| std::cmp::Reverse(v.len()));
        for value in values {
            masked = redact_value(&masked, value);
        }

        (masked, fields)
    }

    /// 对二进制产物脱敏
    ///
    /// 没有敏感字段时原样通过；有敏感字段时无法处理，返回错误由调用方决定是否放行。
    pub fn mask_binary(&self, record: &Record) -> Result<(), MaskingError> {
        let fields = self.sensitive_fields(record);
        if fields.is_empty() {
            Ok(())
        } else {
            Err(MaskingError::BinaryArtifact { fields })
        }
    }
}

/// 替换文本中作为独立取值出现的 `value`
///
/// 长值不能嵌在更长的单词里；短值（如 `M`、`1`）必须恰好占满
/// `"…"`、`'…'` 或 `>…<`，否则会误伤无关的文本和标签。
fn redact_value(text: &str, value: &str) -> String {
    if value.is_empty() {
        return text.to_string();
    }
    let short = value.chars().count() < MIN_FREE_MATCH_CHARS;

    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for (start, _) in text.match_indices(value) {
        let end = start + value.len();
        let before = text[..start].chars().next_back();
        let after = text[end..].chars().next();
        let hit = if short {
            encloses(before, after)
        } else {
            on_boundary(value, before, after)
        };
        if hit {
            out.push_str(&text[last..start]);
            out.push_str(REDACTED);
            last = end;
        }
    }
    out.push_str(&text[last..]);
    out
}

fn encloses(before: Option<char>, after: Option<char>) -> bool {
    matches!(
        (before, after),
        (Some('"'), Some('"')) | (Some('\''), Some('\'')) | (Some('>'), Some('<'))
    )
}

fn on_boundary(value: &str, before: Option<char>, after: Option<char>) -> bool {
    let joins = |edge: Option<char>, neighbour: Option<char>| {
        matches!((edge, neighbour), (Some(e), Some(n)) if e.is_alphanumeric() && n.is_alphanumeric())
    };
    !joins(value.chars().next(), before) && !joins(value.chars().next_back(), after)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn masker() -> FieldMasker {
        FieldMasker::new(&["^narrative$".to_string(), "(?i)patient".to_string()]).unwrap()
    }

    fn record() -> Record {
        Record::new(
            "C-1",
            [
                ("narrative", "John Smith, 45, took Drug X"),
                ("patient_initials", "JS"),
                ("onset_date", "2024-01-02"),
            ],
        )
    }

    #[test]
    fn test_sensitive_fields_match_by_name() {
        let fields = masker().sensitive_fields(&record());
        assert_eq!(fields, vec!["narrative".to_string(), "patient_initials".to_string()]);
    }

    #[test]
    fn test_mask_text_removes_sensitive_values() {
        let html = "<p>John Smith, 45, took Drug X</p><span>JS</span><i>2024-01-02</i>";
        let (masked, fields) = masker().mask_text(html, &record());

        assert!(!masked.contains("John Smith"));
        assert!(!masked.contains(">JS<"));
        assert!(masked.contains("2024-01-02"));
        assert_eq!(masked.matches(REDACTED).count(), 2);
        assert_eq!(fields.len(), 2);
    }

    #[test]
    fn test_short_values_only_masked_in_their_own_slot() {
        let masker = FieldMasker::new(&["^sex$".to_string(), "^reporter$".to_string()]).unwrap();
        let record = Record::new("C-3", [("sex", "M"), ("reporter", "Anna")]);
        let html = concat!(
            "<meta charset=\"utf-8\"><p>Male patients: M</p>",
            "<option value=\"M\">M</option>",
            "<p>Annabel</p><i>Anna</i>"
        );

        let (masked, _) = masker.mask_text(html, &record);

        assert!(masked.contains("<meta charset=\"utf-8\">"));
        assert!(masked.contains("<p>Male patients: M</p>"));
        assert!(masked.contains("<option value=\"[REDACTED]\">[REDACTED]</option>"));
        assert!(masked.contains("<p>Annabel</p>"));
        assert!(masked.contains("<i>[REDACTED]</i>"));
    }

    #[test]
    fn test_mask_binary_fails_only_with_sensitive_fields() {
        assert!(masker().mask_binary(&record()).is_err());

        let plain = Record::new("C-2", [("onset_date", "2024-01-02")]);
        assert!(masker().mask_binary(&plain).is_ok());
    }

    #[test]
    fn test_invalid_pattern_is_config_error() {
        let err = FieldMasker::new(&["(unclosed".to_string()]).unwrap_err();
        assert!(err.to_string().contains("(unclosed"));
    }
}
