//! 记录校验 - 业务能力层
//!
//! 纯函数：Record → ValidationResult。只有通过校验的记录才会入队。

use crate::config::Config;
use crate::models::{Record, ValidationResult};

/// 校验接口
pub trait Validator: Send + Sync {
    fn validate(&self, record: &Record) -> ValidationResult;
}

/// 基于配置规则的校验器
///
/// 规则：
/// - 必填字段
/// - 成对字段（要么都有，要么都没有）
/// - 字段长度上限
#[derive(Debug, Clone, Default)]
pub struct RuleValidator {
    required: Vec<String>,
    paired: Vec<(String, String)>,
    max_lengths: Vec<(String, usize)>,
}

impl RuleValidator {
    pub fn new(
        required: Vec<String>,
        paired: Vec<(String, String)>,
        max_lengths: Vec<(String, usize)>,
    ) -> Self {
        Self {
            required,
            paired,
            max_lengths,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.required_fields.clone(),
            config.paired_fields.clone(),
            config.max_field_lengths.clone(),
        )
    }
}

impl Validator for RuleValidator {
    fn validate(&self, record: &Record) -> ValidationResult {
        let mut result = ValidationResult::valid(record.id());

        if record.id().is_empty() {
            result.reasons.push("缺少记录 ID".to_string());
        }

        for field in &self.required {
            if record.get(field).is_none() {
                result.reasons.push(format!("缺少必填字段 '{}'", field));
            }
        }

        for (left, right) in &self.paired {
            if record.get(left).is_some() != record.get(right).is_some() {
                result
                    .reasons
                    .push(format!("字段 '{}' 与 '{}' 必须同时提供", left, right));
            }
        }

        for (field, limit) in &self.max_lengths {
            if let Some(value) = record.get(field) {
                let len = value.chars().count();
                if len > *limit {
                    result
                        .reasons
                        .push(format!("字段 '{}' 长度 {} 超过上限 {}", field, len, limit));
                }
            }
        }

        if record.is_empty() {
            result.warnings.push("记录没有任何字段".to_string());
        }

        result.valid = result.reasons.is_empty();
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validator() -> RuleValidator {
        RuleValidator::new(
            vec!["reaction_reported_term".into(), "onset_date".into()],
            vec![("meddra_term_text".into(), "meddra_code".into())],
            vec![("narrative".into(), 10)],
        )
    }

    #[test]
    fn test_complete_record_is_valid() {
        let record = Record::new(
            "C-1",
            [("reaction_reported_term", "headache"), ("onset_date", "2024-01-02")],
        );
        let result = validator().validate(&record);
        assert!(result.valid);
        assert!(result.reasons.is_empty());
    }

    #[test]
    fn test_missing_required_field() {
        let record = Record::new("C-2", [("reaction_reported_term", "headache")]);
        let result = validator().validate(&record);
        assert!(!result.valid);
        assert!(result.reasons.iter().any(|r| r.contains("onset_date")));
    }

    #[test]
    fn test_blank_value_counts_as_missing() {
        let record = Record::new(
            "C-3",
            [("reaction_reported_term", "   "), ("onset_date", "2024-01-02")],
        );
        assert!(!validator().validate(&record).valid);
    }

    #[test]
    fn test_paired_fields_must_come_together() {
        let record = Record::new(
            "C-4",
            [
                ("reaction_reported_term", "rash"),
                ("onset_date", "2024-01-02"),
                ("meddra_term_text", "Rash"),
            ],
        );
        let result = validator().validate(&record);
        assert!(!result.valid);
        assert!(result.reasons[0].contains("meddra_code"));
    }

    #[test]
    fn test_length_limit_counts_chars() {
        let record = Record::new(
            "C-5",
            [
                ("reaction_reported_term", "rash"),
                ("onset_date", "2024-01-02"),
                ("narrative", "患者自述头痛三天后出现皮疹"),
            ],
        );
        let result = validator().validate(&record);
        assert!(!result.valid);
        assert!(result.reasons[0].contains("narrative"));
    }

    #[test]
    fn test_empty_record_only_warns() {
        let result = RuleValidator::default().validate(&Record::new("C-6", Vec::<(&str, &str)>::new()));
        assert!(result.valid);
        assert_eq!(result.warnings.len(), 1);
    }
}
