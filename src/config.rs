use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::error::{AppError, AppResult, FileError};

/// 动作执行器类型
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutorKind {
    /// 真实浏览器（chromiumoxide）
    Chromium,
    /// 只打日志，不操作页面
    DryRun,
}

impl ExecutorKind {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "chromium" | "chrome" => Some(ExecutorKind::Chromium),
            "dry_run" | "dry-run" | "dryrun" => Some(ExecutorKind::DryRun),
            _ => None,
        }
    }
}

/// 程序配置文件
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    // --- 编排策略 ---
    /// 同时处理的记录数量（对外部页面的唯一准入控制）
    pub max_concurrent_jobs: usize,
    /// 每条记录最多尝试次数
    pub max_attempts: u32,
    /// 退避基数（毫秒）
    pub backoff_base_ms: u64,
    /// 退避上限（毫秒）
    pub backoff_cap_ms: u64,
    /// 是否给退避加随机抖动
    pub backoff_jitter: bool,
    /// 单个字段确认的超时（毫秒）
    pub fill_timeout_ms: u64,
    // --- 执行器 ---
    pub executor: ExecutorKind,
    /// 浏览器调试端口
    pub browser_debug_port: u16,
    /// 为 true 时自行启动无头浏览器，否则连接到调试端口
    pub headless: bool,
    pub chrome_executable: Option<String>,
    /// 目标表单 URL
    pub target_url: String,
    pub submit_selector: String,
    pub success_selector: Option<String>,
    pub capture_screenshots: bool,
    /// 可选的选择器映射 TOML 文件
    pub mapping_file: Option<String>,
    // --- 输入 / 校验 ---
    /// 记录 TOML 文件存放目录
    pub records_folder: String,
    pub required_fields: Vec<String>,
    /// 必须同时出现或同时缺失的字段对
    pub paired_fields: Vec<(String, String)>,
    pub max_field_lengths: Vec<(String, usize)>,
    // --- 审计 ---
    /// 证据与报告输出目录
    pub evidence_dir: String,
    /// 需要脱敏的字段名正则
    pub mask_patterns: Vec<String>,
    // --- 日志 ---
    /// 是否显示详细日志
    pub verbose_logging: bool,
    /// 输出日志文件
    pub output_log_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 2,
            max_attempts: 3,
            backoff_base_ms: 500,
            backoff_cap_ms: 8_000,
            backoff_jitter: false,
            fill_timeout_ms: 5_000,
            executor: ExecutorKind::DryRun,
            browser_debug_port: 9222,
            headless: true,
            chrome_executable: None,
            target_url: "http://127.0.0.1:8000/".to_string(),
            submit_selector: "button[type=submit]".to_string(),
            success_selector: Some("#status".to_string()),
            capture_screenshots: true,
            mapping_file: None,
            records_folder: "input_records".to_string(),
            required_fields: vec![
                "reaction_reported_term".to_string(),
                "meddra_level".to_string(),
                "onset_date".to_string(),
            ],
            paired_fields: vec![("meddra_term_text".to_string(), "meddra_code".to_string())],
            max_field_lengths: vec![("narrative".to_string(), 4000)],
            evidence_dir: "artifacts".to_string(),
            mask_patterns: vec!["^narrative$".to_string(), "(?i)patient".to_string()],
            verbose_logging: false,
            output_log_file: "output.txt".to_string(),
        }
    }
}

impl Config {
    /// 加载配置：可选的 CONFIG_FILE（TOML）打底，再由环境变量覆盖
    pub fn load() -> AppResult<Self> {
        let base = match std::env::var("CONFIG_FILE") {
            Ok(path) => Self::from_toml_file(Path::new(&path))?,
            Err(_) => Self::default(),
        };
        let config = base.with_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// 只从环境变量读取（未设置的项取默认值）
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// 从 TOML 文件读取，缺失的项取默认值
    pub fn from_toml_file(path: &Path) -> AppResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AppError::file_read_failed(path.display().to_string(), e))?;
        toml::from_str(&content).map_err(|e| {
            AppError::File(FileError::TomlParseFailed {
                path: path.display().to_string(),
                source: Box::new(e),
            })
        })
    }

    fn with_env_overrides(self) -> Self {
        let base = self;
        Self {
            max_concurrent_jobs: env_parse("MAX_CONCURRENT_JOBS").unwrap_or(base.max_concurrent_jobs),
            max_attempts: env_parse("MAX_ATTEMPTS").unwrap_or(base.max_attempts),
            backoff_base_ms: env_parse("BACKOFF_BASE_MS").unwrap_or(base.backoff_base_ms),
            backoff_cap_ms: env_parse("BACKOFF_CAP_MS").unwrap_or(base.backoff_cap_ms),
            backoff_jitter: env_parse("BACKOFF_JITTER").unwrap_or(base.backoff_jitter),
            fill_timeout_ms: env_parse("FILL_TIMEOUT_MS").unwrap_or(base.fill_timeout_ms),
            executor: std::env::var("EXECUTOR").ok().and_then(|v| ExecutorKind::parse(&v)).unwrap_or(base.executor),
            browser_debug_port: env_parse("BROWSER_DEBUG_PORT").unwrap_or(base.browser_debug_port),
            headless: env_parse("HEADLESS").unwrap_or(base.headless),
            chrome_executable: std::env::var("CHROME_EXECUTABLE").ok().or(base.chrome_executable),
            target_url: std::env::var("TARGET_URL").unwrap_or(base.target_url),
            submit_selector: std::env::var("SUBMIT_SELECTOR").unwrap_or(base.submit_selector),
            success_selector: std::env::var("SUCCESS_SELECTOR").ok().or(base.success_selector),
            capture_screenshots: env_parse("CAPTURE_SCREENSHOTS").unwrap_or(base.capture_screenshots),
            mapping_file: std::env::var("MAPPING_FILE").ok().or(base.mapping_file),
            records_folder: std::env::var("RECORDS_FOLDER").unwrap_or(base.records_folder),
            required_fields: env_list("REQUIRED_FIELDS").unwrap_or(base.required_fields),
            paired_fields: base.paired_fields,
            max_field_lengths: base.max_field_lengths,
            evidence_dir: std::env::var("EVIDENCE_DIR").unwrap_or(base.evidence_dir),
            mask_patterns: env_list("MASK_PATTERNS").unwrap_or(base.mask_patterns),
            verbose_logging: env_parse("VERBOSE_LOGGING").unwrap_or(base.verbose_logging),
            output_log_file: std::env::var("OUTPUT_LOG_FILE").unwrap_or(base.output_log_file),
        }
    }

    /// 检查策略取值
    pub fn validate(&self) -> AppResult<()> {
        if self.max_concurrent_jobs == 0 {
            return Err(AppError::invalid_config("max_concurrent_jobs", "必须大于 0"));
        }
        if self.max_attempts == 0 {
            return Err(AppError::invalid_config("max_attempts", "必须大于 0"));
        }
        if self.backoff_cap_ms < self.backoff_base_ms {
            return Err(AppError::invalid_config(
                "backoff_cap_ms",
                format!("上限 {} 小于基数 {}", self.backoff_cap_ms, self.backoff_base_ms),
            ));
        }
        if self.fill_timeout_ms == 0 {
            return Err(AppError::invalid_config("fill_timeout_ms", "不允许无限等待"));
        }
        Ok(())
    }

    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }

    pub fn backoff_cap(&self) -> Duration {
        Duration::from_millis(self.backoff_cap_ms)
    }

    pub fn fill_timeout(&self) -> Duration {
        Duration::from_millis(self.fill_timeout_ms)
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

/// 逗号分隔的列表
fn env_list(name: &str) -> Option<Vec<String>> {
    std::env::var(name).ok().map(|v| {
        v.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect()
    })
}
