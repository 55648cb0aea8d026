use thiserror::Error;

/// 应用程序错误类型
///
/// 只描述"系统级"错误。单条记录的执行失败不走这里，
/// 而是以 `AttemptOutcome` / `JobError` 的值形式在 worker 内部流转。
#[derive(Debug, Error)]
pub enum AppError {
    /// 浏览器相关错误
    #[error("浏览器错误: {0}")]
    Browser(#[from] BrowserError),
    /// 持久化存储错误（对批次是致命的）
    #[error("存储错误: {0}")]
    Store(#[from] StoreError),
    /// 队列错误
    #[error("队列错误: {0}")]
    Queue(#[from] QueueError),
    /// 文件操作错误
    #[error("文件错误: {0}")]
    File(#[from] FileError),
    /// 配置错误
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),
    /// worker 处理任务时崩溃（任务已放回队列）
    #[error("worker {worker_id} 处理记录 {job_id} 时崩溃: {message}")]
    WorkerPanicked {
        worker_id: usize,
        job_id: String,
        message: String,
    },
    /// 其他错误（用于包装第三方库错误）
    #[error("错误: {0}")]
    Other(String),
}

/// 浏览器相关错误
#[derive(Debug, Error)]
pub enum BrowserError {
    /// 连接浏览器失败
    #[error("无法连接到浏览器 (端口: {port}): {source}")]
    ConnectionFailed {
        port: u16,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 启动浏览器失败
    #[error("启动浏览器失败: {source}")]
    LaunchFailed {
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 创建页面失败
    #[error("创建页面失败: {source}")]
    PageCreationFailed {
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 执行脚本失败
    #[error("执行脚本失败: {source}")]
    ScriptExecutionFailed {
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 浏览器配置失败
    #[error("浏览器配置失败: {message}")]
    ConfigurationFailed { message: String },
}

/// 审计存储错误
#[derive(Debug, Error)]
pub enum StoreError {
    /// 证据写入被拒绝
    #[error("证据写入失败 ({what}): {source}")]
    WriteRejected {
        what: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 存储不可用
    #[error("存储不可用: {reason}")]
    Unavailable { reason: String },
}

/// 队列错误
#[derive(Debug, Error)]
pub enum QueueError {
    /// 队列已关闭，不再接收新任务
    #[error("队列已关闭，拒绝入队: {job_id}")]
    Closed { job_id: String },
    /// 同一批次内记录 ID 重复
    #[error("记录 ID 重复: {job_id}")]
    DuplicateJob { job_id: String },
}

/// 文件操作错误
#[derive(Debug, Error)]
pub enum FileError {
    /// 读取文件失败
    #[error("读取文件失败 ({path}): {source}")]
    ReadFailed {
        path: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// TOML 解析失败
    #[error("TOML解析失败 ({path}): {source}")]
    TomlParseFailed {
        path: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

/// 配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    /// 取值非法
    #[error("配置项 {name} 取值非法: {reason}")]
    InvalidValue { name: String, reason: String },
    /// 脱敏规则无法编译
    #[error("脱敏规则 '{pattern}' 无法编译: {source}")]
    InvalidMaskPattern {
        pattern: String,
        source: regex::Error,
    },
}

// ========== 从常见错误类型转换 ==========

impl From<chromiumoxide::error::CdpError> for AppError {
    fn from(err: chromiumoxide::error::CdpError) -> Self {
        AppError::Browser(BrowserError::ScriptExecutionFailed {
            source: Box::new(err),
        })
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Other(format!("JSON处理失败: {}", err))
    }
}

// ========== 便捷构造函数 ==========

impl AppError {
    /// 创建浏览器连接错误
    pub fn browser_connection_failed(
        port: u16,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        AppError::Browser(BrowserError::ConnectionFailed {
            port,
            source: Box::new(source),
        })
    }

    /// 创建证据写入错误
    pub fn store_write_failed(
        what: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        AppError::Store(StoreError::WriteRejected {
            what: what.into(),
            source: Box::new(source),
        })
    }

    /// 创建文件读取错误
    pub fn file_read_failed(
        path: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        AppError::File(FileError::ReadFailed {
            path: path.into(),
            source: Box::new(source),
        })
    }

    /// 创建配置取值错误
    pub fn invalid_config(name: impl Into<String>, reason: impl Into<String>) -> Self {
        AppError::Config(ConfigError::InvalidValue {
            name: name.into(),
            reason: reason.into(),
        })
    }

    /// 是否为系统级故障（必须中止整个批次）
    pub fn is_system_fault(&self) -> bool {
        matches!(
            self,
            AppError::Store(_)
                | AppError::Queue(QueueError::Closed { .. })
                | AppError::WorkerPanicked { .. }
        )
    }
}

// ========== Result 类型别名 ==========

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;
