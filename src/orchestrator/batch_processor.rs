//! 批量录入入口 - 编排层
//!
//! ## 职责
//!
//! 本模块是整个应用的入口，负责资源准备和一次完整批次的生命周期。
//!
//! ## 核心功能
//!
//! 1. **应用初始化**：日志文件、审计存储、按配置选择执行器（Chromium / 试运行）
//! 2. **批量加载**：扫描并加载所有待录入的记录（`Vec<Record>`）
//! 3. **启动批次**：校验、入队、启动 worker 池
//! 4. **进度输出**：订阅汇总快照并打印
//! 5. **取消**：Ctrl-C 发出协作式取消信号
//! 6. **收尾**：持久化批次报告，输出全局统计
//!
//! ## 设计特点
//!
//! - **顶层编排**：不处理单条记录的细节
//! - **资源所有者**：唯一持有 Browser 和审计存储的模块

use anyhow::Result;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

use crate::browser;
use crate::config::{Config, ExecutorKind};
use crate::infrastructure::{AuditStore, FileAuditStore};
use crate::models::load_all_toml_files;
use crate::orchestrator::batch::{start_batch, BatchOptions};
use crate::orchestrator::reporter::BatchSummary;
use crate::orchestrator::worker_pool::PoolExit;
use crate::services::{
    ChromiumExecutorFactory, DryRunExecutor, ExecutorFactory, FormSettings, RuleValidator,
    SelectorCatalog, SharedExecutor,
};
use crate::utils::logging::{
    init_log_file, log_progress, log_records_loaded, log_startup, print_final_stats,
};

/// 应用主结构
pub struct App {
    config: Config,
    store: Arc<dyn AuditStore>,
    factory: Arc<dyn ExecutorFactory>,
}

impl App {
    /// 初始化应用
    pub async fn initialize(config: Config) -> Result<Self> {
        // 初始化日志文件
        init_log_file(&config.output_log_file)?;

        log_startup(&config);

        let store: Arc<dyn AuditStore> = Arc::new(FileAuditStore::open(&config.evidence_dir).await?);

        let catalog = match &config.mapping_file {
            Some(path) => SelectorCatalog::from_toml_file(Path::new(path))?,
            None => SelectorCatalog::default(),
        };
        let catalog = Arc::new(catalog);
        info!("🗺️ 映射字段: {}", catalog.field_order().join(", "));

        let factory: Arc<dyn ExecutorFactory> = match config.executor {
            ExecutorKind::DryRun => {
                info!("🧪 试运行模式：不连接浏览器");
                Arc::new(SharedExecutor::new(Arc::new(DryRunExecutor::new(catalog))))
            }
            ExecutorKind::Chromium => {
                let browser = if config.headless {
                    browser::launch_headless_browser(config.chrome_executable.as_deref()).await?
                } else {
                    browser::connect_to_browser(config.browser_debug_port).await?
                };
                Arc::new(ChromiumExecutorFactory::new(
                    Arc::new(browser),
                    catalog,
                    FormSettings::from_config(&config),
                ))
            }
        };

        Ok(Self {
            config,
            store,
            factory,
        })
    }

    /// 运行应用主逻辑，返回最终汇总
    pub async fn run(&self) -> Result<BatchSummary> {
        info!("\n📁 正在扫描待录入的记录...");
        let records = load_all_toml_files(&self.config.records_folder).await?;

        if records.is_empty() {
            warn!("⚠️ 没有找到待录入的记录，程序结束");
            return Ok(BatchSummary {
                complete: true,
                ..Default::default()
            });
        }

        let loaded = records.len();
        let validator = RuleValidator::from_config(&self.config);
        let handle = start_batch(
            records,
            &validator,
            BatchOptions::from_config(&self.config),
            self.factory.clone(),
            self.store.clone(),
        )
        .await?;

        let batch = handle.batch().clone();
        let admitted = batch.reporter().summary().await;
        log_records_loaded(loaded, admitted.total, admitted.rejected);

        // Ctrl-C → 协作式取消
        let cancel = handle.cancel_token();
        let ctrl_c = tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("🛑 收到 Ctrl-C，正在停止（进行中的记录会放回队列）...");
                cancel.cancel();
            }
        });

        // 进度输出
        let mut summaries = handle.summaries();
        let progress = tokio::spawn(async move {
            while summaries.changed().await.is_ok() {
                let summary = summaries.borrow_and_update().clone();
                if summary.complete {
                    break;
                }
                log_progress(&summary);
            }
        });

        let run = handle.wait().await;
        ctrl_c.abort();
        progress.abort();
        let run = run?;

        if run.exit == PoolExit::Cancelled {
            warn!("⏸️ 批次被取消，剩余 {} 条记录未完成", run.summary.pending);
        }

        let report = batch.reporter().persist(batch.store()).await?;
        print_final_stats(&report.summary, &self.config.output_log_file);

        Ok(report.summary)
    }
}
