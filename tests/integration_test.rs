use case_autofill::browser::{connect_to_browser, open_form_page};
use case_autofill::config::Config;
use case_autofill::infrastructure::{JsExecutor, MemoryAuditStore};
use case_autofill::models::Record;
use case_autofill::orchestrator::{start_batch, BatchOptions, PoolExit};
use case_autofill::services::{ChromiumExecutorFactory, FormSettings, RuleValidator, SelectorCatalog};
use case_autofill::utils::logging;
use std::sync::Arc;

#[tokio::test]
#[ignore] // 默认忽略，需要手动运行：cargo test -- --ignored
async fn test_fill_single_record() {
    // 初始化日志
    logging::init();

    // 加载配置
    let config = Config::from_env();

    // 连接浏览器（需要以 --remote-debugging-port 启动的 Chrome，以及可访问的表单页）
    let browser = connect_to_browser(config.browser_debug_port)
        .await
        .expect("连接浏览器失败");

    let factory = Arc::new(ChromiumExecutorFactory::new(
        Arc::new(browser),
        Arc::new(SelectorCatalog::default()),
        FormSettings::from_config(&config),
    ));

    let record = Record::new(
        "IT-001",
        [
            ("reaction_reported_term", "headache"),
            ("meddra_level", "PT"),
            ("onset_date", "2024-03-01"),
        ],
    );

    let handle = start_batch(
        vec![record],
        &RuleValidator::from_config(&config),
        BatchOptions::from_config(&config),
        factory,
        Arc::new(MemoryAuditStore::new()),
    )
    .await
    .expect("启动批次失败");

    let run = handle.wait().await.expect("批次运行失败");
    assert_eq!(run.exit, PoolExit::Drained);
    assert_eq!(run.summary.succeeded, 1, "记录应该录入成功");
}

#[tokio::test]
#[ignore]
async fn test_browser_connection() {
    // 初始化日志
    logging::init();

    // 加载配置
    let config = Config::from_env();

    // 测试浏览器连接并打开表单页
    let browser = connect_to_browser(config.browser_debug_port)
        .await
        .expect("应该能够成功连接浏览器");
    let page = open_form_page(&browser, &config.target_url)
        .await
        .expect("应该能够打开表单页");

    let executor = JsExecutor::new(page);
    let title: String = executor
        .eval_as("document.title")
        .await
        .expect("应该能够执行脚本");
    println!("表单页标题: {}", title);
}

#[tokio::test]
#[ignore]
async fn test_load_record_files() {
    // 初始化日志
    logging::init();

    // 加载配置
    let config = Config::from_env();

    // 测试加载所有 TOML 文件
    let result = case_autofill::models::load_all_toml_files(&config.records_folder).await;

    assert!(result.is_ok(), "应该能够加载 TOML 文件");

    let records = result.unwrap();
    println!("找到 {} 条记录", records.len());
}
