use anyhow::Result;
use case_autofill::utils::logging;
use case_autofill::{App, Config};

#[tokio::main]
async fn main() -> Result<()> {
    // 初始化日志
    logging::init();

    // 加载配置
    let config = Config::load()?;

    // 初始化并运行应用
    let summary = App::initialize(config).await?.run().await?;

    // 有死信或未完成的记录时以非零状态退出
    if summary.dead_lettered > 0 || summary.pending > 0 {
        std::process::exit(1);
    }

    Ok(())
}
