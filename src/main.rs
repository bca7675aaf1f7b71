use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Arg, Command};
use ept::app::{AppMode, Application};
use ept::common::{init_logging, install_metrics_exporter, load_config, StartupConfig};
use ept::shutdown::ShutdownManager;
use tracing::{error, info, warn};

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        // 日志系统可能尚未初始化
        eprintln!("ept 异常退出: {e:#}");
        error!("ept 异常退出: {e:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // 解析命令行参数
    let matches = Command::new("ept")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Fabric端点追踪 - 工作分发Manager与Worker")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("配置文件路径（缺省时依次查找 config/ept.toml、ept.toml、/etc/ept/config.toml）"),
        )
        .arg(
            Arg::new("mode")
                .short('m')
                .long("mode")
                .value_name("MODE")
                .help("运行模式")
                .value_parser(["manager", "worker"])
                .default_value("manager"),
        )
        .arg(
            Arg::new("log-level")
                .short('l')
                .long("log-level")
                .value_name("LEVEL")
                .help("日志级别")
                .value_parser(["trace", "debug", "info", "warn", "error"]),
        )
        .arg(
            Arg::new("log-format")
                .long("log-format")
                .value_name("FORMAT")
                .help("日志格式")
                .value_parser(["json", "pretty"]),
        )
        .arg(
            Arg::new("manager-id")
                .long("manager-id")
                .value_name("ID")
                .help("Manager ID（默认使用主机名）"),
        )
        .arg(
            Arg::new("worker-id")
                .long("worker-id")
                .value_name("ID")
                .help("Worker ID，仅在worker模式下使用（默认 <主机名>-<pid>）"),
        )
        .get_matches();

    let startup = StartupConfig {
        config_path: matches.get_one::<String>("config").cloned(),
        log_level: matches.get_one::<String>("log-level").cloned(),
        log_format: matches.get_one::<String>("log-format").cloned(),
        manager_id: matches.get_one::<String>("manager-id").cloned(),
        worker_id: matches.get_one::<String>("worker-id").cloned(),
    };
    let mode: AppMode = matches
        .get_one::<String>("mode")
        .map(String::as_str)
        .unwrap_or("manager")
        .parse()?;

    let config = load_config(&startup)?;
    init_logging(
        &config.observability.log_level,
        &config.observability.log_format,
    )?;
    install_metrics_exporter(&config.observability)?;

    info!("启动Fabric端点追踪，运行模式: {:?}", mode);
    match mode {
        AppMode::Manager => info!("Manager ID: {}", config.manager.manager_id),
        AppMode::Worker => info!("Worker ID: {}", config.worker.worker_id),
    }
    info!("消息代理: {:?}", config.broker.r#type);

    let app = Application::new(config, mode)
        .await
        .context("初始化应用失败")?;

    let shutdown_manager = ShutdownManager::new();
    let signals = shutdown_manager.listen_for_signals();

    let root = shutdown_manager.token();
    let token = root.clone();
    let mut app_handle = tokio::spawn(async move { app.run(token).await });

    let result = tokio::select! {
        joined = &mut app_handle => joined,
        _ = root.cancelled() => {
            info!("收到关闭信号，开始优雅关闭...");
            match tokio::time::timeout(SHUTDOWN_TIMEOUT, &mut app_handle).await {
                Ok(joined) => joined,
                Err(_) => {
                    warn!("应用关闭超时，强制退出");
                    app_handle.abort();
                    return Err(anyhow::anyhow!("关闭超时"));
                }
            }
        }
    };
    shutdown_manager.shutdown();
    signals.abort();

    result.context("应用任务异常终止")??;
    info!("Fabric端点追踪已退出");
    Ok(())
}
