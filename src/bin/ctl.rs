use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use ept::app::connect_broker;
use ept::common::{load_config, StartupConfig};
use ept_core::models::{ManagerCommand, ManagerResponse};
use ept_core::AppConfig;
use ept_manager::ManagerClient;

/// Manager控制工具
#[derive(Parser, Debug)]
#[command(name = "ept-ctl")]
#[command(version)]
#[command(about = "Fabric端点追踪 - Manager控制工具")]
struct CtlApp {
    #[command(subcommand)]
    command: Commands,

    /// 配置文件路径
    #[arg(short, long)]
    config: Option<String>,

    /// 等待响应的秒数，覆盖配置中的 control_timeout_seconds
    #[arg(long)]
    timeout: Option<u64>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// 查询Manager状态
    Status,
    /// 启动fabric订阅进程
    Start(FabricArgs),
    /// 停止fabric订阅进程
    Stop(FabricArgs),
    /// 重启fabric订阅进程
    Restart(FabricArgs),
}

#[derive(clap::Args, Debug)]
struct FabricArgs {
    /// fabric名称
    fabric: String,

    /// 记录到fabric事件中的原因
    #[arg(short, long)]
    reason: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = CtlApp::parse();
    let mut config = load_config(&StartupConfig {
        config_path: cli.config.clone(),
        ..Default::default()
    })?;
    if let Some(timeout) = cli.timeout {
        config.manager.control_timeout_seconds = timeout;
    }

    let client = build_client(&config).await?;
    let response = match cli.command {
        Commands::Status => client.request(ManagerCommand::GetManagerStatus).await,
        Commands::Start(args) => client.start_fabric(&args.fabric, args.reason).await,
        Commands::Stop(args) => client.stop_fabric(&args.fabric, args.reason).await,
        Commands::Restart(args) => client.restart_fabric(&args.fabric, args.reason).await,
    }
    .context("控制请求失败")?;

    print_response(&response)?;
    if !response.success {
        std::process::exit(2);
    }
    Ok(())
}

async fn build_client(config: &AppConfig) -> Result<ManagerClient> {
    if !config.broker.is_redis() {
        return Err(anyhow::anyhow!(
            "进程内消息代理无法与其他进程通信，请将 broker.type 设置为 redis"
        ));
    }
    let (broker, _) = connect_broker(&config.broker).await?;
    Ok(ManagerClient::from_config(
        Arc::clone(&broker),
        &config.broker,
        &config.manager,
    ))
}

fn print_response(response: &ManagerResponse) -> Result<()> {
    let output = serde_json::to_string_pretty(response).context("序列化响应失败")?;
    println!("{output}");
    Ok(())
}
