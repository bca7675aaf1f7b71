use std::net::SocketAddr;

use anyhow::{Context, Result};
use ept_core::config::ObservabilityConfig;
use ept_core::AppConfig;
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// 命令行给出的启动参数
#[derive(Debug, Clone, Default)]
pub struct StartupConfig {
    pub config_path: Option<String>,
    pub log_level: Option<String>,
    pub log_format: Option<String>,
    pub manager_id: Option<String>,
    pub worker_id: Option<String>,
}

/// 初始化日志系统，`RUST_LOG` 优先于 `log_level`
pub fn init_logging(log_level: &str, log_format: &str) -> Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let registry = tracing_subscriber::registry().with(env_filter);

    match log_format {
        "json" => {
            registry
                .with(tracing_subscriber::fmt::layer().json())
                .try_init()
                .context("初始化JSON日志格式失败")?;
        }
        "pretty" => {
            registry
                .with(tracing_subscriber::fmt::layer().pretty())
                .try_init()
                .context("初始化Pretty日志格式失败")?;
        }
        _ => {
            return Err(anyhow::anyhow!("不支持的日志格式: {log_format}"));
        }
    }

    Ok(())
}

/// 加载配置并应用命令行覆盖
pub fn load_config(startup: &StartupConfig) -> Result<AppConfig> {
    if let Some(path) = &startup.config_path {
        if !std::path::Path::new(path).exists() {
            return Err(anyhow::anyhow!("配置文件不存在: {path}"));
        }
    }

    let mut config = AppConfig::load(startup.config_path.as_deref()).with_context(|| {
        format!(
            "加载配置失败: {}",
            startup.config_path.as_deref().unwrap_or("<默认路径>")
        )
    })?;

    if let Some(level) = &startup.log_level {
        config.observability.log_level = level.clone();
    }
    if let Some(format) = &startup.log_format {
        config.observability.log_format = format.clone();
    }
    if let Some(id) = &startup.manager_id {
        config.manager.manager_id = id.clone();
    }
    if config.manager.manager_id.is_empty() {
        config.manager.manager_id = default_manager_id();
    }
    if let Some(id) = &startup.worker_id {
        config.worker.worker_id = id.clone();
    }
    if config.worker.worker_id.is_empty() {
        config.worker.worker_id = default_worker_id();
    }

    config.validate().context("命令行覆盖后的配置无效")?;
    Ok(config)
}

/// 默认Manager ID：主机名
pub fn default_manager_id() -> String {
    hostname::get()
        .ok()
        .and_then(|name| name.into_string().ok())
        .filter(|name| !name.is_empty())
        .map(|name| format!("ept-manager-{name}"))
        .unwrap_or_else(|| "ept-manager".to_string())
}

/// 默认Worker ID：`<hostname>-<pid>`
pub fn default_worker_id() -> String {
    let host = hostname::get()
        .ok()
        .and_then(|name| name.into_string().ok())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "ept-worker".to_string());
    format!("{}-{}", host, std::process::id())
}

/// 按配置安装 Prometheus 指标导出器
pub fn install_metrics_exporter(config: &ObservabilityConfig) -> Result<()> {
    if !config.metrics_enabled {
        return Ok(());
    }

    let address: SocketAddr = config
        .metrics_bind_address
        .parse()
        .with_context(|| format!("无效的指标监听地址: {}", config.metrics_bind_address))?;
    PrometheusBuilder::new()
        .with_http_listener(address)
        .install()
        .context("安装Prometheus指标导出器失败")?;

    info!("Prometheus指标导出器已启动: {}", address);
    Ok(())
}
