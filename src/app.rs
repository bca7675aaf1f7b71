use std::sync::Arc;

use anyhow::{Context, Result};
use ept_core::config::BrokerConfig;
use ept_core::traits::{Broker, StatsStore};
use ept_core::AppConfig;
use ept_infrastructure::{
    ConfigFabricRepository, InMemoryBroker, InMemoryStatsStore, RedisBroker, RedisConnector,
    RedisStatsStore, SubprocessLauncher,
};
use ept_manager::Manager;
use ept_worker::{LoggingJobHandler, WorkerService};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// 应用运行模式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppMode {
    /// 工作分发Manager
    Manager,
    /// 只记录日志的Worker
    Worker,
}

impl std::str::FromStr for AppMode {
    type Err = anyhow::Error;

    fn from_str(mode: &str) -> Result<Self> {
        match mode {
            "manager" => Ok(AppMode::Manager),
            "worker" => Ok(AppMode::Worker),
            _ => Err(anyhow::anyhow!("不支持的运行模式: {mode}")),
        }
    }
}

/// 按配置创建消息代理和统计存储
pub async fn connect_broker(config: &BrokerConfig) -> Result<(Arc<dyn Broker>, Arc<dyn StatsStore>)> {
    if config.is_redis() {
        let connector = RedisConnector::connect(config.redis.clone())
            .await
            .with_context(|| {
                format!(
                    "连接Redis失败: {}:{}",
                    config.redis.host, config.redis.port
                )
            })?;
        info!(
            "已连接Redis {}:{}/{}",
            config.redis.host, config.redis.port, config.redis.database
        );
        let stats = RedisStatsStore::new(connector.clone(), config.stats_key_prefix.clone());
        Ok((Arc::new(RedisBroker::new(connector)), Arc::new(stats)))
    } else {
        info!("使用进程内消息代理");
        Ok((
            Arc::new(InMemoryBroker::new()),
            Arc::new(InMemoryStatsStore::new()),
        ))
    }
}

enum Component {
    Manager(Manager),
    Worker(WorkerService),
}

/// 应用组合根
pub struct Application {
    config: AppConfig,
    component: Component,
}

impl Application {
    pub async fn new(config: AppConfig, mode: AppMode) -> Result<Self> {
        if mode == AppMode::Worker && !config.broker.is_redis() {
            warn!("Worker使用进程内消息代理，无法收到其他进程中Manager的消息");
        }
        let (broker, stats) = connect_broker(&config.broker).await?;
        Self::with_broker(config, mode, broker, stats)
    }

    /// 使用已有的代理组装组件
    pub fn with_broker(
        config: AppConfig,
        mode: AppMode,
        broker: Arc<dyn Broker>,
        stats: Arc<dyn StatsStore>,
    ) -> Result<Self> {
        let component = match mode {
            AppMode::Manager => {
                let repository = Arc::new(ConfigFabricRepository::from_config(&config.fabric));
                let launcher = Arc::new(SubprocessLauncher::new(config.fabric.clone()));
                Component::Manager(Manager::new(&config, broker, stats, repository, launcher))
            }
            AppMode::Worker => {
                let service = WorkerService::new(&config, broker, Arc::new(LoggingJobHandler::new()))
                    .context("初始化Worker失败")?;
                Component::Worker(service)
            }
        };
        Ok(Self { config, component })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn mode(&self) -> AppMode {
        match self.component {
            Component::Manager(_) => AppMode::Manager,
            Component::Worker(_) => AppMode::Worker,
        }
    }

    pub fn manager(&self) -> Option<&Manager> {
        match &self.component {
            Component::Manager(manager) => Some(manager),
            Component::Worker(_) => None,
        }
    }

    pub async fn run(&self, shutdown: CancellationToken) -> Result<()> {
        match &self.component {
            Component::Manager(manager) => {
                info!(
                    "Manager {} 管理 {} 个fabric",
                    manager.id(),
                    self.config.fabric.fabrics.len()
                );
                manager.run(shutdown).await.context("Manager主循环异常退出")
            }
            Component::Worker(worker) => {
                info!(
                    "Worker {} (role={}) 消费 {} 个队列",
                    worker.worker_id(),
                    self.config.worker.role,
                    worker.consumer().queues().len()
                );
                worker.run(shutdown).await.context("Worker主循环异常退出")
            }
        }
    }
}
