use std::time::Duration;

use ept_core::config::RedisConfig;
use ept_core::{EptError, EptResult};
use redis::aio::{ConnectionManager, MultiplexedConnection};
use redis::{Client, RedisResult};
use tokio::time::sleep;
use tracing::{debug, error, warn};

/// Redis连接管理
///
/// 共享的 [`ConnectionManager`] 用于普通命令；阻塞命令（BLPOP）
/// 需要独占连接，通过 [`RedisConnector::dedicated`] 获取。
#[derive(Clone)]
pub struct RedisConnector {
    client: Client,
    shared: ConnectionManager,
    config: RedisConfig,
}

impl RedisConnector {
    pub async fn connect(config: RedisConfig) -> EptResult<Self> {
        let client = Client::open(config.build_url())
            .map_err(|e| EptError::Broker(format!("创建Redis客户端失败: {e}")))?;

        let shared = Self::with_retry(&config, || ConnectionManager::new(client.clone())).await?;

        let connector = Self {
            client,
            shared,
            config,
        };
        connector.ping().await?;
        debug!(
            "已连接Redis {}:{}/{}",
            connector.config.host, connector.config.port, connector.config.database
        );

        Ok(connector)
    }

    async fn with_retry<T, F, Fut>(config: &RedisConfig, mut connect: F) -> EptResult<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = RedisResult<T>>,
    {
        let mut last_error = None;

        for attempt in 0..config.max_retry_attempts {
            let attempt_result = tokio::time::timeout(
                Duration::from_secs(config.connection_timeout_seconds),
                connect(),
            )
            .await;

            match attempt_result {
                Ok(Ok(conn)) => {
                    if attempt > 0 {
                        debug!("第 {} 次尝试后重新连接Redis成功", attempt + 1);
                    }
                    return Ok(conn);
                }
                Ok(Err(e)) => last_error = Some(e.to_string()),
                Err(_) => {
                    last_error = Some(format!(
                        "连接超时({}s)",
                        config.connection_timeout_seconds
                    ))
                }
            }

            if attempt + 1 < config.max_retry_attempts {
                warn!(
                    "连接Redis失败 ({}/{}): {}，{}s 后重试",
                    attempt + 1,
                    config.max_retry_attempts,
                    last_error.as_deref().unwrap_or("未知错误"),
                    config.retry_delay_seconds
                );
                sleep(Duration::from_secs(config.retry_delay_seconds)).await;
            }
        }

        let error_msg = format!(
            "连接Redis失败，已重试 {} 次，最后错误: {}",
            config.max_retry_attempts,
            last_error.unwrap_or_else(|| "未知错误".to_string())
        );
        error!("{}", error_msg);
        Err(EptError::Broker(error_msg))
    }

    /// 共享连接，克隆开销很小
    pub fn shared(&self) -> ConnectionManager {
        self.shared.clone()
    }

    /// 新建一条独占连接
    pub async fn dedicated(&self) -> EptResult<MultiplexedConnection> {
        let client = self.client.clone();
        Self::with_retry(&self.config, move || {
            let client = client.clone();
            async move { client.get_multiplexed_async_connection().await }
        })
        .await
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn config(&self) -> &RedisConfig {
        &self.config
    }

    pub async fn ping(&self) -> EptResult<()> {
        let mut conn = self.shared();
        let result: RedisResult<String> = redis::cmd("PING").query_async(&mut conn).await;
        match result {
            Ok(response) if response == "PONG" => Ok(()),
            Ok(response) => {
                let error_msg = format!("PING 返回了意外的响应: {response}");
                error!("{}", error_msg);
                Err(EptError::Broker(error_msg))
            }
            Err(e) => {
                let error_msg = format!("Redis PING 失败: {e}");
                error!("{}", error_msg);
                Err(EptError::Broker(error_msg))
            }
        }
    }

    pub async fn health_check(&self) -> bool {
        match self.ping().await {
            Ok(()) => true,
            Err(e) => {
                warn!("Redis健康检查失败: {}", e);
                false
            }
        }
    }
}

pub(crate) fn redis_error(context: &str, e: redis::RedisError) -> EptError {
    EptError::Broker(format!("{context}: {e}"))
}
