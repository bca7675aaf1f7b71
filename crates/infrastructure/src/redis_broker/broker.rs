use std::time::Duration;

use async_trait::async_trait;
use ept_core::traits::{Broker, ChannelMessage, Subscription};
use ept_core::EptResult;
use futures::StreamExt;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use tokio::sync::{mpsc, Mutex, Semaphore};
use tracing::{debug, warn};

use super::connection::{redis_error, RedisConnector};

const SUBSCRIPTION_BUFFER: usize = 1024;

/// 基于Redis列表和发布/订阅的消息代理
///
/// 队列使用 RPUSH/BLPOP，`drain` 在一个 MULTI/EXEC 事务中执行 LRANGE + DEL。
pub struct RedisBroker {
    connector: RedisConnector,
    /// 阻塞弹出专用的空闲连接
    blocking_pool: Mutex<Vec<MultiplexedConnection>>,
    blocking_permits: Semaphore,
}

impl RedisBroker {
    pub fn new(connector: RedisConnector) -> Self {
        let pool_size = connector.config().blocking_pool_size;
        Self {
            connector,
            blocking_pool: Mutex::new(Vec::with_capacity(pool_size)),
            blocking_permits: Semaphore::new(pool_size),
        }
    }

    pub fn connector(&self) -> &RedisConnector {
        &self.connector
    }

    async fn checkout_blocking(&self) -> EptResult<MultiplexedConnection> {
        if let Some(conn) = self.blocking_pool.lock().await.pop() {
            return Ok(conn);
        }
        self.connector.dedicated().await
    }

    async fn checkin_blocking(&self, conn: MultiplexedConnection) {
        self.blocking_pool.lock().await.push(conn);
    }
}

#[async_trait]
impl Broker for RedisBroker {
    async fn push(&self, queue: &str, payload: &str) -> EptResult<()> {
        let mut conn = self.connector.shared();
        let _: i64 = conn
            .rpush(queue, payload)
            .await
            .map_err(|e| redis_error("RPUSH 失败", e))?;
        Ok(())
    }

    async fn pop(&self, queue: &str, timeout: Duration) -> EptResult<Option<String>> {
        let _permit = self
            .blocking_permits
            .acquire()
            .await
            .map_err(|e| ept_core::EptError::Internal(format!("阻塞连接池已关闭: {e}")))?;

        let mut conn = self.checkout_blocking().await?;
        // BLPOP 的超时为 0 表示永久阻塞
        let seconds = timeout.as_secs_f64().max(0.01);
        let result: redis::RedisResult<Option<(String, String)>> = redis::cmd("BLPOP")
            .arg(queue)
            .arg(seconds)
            .query_async(&mut conn)
            .await;

        match result {
            Ok(item) => {
                self.checkin_blocking(conn).await;
                Ok(item.map(|(_, payload)| payload))
            }
            // 出错的连接直接丢弃
            Err(e) => Err(redis_error("BLPOP 失败", e)),
        }
    }

    async fn drain(&self, queue: &str) -> EptResult<Vec<String>> {
        let mut conn = self.connector.shared();
        let (items,): (Vec<String>,) = redis::pipe()
            .atomic()
            .lrange(queue, 0, -1)
            .del(queue)
            .ignore()
            .query_async(&mut conn)
            .await
            .map_err(|e| redis_error("清空队列失败", e))?;
        debug!("队列 {} 被清空，取出 {} 条消息", queue, items.len());
        Ok(items)
    }

    async fn len(&self, queue: &str) -> EptResult<u64> {
        let mut conn = self.connector.shared();
        conn.llen(queue)
            .await
            .map_err(|e| redis_error("LLEN 失败", e))
    }

    async fn delete(&self, queue: &str) -> EptResult<()> {
        let mut conn = self.connector.shared();
        let _: i64 = conn
            .del(queue)
            .await
            .map_err(|e| redis_error("DEL 失败", e))?;
        Ok(())
    }

    async fn publish(&self, channel: &str, payload: &str) -> EptResult<()> {
        let mut conn = self.connector.shared();
        let _: i64 = conn
            .publish(channel, payload)
            .await
            .map_err(|e| redis_error("PUBLISH 失败", e))?;
        Ok(())
    }

    async fn subscribe(&self, channels: &[String]) -> EptResult<Subscription> {
        let mut pubsub = self
            .connector
            .client()
            .get_async_pubsub()
            .await
            .map_err(|e| redis_error("创建订阅连接失败", e))?;
        for channel in channels {
            pubsub
                .subscribe(channel)
                .await
                .map_err(|e| redis_error("SUBSCRIBE 失败", e))?;
        }

        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        let forwarder = tokio::spawn(async move {
            let mut stream = pubsub.into_on_message();
            while let Some(msg) = stream.next().await {
                let payload: String = match msg.get_payload() {
                    Ok(payload) => payload,
                    Err(e) => {
                        warn!("无法解码频道 {} 上的消息: {}", msg.get_channel_name(), e);
                        continue;
                    }
                };
                let message = ChannelMessage {
                    channel: msg.get_channel_name().to_string(),
                    payload,
                };
                if tx.send(message).await.is_err() {
                    break;
                }
            }
            debug!("Redis订阅转发任务结束");
        });

        Ok(Subscription::new(rx, Some(forwarder)))
    }
}
