use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use ept_core::models::QueueStatsRecord;
use ept_core::traits::{Broker, ChannelMessage, StatsStore, Subscription};
use ept_core::EptResult;
use tokio::sync::{broadcast, mpsc, Mutex, Notify, RwLock};
use tokio::time::Instant;
use tracing::{debug, warn};

const CHANNEL_CAPACITY: usize = 4096;
const SUBSCRIPTION_BUFFER: usize = 1024;

/// 内存消息代理
///
/// 与Redis后端语义一致的进程内实现，用于单进程部署和测试。
/// 队列为 `VecDeque`，阻塞弹出通过 `Notify` 唤醒，发布/订阅基于 `broadcast`。
pub struct InMemoryBroker {
    queues: Mutex<HashMap<String, VecDeque<String>>>,
    pushed: Notify,
    channels: broadcast::Sender<ChannelMessage>,
}

impl Default for InMemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryBroker {
    pub fn new() -> Self {
        let (channels, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            queues: Mutex::new(HashMap::new()),
            pushed: Notify::new(),
            channels,
        }
    }

    /// 队列内容快照，不修改队列
    pub async fn peek_all(&self, queue: &str) -> Vec<String> {
        self.queues
            .lock()
            .await
            .get(queue)
            .map(|items| items.iter().cloned().collect())
            .unwrap_or_default()
    }

    async fn try_pop(&self, queue: &str) -> Option<String> {
        let mut queues = self.queues.lock().await;
        let items = queues.get_mut(queue)?;
        let payload = items.pop_front();
        if items.is_empty() {
            queues.remove(queue);
        }
        payload
    }
}

#[async_trait]
impl Broker for InMemoryBroker {
    async fn push(&self, queue: &str, payload: &str) -> EptResult<()> {
        self.queues
            .lock()
            .await
            .entry(queue.to_string())
            .or_default()
            .push_back(payload.to_string());
        self.pushed.notify_waiters();
        Ok(())
    }

    async fn pop(&self, queue: &str, timeout: Duration) -> EptResult<Option<String>> {
        let deadline = Instant::now() + timeout;
        loop {
            // 先登记等待再检查队列，避免错过检查与等待之间的 push
            let notified = self.pushed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(payload) = self.try_pop(queue).await {
                return Ok(Some(payload));
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Ok(None);
            }
        }
    }

    async fn drain(&self, queue: &str) -> EptResult<Vec<String>> {
        let items = self.queues.lock().await.remove(queue).unwrap_or_default();
        debug!("队列 {} 被清空，取出 {} 条消息", queue, items.len());
        Ok(items.into())
    }

    async fn len(&self, queue: &str) -> EptResult<u64> {
        Ok(self
            .queues
            .lock()
            .await
            .get(queue)
            .map_or(0, |items| items.len() as u64))
    }

    async fn delete(&self, queue: &str) -> EptResult<()> {
        self.queues.lock().await.remove(queue);
        Ok(())
    }

    async fn publish(&self, channel: &str, payload: &str) -> EptResult<()> {
        // 没有订阅者时发送失败，与 Redis PUBLISH 返回 0 等价
        let _ = self.channels.send(ChannelMessage {
            channel: channel.to_string(),
            payload: payload.to_string(),
        });
        Ok(())
    }

    async fn subscribe(&self, channels: &[String]) -> EptResult<Subscription> {
        let mut source = self.channels.subscribe();
        let wanted: Vec<String> = channels.to_vec();
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);

        let forwarder = tokio::spawn(async move {
            loop {
                match source.recv().await {
                    Ok(message) => {
                        if !wanted.contains(&message.channel) {
                            continue;
                        }
                        if tx.send(message).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("订阅处理过慢，丢弃了 {} 条频道消息", skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        Ok(Subscription::new(rx, Some(forwarder)))
    }
}

/// 内存队列统计存储
#[derive(Debug, Default)]
pub struct InMemoryStatsStore {
    records: RwLock<HashMap<(String, String), QueueStatsRecord>>,
}

impl InMemoryStatsStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StatsStore for InMemoryStatsStore {
    async fn load(&self, proc: &str, queue: &str) -> EptResult<Option<QueueStatsRecord>> {
        Ok(self
            .records
            .read()
            .await
            .get(&(proc.to_string(), queue.to_string()))
            .cloned())
    }

    async fn save(&self, record: &QueueStatsRecord) -> EptResult<()> {
        self.records.write().await.insert(
            (record.proc.clone(), record.queue.clone()),
            record.clone(),
        );
        Ok(())
    }
}
