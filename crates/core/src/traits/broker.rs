use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::EptResult;

/// 发布/订阅通道上收到的一条消息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelMessage {
    pub channel: String,
    pub payload: String,
}

/// 一个活跃的通道订阅
///
/// 后台转发任务在订阅被丢弃时中止。
pub struct Subscription {
    receiver: mpsc::Receiver<ChannelMessage>,
    forwarder: Option<JoinHandle<()>>,
}

impl Subscription {
    pub fn new(receiver: mpsc::Receiver<ChannelMessage>, forwarder: Option<JoinHandle<()>>) -> Self {
        Self {
            receiver,
            forwarder,
        }
    }

    /// 等待下一条消息，订阅关闭时返回 `None`
    pub async fn recv(&mut self) -> Option<ChannelMessage> {
        self.receiver.recv().await
    }

    pub fn try_recv(&mut self) -> Option<ChannelMessage> {
        self.receiver.try_recv().ok()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(handle) = self.forwarder.take() {
            handle.abort();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("has_forwarder", &self.forwarder.is_some())
            .finish()
    }
}

/// 消息代理抽象：FIFO 列表 + 发布/订阅
///
/// 投递语义为至少一次、非事务；唯一的原子操作是 [`Broker::drain`]。
#[async_trait]
pub trait Broker: Send + Sync {
    /// 追加到队列尾部
    async fn push(&self, queue: &str, payload: &str) -> EptResult<()>;

    /// 从队列头部弹出，最多阻塞 `timeout`
    async fn pop(&self, queue: &str, timeout: Duration) -> EptResult<Option<String>>;

    /// 原子地读取并删除队列中的全部消息
    async fn drain(&self, queue: &str) -> EptResult<Vec<String>>;

    /// 队列当前长度
    async fn len(&self, queue: &str) -> EptResult<u64>;

    /// 删除队列及其全部消息
    async fn delete(&self, queue: &str) -> EptResult<()>;

    /// 向通道发布消息
    async fn publish(&self, channel: &str, payload: &str) -> EptResult<()>;

    /// 订阅一组通道
    async fn subscribe(&self, channels: &[String]) -> EptResult<Subscription>;
}
