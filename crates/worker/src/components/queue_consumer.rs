use std::sync::Arc;
use std::time::Duration;

use ept_core::models::{WorkMessage, WorkMessageType};
use ept_core::traits::Broker;
use ept_core::EptResult;
use tokio::sync::Mutex;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::job_handler::JobHandler;
use super::sequence::{SeqCheck, SequenceTracker};

const PRIORITY_POP_TIMEOUT: Duration = Duration::from_millis(10);
const RETRY_DELAY: Duration = Duration::from_secs(1);

/// 消费Worker自己的优先级队列
///
/// 队列按声明顺序排列，越靠前优先级越高：每一轮先短暂地检查高优先级队列，
/// 只在最后一个队列上阻塞等待。
pub struct WorkerQueueConsumer {
    broker: Arc<dyn Broker>,
    queues: Vec<String>,
    handler: Arc<dyn JobHandler>,
    sequences: Mutex<SequenceTracker>,
    poll_timeout: Duration,
}

impl WorkerQueueConsumer {
    pub fn new(
        broker: Arc<dyn Broker>,
        queues: Vec<String>,
        handler: Arc<dyn JobHandler>,
        poll_timeout: Duration,
    ) -> Self {
        Self {
            broker,
            queues,
            handler,
            sequences: Mutex::new(SequenceTracker::new()),
            poll_timeout,
        }
    }

    pub fn queues(&self) -> &[String] {
        &self.queues
    }

    /// 按优先级取出下一条消息 `(queue, payload)`
    pub async fn next_message(&self) -> EptResult<Option<(String, String)>> {
        let last = self.queues.len().saturating_sub(1);
        for (index, queue) in self.queues.iter().enumerate() {
            let timeout = if index == last {
                self.poll_timeout
            } else {
                PRIORITY_POP_TIMEOUT
            };
            if let Some(payload) = self.broker.pop(queue, timeout).await? {
                return Ok(Some((queue.clone(), payload)));
            }
        }
        Ok(None)
    }

    /// 处理一条消息；无法解析的消息和处理失败都只记录日志
    pub async fn handle_payload(&self, queue: &str, payload: &str) {
        let message = match WorkMessage::parse(payload) {
            Ok(message) => message,
            Err(e) => {
                warn!("跳过队列 {} 中无法解析的消息: {}", queue, e);
                return;
            }
        };

        match self.sequences.lock().await.observe(queue, message.seq) {
            SeqCheck::InOrder => {}
            SeqCheck::Gap { expected, got } => warn!(
                "队列 {} 序列号不连续: 期望 {}，收到 {}",
                queue, expected, got
            ),
            SeqCheck::Stale { last, got } => warn!(
                "队列 {} 序列号回退: 上一条 {}，收到 {}",
                queue, last, got
            ),
        }

        let result = match message.msg_type {
            WorkMessageType::Work => self.handler.handle(queue, &message).await,
            WorkMessageType::FlushFabric => {
                info!("收到 FLUSH_FABRIC: fabric={}", message.fabric);
                self.handler.flush_fabric(&message.fabric).await
            }
        };
        if let Err(e) = result {
            warn!(
                "处理队列 {} 的消息失败 (fabric={}, seq={}): {}",
                queue, message.fabric, message.seq, e
            );
        }
    }

    /// 一轮拉取与处理，返回是否处理了消息
    pub async fn poll_once(&self) -> EptResult<bool> {
        match self.next_message().await? {
            Some((queue, payload)) => {
                self.handle_payload(&queue, &payload).await;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// 持续消费直到取消；不可重试的代理错误会结束循环
    pub async fn run(&self, token: CancellationToken) -> EptResult<()> {
        info!("开始消费队列 {:?}", self.queues);
        loop {
            let polled = tokio::select! {
                _ = token.cancelled() => break,
                polled = self.poll_once() => polled,
            };
            match polled {
                Ok(_) => {}
                Err(e) if e.is_retryable() => {
                    warn!("读取Worker队列失败，稍后重试: {}", e);
                    tokio::select! {
                        _ = token.cancelled() => break,
                        _ = sleep(RETRY_DELAY) => {}
                    }
                }
                Err(e) => return Err(e),
            }
        }
        debug!("队列消费已停止");
        Ok(())
    }

    pub async fn last_seq(&self, queue: &str) -> Option<u64> {
        self.sequences.lock().await.last(queue)
    }
}
