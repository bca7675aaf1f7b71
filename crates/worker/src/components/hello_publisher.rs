use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use ept_core::models::WorkerHello;
use ept_core::traits::Broker;
use ept_core::EptResult;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// 周期性地在Worker控制频道上发布 hello
pub struct HelloPublisher {
    broker: Arc<dyn Broker>,
    channel: String,
    worker_id: String,
    role: String,
    queues: Vec<String>,
    start_time: DateTime<Utc>,
    interval: Duration,
    seq: AtomicU64,
}

impl HelloPublisher {
    pub fn new(
        broker: Arc<dyn Broker>,
        channel: impl Into<String>,
        worker_id: impl Into<String>,
        role: impl Into<String>,
        queues: Vec<String>,
        interval: Duration,
    ) -> Self {
        Self {
            broker,
            channel: channel.into(),
            worker_id: worker_id.into(),
            role: role.into(),
            queues,
            start_time: Utc::now(),
            interval,
            seq: AtomicU64::new(0),
        }
    }

    /// 下一条 hello，`seq` 从 1 开始递增
    pub fn next_hello(&self) -> WorkerHello {
        WorkerHello::new(
            &self.worker_id,
            &self.role,
            self.start_time,
            self.queues.clone(),
            self.seq.fetch_add(1, Ordering::Relaxed) + 1,
        )
    }

    pub async fn publish_once(&self) -> EptResult<u64> {
        let hello = self.next_hello();
        self.broker
            .publish(&self.channel, &hello.serialize()?)
            .await?;
        debug!("已发送hello: worker={}, seq={}", hello.worker_id, hello.seq);
        Ok(hello.seq)
    }

    /// 立即发送一次，之后每个间隔发送一次，直到取消
    pub async fn run(&self, token: CancellationToken) {
        info!(
            "Worker {} 开始发送hello，间隔 {:?}",
            self.worker_id, self.interval
        );
        let mut ticker = interval(self.interval);
        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    info!("Worker {} 停止发送hello", self.worker_id);
                    break;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.publish_once().await {
                        error!("发送hello失败: {}", e);
                    }
                }
            }
        }
    }
}
