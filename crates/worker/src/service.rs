use std::sync::Arc;
use std::time::Duration;

use ept_core::traits::Broker;
use ept_core::{AppConfig, EptError, EptResult};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::components::{HelloPublisher, JobHandler, WorkerQueueConsumer};

const QUEUE_POLL_TIMEOUT: Duration = Duration::from_secs(1);

/// Worker进程：发送hello并消费自己的队列
pub struct WorkerService {
    worker_id: String,
    publisher: Arc<HelloPublisher>,
    consumer: WorkerQueueConsumer,
}

impl WorkerService {
    pub fn new(
        config: &AppConfig,
        broker: Arc<dyn Broker>,
        handler: Arc<dyn JobHandler>,
    ) -> EptResult<Self> {
        let worker_id = config.worker.worker_id.clone();
        if worker_id.is_empty() {
            return Err(EptError::Configuration("worker_id 不能为空".to_string()));
        }
        let queues = config.worker.queue_names(&worker_id);

        let publisher = Arc::new(HelloPublisher::new(
            broker.clone(),
            config.broker.worker_control_channel.clone(),
            worker_id.clone(),
            config.worker.role.clone(),
            queues.clone(),
            config.worker.hello_interval(),
        ));
        let consumer = WorkerQueueConsumer::new(broker, queues, handler, QUEUE_POLL_TIMEOUT);

        Ok(Self {
            worker_id,
            publisher,
            consumer,
        })
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    pub fn consumer(&self) -> &WorkerQueueConsumer {
        &self.consumer
    }

    /// 运行到 `shutdown` 取消；hello任务随消费循环一起结束
    pub async fn run(&self, shutdown: CancellationToken) -> EptResult<()> {
        info!("Worker {} 启动", self.worker_id);
        let hello_token = shutdown.child_token();
        let publisher = self.publisher.clone();
        let hello_task = {
            let token = hello_token.clone();
            tokio::spawn(async move { publisher.run(token).await })
        };

        let result = self.consumer.run(shutdown).await;

        hello_token.cancel();
        if let Err(e) = hello_task.await {
            error!("hello任务异常退出: {}", e);
        }
        info!("Worker {} 已停止", self.worker_id);
        result
    }
}
