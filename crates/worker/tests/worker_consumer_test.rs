//! Worker侧队列消费与hello发送

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use ept_core::models::{WorkMessage, WorkerHello, ROLE_WATCHER};
use ept_core::traits::Broker;
use ept_core::{AppConfig, EptError, EptResult};
use ept_infrastructure::InMemoryBroker;
use ept_testing_utils::{TestEnv, WorkMessageBuilder};
use ept_worker::{HelloPublisher, JobHandler, WorkerQueueConsumer, WorkerService};
use tokio_util::sync::CancellationToken;

/// 记录收到的消息
#[derive(Default)]
struct RecordingJobHandler {
    handled: Mutex<Vec<(String, u64, String)>>,
    flushed: Mutex<Vec<String>>,
    fail_fabric: Option<String>,
}

impl RecordingJobHandler {
    fn handled(&self) -> Vec<(String, u64, String)> {
        self.handled.lock().unwrap().clone()
    }

    fn flushed(&self) -> Vec<String> {
        self.flushed.lock().unwrap().clone()
    }
}

#[async_trait]
impl JobHandler for RecordingJobHandler {
    async fn handle(&self, queue: &str, message: &WorkMessage) -> EptResult<()> {
        if self.fail_fabric.as_deref() == Some(message.fabric.as_str()) {
            return Err(EptError::Internal("处理失败".to_string()));
        }
        self.handled.lock().unwrap().push((
            queue.to_string(),
            message.seq,
            message.address(),
        ));
        Ok(())
    }

    async fn flush_fabric(&self, fabric: &str) -> EptResult<()> {
        self.flushed.lock().unwrap().push(fabric.to_string());
        Ok(())
    }
}

fn sequenced(fabric: &str, address: &str, seq: u64) -> String {
    let mut message = WorkMessageBuilder::new(fabric, address).build();
    message.seq = seq;
    message.serialize().unwrap()
}

#[tokio::test]
async fn test_consumer_prefers_high_priority_queue() {
    let broker = Arc::new(InMemoryBroker::new());
    let handler = Arc::new(RecordingJobHandler::default());
    let consumer = WorkerQueueConsumer::new(
        broker.clone(),
        vec!["pq_w1".to_string(), "wq_w1".to_string()],
        handler.clone(),
        Duration::from_millis(50),
    );

    broker.push("wq_w1", &sequenced("fab1", "low", 1)).await.unwrap();
    broker.push("pq_w1", &sequenced("fab1", "high", 1)).await.unwrap();

    assert!(consumer.poll_once().await.unwrap());
    assert!(consumer.poll_once().await.unwrap());
    assert!(!consumer.poll_once().await.unwrap());

    let handled = handler.handled();
    assert_eq!(handled[0], ("pq_w1".to_string(), 1, "high".to_string()));
    assert_eq!(handled[1], ("wq_w1".to_string(), 1, "low".to_string()));
}

#[tokio::test]
async fn test_consumer_skips_garbage_and_tracks_sequence() {
    let broker = Arc::new(InMemoryBroker::new());
    let handler = Arc::new(RecordingJobHandler {
        fail_fabric: Some("bad".to_string()),
        ..Default::default()
    });
    let consumer = WorkerQueueConsumer::new(
        broker.clone(),
        vec!["wq_w1".to_string()],
        handler.clone(),
        Duration::from_millis(20),
    );

    broker.push("wq_w1", "{garbage").await.unwrap();
    broker.push("wq_w1", &sequenced("fab1", "a", 1)).await.unwrap();
    broker.push("wq_w1", &sequenced("bad", "b", 2)).await.unwrap();
    // 缺少 3 只记录警告，消息照常处理
    broker.push("wq_w1", &sequenced("fab1", "c", 4)).await.unwrap();
    let mut flush = WorkMessage::flush_fabric("fab1");
    flush.seq = 5;
    broker.push("wq_w1", &flush.serialize().unwrap()).await.unwrap();

    while consumer.poll_once().await.unwrap() {}

    let handled = handler.handled();
    assert_eq!(handled.len(), 2);
    assert_eq!(handled[1].1, 4);
    assert_eq!(handler.flushed(), vec!["fab1"]);
    assert_eq!(consumer.last_seq("wq_w1").await, Some(5));
}

#[tokio::test]
async fn test_hello_publisher_increments_seq() {
    let broker = Arc::new(InMemoryBroker::new());
    let mut subscription = broker.subscribe(&["hello".to_string()]).await.unwrap();
    let publisher = HelloPublisher::new(
        broker.clone(),
        "hello",
        "x1",
        ROLE_WATCHER,
        vec!["pq_x1".to_string(), "wq_x1".to_string()],
        Duration::from_secs(5),
    );

    assert_eq!(publisher.publish_once().await.unwrap(), 1);
    assert_eq!(publisher.publish_once().await.unwrap(), 2);

    let first = WorkerHello::parse(&subscription.recv().await.unwrap().payload).unwrap();
    let second = WorkerHello::parse(&subscription.recv().await.unwrap().payload).unwrap();
    assert_eq!(first.seq, 1);
    assert_eq!(second.seq, 2);
    assert_eq!(first.start_time, second.start_time);
    assert_eq!(first.role, ROLE_WATCHER);
    assert!(first.validate().is_ok());
}

#[tokio::test]
async fn test_worker_service_runs_until_cancelled() {
    let mut config = AppConfig::default();
    config.worker.worker_id = "w9".to_string();
    config.worker.hello_interval_seconds = 1;

    let broker = Arc::new(InMemoryBroker::new());
    let mut hellos = broker
        .subscribe(&[config.broker.worker_control_channel.clone()])
        .await
        .unwrap();
    let handler = Arc::new(RecordingJobHandler::default());
    let service = Arc::new(WorkerService::new(&config, broker.clone(), handler.clone()).unwrap());
    assert_eq!(service.consumer().queues(), ["pq_w9", "wq_w9"]);

    let shutdown = CancellationToken::new();
    let handle = {
        let service = service.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move { service.run(shutdown).await })
    };

    let hello = WorkerHello::parse(&hellos.recv().await.unwrap().payload).unwrap();
    assert_eq!(hello.worker_id, "w9");
    assert_eq!(hello.queues, vec!["pq_w9", "wq_w9"]);

    broker.push("wq_w9", &sequenced("fab1", "10.1.1.1", 1)).await.unwrap();
    let received = TestEnv::wait_for(
        || {
            let handler = handler.clone();
            async move { handler.handled().len() == 1 }
        },
        Duration::from_secs(5),
    )
    .await;
    assert!(received);

    shutdown.cancel();
    handle.await.unwrap().unwrap();
}

#[test]
fn test_worker_service_requires_id() {
    let config = AppConfig::default();
    let broker = Arc::new(InMemoryBroker::new());
    let result = WorkerService::new(&config, broker, Arc::new(RecordingJobHandler::default()));
    assert!(matches!(result, Err(EptError::Configuration(_))));
}
