use std::sync::Arc;

use ept_core::models::{StatsDirection, WorkMessage, WorkMessageType, ROLE_WORKER};
use ept_core::traits::Broker;
use ept_core::{EptError, EptResult};
use sha2::{Digest, Sha256};
use tracing::{debug, error, warn};

use crate::queue_stats::QueueStatsTracker;
use crate::worker_tracker::{TrackedWorker, WorkerTracker};

/// 清理队列时每条保留消息的放回尝试次数
const REQUEUE_ATTEMPTS: u32 = 3;

/// 一条成功入队的消息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub worker_id: String,
    pub queue: String,
    pub seq: u64,
}

/// 地址在 `worker_count` 个Worker中的位置
///
/// 取地址 SHA-256 摘要的前 8 字节（大端）对Worker数量取模；没有Worker时返回 `None`。
pub fn route_index(address: &str, worker_count: usize) -> Option<usize> {
    if worker_count == 0 {
        return None;
    }
    let digest = Sha256::digest(address.as_bytes());
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    Some((u64::from_be_bytes(prefix) % worker_count as u64) as usize)
}

/// 在有序的活跃Worker列表中为地址选择Worker
pub fn select_worker<'a>(
    address: &str,
    workers: &'a [Arc<TrackedWorker>],
) -> Option<&'a Arc<TrackedWorker>> {
    route_index(address, workers.len()).map(|index| &workers[index])
}

/// 工作路由
///
/// 定向消息按地址哈希到某个角色的一个Worker，广播消息发送给角色内所有活跃Worker。
/// 同一时间只持有一个Worker的一把队列锁。
pub struct WorkRouter {
    broker: Arc<dyn Broker>,
    tracker: Arc<WorkerTracker>,
    stats: Arc<QueueStatsTracker>,
}

impl WorkRouter {
    pub fn new(
        broker: Arc<dyn Broker>,
        tracker: Arc<WorkerTracker>,
        stats: Arc<QueueStatsTracker>,
    ) -> Self {
        Self {
            broker,
            tracker,
            stats,
        }
    }

    /// 按消息的广播标志或地址选择分发方式
    pub async fn dispatch(&self, message: &WorkMessage) -> EptResult<Vec<Delivery>> {
        if message.is_broadcast() {
            self.broadcast(message).await
        } else {
            self.dispatch_targeted(message).await.map(|delivery| vec![delivery])
        }
    }

    /// 定向分发；未声明角色的消息发给 `worker` 角色
    pub async fn dispatch_targeted(&self, message: &WorkMessage) -> EptResult<Delivery> {
        let role = message.role.as_deref().unwrap_or(ROLE_WORKER);
        let workers = self.tracker.active_workers(Some(role)).await;
        let address = message.address();

        let worker = select_worker(&address, &workers).ok_or_else(|| {
            EptError::NoActiveWorkers {
                role: role.to_string(),
            }
        })?;
        debug!(
            "地址 {} 路由到Worker {} ({} 个活跃)",
            address,
            worker.worker_id(),
            workers.len()
        );

        self.send_to_worker(worker, message).await
    }

    /// 发送给角色内（`role` 为空时所有角色）每个活跃Worker的同一队列索引
    ///
    /// 没有活跃Worker时静默返回空列表；单个Worker失败只记录日志。
    pub async fn broadcast(&self, message: &WorkMessage) -> EptResult<Vec<Delivery>> {
        let workers = self.tracker.active_workers(message.role.as_deref()).await;
        if workers.is_empty() {
            debug!(
                "广播没有接收者: role={:?}, fabric={}",
                message.role, message.fabric
            );
            return Ok(Vec::new());
        }

        let mut deliveries = Vec::with_capacity(workers.len());
        for worker in &workers {
            if message.qnum >= worker.queues().len() {
                warn!(
                    "Worker {} 没有队列索引 {}，跳过广播",
                    worker.worker_id(),
                    message.qnum
                );
                continue;
            }
            match self.send_to_worker(worker, message).await {
                Ok(delivery) => deliveries.push(delivery),
                Err(e) => warn!("向Worker {} 广播失败: {}", worker.worker_id(), e),
            }
        }
        Ok(deliveries)
    }

    /// 在队列锁内分配序列号并入队
    ///
    /// 只有入队成功后序列号才会前进，因此Worker看到的序列号没有空洞。
    /// 拿到锁后Worker若已被移除则拒绝入队，移除后的清空不会被旧快照绕过。
    pub async fn send_to_worker(
        &self,
        worker: &TrackedWorker,
        message: &WorkMessage,
    ) -> EptResult<Delivery> {
        let queue = worker.queue(message.qnum)?.to_string();
        let mut last_seq = worker.lock_queue(message.qnum).await?;
        if !worker.is_active() {
            return Err(EptError::WorkerNotFound {
                id: worker.worker_id().to_string(),
            });
        }

        let seq = *last_seq + 1;
        let mut outgoing = message.clone();
        outgoing.seq = seq;
        let payload = outgoing.serialize()?;

        self.broker.push(&queue, &payload).await?;
        *last_seq = seq;
        drop(last_seq);

        self.stats.increment(&queue, StatsDirection::Tx).await;
        Ok(Delivery {
            worker_id: worker.worker_id().to_string(),
            queue,
            seq,
        })
    }

    /// 停止fabric时的清理
    ///
    /// 先向所有活跃Worker广播 `FLUSH_FABRIC`，再由Manager自己从每个Worker的每个队列中
    /// 删除该fabric的工作消息。返回删除的消息数。
    pub async fn flush_fabric(&self, fabric: &str) -> EptResult<usize> {
        let notice = WorkMessage::flush_fabric(fabric);
        if let Err(e) = self.broadcast(&notice).await {
            warn!("广播 FLUSH_FABRIC({}) 失败: {}", fabric, e);
        }

        let mut removed = 0;
        for worker in self.tracker.workers().await {
            for qnum in 0..worker.queues().len() {
                match self.flush_queue(&worker, qnum, fabric).await {
                    Ok(count) => removed += count,
                    Err(e) => warn!(
                        "清理Worker {} 队列 {} 中fabric {} 的消息失败: {}",
                        worker.worker_id(),
                        qnum,
                        fabric,
                        e
                    ),
                }
            }
        }

        if removed > 0 {
            debug!("已从Worker队列中删除fabric {} 的 {} 条消息", fabric, removed);
        }
        Ok(removed)
    }

    /// 在队列锁内原子地取出全部消息，丢弃属于 `fabric` 的工作消息，其余按原顺序放回
    pub async fn flush_queue(
        &self,
        worker: &TrackedWorker,
        qnum: usize,
        fabric: &str,
    ) -> EptResult<usize> {
        let queue = worker.queue(qnum)?.to_string();
        let _guard = worker.lock_queue(qnum).await?;

        let drained = self.broker.drain(&queue).await?;
        let total = drained.len();
        let mut kept = Vec::with_capacity(total);
        for payload in drained {
            match WorkMessage::parse(&payload) {
                Ok(message)
                    if message.msg_type == WorkMessageType::Work && message.fabric == fabric => {}
                Ok(_) => kept.push(payload),
                Err(e) => debug!("丢弃队列 {} 中无法解析的消息: {}", queue, e),
            }
        }
        let removed = total - kept.len();

        // 放回失败不中断，剩余消息仍按顺序尝试
        let mut lost = 0;
        let mut last_error = None;
        for payload in &kept {
            if let Err(e) = self.push_with_retry(&queue, payload).await {
                lost += 1;
                last_error = Some(e);
            }
        }

        match last_error {
            None => Ok(removed),
            Some(e) => {
                error!(
                    "队列 {} 清理后放回消息失败，丢失 {}/{} 条: {}",
                    queue,
                    lost,
                    kept.len(),
                    e
                );
                Err(e)
            }
        }
    }

    async fn push_with_retry(&self, queue: &str, payload: &str) -> EptResult<()> {
        let mut attempt = 1;
        loop {
            match self.broker.push(queue, payload).await {
                Ok(()) => return Ok(()),
                Err(e) if attempt < REQUEUE_ATTEMPTS && e.is_retryable() => {
                    warn!("放回队列 {} 失败 (第 {} 次): {}", queue, attempt, e);
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// 删除Worker所有队列中的消息
    pub async fn purge_worker(&self, worker: &TrackedWorker) -> EptResult<()> {
        for (qnum, queue) in worker.queues().iter().enumerate() {
            let _guard = worker.lock_queue(qnum).await?;
            self.broker.delete(queue).await?;
        }
        debug!("已清空Worker {} 的全部队列", worker.worker_id());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use ept_core::config::StatsConfig;
    use ept_core::models::{Job, WorkerHello, ROLE_WATCHER};
    use ept_core::traits::Subscription;
    use ept_infrastructure::{InMemoryBroker, InMemoryStatsStore};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

    struct Fixture {
        broker: Arc<InMemoryBroker>,
        tracker: Arc<WorkerTracker>,
        stats: Arc<QueueStatsTracker>,
        router: WorkRouter,
    }

    fn fixture() -> Fixture {
        let broker = Arc::new(InMemoryBroker::new());
        let tracker = Arc::new(WorkerTracker::new(
            Duration::seconds(15),
            vec![ROLE_WORKER.to_string()],
        ));
        let stats = Arc::new(QueueStatsTracker::new(
            "mgr",
            Arc::new(InMemoryStatsStore::new()),
            StatsConfig::default(),
        ));
        let router = WorkRouter::new(broker.clone(), tracker.clone(), stats.clone());
        Fixture {
            broker,
            tracker,
            stats,
            router,
        }
    }

    async fn register(fixture: &Fixture, id: &str, role: &str, queues: &[&str]) {
        let hello = WorkerHello::new(
            id,
            role,
            Utc::now(),
            queues.iter().map(|q| q.to_string()).collect(),
            1,
        );
        fixture.tracker.handle_hello(&hello).await.unwrap();
        for queue in queues {
            fixture.stats.init(queue).await.unwrap();
        }
        fixture.tracker.sweep().await;
    }

    fn job_for(fabric: &str, address: &str) -> WorkMessage {
        WorkMessage::work(fabric, ROLE_WORKER, 0, Job::new("endpoint", address, json!({})))
    }

    #[test]
    fn test_route_index_is_deterministic() {
        assert_eq!(route_index("10.0.0.1", 0), None);
        for count in 1..10 {
            let first = route_index("10.0.0.1", count).unwrap();
            assert!(first < count);
            assert_eq!(route_index("10.0.0.1", count), Some(first));
        }
        assert_eq!(route_index("anything", 1), Some(0));
    }

    #[tokio::test]
    async fn test_targeted_dispatch_without_workers_fails() {
        let fixture = fixture();
        let result = fixture.router.dispatch(&job_for("fab1", "10.0.0.1")).await;
        assert!(matches!(result, Err(EptError::NoActiveWorkers { .. })));
    }

    #[tokio::test]
    async fn test_targeted_dispatch_is_stable_and_sequenced() {
        let fixture = fixture();
        for id in ["w1", "w2", "w3"] {
            register(&fixture, id, ROLE_WORKER, &[&format!("wq_{id}")]).await;
        }

        let first = fixture.router.dispatch(&job_for("fab1", "aa:bb")).await.unwrap();
        let second = fixture.router.dispatch(&job_for("fab1", "aa:bb")).await.unwrap();
        assert_eq!(first[0].worker_id, second[0].worker_id);
        assert_eq!(first[0].seq, 1);
        assert_eq!(second[0].seq, 2);

        let queued = fixture.broker.peek_all(&first[0].queue).await;
        assert_eq!(queued.len(), 2);
        assert_eq!(WorkMessage::parse(&queued[1]).unwrap().seq, 2);
        assert_eq!(fixture.stats.totals(&first[0].queue).await, Some((2, 0)));
    }

    #[tokio::test]
    async fn test_targeted_dispatch_queue_out_of_range() {
        let fixture = fixture();
        register(&fixture, "w1", ROLE_WORKER, &["wq_w1"]).await;

        let mut message = job_for("fab1", "10.0.0.1");
        message.qnum = 1;
        let result = fixture.router.dispatch(&message).await;
        assert!(matches!(
            result,
            Err(EptError::QueueIndexOutOfRange { qnum: 1, .. })
        ));
    }

    #[tokio::test]
    async fn test_broadcast_by_role() {
        let fixture = fixture();
        register(&fixture, "w1", ROLE_WORKER, &["pq_w1", "wq_w1"]).await;
        register(&fixture, "w2", ROLE_WORKER, &["pq_w2"]).await;
        register(&fixture, "x1", ROLE_WATCHER, &["pq_x1", "wq_x1"]).await;

        let job = Job::new("refresh", 0u64, json!({}));
        let message = WorkMessage::work("fab1", ROLE_WORKER, 1, job.clone());
        let deliveries = fixture.router.dispatch(&message).await.unwrap();
        // w2 只有一个队列，跳过
        assert_eq!(deliveries.len(), 1);
        assert_eq!(deliveries[0].queue, "wq_w1");

        let everyone = WorkMessage::broadcast("fab1", None, 0, job);
        let deliveries = fixture.router.dispatch(&everyone).await.unwrap();
        assert_eq!(deliveries.len(), 3);
        assert!(deliveries.iter().all(|d| d.seq == 1));
    }

    #[tokio::test]
    async fn test_broadcast_without_workers_is_silent() {
        let fixture = fixture();
        let message = WorkMessage::broadcast("fab1", Some(ROLE_WATCHER.into()), 0, Job::new("x", 0u64, json!({})));
        assert!(fixture.router.dispatch(&message).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_flush_queue_keeps_other_fabrics_in_order() {
        let fixture = fixture();
        register(&fixture, "w1", ROLE_WORKER, &["wq_w1"]).await;
        let worker = fixture.tracker.get("w1").await.unwrap();

        let order = [("fab1", "a"), ("fab2", "b"), ("fab1", "c"), ("fab2", "d"), ("fab2", "e")];
        for (fabric, address) in order {
            fixture
                .router
                .send_to_worker(&worker, &job_for(fabric, address))
                .await
                .unwrap();
        }
        fixture.broker.push("wq_w1", "garbage").await.unwrap();

        let removed = fixture.router.flush_queue(&worker, 0, "fab1").await.unwrap();
        assert_eq!(removed, 3);

        let remaining: Vec<WorkMessage> = fixture
            .broker
            .peek_all("wq_w1")
            .await
            .iter()
            .map(|p| WorkMessage::parse(p).unwrap())
            .collect();
        let addresses: Vec<String> = remaining.iter().map(|m| m.address()).collect();
        assert_eq!(addresses, vec!["b", "d", "e"]);
        assert!(remaining.iter().all(|m| m.fabric == "fab2"));
    }

    /// 按调用序号让 `push` 失败的代理
    struct FlakyBroker {
        inner: InMemoryBroker,
        pushes: AtomicUsize,
        failing_calls: Vec<usize>,
    }

    impl FlakyBroker {
        fn new(failing_calls: Vec<usize>) -> Self {
            Self {
                inner: InMemoryBroker::new(),
                pushes: AtomicUsize::new(0),
                failing_calls,
            }
        }

        fn arm(&self) {
            self.pushes.store(0, AtomicOrdering::SeqCst);
        }
    }

    #[async_trait::async_trait]
    impl Broker for FlakyBroker {
        async fn push(&self, queue: &str, payload: &str) -> EptResult<()> {
            let call = self.pushes.fetch_add(1, AtomicOrdering::SeqCst) + 1;
            if self.failing_calls.contains(&call) {
                return Err(EptError::Broker(format!("push #{call} 失败")));
            }
            self.inner.push(queue, payload).await
        }

        async fn pop(&self, queue: &str, timeout: std::time::Duration) -> EptResult<Option<String>> {
            self.inner.pop(queue, timeout).await
        }

        async fn drain(&self, queue: &str) -> EptResult<Vec<String>> {
            self.inner.drain(queue).await
        }

        async fn len(&self, queue: &str) -> EptResult<u64> {
            self.inner.len(queue).await
        }

        async fn delete(&self, queue: &str) -> EptResult<()> {
            self.inner.delete(queue).await
        }

        async fn publish(&self, channel: &str, payload: &str) -> EptResult<()> {
            self.inner.publish(channel, payload).await
        }

        async fn subscribe(&self, channels: &[String]) -> EptResult<Subscription> {
            self.inner.subscribe(channels).await
        }
    }

    async fn flaky_fixture(failing_calls: Vec<usize>) -> (Arc<FlakyBroker>, Arc<TrackedWorker>, WorkRouter) {
        let broker = Arc::new(FlakyBroker::new(failing_calls));
        let tracker = Arc::new(WorkerTracker::new(
            Duration::seconds(15),
            vec![ROLE_WORKER.to_string()],
        ));
        let stats = Arc::new(QueueStatsTracker::new(
            "mgr",
            Arc::new(InMemoryStatsStore::new()),
            StatsConfig::default(),
        ));
        let hello = WorkerHello::new("w1", ROLE_WORKER, Utc::now(), vec!["wq_w1".to_string()], 1);
        tracker.handle_hello(&hello).await.unwrap();
        tracker.sweep().await;
        let worker = tracker.get("w1").await.unwrap();
        let router = WorkRouter::new(broker.clone(), tracker, stats);
        (broker, worker, router)
    }

    async fn queued_addresses(broker: &FlakyBroker, queue: &str) -> Vec<String> {
        broker
            .inner
            .peek_all(queue)
            .await
            .iter()
            .map(|p| WorkMessage::parse(p).unwrap().address())
            .collect()
    }

    #[tokio::test]
    async fn test_flush_queue_retries_transient_requeue_failure() {
        let (broker, worker, router) = flaky_fixture(vec![2]).await;
        for (fabric, address) in [("fab2", "a"), ("fab1", "x"), ("fab2", "b"), ("fab2", "c"), ("fab2", "d")] {
            broker
                .inner
                .push("wq_w1", &job_for(fabric, address).serialize().unwrap())
                .await
                .unwrap();
        }
        broker.arm();

        let removed = router.flush_queue(&worker, 0, "fab1").await.unwrap();
        assert_eq!(removed, 1);
        assert_eq!(queued_addresses(&broker, "wq_w1").await, vec!["a", "b", "c", "d"]);
    }

    #[tokio::test]
    async fn test_flush_queue_keeps_requeueing_after_failure() {
        // 第二条保留消息的三次尝试全部失败
        let (broker, worker, router) = flaky_fixture(vec![2, 3, 4]).await;
        for address in ["a", "b", "c", "d"] {
            broker
                .inner
                .push("wq_w1", &job_for("fab2", address).serialize().unwrap())
                .await
                .unwrap();
        }
        broker.arm();

        let result = router.flush_queue(&worker, 0, "fab1").await;
        assert!(matches!(result, Err(EptError::Broker(_))));
        assert_eq!(queued_addresses(&broker, "wq_w1").await, vec!["a", "c", "d"]);
    }

    #[tokio::test]
    async fn test_flush_fabric_keeps_control_messages() {
        let fixture = fixture();
        register(&fixture, "w1", ROLE_WORKER, &["wq_w1"]).await;
        let worker = fixture.tracker.get("w1").await.unwrap();
        fixture
            .router
            .send_to_worker(&worker, &job_for("fab1", "a"))
            .await
            .unwrap();

        let removed = fixture.router.flush_fabric("fab1").await.unwrap();
        assert_eq!(removed, 1);

        let remaining = fixture.broker.peek_all("wq_w1").await;
        assert_eq!(remaining.len(), 1);
        let notice = WorkMessage::parse(&remaining[0]).unwrap();
        assert_eq!(notice.msg_type, WorkMessageType::FlushFabric);
        assert_eq!(notice.seq, 2);
    }

    #[tokio::test]
    async fn test_send_to_removed_worker_is_rejected() {
        let fixture = fixture();
        register(&fixture, "w1", ROLE_WORKER, &["wq_w1"]).await;
        let snapshot = fixture.tracker.active_workers(Some(ROLE_WORKER)).await;

        let outcome = fixture
            .tracker
            .sweep_at(Utc::now() + Duration::seconds(16))
            .await;
        assert_eq!(outcome.removed.len(), 1);
        fixture.router.purge_worker(&outcome.removed[0]).await.unwrap();

        let result = fixture
            .router
            .send_to_worker(&snapshot[0], &job_for("fab1", "10.0.0.1"))
            .await;
        assert!(matches!(result, Err(EptError::WorkerNotFound { .. })));
        assert_eq!(fixture.broker.len("wq_w1").await.unwrap(), 0);
        assert_eq!(fixture.stats.totals("wq_w1").await, Some((0, 0)));
    }

    #[tokio::test]
    async fn test_purge_worker() {
        let fixture = fixture();
        register(&fixture, "w1", ROLE_WORKER, &["pq_w1", "wq_w1"]).await;
        let worker = fixture.tracker.get("w1").await.unwrap();
        fixture.broker.push("pq_w1", "x").await.unwrap();
        fixture.broker.push("wq_w1", "y").await.unwrap();

        fixture.router.purge_worker(&worker).await.unwrap();
        assert_eq!(fixture.broker.len("pq_w1").await.unwrap(), 0);
        assert_eq!(fixture.broker.len("wq_w1").await.unwrap(), 0);
    }
}
