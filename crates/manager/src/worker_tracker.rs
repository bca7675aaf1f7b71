use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use chrono::{DateTime, Duration, Utc};
use ept_core::models::{TrackedWorkerRecord, WorkerHello};
use ept_core::{EptError, EptResult};
use metrics::gauge;
use tokio::sync::{Mutex, MutexGuard, RwLock};
use tracing::{debug, info, warn};

/// Manager视角下的一个Worker
///
/// 角色和队列在首次注册后不再改变。每个队列有一把锁，锁内保存该队列
/// 最后分配的序列号；递增序列号与入队必须在同一把锁内完成。
#[derive(Debug)]
pub struct TrackedWorker {
    worker_id: String,
    role: String,
    queues: Vec<String>,
    start_time: DateTime<Utc>,
    registered_at: DateTime<Utc>,
    last_hello: StdMutex<DateTime<Utc>>,
    active: AtomicBool,
    queue_seq: Vec<Mutex<u64>>,
}

impl TrackedWorker {
    fn from_hello(hello: &WorkerHello, now: DateTime<Utc>) -> Self {
        Self {
            worker_id: hello.worker_id.clone(),
            role: hello.role.clone(),
            queues: hello.queues.clone(),
            start_time: hello.start_time,
            registered_at: now,
            last_hello: StdMutex::new(now),
            active: AtomicBool::new(false),
            queue_seq: hello.queues.iter().map(|_| Mutex::new(0)).collect(),
        }
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    pub fn role(&self) -> &str {
        &self.role
    }

    pub fn queues(&self) -> &[String] {
        &self.queues
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub fn last_hello(&self) -> DateTime<Utc> {
        *self
            .last_hello
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// 只向前推进，乱序到达的旧 hello 不会回退时间
    fn touch(&self, now: DateTime<Utc>) {
        let mut last = self
            .last_hello
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if now > *last {
            *last = now;
        }
    }

    /// 队列名称，索引越界返回错误
    pub fn queue(&self, qnum: usize) -> EptResult<&str> {
        self.queues
            .get(qnum)
            .map(String::as_str)
            .ok_or_else(|| EptError::QueueIndexOutOfRange {
                worker_id: self.worker_id.clone(),
                qnum,
            })
    }

    /// 获取队列锁，守卫内是该队列最后分配的序列号
    pub async fn lock_queue(&self, qnum: usize) -> EptResult<MutexGuard<'_, u64>> {
        match self.queue_seq.get(qnum) {
            Some(lock) => Ok(lock.lock().await),
            None => Err(EptError::QueueIndexOutOfRange {
                worker_id: self.worker_id.clone(),
                qnum,
            }),
        }
    }

    /// 状态查询用的快照，`queue_len` 由调用方提供
    pub async fn record(&self, queue_len: Vec<u64>) -> TrackedWorkerRecord {
        let mut seq = Vec::with_capacity(self.queue_seq.len());
        for lock in &self.queue_seq {
            seq.push(*lock.lock().await);
        }
        TrackedWorkerRecord {
            worker_id: self.worker_id.clone(),
            role: self.role.clone(),
            active: self.is_active(),
            queues: self.queues.clone(),
            seq,
            queue_len,
            start_time: self.start_time,
            last_hello: self.last_hello(),
            registered_at: self.registered_at,
        }
    }
}

/// 一次存活检查的结果
#[derive(Debug, Default)]
pub struct SweepOutcome {
    pub promoted: Vec<Arc<TrackedWorker>>,
    pub removed: Vec<Arc<TrackedWorker>>,
}

impl SweepOutcome {
    pub fn is_empty(&self) -> bool {
        self.promoted.is_empty() && self.removed.is_empty()
    }
}

/// Worker注册与存活追踪
///
/// 收到 hello 时只登记或刷新时间；激活和移除只在周期性的 [`WorkerTracker::sweep`] 中发生。
pub struct WorkerTracker {
    workers: RwLock<BTreeMap<String, Arc<TrackedWorker>>>,
    hello_timeout: Duration,
    required_roles: Vec<String>,
}

impl WorkerTracker {
    pub fn new(hello_timeout: Duration, required_roles: Vec<String>) -> Self {
        Self {
            workers: RwLock::new(BTreeMap::new()),
            hello_timeout,
            required_roles,
        }
    }

    /// 处理 hello，返回新注册的Worker
    pub async fn handle_hello(&self, hello: &WorkerHello) -> EptResult<Option<Arc<TrackedWorker>>> {
        self.handle_hello_at(hello, Utc::now()).await
    }

    pub async fn handle_hello_at(
        &self,
        hello: &WorkerHello,
        now: DateTime<Utc>,
    ) -> EptResult<Option<Arc<TrackedWorker>>> {
        hello.validate()?;

        if let Some(worker) = self.workers.read().await.get(&hello.worker_id) {
            worker.touch(now);
            if worker.role != hello.role || worker.queues != hello.queues {
                debug!(
                    "Worker {} 的角色或队列与注册时不同，已忽略变化",
                    hello.worker_id
                );
            }
            return Ok(None);
        }

        let mut workers = self.workers.write().await;
        // 等待写锁期间可能已被注册
        if let Some(worker) = workers.get(&hello.worker_id) {
            worker.touch(now);
            return Ok(None);
        }

        let worker = Arc::new(TrackedWorker::from_hello(hello, now));
        workers.insert(hello.worker_id.clone(), worker.clone());
        info!(
            "注册新Worker: id={}, role={}, queues={:?}",
            worker.worker_id, worker.role, worker.queues
        );
        Ok(Some(worker))
    }

    pub async fn sweep(&self) -> SweepOutcome {
        self.sweep_at(Utc::now()).await
    }

    /// 移除超时的Worker，激活其余未激活的Worker
    pub async fn sweep_at(&self, now: DateTime<Utc>) -> SweepOutcome {
        let mut outcome = SweepOutcome::default();
        let mut workers = self.workers.write().await;

        let expired: Vec<String> = workers
            .values()
            .filter(|worker| now - worker.last_hello() > self.hello_timeout)
            .map(|worker| worker.worker_id.clone())
            .collect();
        for worker_id in expired {
            if let Some(worker) = workers.remove(&worker_id) {
                warn!(
                    "Worker {} 超时未发送hello (上次: {})，移除",
                    worker_id,
                    worker.last_hello().format("%Y-%m-%d %H:%M:%S UTC")
                );
                worker.active.store(false, Ordering::Release);
                outcome.removed.push(worker);
            }
        }

        for worker in workers.values() {
            if !worker.is_active() {
                worker.active.store(true, Ordering::Release);
                info!("Worker {} (role={}) 已激活", worker.worker_id, worker.role);
                outcome.promoted.push(worker.clone());
            }
        }

        let active = workers.values().filter(|worker| worker.is_active()).count();
        gauge!("ept_workers_active").set(active as f64);
        outcome
    }

    /// 指定角色的活跃Worker，按ID排序；`None` 表示所有角色
    pub async fn active_workers(&self, role: Option<&str>) -> Vec<Arc<TrackedWorker>> {
        self.workers
            .read()
            .await
            .values()
            .filter(|worker| worker.is_active())
            .filter(|worker| role.map_or(true, |role| worker.role == role))
            .cloned()
            .collect()
    }

    /// 所有已知Worker，按ID排序
    pub async fn workers(&self) -> Vec<Arc<TrackedWorker>> {
        self.workers.read().await.values().cloned().collect()
    }

    pub async fn get(&self, worker_id: &str) -> Option<Arc<TrackedWorker>> {
        self.workers.read().await.get(worker_id).cloned()
    }

    /// 每个必需角色都至少有一个活跃Worker
    pub async fn is_ready(&self) -> bool {
        let workers = self.workers.read().await;
        self.required_roles.iter().all(|role| {
            workers
                .values()
                .any(|worker| worker.is_active() && &worker.role == role)
        })
    }

    /// 缺少活跃成员的必需角色
    pub async fn missing_roles(&self) -> Vec<String> {
        let workers = self.workers.read().await;
        self.required_roles
            .iter()
            .filter(|role| {
                !workers
                    .values()
                    .any(|worker| worker.is_active() && &worker.role == *role)
            })
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ept_core::models::{ROLE_WATCHER, ROLE_WORKER};

    fn hello(id: &str, role: &str) -> WorkerHello {
        WorkerHello::new(id, role, Utc::now(), vec![format!("wq_{id}")], 1)
    }

    fn tracker() -> WorkerTracker {
        WorkerTracker::new(
            Duration::seconds(15),
            vec![ROLE_WORKER.to_string(), ROLE_WATCHER.to_string()],
        )
    }

    #[tokio::test]
    async fn test_hello_does_not_activate() {
        let tracker = tracker();
        let now = Utc::now();
        let new = tracker.handle_hello_at(&hello("w1", ROLE_WORKER), now).await.unwrap();
        assert!(new.is_some());
        assert!(tracker.active_workers(Some(ROLE_WORKER)).await.is_empty());

        let outcome = tracker.sweep_at(now + Duration::seconds(5)).await;
        assert_eq!(outcome.promoted.len(), 1);
        assert_eq!(tracker.active_workers(Some(ROLE_WORKER)).await.len(), 1);

        // 再次检查不会重复激活
        let outcome = tracker.sweep_at(now + Duration::seconds(6)).await;
        assert!(outcome.is_empty());
    }

    #[tokio::test]
    async fn test_rejects_worker_without_queues() {
        let tracker = tracker();
        let bad = WorkerHello::new("w1", ROLE_WORKER, Utc::now(), vec![], 1);
        assert!(matches!(
            tracker.handle_hello(&bad).await,
            Err(EptError::InvalidHello(_))
        ));
        assert!(tracker.workers().await.is_empty());
    }

    #[tokio::test]
    async fn test_metadata_is_immutable() {
        let tracker = tracker();
        let now = Utc::now();
        tracker.handle_hello_at(&hello("w1", ROLE_WORKER), now).await.unwrap();

        let changed = WorkerHello::new("w1", ROLE_WATCHER, now, vec!["a".into(), "b".into()], 2);
        let later = now + Duration::seconds(3);
        assert!(tracker.handle_hello_at(&changed, later).await.unwrap().is_none());

        let worker = tracker.get("w1").await.unwrap();
        assert_eq!(worker.role(), ROLE_WORKER);
        assert_eq!(worker.queues(), ["wq_w1"]);
        assert_eq!(worker.last_hello(), later);

        // 较早的 hello 不回退时间
        tracker.handle_hello_at(&changed, now).await.unwrap();
        assert_eq!(tracker.get("w1").await.unwrap().last_hello(), later);
    }

    #[tokio::test]
    async fn test_timeout_removes_worker() {
        let tracker = tracker();
        let now = Utc::now();
        tracker.handle_hello_at(&hello("w1", ROLE_WORKER), now).await.unwrap();
        tracker.sweep_at(now).await;

        // 恰好等于超时不移除
        let outcome = tracker.sweep_at(now + Duration::seconds(15)).await;
        assert!(outcome.removed.is_empty());

        let outcome = tracker.sweep_at(now + Duration::seconds(16)).await;
        assert_eq!(outcome.removed.len(), 1);
        assert!(!outcome.removed[0].is_active());
        assert!(tracker.get("w1").await.is_none());
    }

    #[tokio::test]
    async fn test_timeout_boundary_with_sub_millisecond_hello() {
        let tracker = tracker();
        let now = "2024-05-01T12:00:00.123456789Z".parse::<DateTime<Utc>>().unwrap();
        tracker.handle_hello_at(&hello("w1", ROLE_WORKER), now).await.unwrap();
        tracker.sweep_at(now).await;

        let outcome = tracker.sweep_at(now + Duration::seconds(15)).await;
        assert!(outcome.removed.is_empty());

        let outcome = tracker
            .sweep_at(now + Duration::seconds(15) + Duration::nanoseconds(1))
            .await;
        assert_eq!(outcome.removed.len(), 1);
    }

    #[tokio::test]
    async fn test_ready_requires_all_roles() {
        let tracker = tracker();
        let now = Utc::now();
        tracker.handle_hello_at(&hello("w1", ROLE_WORKER), now).await.unwrap();
        tracker.sweep_at(now).await;
        assert!(!tracker.is_ready().await);
        assert_eq!(tracker.missing_roles().await, vec![ROLE_WATCHER]);

        tracker.handle_hello_at(&hello("x1", ROLE_WATCHER), now).await.unwrap();
        assert!(!tracker.is_ready().await);
        tracker.sweep_at(now).await;
        assert!(tracker.is_ready().await);
    }

    #[tokio::test]
    async fn test_active_workers_ordered_by_id() {
        let tracker = tracker();
        let now = Utc::now();
        for id in ["w3", "w1", "w2"] {
            tracker.handle_hello_at(&hello(id, ROLE_WORKER), now).await.unwrap();
        }
        tracker.sweep_at(now).await;

        let ids: Vec<String> = tracker
            .active_workers(None)
            .await
            .iter()
            .map(|w| w.worker_id().to_string())
            .collect();
        assert_eq!(ids, vec!["w1", "w2", "w3"]);
    }

    #[tokio::test]
    async fn test_queue_lock_bounds() {
        let tracker = tracker();
        let worker = tracker
            .handle_hello(&hello("w1", ROLE_WORKER))
            .await
            .unwrap()
            .unwrap();
        assert!(worker.lock_queue(0).await.is_ok());
        assert!(matches!(
            worker.lock_queue(1).await,
            Err(EptError::QueueIndexOutOfRange { qnum: 1, .. })
        ));
    }
}
