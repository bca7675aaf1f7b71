use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use ept_core::config::StatsConfig;
use ept_core::models::{BucketSnapshot, QueueStatsRecord, StatsBucket, StatsDirection};
use ept_core::traits::StatsStore;
use ept_core::EptResult;
use metrics::{counter, gauge};
use tokio::sync::RwLock;
use tracing::debug;

/// 单个队列的内存计数器
#[derive(Debug)]
struct QueueCounters {
    start: DateTime<Utc>,
    tx: AtomicU64,
    rx: AtomicU64,
}

/// 队列统计追踪器
///
/// `increment` 只修改内存中的原子计数器；`collect` 周期性地把累计值写回
/// 存储，并在各时间粒度的滚动历史中追加快照。
pub struct QueueStatsTracker {
    proc: String,
    store: Arc<dyn StatsStore>,
    limits: StatsConfig,
    queues: RwLock<HashMap<String, Arc<QueueCounters>>>,
}

impl QueueStatsTracker {
    pub fn new(proc: impl Into<String>, store: Arc<dyn StatsStore>, limits: StatsConfig) -> Self {
        Self {
            proc: proc.into(),
            store,
            limits,
            queues: RwLock::new(HashMap::new()),
        }
    }

    pub fn proc(&self) -> &str {
        &self.proc
    }

    /// 注册队列，计数器清零，起始时间为当前时间
    pub async fn init(&self, queue: &str) -> EptResult<()> {
        self.init_at(queue, Utc::now()).await
    }

    pub async fn init_at(&self, queue: &str, now: DateTime<Utc>) -> EptResult<()> {
        // 滚动历史跨进程重启保留，累计值从零开始
        let mut record = self
            .store
            .load(&self.proc, queue)
            .await?
            .unwrap_or_else(|| QueueStatsRecord::new(&self.proc, queue, now));
        record.start = now;
        record.total_tx = 0;
        record.total_rx = 0;
        self.store.save(&record).await?;

        self.queues.write().await.insert(
            queue.to_string(),
            Arc::new(QueueCounters {
                start: now,
                tx: AtomicU64::new(0),
                rx: AtomicU64::new(0),
            }),
        );
        debug!("队列统计已初始化: proc={}, queue={}", self.proc, queue);
        Ok(())
    }

    /// 停止追踪队列，已持久化的记录保留
    pub async fn forget(&self, queue: &str) {
        self.queues.write().await.remove(queue);
    }

    /// 累加计数器，未注册的队列返回 `false`
    pub async fn increment(&self, queue: &str, direction: StatsDirection) -> bool {
        let counters = match self.queues.read().await.get(queue) {
            Some(counters) => counters.clone(),
            None => {
                debug!("忽略未注册队列的统计: {}", queue);
                return false;
            }
        };

        match direction {
            StatsDirection::Tx => {
                counters.tx.fetch_add(1, Ordering::Relaxed);
                counter!("ept_queue_tx_total", "queue" => queue.to_string()).increment(1);
            }
            StatsDirection::Rx => {
                counters.rx.fetch_add(1, Ordering::Relaxed);
                counter!("ept_queue_rx_total", "queue" => queue.to_string()).increment(1);
            }
        }
        true
    }

    /// 当前累计值 `(tx, rx)`
    pub async fn totals(&self, queue: &str) -> Option<(u64, u64)> {
        self.queues.read().await.get(queue).map(|counters| {
            (
                counters.tx.load(Ordering::Relaxed),
                counters.rx.load(Ordering::Relaxed),
            )
        })
    }

    /// 已注册的队列，按名称排序
    pub async fn queues(&self) -> Vec<String> {
        let mut queues: Vec<String> = self.queues.read().await.keys().cloned().collect();
        queues.sort();
        queues
    }

    pub async fn collect(&self, queue: &str, queue_len: u64) -> EptResult<()> {
        self.collect_at(queue, queue_len, Utc::now()).await
    }

    /// 写回累计值并更新滚动历史
    pub async fn collect_at(&self, queue: &str, queue_len: u64, now: DateTime<Utc>) -> EptResult<()> {
        let Some(counters) = self.queues.read().await.get(queue).cloned() else {
            debug!("跳过未注册队列的统计采集: {}", queue);
            return Ok(());
        };

        let mut record = self
            .store
            .load(&self.proc, queue)
            .await?
            .unwrap_or_else(|| QueueStatsRecord::new(&self.proc, queue, counters.start));
        record.start = counters.start;
        record.total_tx = counters.tx.load(Ordering::Relaxed);
        record.total_rx = counters.rx.load(Ordering::Relaxed);

        let since_start = now - counters.start;
        for bucket in StatsBucket::ALL {
            let interval = bucket.interval();
            if since_start <= interval {
                continue;
            }

            let history = record.buckets.get_mut(bucket);
            let snapshot = match history.last() {
                Some(previous) => {
                    let elapsed = now - previous.ts;
                    if elapsed < interval {
                        continue;
                    }
                    let seconds = elapsed.num_milliseconds() as f64 / 1000.0;
                    let delta_tx = record.total_tx.abs_diff(previous.total_tx);
                    let delta_rx = record.total_rx.abs_diff(previous.total_rx);
                    BucketSnapshot {
                        ts: now,
                        total_tx: record.total_tx,
                        total_rx: record.total_rx,
                        delta_tx,
                        delta_rx,
                        tx_rate: rate(delta_tx, seconds),
                        rx_rate: rate(delta_rx, seconds),
                        queue_len: None,
                    }
                }
                None => BucketSnapshot {
                    ts: now,
                    total_tx: record.total_tx,
                    total_rx: record.total_rx,
                    delta_tx: record.total_tx,
                    delta_rx: record.total_rx,
                    tx_rate: 0.0,
                    rx_rate: 0.0,
                    queue_len: None,
                },
            };

            let snapshot = BucketSnapshot {
                queue_len: (bucket == StatsBucket::Minute).then_some(queue_len),
                ..snapshot
            };
            history.push(snapshot);

            let max_len = self.limits.max_len(bucket);
            if history.len() > max_len {
                let excess = history.len() - max_len;
                history.drain(..excess);
            }
        }

        self.store.save(&record).await?;
        gauge!("ept_queue_length", "queue" => queue.to_string()).set(queue_len as f64);
        Ok(())
    }
}

fn rate(delta: u64, seconds: f64) -> f64 {
    if seconds > 0.0 {
        delta as f64 / seconds
    } else {
        0.0
    }
}
