use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use ept_core::models::WorkMessage;
use ept_core::EptResult;
use tracing::info;

use super::JobHandler;

/// 只记录日志的处理器
///
/// 没有接入具体业务逻辑时由 `ept --mode worker` 使用，可以用来观察Manager的分发结果。
#[derive(Debug, Default)]
pub struct LoggingJobHandler {
    handled: AtomicU64,
    flushed: AtomicU64,
}

impl LoggingJobHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn handled(&self) -> u64 {
        self.handled.load(Ordering::Relaxed)
    }

    pub fn flushed(&self) -> u64 {
        self.flushed.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl JobHandler for LoggingJobHandler {
    async fn handle(&self, queue: &str, message: &WorkMessage) -> EptResult<()> {
        let job = &message.job;
        if job.is_due(Utc::now()) {
            info!(
                "[{}] fabric={} seq={} action={} key={}",
                queue,
                message.fabric,
                message.seq,
                job.action,
                job.derive_key()
            );
        } else {
            info!(
                "[{}] fabric={} seq={} action={} key={} 计划执行时间 {:?}",
                queue,
                message.fabric,
                message.seq,
                job.action,
                job.derive_key(),
                job.execute_ts
            );
        }
        self.handled.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn flush_fabric(&self, fabric: &str) -> EptResult<()> {
        info!("丢弃fabric {} 的本地状态", fabric);
        self.flushed.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}
