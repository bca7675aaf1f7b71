use async_trait::async_trait;

use crate::models::QueueStatsRecord;
use crate::EptResult;

/// 队列统计的持久化存储
#[async_trait]
pub trait StatsStore: Send + Sync {
    async fn load(&self, proc: &str, queue: &str) -> EptResult<Option<QueueStatsRecord>>;

    async fn save(&self, record: &QueueStatsRecord) -> EptResult<()>;
}
