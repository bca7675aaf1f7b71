use async_trait::async_trait;
use ept_core::models::QueueStatsRecord;
use ept_core::traits::StatsStore;
use ept_core::EptResult;
use redis::AsyncCommands;

use super::connection::{redis_error, RedisConnector};

/// 以 JSON 形式把队列统计保存在 `<prefix>:<proc>:<queue>` 键下
pub struct RedisStatsStore {
    connector: RedisConnector,
    key_prefix: String,
}

impl RedisStatsStore {
    pub fn new(connector: RedisConnector, key_prefix: impl Into<String>) -> Self {
        Self {
            connector,
            key_prefix: key_prefix.into(),
        }
    }

    pub fn key(&self, proc: &str, queue: &str) -> String {
        format!("{}:{}:{}", self.key_prefix, proc, queue)
    }
}

#[async_trait]
impl StatsStore for RedisStatsStore {
    async fn load(&self, proc: &str, queue: &str) -> EptResult<Option<QueueStatsRecord>> {
        let mut conn = self.connector.shared();
        let raw: Option<String> = conn
            .get(self.key(proc, queue))
            .await
            .map_err(|e| redis_error("读取队列统计失败", e))?;

        match raw {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn save(&self, record: &QueueStatsRecord) -> EptResult<()> {
        let json = serde_json::to_string(record)?;
        let mut conn = self.connector.shared();
        let _: () = conn
            .set(self.key(&record.proc, &record.queue), json)
            .await
            .map_err(|e| redis_error("保存队列统计失败", e))?;
        Ok(())
    }
}
