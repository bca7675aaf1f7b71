use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::{EptError, EptResult};

/// 处理端点事件的Worker角色
pub const ROLE_WORKER: &str = "worker";
/// 处理端点状态观察（stale/offsubnet）的Worker角色
pub const ROLE_WATCHER: &str = "watcher";

/// Worker队列名称：`<prefix>_<worker_id>`
pub fn worker_queue_name(prefix: &str, worker_id: &str) -> String {
    format!("{prefix}_{worker_id}")
}

/// Worker注册/存活通告
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerHello {
    pub worker_id: String,
    pub role: String,
    pub start_time: DateTime<Utc>,
    /// 按优先级排列的队列名称
    pub queues: Vec<String>,
    pub seq: u64,
}

impl WorkerHello {
    pub fn new(
        worker_id: impl Into<String>,
        role: impl Into<String>,
        start_time: DateTime<Utc>,
        queues: Vec<String>,
        seq: u64,
    ) -> Self {
        Self {
            worker_id: worker_id.into(),
            role: role.into(),
            start_time,
            queues,
            seq,
        }
    }

    /// 没有队列或缺少标识的 hello 无效
    pub fn validate(&self) -> EptResult<()> {
        if self.worker_id.is_empty() {
            return Err(EptError::InvalidHello("worker_id 为空".to_string()));
        }
        if self.role.is_empty() {
            return Err(EptError::InvalidHello(format!(
                "Worker {} 未声明角色",
                self.worker_id
            )));
        }
        if self.queues.is_empty() {
            return Err(EptError::InvalidHello(format!(
                "Worker {} 没有声明任何队列",
                self.worker_id
            )));
        }
        Ok(())
    }

    pub fn serialize(&self) -> EptResult<String> {
        serde_json::to_string(self).map_err(EptError::from)
    }

    pub fn parse(payload: &str) -> EptResult<Self> {
        serde_json::from_str(payload).map_err(EptError::from)
    }
}

/// Manager视角下单个Worker的状态快照（用于状态查询）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedWorkerRecord {
    pub worker_id: String,
    pub role: String,
    pub active: bool,
    pub queues: Vec<String>,
    /// 每个队列最后分配的序列号
    pub seq: Vec<u64>,
    /// 每个队列当前长度
    #[serde(default)]
    pub queue_len: Vec<u64>,
    pub start_time: DateTime<Utc>,
    pub last_hello: DateTime<Utc>,
    pub registered_at: DateTime<Utc>,
}
