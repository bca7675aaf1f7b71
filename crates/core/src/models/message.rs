use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::Job;
use crate::errors::{EptError, EptResult};

/// 工作消息类型
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkMessageType {
    /// 普通工作任务
    Work,
    /// 通知Worker丢弃某个fabric的缓存状态
    FlushFabric,
}

/// 在共享工作队列和Worker队列中传输的消息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkMessage {
    pub msg_type: WorkMessageType,
    /// 路由地址，为空时使用任务的派生键
    #[serde(default)]
    pub addr: Option<String>,
    /// 目标角色；广播时为空表示所有角色
    #[serde(default)]
    pub role: Option<String>,
    /// Worker队列索引（优先级）
    #[serde(default)]
    pub qnum: usize,
    pub fabric: String,
    /// 由Manager按Worker队列分配的序列号
    #[serde(default)]
    pub seq: u64,
    #[serde(default)]
    pub broadcast: bool,
    pub job: Job,
}

impl WorkMessage {
    /// 定向到某个角色的工作消息
    pub fn work(fabric: impl Into<String>, role: impl Into<String>, qnum: usize, job: Job) -> Self {
        Self {
            msg_type: WorkMessageType::Work,
            addr: None,
            role: Some(role.into()),
            qnum,
            fabric: fabric.into(),
            seq: 0,
            broadcast: false,
            job,
        }
    }

    /// 广播消息，`role` 为空时发送给所有角色
    pub fn broadcast(
        fabric: impl Into<String>,
        role: Option<String>,
        qnum: usize,
        job: Job,
    ) -> Self {
        Self {
            msg_type: WorkMessageType::Work,
            addr: None,
            role,
            qnum,
            fabric: fabric.into(),
            seq: 0,
            broadcast: true,
            job,
        }
    }

    /// fabric 停止时发送给所有Worker的清理通知
    pub fn flush_fabric(fabric: impl Into<String>) -> Self {
        let fabric = fabric.into();
        let job = Job::new("flush_fabric", fabric.as_str(), Value::Null);
        Self {
            msg_type: WorkMessageType::FlushFabric,
            addr: None,
            role: None,
            qnum: 0,
            fabric,
            seq: 0,
            broadcast: true,
            job,
        }
    }

    pub fn with_addr(mut self, addr: impl Into<String>) -> Self {
        self.addr = Some(addr.into());
        self
    }

    /// 路由地址：显式地址优先，否则使用任务派生键
    pub fn address(&self) -> String {
        match &self.addr {
            Some(addr) => addr.clone(),
            None => self.job.derive_key(),
        }
    }

    /// 广播标志为真，或地址为 `"0"`/空
    pub fn is_broadcast(&self) -> bool {
        if self.broadcast {
            return true;
        }
        let addr = self.address();
        addr.is_empty() || addr == "0"
    }

    pub fn serialize(&self) -> EptResult<String> {
        serde_json::to_string(self).map_err(EptError::from)
    }

    pub fn parse(payload: &str) -> EptResult<Self> {
        serde_json::from_str(payload).map_err(EptError::from)
    }
}
