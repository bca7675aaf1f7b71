use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::TrackedWorkerRecord;
use crate::errors::{EptError, EptResult};

/// Manager控制命令
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "msg_type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ManagerCommand {
    GetManagerStatus,
    FabricStart {
        fabric: String,
        #[serde(default)]
        reason: Option<String>,
    },
    FabricStop {
        fabric: String,
        #[serde(default)]
        reason: Option<String>,
    },
    FabricRestart {
        fabric: String,
        #[serde(default)]
        reason: Option<String>,
    },
}

impl ManagerCommand {
    pub fn name(&self) -> &'static str {
        match self {
            ManagerCommand::GetManagerStatus => "GET_MANAGER_STATUS",
            ManagerCommand::FabricStart { .. } => "FABRIC_START",
            ManagerCommand::FabricStop { .. } => "FABRIC_STOP",
            ManagerCommand::FabricRestart { .. } => "FABRIC_RESTART",
        }
    }
}

/// Manager控制请求，`seq` 原样回显在响应中
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManagerRequest {
    pub seq: u64,
    #[serde(flatten)]
    pub command: ManagerCommand,
}

impl ManagerRequest {
    pub fn new(seq: u64, command: ManagerCommand) -> Self {
        Self { seq, command }
    }

    pub fn serialize(&self) -> EptResult<String> {
        serde_json::to_string(self).map_err(EptError::from)
    }

    pub fn parse(payload: &str) -> EptResult<Self> {
        serde_json::from_str(payload).map_err(EptError::from)
    }
}

/// Manager控制响应
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManagerResponse {
    pub seq: u64,
    pub manager_id: String,
    pub success: bool,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub data: Value,
}

impl ManagerResponse {
    pub fn ok(seq: u64, manager_id: impl Into<String>, data: Value) -> Self {
        Self {
            seq,
            manager_id: manager_id.into(),
            success: true,
            error: None,
            data,
        }
    }

    pub fn failed(seq: u64, manager_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            seq,
            manager_id: manager_id.into(),
            success: false,
            error: Some(error.into()),
            data: Value::Null,
        }
    }

    pub fn serialize(&self) -> EptResult<String> {
        serde_json::to_string(self).map_err(EptError::from)
    }

    pub fn parse(payload: &str) -> EptResult<Self> {
        serde_json::from_str(payload).map_err(EptError::from)
    }
}

/// Manager自身信息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManagerInfo {
    pub id: String,
    pub queues: Vec<String>,
    pub queue_len: Vec<u64>,
}

/// 单个fabric的运行状态
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FabricStatus {
    pub fabric: String,
    pub alive: bool,
    #[serde(default)]
    pub waiting_for_retry: bool,
}

/// 状态查询响应
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManagerStatus {
    pub manager: ManagerInfo,
    pub workers: Vec<TrackedWorkerRecord>,
    pub fabrics: Vec<FabricStatus>,
}
