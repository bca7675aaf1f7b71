use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// fabric配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FabricDefinition {
    pub name: String,
    /// 子进程退出或Worker不可用后是否自动重启
    #[serde(default = "default_auto_start")]
    pub auto_start: bool,
}

fn default_auto_start() -> bool {
    true
}

impl FabricDefinition {
    pub fn new(name: impl Into<String>, auto_start: bool) -> Self {
        Self {
            name: name.into(),
            auto_start,
        }
    }
}

/// fabric生命周期事件状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FabricEventStatus {
    Starting,
    WaitingToStart,
    Stopped,
}

impl FabricEventStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FabricEventStatus::Starting => "starting",
            FabricEventStatus::WaitingToStart => "waiting to start",
            FabricEventStatus::Stopped => "stopped",
        }
    }
}

/// 审计事件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FabricEvent {
    pub fabric: String,
    pub status: FabricEventStatus,
    pub description: String,
    pub ts: DateTime<Utc>,
}
