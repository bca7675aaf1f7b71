use async_trait::async_trait;

use crate::models::{FabricDefinition, FabricEvent, FabricEventStatus};
use crate::EptResult;

/// fabric配置查询与生命周期事件记录
#[async_trait]
pub trait FabricRepository: Send + Sync {
    /// 所有 `auto_start = true` 的fabric
    async fn find_auto_start(&self) -> EptResult<Vec<FabricDefinition>>;

    /// 按名称加载，不存在时返回 `None`
    async fn load(&self, name: &str) -> EptResult<Option<FabricDefinition>>;

    async fn record_event(
        &self,
        fabric: &str,
        status: FabricEventStatus,
        description: &str,
    ) -> EptResult<()>;

    /// 最近的事件，旧事件在前
    async fn events(&self, fabric: &str) -> EptResult<Vec<FabricEvent>>;
}
