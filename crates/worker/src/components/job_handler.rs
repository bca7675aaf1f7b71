use async_trait::async_trait;
use ept_core::models::WorkMessage;
use ept_core::EptResult;

/// Worker侧的消息处理
#[async_trait]
pub trait JobHandler: Send + Sync {
    /// 处理一条工作消息
    async fn handle(&self, queue: &str, message: &WorkMessage) -> EptResult<()>;

    /// 丢弃某个fabric的本地缓存状态
    async fn flush_fabric(&self, fabric: &str) -> EptResult<()>;
}
