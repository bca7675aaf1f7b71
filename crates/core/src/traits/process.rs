use async_trait::async_trait;

use crate::EptResult;

/// 一个fabric订阅子进程
#[async_trait]
pub trait FabricProcess: Send + Sync {
    /// 操作系统进程号
    fn id(&self) -> Option<u32>;

    /// 非阻塞地检查进程是否仍在运行
    fn is_alive(&mut self) -> bool;

    /// 强制终止并回收进程
    async fn terminate(&mut self) -> EptResult<()>;
}

/// 为fabric启动订阅子进程
#[async_trait]
pub trait ProcessLauncher: Send + Sync {
    async fn spawn(&self, fabric: &str) -> EptResult<Box<dyn FabricProcess>>;
}
