use thiserror::Error;

/// 端点追踪系统错误类型定义
#[derive(Debug, Error)]
pub enum EptError {
    #[error("消息代理错误: {0}")]
    Broker(String),

    #[error("序列化错误: {0}")]
    Serialization(String),

    #[error("无效的Worker Hello: {0}")]
    InvalidHello(String),

    #[error("Worker未找到: {id}")]
    WorkerNotFound { id: String },

    #[error("角色 {role} 没有活跃的Worker")]
    NoActiveWorkers { role: String },

    #[error("Worker {worker_id} 不存在队列索引 {qnum}")]
    QueueIndexOutOfRange { worker_id: String, qnum: usize },

    #[error("子进程错误: {0}")]
    Process(String),

    #[error("配置错误: {0}")]
    Configuration(String),

    #[error("操作超时: {0}")]
    Timeout(String),

    #[error("内部错误: {0}")]
    Internal(String),
}

impl EptError {
    /// 是否为可重试的错误
    ///
    /// 代理连接、超时以及子进程错误都是暂时性的，调用方可以稍后重试；
    /// 其余错误说明输入或状态本身有问题，重试不会改变结果。
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EptError::Broker(_) | EptError::Timeout(_) | EptError::Process(_)
        )
    }
}

impl From<serde_json::Error> for EptError {
    fn from(e: serde_json::Error) -> Self {
        EptError::Serialization(e.to_string())
    }
}

/// 统一的Result类型
pub type EptResult<T> = std::result::Result<T, EptError>;
