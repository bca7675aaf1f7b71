//! # 数据模型
//!
//! 在Manager、Worker和fabric订阅进程之间流转的数据结构。
//!
//! - [`Job`] - 可分发的工作单元，带确定性的派生键
//! - [`WorkMessage`] - 带路由信息（角色、队列索引、fabric、序列号）的队列消息
//! - [`WorkerHello`] - Worker的注册/存活通告
//! - [`ManagerRequest`] / [`ManagerResponse`] - Manager控制通道的请求响应
//! - [`QueueStatsRecord`] - 队列吞吐计数与滚动历史
//!
//! 所有在队列或通道上传输的类型都使用 JSON 编码，时间字段统一为 `DateTime<Utc>`。

pub mod control;
pub mod fabric;
pub mod job;
pub mod message;
pub mod queue_stats;
pub mod worker;

pub use control::*;
pub use fabric::*;
pub use job::*;
pub use message::*;
pub use queue_stats::*;
pub use worker::*;
