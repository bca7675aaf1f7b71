//! # EPT Manager
//!
//! 工作分发Manager：从共享工作队列取出消息，按地址一致性哈希或广播投递到
//! 各Worker的优先级队列，并监管每个fabric的订阅子进程。
//!
//! - [`QueueStatsTracker`] - 队列吞吐计数与分桶历史
//! - [`WorkerTracker`] - Worker注册、激活与超时移除
//! - [`WorkRouter`] - 定向/广播分发与fabric清理
//! - [`FabricSupervisor`] - fabric订阅进程的启动、停止与健康检查
//! - [`Manager`] - 把以上组件串起来的主循环
//! - [`ManagerClient`] - 控制通道的请求/响应客户端

pub mod client;
pub mod fabric_supervisor;
pub mod manager;
pub mod queue_stats;
pub mod router;
pub mod worker_tracker;

pub use client::ManagerClient;
pub use fabric_supervisor::{FabricSupervisor, StartOutcome};
pub use manager::Manager;
pub use queue_stats::QueueStatsTracker;
pub use router::{route_index, select_worker, Delivery, WorkRouter};
pub use worker_tracker::{SweepOutcome, TrackedWorker, WorkerTracker};
