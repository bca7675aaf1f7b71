//! # ept-infrastructure
//!
//! 核心端口trait的具体实现：Redis与内存消息代理、队列统计存储、
//! 基于配置的fabric仓库以及订阅子进程启动器。

pub mod fabric_repository;
pub mod in_memory_broker;
pub mod redis_broker;
pub mod subprocess;

pub use fabric_repository::ConfigFabricRepository;
pub use in_memory_broker::{InMemoryBroker, InMemoryStatsStore};
pub use redis_broker::{RedisBroker, RedisConnector, RedisStatsStore};
pub use subprocess::{SubprocessLauncher, SubscriberProcess};
