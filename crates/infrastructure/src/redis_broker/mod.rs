//! Redis后端
//!
//! 工作队列、Worker队列、控制频道以及队列统计都存放在同一个Redis实例中。

pub mod broker;
pub mod connection;
pub mod stats_store;

pub use broker::RedisBroker;
pub use connection::RedisConnector;
pub use stats_store::RedisStatsStore;
