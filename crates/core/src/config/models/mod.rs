pub mod app_config;
pub mod broker;
pub mod fabric;
pub mod manager_worker;
pub mod stats_observability;

pub use app_config::AppConfig;
pub use broker::{BrokerConfig, BrokerType, RedisConfig};
pub use fabric::FabricConfig;
pub use manager_worker::{ManagerConfig, WorkerConfig};
pub use stats_observability::{ObservabilityConfig, StatsConfig};
