//! # ept-core
//!
//! 端点追踪分发层的核心库：错误类型、配置、数据模型以及与外部系统交互的端口trait。

pub mod config;
pub mod errors;
pub mod models;
pub mod traits;

pub use config::AppConfig;
pub use errors::*;
pub use traits::{
    Broker, ChannelMessage, FabricProcess, FabricRepository, ProcessLauncher, StatsStore,
    Subscription,
};
