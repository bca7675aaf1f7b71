//! 配置管理
//!
//! 配置按以下顺序加载，后者覆盖前者：
//!
//! 1. 内置默认值
//! 2. TOML 配置文件
//! 3. 以 `EPT__` 为前缀的环境变量（层级分隔符为 `__`，例如 `EPT__MANAGER__HELLO_TIMEOUT_SECONDS=30`）
//!
//! ```rust,no_run
//! use ept_core::config::AppConfig;
//!
//! let config = AppConfig::load(Some("config/ept.toml")).expect("加载配置失败");
//! println!("manager id: {}", config.manager.manager_id);
//! ```

pub mod models;

pub use models::{
    AppConfig, BrokerConfig, BrokerType, FabricConfig, ManagerConfig, ObservabilityConfig,
    RedisConfig, StatsConfig, WorkerConfig,
};
