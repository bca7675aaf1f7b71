use anyhow::{Context, Result};
use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::Path;

use super::{
    broker::BrokerConfig,
    fabric::FabricConfig,
    manager_worker::{ManagerConfig, WorkerConfig},
    stats_observability::{ObservabilityConfig, StatsConfig},
};

/// System configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub broker: BrokerConfig,
    pub manager: ManagerConfig,
    pub worker: WorkerConfig,
    pub fabric: FabricConfig,
    pub stats: StatsConfig,
    pub observability: ObservabilityConfig,
}

impl AppConfig {
    /// 从配置文件和环境变量加载配置
    ///
    /// 加载顺序：
    /// 1. 内置默认值
    /// 2. 配置文件（TOML），未指定时依次尝试默认路径
    /// 3. 环境变量覆盖（前缀 `EPT`，分隔符 `__`）
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let defaults =
            ConfigBuilder::try_from(&AppConfig::default()).context("构建默认配置失败")?;
        let mut builder = ConfigBuilder::builder().add_source(defaults);

        if let Some(path) = config_path {
            if Path::new(path).exists() {
                builder = builder.add_source(File::new(path, FileFormat::Toml));
            } else {
                return Err(anyhow::anyhow!("配置文件不存在: {}", path));
            }
        } else {
            let default_paths = ["config/ept.toml", "ept.toml", "/etc/ept/config.toml"];
            if let Some(path) = default_paths.iter().find(|p| Path::new(p).exists()) {
                builder = builder.add_source(File::new(path, FileFormat::Toml));
            }
        }

        builder = builder.add_source(
            Environment::with_prefix("EPT")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config: AppConfig = builder
            .build()
            .context("构建配置失败")?
            .try_deserialize()
            .context("反序列化配置失败")?;

        config.validate()?;

        Ok(config)
    }

    /// Load configuration from TOML string
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(toml_str).context("解析TOML配置失败")?;

        config.validate()?;
        Ok(config)
    }

    /// Serialize configuration to TOML string
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("序列化配置为TOML失败")
    }

    pub fn validate(&self) -> Result<()> {
        self.broker.validate().context("消息代理配置验证失败")?;

        self.manager.validate().context("Manager配置验证失败")?;

        self.worker.validate().context("Worker配置验证失败")?;

        self.fabric.validate().context("Fabric配置验证失败")?;

        self.stats.validate().context("队列统计配置验证失败")?;

        self.observability
            .validate()
            .context("可观测性配置验证失败")?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BrokerType;
    use std::io::Write;

    #[test]
    fn test_default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_toml_partial() {
        let config = AppConfig::from_toml(
            r#"
            [broker]
            type = "memory"

            [manager]
            manager_id = "mgr-a"
            hello_timeout_seconds = 30

            [[fabric.fabrics]]
            name = "fab1"

            [[fabric.fabrics]]
            name = "fab2"
            auto_start = false
            "#,
        )
        .unwrap();

        assert_eq!(config.broker.r#type, BrokerType::Memory);
        assert_eq!(config.manager.manager_id, "mgr-a");
        assert_eq!(config.manager.hello_timeout_seconds, 30);
        assert_eq!(config.manager.worker_update_interval_seconds, 5);
        assert_eq!(config.fabric.fabrics.len(), 2);
        assert!(config.fabric.fabrics[0].auto_start);
        assert!(!config.fabric.fabrics[1].auto_start);
    }

    #[test]
    fn test_from_toml_invalid() {
        let result = AppConfig::from_toml(
            r#"
            [observability]
            log_level = "loud"
            "#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_toml_roundtrip() {
        let config = AppConfig::default();
        let toml_str = config.to_toml().unwrap();
        let parsed = AppConfig::from_toml(&toml_str).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
            [worker]
            role = "watcher"
            queue_prefixes = ["w"]
            "#
        )
        .unwrap();

        let path = file.path().to_str().unwrap().to_string();
        let config = AppConfig::load(Some(&path)).unwrap();
        assert_eq!(config.worker.role, "watcher");
        assert_eq!(config.worker.queue_names("w1"), vec!["w_w1"]);
        assert_eq!(config.broker.work_queue, "ept_work");
    }

    #[test]
    fn test_load_missing_file() {
        assert!(AppConfig::load(Some("/nonexistent/ept.toml")).is_err());
    }
}
