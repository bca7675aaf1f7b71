use serde::{Deserialize, Serialize};

use crate::models::FabricDefinition;

/// Fabric订阅进程配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FabricConfig {
    /// 订阅进程可执行文件
    pub subscriber_command: String,
    /// 参数中的 `{fabric}` 会被替换为fabric名称
    pub subscriber_args: Vec<String>,
    /// 每个fabric保留的生命周期事件数量
    pub event_history: usize,
    pub fabrics: Vec<FabricDefinition>,
}

impl Default for FabricConfig {
    fn default() -> Self {
        Self {
            subscriber_command: "ept-subscriber".to_string(),
            subscriber_args: vec!["--fabric".to_string(), "{fabric}".to_string()],
            event_history: 100,
            fabrics: Vec::new(),
        }
    }
}

impl FabricConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.subscriber_command.is_empty() {
            return Err(anyhow::anyhow!("订阅进程命令不能为空"));
        }

        if self.event_history == 0 {
            return Err(anyhow::anyhow!("fabric事件历史长度必须大于0"));
        }

        let mut seen = std::collections::HashSet::new();
        for fabric in &self.fabrics {
            if fabric.name.is_empty() {
                return Err(anyhow::anyhow!("fabric名称不能为空"));
            }
            if !seen.insert(fabric.name.as_str()) {
                return Err(anyhow::anyhow!("fabric重复定义: {}", fabric.name));
            }
        }

        Ok(())
    }

    /// 为指定fabric展开订阅进程参数
    pub fn args_for(&self, fabric: &str) -> Vec<String> {
        self.subscriber_args
            .iter()
            .map(|arg| arg.replace("{fabric}", fabric))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_substitution() {
        let config = FabricConfig::default();
        assert_eq!(config.args_for("fab1"), vec!["--fabric", "fab1"]);
    }

    #[test]
    fn test_duplicate_fabric_rejected() {
        let config = FabricConfig {
            fabrics: vec![
                FabricDefinition::new("fab1", true),
                FabricDefinition::new("fab1", false),
            ],
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
