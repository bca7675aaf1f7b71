use serde::{Deserialize, Serialize};

use crate::models::StatsBucket;

/// 各粒度滚动历史的最大长度
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StatsConfig {
    pub minute_max_len: usize,
    pub five_minute_max_len: usize,
    pub hour_max_len: usize,
    pub day_max_len: usize,
    pub week_max_len: usize,
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            minute_max_len: 60,
            five_minute_max_len: 288,
            hour_max_len: 168,
            day_max_len: 31,
            week_max_len: 52,
        }
    }
}

impl StatsConfig {
    pub fn max_len(&self, bucket: StatsBucket) -> usize {
        match bucket {
            StatsBucket::Minute => self.minute_max_len,
            StatsBucket::FiveMinute => self.five_minute_max_len,
            StatsBucket::Hour => self.hour_max_len,
            StatsBucket::Day => self.day_max_len,
            StatsBucket::Week => self.week_max_len,
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        for bucket in StatsBucket::ALL {
            if self.max_len(bucket) == 0 {
                return Err(anyhow::anyhow!(
                    "统计粒度 {} 的历史长度必须大于0",
                    bucket.as_str()
                ));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub log_level: String,
    /// `pretty` 或 `json`
    pub log_format: String,
    pub metrics_enabled: bool,
    pub metrics_bind_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
            metrics_enabled: false,
            metrics_bind_address: "0.0.0.0:9100".to_string(),
        }
    }
}

impl ObservabilityConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(anyhow::anyhow!(
                "无效的日志级别: {}，支持的级别: {:?}",
                self.log_level,
                valid_log_levels
            ));
        }

        let valid_formats = ["pretty", "json"];
        if !valid_formats.contains(&self.log_format.as_str()) {
            return Err(anyhow::anyhow!(
                "无效的日志格式: {}，支持的格式: {:?}",
                self.log_format,
                valid_formats
            ));
        }

        if self.metrics_enabled
            && self
                .metrics_bind_address
                .parse::<std::net::SocketAddr>()
                .is_err()
        {
            return Err(anyhow::anyhow!(
                "无效的指标监听地址: {}",
                self.metrics_bind_address
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_defaults() {
        let config = StatsConfig::default();
        assert_eq!(config.max_len(StatsBucket::Minute), 60);
        assert_eq!(config.max_len(StatsBucket::Week), 52);
        assert!(config.validate().is_ok());

        let zero = StatsConfig {
            day_max_len: 0,
            ..Default::default()
        };
        assert!(zero.validate().is_err());
    }

    #[test]
    fn test_observability_validation() {
        let mut config = ObservabilityConfig::default();
        assert!(config.validate().is_ok());

        config.log_format = "xml".to_string();
        assert!(config.validate().is_err());

        config.log_format = "json".to_string();
        config.metrics_enabled = true;
        config.metrics_bind_address = "not-an-addr".to_string();
        assert!(config.validate().is_err());
    }
}
