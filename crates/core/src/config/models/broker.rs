use serde::{Deserialize, Serialize};

/// 消息代理类型
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum BrokerType {
    #[default]
    Redis,
    /// 进程内代理，仅用于开发和测试
    Memory,
}

/// Redis configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RedisConfig {
    pub host: String,
    pub port: u16,
    pub database: i64,
    pub password: Option<String>,
    pub connection_timeout_seconds: u64,
    pub max_retry_attempts: u32,
    pub retry_delay_seconds: u64,
    /// 阻塞弹出使用的专用连接数
    pub blocking_pool_size: usize,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 6379,
            database: 0,
            password: None,
            connection_timeout_seconds: 30,
            max_retry_attempts: 3,
            retry_delay_seconds: 1,
            blocking_pool_size: 4,
        }
    }
}

impl RedisConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.host.is_empty() {
            return Err(anyhow::anyhow!("Redis主机地址不能为空"));
        }

        if self.port == 0 {
            return Err(anyhow::anyhow!("Redis端口必须大于0"));
        }

        if self.database < 0 {
            return Err(anyhow::anyhow!("Redis数据库索引不能为负数"));
        }

        if self.connection_timeout_seconds == 0 {
            return Err(anyhow::anyhow!("Redis连接超时时间必须大于0"));
        }

        if self.max_retry_attempts == 0 {
            return Err(anyhow::anyhow!("Redis最大重试次数必须大于0"));
        }

        if self.blocking_pool_size == 0 {
            return Err(anyhow::anyhow!("Redis阻塞连接池大小必须大于0"));
        }

        Ok(())
    }

    /// Build Redis connection URL
    pub fn build_url(&self) -> String {
        let auth = match &self.password {
            Some(password) => format!(":{password}@"),
            None => String::new(),
        };
        format!(
            "redis://{}{}:{}/{}",
            auth, self.host, self.port, self.database
        )
    }
}

/// 队列与频道配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BrokerConfig {
    #[serde(rename = "type")]
    pub r#type: BrokerType,
    pub redis: RedisConfig,
    /// 共享工作队列
    pub work_queue: String,
    /// Worker hello 频道
    pub worker_control_channel: String,
    /// Manager 控制请求频道
    pub manager_control_channel: String,
    /// Manager 控制响应频道
    pub manager_response_channel: String,
    /// 队列统计记录的键前缀
    pub stats_key_prefix: String,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            r#type: BrokerType::default(),
            redis: RedisConfig::default(),
            work_queue: "ept_work".to_string(),
            worker_control_channel: "ept_worker_ctrl".to_string(),
            manager_control_channel: "ept_manager_ctrl".to_string(),
            manager_response_channel: "ept_manager_resp".to_string(),
            stats_key_prefix: "ept:stats".to_string(),
        }
    }
}

impl BrokerConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        let names = [
            ("work_queue", &self.work_queue),
            ("worker_control_channel", &self.worker_control_channel),
            ("manager_control_channel", &self.manager_control_channel),
            ("manager_response_channel", &self.manager_response_channel),
            ("stats_key_prefix", &self.stats_key_prefix),
        ];
        for (field, value) in names {
            if value.is_empty() {
                return Err(anyhow::anyhow!("{field} 不能为空"));
            }
        }

        if self.manager_control_channel == self.manager_response_channel {
            return Err(anyhow::anyhow!("Manager控制频道与响应频道不能相同"));
        }

        if self.r#type == BrokerType::Redis {
            self.redis.validate()?;
        }

        Ok(())
    }

    pub fn is_redis(&self) -> bool {
        self.r#type == BrokerType::Redis
    }
}
