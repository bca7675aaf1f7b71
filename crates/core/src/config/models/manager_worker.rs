use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::models::{worker_queue_name, ROLE_WATCHER, ROLE_WORKER};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ManagerConfig {
    /// 为空时使用主机名
    pub manager_id: String,
    pub stats_interval_seconds: u64,
    /// 存活检查周期
    pub worker_update_interval_seconds: u64,
    pub hello_timeout_seconds: u64,
    /// 启动fabric前必须至少有一个活跃成员的角色
    pub required_roles: Vec<String>,
    /// 工作队列单次阻塞弹出的超时
    pub work_pop_timeout_seconds: u64,
    /// 控制客户端等待响应的超时
    pub control_timeout_seconds: u64,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            manager_id: String::new(),
            stats_interval_seconds: 60,
            worker_update_interval_seconds: 5,
            hello_timeout_seconds: 15,
            required_roles: vec![ROLE_WORKER.to_string(), ROLE_WATCHER.to_string()],
            work_pop_timeout_seconds: 1,
            control_timeout_seconds: 10,
        }
    }
}

impl ManagerConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.stats_interval_seconds == 0 {
            return Err(anyhow::anyhow!("统计采集间隔必须大于0"));
        }

        if self.worker_update_interval_seconds == 0 {
            return Err(anyhow::anyhow!("Worker存活检查间隔必须大于0"));
        }

        if self.hello_timeout_seconds <= self.worker_update_interval_seconds {
            return Err(anyhow::anyhow!(
                "hello超时({}s)必须大于存活检查间隔({}s)",
                self.hello_timeout_seconds,
                self.worker_update_interval_seconds
            ));
        }

        if self.required_roles.iter().any(|role| role.is_empty()) {
            return Err(anyhow::anyhow!("必需角色不能为空字符串"));
        }

        if self.work_pop_timeout_seconds == 0 {
            return Err(anyhow::anyhow!("工作队列弹出超时必须大于0"));
        }

        if self.control_timeout_seconds == 0 {
            return Err(anyhow::anyhow!("控制请求超时必须大于0"));
        }

        Ok(())
    }

    pub fn stats_interval(&self) -> Duration {
        Duration::from_secs(self.stats_interval_seconds)
    }

    pub fn worker_update_interval(&self) -> Duration {
        Duration::from_secs(self.worker_update_interval_seconds)
    }

    pub fn hello_timeout(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.hello_timeout_seconds as i64)
    }

    pub fn work_pop_timeout(&self) -> Duration {
        Duration::from_secs(self.work_pop_timeout_seconds)
    }

    pub fn control_timeout(&self) -> Duration {
        Duration::from_secs(self.control_timeout_seconds)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WorkerConfig {
    /// 为空时使用 `<hostname>-<pid>`
    pub worker_id: String,
    pub role: String,
    /// 按优先级排列的队列前缀
    pub queue_prefixes: Vec<String>,
    pub hello_interval_seconds: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            worker_id: String::new(),
            role: ROLE_WORKER.to_string(),
            queue_prefixes: vec!["pq".to_string(), "wq".to_string()],
            hello_interval_seconds: 5,
        }
    }
}

impl WorkerConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.role.is_empty() {
            return Err(anyhow::anyhow!("Worker角色不能为空"));
        }

        if self.queue_prefixes.is_empty() {
            return Err(anyhow::anyhow!("Worker至少需要一个队列"));
        }

        if self.hello_interval_seconds == 0 {
            return Err(anyhow::anyhow!("hello间隔必须大于0"));
        }

        Ok(())
    }

    /// 指定Worker的队列名称，顺序即优先级
    pub fn queue_names(&self, worker_id: &str) -> Vec<String> {
        self.queue_prefixes
            .iter()
            .map(|prefix| worker_queue_name(prefix, worker_id))
            .collect()
    }

    pub fn hello_interval(&self) -> Duration {
        Duration::from_secs(self.hello_interval_seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manager_defaults() {
        let config = ManagerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.hello_timeout().num_seconds(), 15);
        assert_eq!(config.worker_update_interval(), Duration::from_secs(5));
        assert_eq!(config.required_roles, vec!["worker", "watcher"]);
    }

    #[test]
    fn test_hello_timeout_must_exceed_sweep() {
        let config = ManagerConfig {
            hello_timeout_seconds: 5,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_worker_queue_names() {
        let config = WorkerConfig::default();
        assert_eq!(config.queue_names("w1"), vec!["pq_w1", "wq_w1"]);

        let empty = WorkerConfig {
            queue_prefixes: vec![],
            ..Default::default()
        };
        assert!(empty.validate().is_err());
    }
}
