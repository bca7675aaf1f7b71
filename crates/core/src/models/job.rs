use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::{EptError, EptResult};

/// 任务键
///
/// 可以是单个标量值，也可以是字段映射。字段映射使用 `BTreeMap` 存储，
/// 字段顺序与输入无关，因此同一个逻辑目标总是得到同一个派生键。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JobKey {
    Fields(BTreeMap<String, Value>),
    Scalar(Value),
}

impl JobKey {
    /// 派生确定性的键字符串
    ///
    /// 映射：按字段名排序后拼接 `|field:value|`；标量：直接转为字符串。
    pub fn derive(&self) -> String {
        match self {
            JobKey::Fields(fields) => fields
                .iter()
                .map(|(field, value)| format!("|{}:{}|", field, scalar_to_string(value)))
                .collect(),
            JobKey::Scalar(value) => scalar_to_string(value),
        }
    }
}

impl From<&str> for JobKey {
    fn from(value: &str) -> Self {
        JobKey::Scalar(Value::String(value.to_string()))
    }
}

impl From<String> for JobKey {
    fn from(value: String) -> Self {
        JobKey::Scalar(Value::String(value))
    }
}

impl From<u64> for JobKey {
    fn from(value: u64) -> Self {
        JobKey::Scalar(Value::from(value))
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for JobKey {
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
        JobKey::Fields(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

fn scalar_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// 可分发的工作单元
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub action: String,
    pub key: JobKey,
    pub ts: DateTime<Utc>,
    #[serde(default)]
    pub execute_ts: Option<DateTime<Utc>>,
    #[serde(default)]
    pub data: Value,
}

impl Job {
    /// 创建新任务，时间戳取当前时间
    pub fn new(action: impl Into<String>, key: impl Into<JobKey>, data: Value) -> Self {
        Self {
            action: action.into(),
            key: key.into(),
            ts: Utc::now(),
            execute_ts: None,
            data,
        }
    }

    pub fn with_ts(mut self, ts: DateTime<Utc>) -> Self {
        self.ts = ts;
        self
    }

    pub fn with_execute_ts(mut self, execute_ts: DateTime<Utc>) -> Self {
        self.execute_ts = Some(execute_ts);
        self
    }

    /// 用于一致性哈希的键
    pub fn derive_key(&self) -> String {
        self.key.derive()
    }

    /// 是否已到执行时间
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.execute_ts.map_or(true, |ts| ts <= now)
    }

    pub fn serialize(&self) -> EptResult<String> {
        serde_json::to_string(self).map_err(EptError::from)
    }

    /// 解析任务；格式错误返回 `EptError::Serialization`，调用方应记录后跳过
    pub fn parse(payload: &str) -> EptResult<Self> {
        serde_json::from_str(payload).map_err(EptError::from)
    }
}
