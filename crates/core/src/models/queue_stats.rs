use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// 统计方向
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatsDirection {
    Tx,
    Rx,
}

/// 滚动历史的时间粒度
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatsBucket {
    Minute,
    FiveMinute,
    Hour,
    Day,
    Week,
}

impl StatsBucket {
    pub const ALL: [StatsBucket; 5] = [
        StatsBucket::Minute,
        StatsBucket::FiveMinute,
        StatsBucket::Hour,
        StatsBucket::Day,
        StatsBucket::Week,
    ];

    /// 粒度对应的时间间隔
    pub fn interval(&self) -> Duration {
        match self {
            StatsBucket::Minute => Duration::minutes(1),
            StatsBucket::FiveMinute => Duration::minutes(5),
            StatsBucket::Hour => Duration::hours(1),
            StatsBucket::Day => Duration::days(1),
            StatsBucket::Week => Duration::weeks(1),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StatsBucket::Minute => "minute",
            StatsBucket::FiveMinute => "five_minute",
            StatsBucket::Hour => "hour",
            StatsBucket::Day => "day",
            StatsBucket::Week => "week",
        }
    }
}

/// 单个粒度上的一次快照
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BucketSnapshot {
    pub ts: DateTime<Utc>,
    pub total_tx: u64,
    pub total_rx: u64,
    pub delta_tx: u64,
    pub delta_rx: u64,
    pub tx_rate: f64,
    pub rx_rate: f64,
    /// 仅分钟粒度记录采样时的队列长度
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queue_len: Option<u64>,
}

/// 五个粒度的滚动历史
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BucketHistory {
    #[serde(default)]
    pub minute: Vec<BucketSnapshot>,
    #[serde(default)]
    pub five_minute: Vec<BucketSnapshot>,
    #[serde(default)]
    pub hour: Vec<BucketSnapshot>,
    #[serde(default)]
    pub day: Vec<BucketSnapshot>,
    #[serde(default)]
    pub week: Vec<BucketSnapshot>,
}

impl BucketHistory {
    pub fn get(&self, bucket: StatsBucket) -> &Vec<BucketSnapshot> {
        match bucket {
            StatsBucket::Minute => &self.minute,
            StatsBucket::FiveMinute => &self.five_minute,
            StatsBucket::Hour => &self.hour,
            StatsBucket::Day => &self.day,
            StatsBucket::Week => &self.week,
        }
    }

    pub fn get_mut(&mut self, bucket: StatsBucket) -> &mut Vec<BucketSnapshot> {
        match bucket {
            StatsBucket::Minute => &mut self.minute,
            StatsBucket::FiveMinute => &mut self.five_minute,
            StatsBucket::Hour => &mut self.hour,
            StatsBucket::Day => &mut self.day,
            StatsBucket::Week => &mut self.week,
        }
    }
}

/// 单个命名队列的可观测计数器
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueStatsRecord {
    /// 所属进程标识
    pub proc: String,
    pub queue: String,
    /// 进程启动时间
    pub start: DateTime<Utc>,
    pub total_tx: u64,
    pub total_rx: u64,
    #[serde(default)]
    pub buckets: BucketHistory,
}

impl QueueStatsRecord {
    /// 计数器清零的新记录
    pub fn new(proc: impl Into<String>, queue: impl Into<String>, start: DateTime<Utc>) -> Self {
        Self {
            proc: proc.into(),
            queue: queue.into(),
            start,
            total_tx: 0,
            total_rx: 0,
            buckets: BucketHistory::default(),
        }
    }
}
