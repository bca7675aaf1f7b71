//! # EPT Worker
//!
//! Manager协议的Worker侧：周期性发送 hello，按优先级消费自己的队列，
//! 校验每个队列的序列号并把消息交给 [`JobHandler`]。

pub mod components;
pub mod service;

pub use components::{
    HelloPublisher, JobHandler, LoggingJobHandler, SeqCheck, SequenceTracker, WorkerQueueConsumer,
};
pub use service::WorkerService;
