//! Test data builders
//!
//! Builders with sensible defaults for the messages exchanged between the
//! manager and workers.

use chrono::{DateTime, Utc};
use ept_core::models::{worker_queue_name, Job, JobKey, WorkMessage, WorkerHello, ROLE_WORKER};
use serde_json::Value;

/// Builder for `WorkerHello`
pub struct HelloBuilder {
    hello: WorkerHello,
}

impl HelloBuilder {
    /// A `worker` role hello with a single `wq_<id>` queue
    pub fn new(worker_id: &str) -> Self {
        Self {
            hello: WorkerHello::new(
                worker_id,
                ROLE_WORKER,
                Utc::now(),
                vec![worker_queue_name("wq", worker_id)],
                1,
            ),
        }
    }

    pub fn with_role(mut self, role: &str) -> Self {
        self.hello.role = role.to_string();
        self
    }

    pub fn with_queues(mut self, queues: &[&str]) -> Self {
        self.hello.queues = queues.iter().map(|q| q.to_string()).collect();
        self
    }

    /// Queue names derived from prefixes, e.g. `["pq", "wq"]`
    pub fn with_prefixes(mut self, prefixes: &[&str]) -> Self {
        let id = self.hello.worker_id.clone();
        self.hello.queues = prefixes
            .iter()
            .map(|prefix| worker_queue_name(prefix, &id))
            .collect();
        self
    }

    pub fn with_seq(mut self, seq: u64) -> Self {
        self.hello.seq = seq;
        self
    }

    pub fn with_start_time(mut self, start_time: DateTime<Utc>) -> Self {
        self.hello.start_time = start_time;
        self
    }

    pub fn build(self) -> WorkerHello {
        self.hello
    }
}

/// Builder for `WorkMessage`
pub struct WorkMessageBuilder {
    message: WorkMessage,
}

impl WorkMessageBuilder {
    /// A targeted `worker` message for `fabric` keyed on `address`
    pub fn new(fabric: &str, address: &str) -> Self {
        Self {
            message: WorkMessage::work(
                fabric,
                ROLE_WORKER,
                0,
                Job::new("endpoint", address, Value::Null),
            ),
        }
    }

    pub fn with_role(mut self, role: &str) -> Self {
        self.message.role = Some(role.to_string());
        self
    }

    pub fn with_qnum(mut self, qnum: usize) -> Self {
        self.message.qnum = qnum;
        self
    }

    pub fn with_action(mut self, action: &str) -> Self {
        self.message.job.action = action.to_string();
        self
    }

    pub fn with_key(mut self, key: impl Into<JobKey>) -> Self {
        self.message.job.key = key.into();
        self
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.message.job.data = data;
        self
    }

    pub fn broadcast(mut self) -> Self {
        self.message.broadcast = true;
        self
    }

    pub fn build(self) -> WorkMessage {
        self.message
    }

    /// Serialized payload ready to push onto a queue
    pub fn payload(self) -> String {
        self.message
            .serialize()
            .expect("work message should serialize")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ept_core::models::ROLE_WATCHER;

    #[test]
    fn test_hello_builder() {
        let hello = HelloBuilder::new("w1")
            .with_role(ROLE_WATCHER)
            .with_prefixes(&["pq", "wq"])
            .with_seq(3)
            .build();
        assert_eq!(hello.queues, vec!["pq_w1", "wq_w1"]);
        assert_eq!(hello.role, ROLE_WATCHER);
        assert!(hello.validate().is_ok());
    }

    #[test]
    fn test_work_message_builder() {
        let message = WorkMessageBuilder::new("fab1", "10.0.0.1").with_qnum(1).build();
        assert_eq!(message.address(), "10.0.0.1");
        assert!(!message.is_broadcast());

        let payload = WorkMessageBuilder::new("fab1", "x").broadcast().payload();
        assert!(WorkMessage::parse(&payload).unwrap().is_broadcast());
    }
}
