pub mod hello_publisher;
pub mod job_handler;
pub mod logging_handler;
pub mod queue_consumer;
pub mod sequence;

pub use hello_publisher::HelloPublisher;
pub use job_handler::JobHandler;
pub use logging_handler::LoggingJobHandler;
pub use queue_consumer::WorkerQueueConsumer;
pub use sequence::{SeqCheck, SequenceTracker};
