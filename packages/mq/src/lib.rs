pub mod error;
pub mod models;
pub mod queues;

pub use error::MqError;
pub use models::{BroccoliError, BrokerMessage, MqConfig, MqQueue, init_mq};
pub use queues::{QueueRetryPolicy, SchedulerQueues};
