use serde::{Serialize, de::DeserializeOwned};
use std::fmt::Debug;

/// Core trait for all MQ messages
pub trait Message: Serialize + DeserializeOwned + Debug + Send + Sync + Clone {
    fn message_type() -> &'static str
    where
        Self: Sized;

    /// Stable identifier used for retry tracking and log correlation.
    fn message_id(&self) -> &str;
}
