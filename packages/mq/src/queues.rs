use std::sync::Arc;

use common::jobs::{DispatchJob, EvaluationJob};
use common::mq::Message;
use common::retry::calculate_backoff;
use tracing::{info, warn};

use crate::error::MqError;
use crate::models::MqQueue;

/// How publishes behave when the broker reports a transient failure.
#[derive(Debug, Clone)]
pub struct QueueRetryPolicy {
    /// Publish attempts before giving up.
    pub max_attempts: u8,
    /// Base backoff delay in milliseconds.
    pub base_delay_ms: u64,
    /// Backoff ceiling in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for QueueRetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1000,
            max_delay_ms: 30000,
        }
    }
}

/// The two ordered stages of the scheduler.
///
/// The dispatch queue carries "decide what to run" work; the evaluation
/// queue carries "run it" work. Enqueue is fire-and-forget from the
/// caller's perspective: transient broker errors are retried here with
/// backoff before the error surfaces.
pub struct SchedulerQueues {
    mq: Arc<MqQueue>,
    dispatch_queue: String,
    evaluation_queue: String,
    retry: QueueRetryPolicy,
}

impl SchedulerQueues {
    pub fn new(
        mq: Arc<MqQueue>,
        dispatch_queue: impl Into<String>,
        evaluation_queue: impl Into<String>,
        retry: QueueRetryPolicy,
    ) -> Self {
        Self {
            mq,
            dispatch_queue: dispatch_queue.into(),
            evaluation_queue: evaluation_queue.into(),
            retry,
        }
    }

    /// Name of the dispatch queue, for consumers.
    pub fn dispatch_queue(&self) -> &str {
        &self.dispatch_queue
    }

    /// Name of the evaluation queue, for consumers.
    pub fn evaluation_queue(&self) -> &str {
        &self.evaluation_queue
    }

    /// Underlying broker handle, for `process_messages` consumers.
    pub fn mq(&self) -> &Arc<MqQueue> {
        &self.mq
    }

    /// Enqueue a dispatch job (new submission, instructor regrade).
    pub async fn enqueue_dispatch(&self, job: &DispatchJob) -> Result<(), MqError> {
        self.publish_with_retry(&self.dispatch_queue, job).await
    }

    /// Enqueue an evaluation job for an existing pending Result.
    pub async fn enqueue_evaluation(&self, job: &EvaluationJob) -> Result<(), MqError> {
        self.publish_with_retry(&self.evaluation_queue, job).await
    }

    /// Publish, retrying transient broker errors with exponential backoff.
    ///
    /// A failed publish retries the exact same message; it is never
    /// reinterpreted as job failure.
    async fn publish_with_retry<M: Message>(&self, queue: &str, message: &M) -> Result<(), MqError> {
        let mut attempt: u8 = 0;

        loop {
            match self.mq.publish(queue, None, message, None).await {
                Ok(_) => {
                    info!(
                        queue,
                        message_type = M::message_type(),
                        message_id = message.message_id(),
                        "Enqueued"
                    );
                    return Ok(());
                }
                Err(e) => {
                    attempt += 1;
                    if attempt >= self.retry.max_attempts {
                        return Err(MqError::Internal(format!(
                            "Failed to publish to '{queue}' after {attempt} attempts: {e}"
                        )));
                    }

                    let delay = calculate_backoff(
                        attempt,
                        self.retry.base_delay_ms,
                        self.retry.max_delay_ms,
                    );
                    warn!(
                        queue,
                        message_id = message.message_id(),
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Publish failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}
