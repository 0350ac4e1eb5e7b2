mod config;
mod error;
mod handlers;
mod launcher;
mod stage;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use common::jobs::EvaluationJob;
use common::retry::{
    RetryCleanupGuard, RetryDecision, RetryTracker, calculate_backoff, spawn_cleanup_task,
};
use handlers::evaluation::handle_evaluation_job;
use launcher::{NativeLauncher, ProcessLauncher};
use mq::{BroccoliError, BrokerMessage, MqConfig, init_mq};
use sea_orm::DatabaseConnection;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_target(false).init();

    let config = config::WorkerAppConfig::load().context("Failed to load config")?;
    info!("Worker starting: {}", config.worker.id);

    let db = common::db::init_db(&config.database.url)
        .await
        .context("Failed to connect to database")?;
    info!("Database connected");

    let mq = Arc::new(
        init_mq(MqConfig {
            url: config.mq.url.clone(),
            pool_size: config.mq.pool_size,
        })
        .await
        .context("Failed to initialize MQ")?,
    );

    info!(
        queue_name = %config.mq.evaluation_queue_name,
        max_retries = config.mq.retry.max_retries,
        "MQ connected"
    );

    let retry_config = config.mq.retry.clone();
    let retry_tracker = Arc::new(Mutex::new(RetryTracker::new(retry_config.max_retries)));

    // TODO: Store handle for graceful shutdown. Currently the task runs until process exit.
    let _cleanup_handle = spawn_cleanup_task(
        retry_tracker.clone(),
        Duration::from_secs(retry_config.cleanup_interval_secs),
        Duration::from_secs(retry_config.max_age_secs),
    );

    let launcher: Arc<dyn ProcessLauncher> = Arc::new(NativeLauncher);
    let worker_config = config.worker.clone();

    let result = mq
        .process_messages(
            &config.mq.evaluation_queue_name,
            Some(config.worker.batch_size), // concurrent evaluations
            None,
            move |message: BrokerMessage<EvaluationJob>| {
                let db = db.clone();
                let launcher = Arc::clone(&launcher);
                let worker_config = worker_config.clone();
                let retry_config = retry_config.clone();
                let retry_tracker = Arc::clone(&retry_tracker);
                async move {
                    process_message(
                        message,
                        &db,
                        launcher.as_ref(),
                        &worker_config,
                        &retry_config,
                        &retry_tracker,
                    )
                    .await
                }
            },
        )
        .await;

    if let Err(e) = result {
        error!(error = %e, "Worker stopped unexpectedly");
    }

    Ok(())
}

/// Run one evaluation job with in-process retry/backoff.
///
/// Transient failures retry until the budget runs out; after that the
/// Result stays pending and the operator backlog sweep is the recovery
/// path. Configuration errors are logged and dropped immediately.
async fn process_message(
    message: BrokerMessage<EvaluationJob>,
    db: &DatabaseConnection,
    launcher: &dyn ProcessLauncher,
    worker_config: &config::WorkerConfig,
    retry_config: &common::config::RetryAppConfig,
    retry_tracker: &Arc<Mutex<RetryTracker>>,
) -> Result<(), BroccoliError> {
    let job = message.payload;
    let job_id = job.job_id.clone();
    let result_id = job.result_id;

    let mut cleanup_guard = RetryCleanupGuard::new(retry_tracker, &job_id);

    loop {
        match handle_evaluation_job(db, launcher, worker_config, &job).await {
            Ok(()) => {
                retry_tracker.lock().await.clear(&job_id);
                cleanup_guard.defuse();
                return Ok(());
            }
            Err(e) if !e.is_transient() => {
                error!(
                    result_id,
                    job_id = %job_id,
                    error = %e,
                    "Evaluation failed on bad configuration, dropping job"
                );
                cleanup_guard.defuse();
                return Ok(());
            }
            Err(e) => {
                let decision = retry_tracker.lock().await.record_failure(&job_id);

                match decision {
                    RetryDecision::Retry { attempt } => {
                        let delay = calculate_backoff(
                            attempt,
                            retry_config.base_delay_ms,
                            retry_config.max_delay_ms,
                        );
                        warn!(
                            result_id,
                            job_id = %job_id,
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            error = %e,
                            "Retrying evaluation"
                        );
                        tokio::time::sleep(delay).await;
                    }
                    RetryDecision::Exhausted { attempts } => {
                        // The Result stays pending; the dispatch-pending
                        // sweep re-enqueues it later.
                        error!(
                            result_id,
                            job_id = %job_id,
                            attempts,
                            error = %e,
                            "Max retries exhausted, leaving result pending"
                        );
                        cleanup_guard.defuse();
                        return Ok(());
                    }
                }
            }
        }
    }
}
