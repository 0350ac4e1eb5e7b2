use std::sync::Arc;

use anyhow::Context;
use mq::{MqConfig, QueueRetryPolicy, SchedulerQueues, init_mq};
use server::config::AppConfig;
use server::consumers::dispatch::consume_dispatch_jobs;
use server::scheduler::Scheduler;
use server::state::AppState;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_target(false).init();

    let config = AppConfig::load().context("Failed to load config")?;

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
        dispatch_queue = %config.mq.dispatch_queue_name,
        evaluation_queue = %config.mq.evaluation_queue_name,
        "MQ connected"
    );

    let queues = Arc::new(SchedulerQueues::new(
        mq,
        config.mq.dispatch_queue_name.clone(),
        config.mq.evaluation_queue_name.clone(),
        QueueRetryPolicy {
            max_attempts: config.mq.retry.max_retries,
            base_delay_ms: config.mq.retry.base_delay_ms,
            max_delay_ms: config.mq.retry.max_delay_ms,
        },
    ));

    tokio::spawn(consume_dispatch_jobs(
        db.clone(),
        Arc::clone(&queues),
        config.grader.dispatch_concurrency,
    ));

    let scheduler = Arc::new(Scheduler::new(db.clone(), Arc::clone(&queues)));

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let state = AppState {
        db,
        queues,
        scheduler,
        config: Arc::new(config),
    };

    let app = server::build_router(state);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!(addr = %addr, "Server listening");

    axum::serve(listener, app).await.context("Server error")?;
    Ok(())
}
