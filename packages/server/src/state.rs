use std::sync::Arc;

use mq::SchedulerQueues;
use sea_orm::DatabaseConnection;

use crate::config::AppConfig;
use crate::scheduler::Scheduler;

#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    pub queues: Arc<SchedulerQueues>,
    pub scheduler: Arc<Scheduler>,
    pub config: Arc<AppConfig>,
}
