use serde::Deserialize;

/// App-level MQ configuration shared by the server and the worker.
#[derive(Debug, Deserialize, Clone)]
pub struct MqAppConfig {
    /// Redis connection URL. Default: "redis://localhost:6379".
    #[serde(default = "default_mq_url")]
    pub url: String,
    /// Connection pool size. Default: 5.
    #[serde(default = "default_mq_pool_size")]
    pub pool_size: u8,
    /// Queue name for dispatch jobs (decide what to run). Default: "dispatch".
    #[serde(default = "default_dispatch_queue_name")]
    pub dispatch_queue_name: String,
    /// Queue name for evaluation jobs (run it). Default: "evaluation".
    #[serde(default = "default_evaluation_queue_name")]
    pub evaluation_queue_name: String,
    #[serde(default)]
    pub retry: RetryAppConfig,
}

/// Retry/backoff settings for transient queue and persistence failures.
#[derive(Debug, Deserialize, Clone)]
pub struct RetryAppConfig {
    /// Attempts before a job is given up on. Default: 3.
    #[serde(default = "default_max_retries")]
    pub max_retries: u8,
    /// Base backoff delay in milliseconds. Default: 1000.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Backoff ceiling in milliseconds. Default: 30000.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Interval between stale tracker sweeps, in seconds. Default: 300.
    #[serde(default = "default_cleanup_interval_secs")]
    pub cleanup_interval_secs: u64,
    /// Age after which tracker entries are dropped, in seconds. Default: 3600.
    #[serde(default = "default_max_age_secs")]
    pub max_age_secs: u64,
}

fn default_mq_url() -> String {
    "redis://localhost:6379".into()
}
fn default_mq_pool_size() -> u8 {
    5
}
fn default_dispatch_queue_name() -> String {
    "dispatch".into()
}
fn default_evaluation_queue_name() -> String {
    "evaluation".into()
}
fn default_max_retries() -> u8 {
    3
}
fn default_base_delay_ms() -> u64 {
    1000
}
fn default_max_delay_ms() -> u64 {
    30000
}
fn default_cleanup_interval_secs() -> u64 {
    300
}
fn default_max_age_secs() -> u64 {
    3600
}

impl Default for MqAppConfig {
    fn default() -> Self {
        Self {
            url: default_mq_url(),
            pool_size: default_mq_pool_size(),
            dispatch_queue_name: default_dispatch_queue_name(),
            evaluation_queue_name: default_evaluation_queue_name(),
            retry: RetryAppConfig::default(),
        }
    }
}

impl Default for RetryAppConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            cleanup_interval_secs: default_cleanup_interval_secs(),
            max_age_secs: default_max_age_secs(),
        }
    }
}
