use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;

#[derive(Debug, Clone, Deserialize, Default)]
pub struct Settings {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub jobs: JobQueueConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub otel: OtelConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL; storage falls back to memory when absent
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_seconds: u32,
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_seconds: u32,
    /// Apply the bundled SQL migrations at startup
    #[serde(default)]
    pub run_migrations: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// "memory" or "postgres"
    #[serde(default = "default_backend")]
    pub backend: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JobQueueConfig {
    /// "memory" or "postgres"
    #[serde(default = "default_backend")]
    pub backend: String,
    #[serde(default = "default_email_job_type")]
    pub email_job_type: String,
    #[serde(default = "default_whatsapp_job_type")]
    pub whatsapp_job_type: String,
    #[serde(default = "default_max_retries")]
    pub default_max_retries: i32,
}

/// Development-time redirection of outbound email/WhatsApp recipients.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct DispatchConfig {
    #[serde(default)]
    pub override_email: Option<String>,
    #[serde(default)]
    pub override_phone: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub format: LogFormat,
    /// Filter directive used when `RUST_LOG` is unset
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OtelConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_otel_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_service_name")]
    pub service_name: String,
    #[serde(default = "default_sampling_ratio")]
    pub sampling_ratio: f64,
}

fn default_pool_size() -> u32 {
    10
}

fn default_connect_timeout() -> u32 {
    5
}

fn default_idle_timeout() -> u32 {
    600 // 10 minutes
}

fn default_backend() -> String {
    "memory".to_string()
}

fn default_email_job_type() -> String {
    "email-notification".to_string()
}

fn default_whatsapp_job_type() -> String {
    "send-notification".to_string()
}

fn default_max_retries() -> i32 {
    3
}

fn default_log_filter() -> String {
    "info".to_string()
}

fn default_otel_endpoint() -> String {
    "http://localhost:4317".to_string()
}

fn default_service_name() -> String {
    "notification-engine".to_string()
}

fn default_sampling_ratio() -> f64 {
    1.0
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        // Load .env file if exists
        let _ = dotenvy::dotenv();

        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let builder = Config::builder()
            .set_default("storage.backend", "memory")?
            .set_default("jobs.backend", "memory")?
            .set_default("database.pool_size", 10)?
            .set_default("otel.enabled", false)?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // NOTIF_STORAGE__BACKEND, NOTIF_DISPATCH__OVERRIDE_EMAIL, NOTIF_LOGGING__FORMAT, ...
            .add_source(
                Environment::with_prefix("NOTIF")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .set_override_option("database.url", env::var("DATABASE_URL").ok())?;

        builder.build()?.try_deserialize()
    }

    pub fn uses_postgres(&self) -> bool {
        self.storage.backend == "postgres" || self.jobs.backend == "postgres"
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            pool_size: default_pool_size(),
            connect_timeout_seconds: default_connect_timeout(),
            idle_timeout_seconds: default_idle_timeout(),
            run_migrations: false,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
        }
    }
}

impl Default for JobQueueConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            email_job_type: default_email_job_type(),
            whatsapp_job_type: default_whatsapp_job_type(),
            default_max_retries: default_max_retries(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::default(),
            filter: default_log_filter(),
        }
    }
}

impl Default for OtelConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: default_otel_endpoint(),
            service_name: default_service_name(),
            sampling_ratio: default_sampling_ratio(),
        }
    }
}
