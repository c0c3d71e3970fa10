//! Hand-off of email and WhatsApp deliveries to an external job system.
//!
//! The engine only enqueues; workers that send and retry live elsewhere.

mod memory;
mod postgres;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::config::JobQueueConfig;
use crate::postgres::PostgresPool;

pub use memory::{MemoryJobQueue, QueuedJob};
pub use postgres::PostgresJobQueue;

#[derive(Debug, Error)]
pub enum JobQueueError {
    /// PostgreSQL operation failed
    #[error("PostgreSQL error: {0}")]
    Postgres(#[from] sqlx::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Queue is not accepting jobs
    #[error("Job queue unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailJob {
    pub to: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cc: Vec<String>,
    pub subject: String,
    pub body: String,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WhatsAppJob {
    pub phone_number: String,
    pub message: String,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

/// Job payload, serialized as `{"email": {...}}` or `{"whatsapp": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum JobPayload {
    #[serde(rename = "email")]
    Email(EmailJob),
    #[serde(rename = "whatsapp")]
    WhatsApp(WhatsAppJob),
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewJob {
    pub job_type: String,
    pub payload: JobPayload,
    pub priority: i32,
    pub max_retries: i32,
}

#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Enqueue a job and return its id.
    async fn create_job(&self, job: NewJob) -> Result<Uuid, JobQueueError>;

    fn backend_name(&self) -> &'static str;
}

/// Create a job queue based on configuration.
///
/// Returns a `PostgresJobQueue` for `"postgres"` when a pool is provided and a
/// `MemoryJobQueue` otherwise.
pub fn create_job_queue(
    settings: &JobQueueConfig,
    postgres_pool: Option<&PostgresPool>,
) -> Arc<dyn JobQueue> {
    match settings.backend.as_str() {
        "postgres" => {
            if let Some(pool) = postgres_pool {
                tracing::info!(backend = "postgres", "Creating PostgreSQL job queue");
                Arc::new(PostgresJobQueue::new(pool.pool().clone()))
            } else {
                tracing::warn!(
                    "PostgreSQL job queue requested but no pool provided, falling back to memory"
                );
                Arc::new(MemoryJobQueue::new())
            }
        }
        _ => {
            tracing::info!(backend = "memory", "Creating in-memory job queue");
            Arc::new(MemoryJobQueue::new())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_shape() {
        let payload = JobPayload::WhatsApp(WhatsAppJob {
            phone_number: "+6281234".to_string(),
            message: "hello".to_string(),
            metadata: serde_json::Map::new(),
        });

        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["whatsapp"]["phoneNumber"], "+6281234");

        let email = JobPayload::Email(EmailJob {
            to: vec!["a@example.com".to_string()],
            cc: Vec::new(),
            subject: "s".to_string(),
            body: "b".to_string(),
            metadata: serde_json::Map::new(),
        });
        let json = serde_json::to_value(&email).unwrap();
        assert!(json["email"].get("cc").is_none());
    }

    #[test]
    fn test_factory_defaults_to_memory() {
        let queue = create_job_queue(&JobQueueConfig::default(), None);
        assert_eq!(queue.backend_name(), "memory");
    }
}
