use async_trait::async_trait;
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

use crate::metrics::DispatchMetrics;

use super::{JobQueue, JobQueueError, NewJob};

/// Writes jobs to the `jobs` table for external workers to pick up.
pub struct PostgresJobQueue {
    pool: PgPool,
}

impl PostgresJobQueue {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobQueue for PostgresJobQueue {
    async fn create_job(&self, job: NewJob) -> Result<Uuid, JobQueueError> {
        let id = Uuid::new_v4();

        sqlx::query(
            r#"
            INSERT INTO jobs (id, type, priority, payload, status, retry_count, max_retries)
            VALUES ($1, $2, $3, $4, 'pending', 0, $5)
            "#,
        )
        .bind(id)
        .bind(&job.job_type)
        .bind(job.priority)
        .bind(Json(&job.payload))
        .bind(job.max_retries)
        .execute(&self.pool)
        .await?;

        DispatchMetrics::record_job(&job.job_type);
        tracing::debug!(
            job_id = %id,
            job_type = %job.job_type,
            priority = job.priority,
            "Job enqueued in PostgreSQL"
        );

        Ok(id)
    }

    fn backend_name(&self) -> &'static str {
        "postgres"
    }
}
