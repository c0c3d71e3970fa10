use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use uuid::Uuid;

use crate::metrics::DispatchMetrics;

use super::{JobQueue, JobQueueError, NewJob};

#[derive(Debug, Clone, PartialEq)]
pub struct QueuedJob {
    pub id: Uuid,
    pub job: NewJob,
    pub enqueued_at: DateTime<Utc>,
}

/// In-memory job queue. Jobs are only recorded, never executed.
pub struct MemoryJobQueue {
    jobs: DashMap<Uuid, QueuedJob>,
    accepting: AtomicBool,
}

impl Default for MemoryJobQueue {
    fn default() -> Self {
        Self {
            jobs: DashMap::new(),
            accepting: AtomicBool::new(true),
        }
    }
}

impl MemoryJobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Toggle whether `create_job` succeeds.
    pub fn set_accepting(&self, accepting: bool) {
        self.accepting.store(accepting, Ordering::SeqCst);
    }

    /// Recorded jobs in enqueue order.
    pub fn jobs(&self) -> Vec<QueuedJob> {
        let mut jobs: Vec<QueuedJob> = self.jobs.iter().map(|j| j.value().clone()).collect();
        jobs.sort_by_key(|j| j.enqueued_at);
        jobs
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

#[async_trait]
impl JobQueue for MemoryJobQueue {
    async fn create_job(&self, job: NewJob) -> Result<Uuid, JobQueueError> {
        if !self.accepting.load(Ordering::SeqCst) {
            return Err(JobQueueError::Unavailable(
                "memory job queue is not accepting jobs".to_string(),
            ));
        }

        let id = Uuid::new_v4();
        let job_type = job.job_type.clone();
        self.jobs.insert(
            id,
            QueuedJob {
                id,
                job,
                enqueued_at: Utc::now(),
            },
        );

        DispatchMetrics::record_job(&job_type);
        tracing::debug!(job_id = %id, job_type = %job_type, "Job enqueued in memory");

        Ok(id)
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::{JobPayload, WhatsAppJob};

    fn job() -> NewJob {
        NewJob {
            job_type: "send-notification".to_string(),
            payload: JobPayload::WhatsApp(WhatsAppJob {
                phone_number: "+62811".to_string(),
                message: "hi".to_string(),
                metadata: serde_json::Map::new(),
            }),
            priority: 0,
            max_retries: 3,
        }
    }

    #[tokio::test]
    async fn test_create_and_inspect() {
        let queue = MemoryJobQueue::new();
        let id = tokio_test::assert_ok!(queue.create_job(job()).await);

        let jobs = queue.jobs();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].id, id);
        assert_eq!(jobs[0].job.max_retries, 3);
    }

    #[tokio::test]
    async fn test_rejects_when_not_accepting() {
        let queue = MemoryJobQueue::new();
        queue.set_accepting(false);

        let err = tokio_test::assert_err!(queue.create_job(job()).await);
        assert!(matches!(err, JobQueueError::Unavailable(_)));
        assert!(queue.is_empty());
    }
}
