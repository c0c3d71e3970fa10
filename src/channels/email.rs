use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;

use crate::config::{DispatchConfig, JobQueueConfig};
use crate::directory::Recipient;
use crate::dispatch::NotificationRequest;
use crate::jobs::{EmailJob, JobPayload, JobQueue, NewJob};
use crate::preference::NotificationChannel;

use super::{ChannelAdapter, ChannelDelivery, DispatchResult};

const NO_EMAIL_REASON: &str = "No email address available";

/// Hands a single email job covering every addressable recipient to the
/// job queue.
pub struct EmailChannelAdapter {
    queue: Arc<dyn JobQueue>,
    job_type: String,
    max_retries: i32,
    redirect_to: Option<String>,
}

impl EmailChannelAdapter {
    pub fn new(queue: Arc<dyn JobQueue>, jobs: &JobQueueConfig, dispatch: &DispatchConfig) -> Self {
        Self {
            queue,
            job_type: jobs.email_job_type.clone(),
            max_retries: jobs.default_max_retries,
            redirect_to: dispatch
                .override_email
                .clone()
                .filter(|email| !email.trim().is_empty()),
        }
    }

    /// Split recipients into those covered by the job and those skipped, and
    /// collect the unique target addresses.
    fn targets<'a>(
        &self,
        recipients: &'a [Recipient],
        request: &NotificationRequest,
    ) -> (Vec<String>, Vec<&'a Recipient>, Vec<&'a Recipient>) {
        let explicit = self
            .redirect_to
            .as_ref()
            .map(|email| vec![email.clone()])
            .or_else(|| {
                request
                    .channel_overrides
                    .email
                    .as_ref()
                    .and_then(|o| o.to.clone())
                    .filter(|to| !to.is_empty())
            });

        if let Some(to) = explicit {
            return (dedup(to), recipients.iter().collect(), Vec::new());
        }

        let (covered, skipped): (Vec<&Recipient>, Vec<&Recipient>) = recipients
            .iter()
            .partition(|r| r.email_address().is_some());
        let to = dedup(
            covered
                .iter()
                .filter_map(|r| r.email_address())
                .map(str::to_string),
        );

        (to, covered, skipped)
    }

    fn build_job(&self, to: Vec<String>, request: &NotificationRequest) -> NewJob {
        let overrides = request.channel_overrides.email.clone().unwrap_or_default();

        let mut metadata = serde_json::Map::new();
        metadata.insert("category".to_string(), request.category.as_str().into());
        if let Some(event_type) = &request.event_type {
            metadata.insert("eventType".to_string(), event_type.as_str().into());
        }
        metadata.extend(request.metadata.to_json_map());
        metadata.extend(overrides.metadata);

        NewJob {
            job_type: request
                .job_options
                .job_type
                .clone()
                .unwrap_or_else(|| self.job_type.clone()),
            payload: JobPayload::Email(EmailJob {
                to,
                cc: overrides.cc,
                subject: overrides.subject.unwrap_or_else(|| request.title.clone()),
                body: overrides.body.unwrap_or_else(|| request.message.clone()),
                metadata,
            }),
            priority: request.job_options.priority.unwrap_or(0),
            max_retries: request.job_options.max_retries.unwrap_or(self.max_retries),
        }
    }
}

fn dedup(emails: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut seen = HashSet::new();
    emails
        .into_iter()
        .filter(|email| seen.insert(email.clone()))
        .collect()
}

#[async_trait]
impl ChannelAdapter for EmailChannelAdapter {
    fn channel(&self) -> NotificationChannel {
        NotificationChannel::Email
    }

    async fn deliver(&self, delivery: ChannelDelivery<'_>) -> Vec<DispatchResult> {
        if delivery.recipients.is_empty() {
            return Vec::new();
        }

        let (to, covered, skipped) = self.targets(delivery.recipients, delivery.request);

        let mut results: Vec<DispatchResult> = skipped
            .iter()
            .map(|r| DispatchResult::skipped(&r.user_id, delivery.channel, NO_EMAIL_REASON))
            .collect();

        if to.is_empty() {
            return results;
        }

        let job = self.build_job(to, delivery.request);
        let job_type = job.job_type.clone();

        match self.queue.create_job(job).await {
            Ok(job_id) => {
                tracing::debug!(
                    job_id = %job_id,
                    job_type = %job_type,
                    recipients = covered.len(),
                    "Email job scheduled"
                );
                let job_id = job_id.to_string();
                results.extend(
                    covered
                        .iter()
                        .map(|r| DispatchResult::scheduled(&r.user_id, delivery.channel, &job_id)),
                );
            }
            Err(e) => {
                tracing::warn!(job_type = %job_type, error = %e, "Failed to enqueue email job");
                let reason = e.to_string();
                results.extend(
                    covered
                        .iter()
                        .map(|r| DispatchResult::failed(&r.user_id, delivery.channel, &reason)),
                );
            }
        }

        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channels::DispatchStatus;
    use crate::dispatch::{EmailOverride, JobOptions};
    use crate::jobs::MemoryJobQueue;
    use crate::notification::NotificationMetadata;
    use crate::preference::NotificationCategory;

    fn adapter(queue: Arc<MemoryJobQueue>, dispatch: DispatchConfig) -> EmailChannelAdapter {
        EmailChannelAdapter::new(queue, &JobQueueConfig::default(), &dispatch)
    }

    fn request() -> NotificationRequest {
        NotificationRequest::builder(NotificationCategory::Projects, "Kickoff", "Monday 9am")
            .event_type("project.kickoff")
            .build()
    }

    fn email_of(job: &NewJob) -> &EmailJob {
        match &job.payload {
            JobPayload::Email(email) => email,
            other => panic!("unexpected payload {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_single_job_for_addressable_recipients() {
        let queue = Arc::new(MemoryJobQueue::new());
        let adapter = adapter(queue.clone(), DispatchConfig::default());
        let recipients = vec![
            Recipient::new("alice").with_email("alice@example.com"),
            Recipient::new("bob"),
            Recipient::new("carol").with_email("alice@example.com"),
        ];
        let request = request();

        let results = adapter
            .deliver(ChannelDelivery {
                channel: NotificationChannel::Email,
                recipients: &recipients,
                request: &request,
            })
            .await;

        assert_eq!(results.len(), 3);
        let bob = results.iter().find(|r| r.user_id == "bob").unwrap();
        assert_eq!(bob.status, DispatchStatus::Skipped);
        assert_eq!(bob.reason.as_deref(), Some(NO_EMAIL_REASON));

        let scheduled: Vec<_> = results
            .iter()
            .filter(|r| r.status == DispatchStatus::Scheduled)
            .collect();
        assert_eq!(scheduled.len(), 2);
        assert_eq!(scheduled[0].job_id, scheduled[1].job_id);

        let jobs = queue.jobs();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].job.job_type, "email-notification");
        assert_eq!(jobs[0].job.priority, 0);
        assert_eq!(jobs[0].job.max_retries, 3);
        let email = email_of(&jobs[0].job);
        assert_eq!(email.to, vec!["alice@example.com".to_string()]);
        assert_eq!(email.subject, "Kickoff");
        assert_eq!(email.metadata["category"], "projects");
        assert_eq!(email.metadata["eventType"], "project.kickoff");
    }

    #[tokio::test]
    async fn test_override_and_job_options() {
        let queue = Arc::new(MemoryJobQueue::new());
        let adapter = adapter(queue.clone(), DispatchConfig::default());
        let recipients = vec![Recipient::new("bob")];
        let request = NotificationRequest::builder(NotificationCategory::System, "Report", "Body")
            .metadata(NotificationMetadata::default().with_hint("template", "weekly".into()))
            .email(EmailOverride {
                to: Some(vec!["ops@example.com".to_string()]),
                subject: Some("Weekly report".to_string()),
                ..Default::default()
            })
            .job_options(JobOptions {
                priority: Some(5),
                max_retries: Some(1),
                job_type: Some("digest-email".to_string()),
            })
            .build();

        let results = adapter
            .deliver(ChannelDelivery {
                channel: NotificationChannel::Email,
                recipients: &recipients,
                request: &request,
            })
            .await;

        assert_eq!(results[0].status, DispatchStatus::Scheduled);
        let job = &queue.jobs()[0].job;
        assert_eq!(job.job_type, "digest-email");
        assert_eq!(job.priority, 5);
        assert_eq!(job.max_retries, 1);
        let email = email_of(job);
        assert_eq!(email.to, vec!["ops@example.com".to_string()]);
        assert_eq!(email.subject, "Weekly report");
        assert_eq!(email.body, "Body");
        assert_eq!(email.metadata["hints"]["template"], "weekly");
    }

    #[tokio::test]
    async fn test_redirect_replaces_recipients() {
        let queue = Arc::new(MemoryJobQueue::new());
        let adapter = adapter(
            queue.clone(),
            DispatchConfig {
                override_email: Some("dev@example.com".to_string()),
                override_phone: None,
            },
        );
        let recipients = vec![Recipient::new("alice").with_email("alice@example.com")];
        let request = request();

        adapter
            .deliver(ChannelDelivery {
                channel: NotificationChannel::Email,
                recipients: &recipients,
                request: &request,
            })
            .await;

        let email = email_of(&queue.jobs()[0].job).clone();
        assert_eq!(email.to, vec!["dev@example.com".to_string()]);
    }

    #[tokio::test]
    async fn test_enqueue_failure_marks_failed() {
        let queue = Arc::new(MemoryJobQueue::new());
        queue.set_accepting(false);
        let adapter = adapter(queue.clone(), DispatchConfig::default());
        let recipients = vec![Recipient::new("alice").with_email("alice@example.com")];
        let request = request();

        let results = adapter
            .deliver(ChannelDelivery {
                channel: NotificationChannel::Email,
                recipients: &recipients,
                request: &request,
            })
            .await;

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].status, DispatchStatus::Failed);
    }

    #[tokio::test]
    async fn test_no_recipients_no_job() {
        let queue = Arc::new(MemoryJobQueue::new());
        let adapter = adapter(queue.clone(), DispatchConfig::default());
        let request = request();

        let results = adapter
            .deliver(ChannelDelivery {
                channel: NotificationChannel::Email,
                recipients: &[],
                request: &request,
            })
            .await;

        assert!(results.is_empty());
        assert!(queue.is_empty());
    }
}
