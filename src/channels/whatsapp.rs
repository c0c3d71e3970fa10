use std::sync::Arc;

use async_trait::async_trait;

use crate::config::{DispatchConfig, JobQueueConfig};
use crate::dispatch::NotificationRequest;
use crate::jobs::{JobPayload, JobQueue, NewJob, WhatsAppJob};
use crate::preference::NotificationChannel;

use super::{ChannelAdapter, ChannelDelivery, DispatchResult};

const NO_PHONE_REASON: &str = "No phone number available";

/// Enqueues one WhatsApp job per recipient.
pub struct WhatsAppChannelAdapter {
    queue: Arc<dyn JobQueue>,
    job_type: String,
    max_retries: i32,
    redirect_to: Option<String>,
}

impl WhatsAppChannelAdapter {
    pub fn new(queue: Arc<dyn JobQueue>, jobs: &JobQueueConfig, dispatch: &DispatchConfig) -> Self {
        Self {
            queue,
            job_type: jobs.whatsapp_job_type.clone(),
            max_retries: jobs.default_max_retries,
            redirect_to: dispatch
                .override_phone
                .clone()
                .filter(|phone| !phone.trim().is_empty()),
        }
    }

    fn build_job(&self, phone_number: String, request: &NotificationRequest) -> NewJob {
        let overrides = request
            .channel_overrides
            .whatsapp
            .clone()
            .unwrap_or_default();

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
            payload: JobPayload::WhatsApp(WhatsAppJob {
                phone_number,
                message: overrides.message.unwrap_or_else(|| request.message.clone()),
                metadata,
            }),
            priority: request.job_options.priority.unwrap_or(0),
            max_retries: request.job_options.max_retries.unwrap_or(self.max_retries),
        }
    }
}

#[async_trait]
impl ChannelAdapter for WhatsAppChannelAdapter {
    fn channel(&self) -> NotificationChannel {
        NotificationChannel::WhatsApp
    }

    async fn deliver(&self, delivery: ChannelDelivery<'_>) -> Vec<DispatchResult> {
        let override_phone = delivery
            .request
            .channel_overrides
            .whatsapp
            .as_ref()
            .and_then(|o| o.phone_number.as_deref())
            .filter(|p| !p.trim().is_empty());

        let mut results = Vec::with_capacity(delivery.recipients.len());

        for recipient in delivery.recipients {
            let phone = self
                .redirect_to
                .as_deref()
                .or(override_phone)
                .or_else(|| recipient.phone());

            let Some(phone) = phone else {
                results.push(DispatchResult::skipped(
                    &recipient.user_id,
                    delivery.channel,
                    NO_PHONE_REASON,
                ));
                continue;
            };

            let job = self.build_job(phone.to_string(), delivery.request);

            match self.queue.create_job(job).await {
                Ok(job_id) => {
                    tracing::debug!(
                        user_id = %recipient.user_id,
                        job_id = %job_id,
                        "WhatsApp job scheduled"
                    );
                    results.push(DispatchResult::scheduled(
                        &recipient.user_id,
                        delivery.channel,
                        job_id.to_string(),
                    ));
                }
                Err(e) => {
                    tracing::warn!(
                        user_id = %recipient.user_id,
                        error = %e,
                        "Failed to enqueue WhatsApp job"
                    );
                    results.push(DispatchResult::failed(
                        &recipient.user_id,
                        delivery.channel,
                        e.to_string(),
                    ));
                }
            }
        }

        results
    }
}
