use std::sync::Arc;

use async_trait::async_trait;

use crate::dispatch::NotificationRequest;
use crate::notification::{NewNotification, NotificationOrchestrator, NotificationType};
use crate::preference::NotificationChannel;

use super::{ChannelAdapter, ChannelDelivery, DispatchResult};

/// Writes one in-app notification per recipient through the orchestrator,
/// which persists it and emits `created`.
pub struct InAppChannelAdapter {
    orchestrator: Arc<NotificationOrchestrator>,
}

impl InAppChannelAdapter {
    pub fn new(orchestrator: Arc<NotificationOrchestrator>) -> Self {
        Self { orchestrator }
    }

    /// Notification template for `user_id`, with the in-app override applied.
    fn build(&self, user_id: &str, request: &NotificationRequest) -> NewNotification {
        let overrides = request.channel_overrides.in_app.as_ref();

        let mut metadata = request.metadata.clone();
        if metadata.event_type.is_none() {
            metadata.event_type = request.event_type.clone();
        }
        if let Some(priority) = request.priority {
            metadata.priority = Some(priority);
        }

        let notification_type = overrides
            .and_then(|o| o.notification_type)
            .or(request.notification_type)
            .unwrap_or(NotificationType::Informational);

        let mut notification = NewNotification::new(
            user_id,
            notification_type,
            overrides
                .and_then(|o| o.title.clone())
                .unwrap_or_else(|| request.title.clone()),
            overrides
                .and_then(|o| o.message.clone())
                .unwrap_or_else(|| request.message.clone()),
        )
        .category(
            overrides
                .and_then(|o| o.category.clone())
                .unwrap_or_else(|| request.category.clone()),
        );

        if let Some(overrides) = overrides {
            if let Some(extra) = overrides.metadata.clone() {
                metadata = metadata.merge(extra);
            }
            if let Some(priority) = overrides.priority {
                metadata.priority = Some(priority);
            }
            if let Some(expires_at) = overrides.expires_at {
                notification = notification.expires_at(expires_at);
            }
            for action in &overrides.actions {
                notification = notification.action(action.clone());
            }
        }

        notification.metadata(metadata)
    }
}

#[async_trait]
impl ChannelAdapter for InAppChannelAdapter {
    fn channel(&self) -> NotificationChannel {
        NotificationChannel::InApp
    }

    async fn deliver(&self, delivery: ChannelDelivery<'_>) -> Vec<DispatchResult> {
        let mut results = Vec::with_capacity(delivery.recipients.len());

        for recipient in delivery.recipients {
            let input = self.build(&recipient.user_id, delivery.request);

            match self.orchestrator.create_notification(input).await {
                Ok(notification) => {
                    tracing::debug!(
                        user_id = %recipient.user_id,
                        notification_id = %notification.id,
                        "In-app notification created"
                    );
                    results.push(DispatchResult::sent(&recipient.user_id, delivery.channel));
                }
                Err(e) => {
                    tracing::warn!(
                        user_id = %recipient.user_id,
                        error = %e,
                        "In-app notification failed"
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channels::DispatchStatus;
    use crate::directory::Recipient;
    use crate::dispatch::InAppOverride;
    use crate::events::NotificationEventHub;
    use crate::notification::{
        ListParams, MemoryNotificationStore, NewAction, NotificationMetadata, Priority,
    };
    use crate::preference::NotificationCategory;

    fn adapter() -> (InAppChannelAdapter, Arc<NotificationOrchestrator>) {
        let orchestrator = Arc::new(NotificationOrchestrator::new(
            Arc::new(MemoryNotificationStore::new()),
            NotificationEventHub::new(),
        ));
        (InAppChannelAdapter::new(orchestrator.clone()), orchestrator)
    }

    #[tokio::test]
    async fn test_creates_one_notification_per_recipient() {
        let (adapter, orchestrator) = adapter();
        let request = NotificationRequest::builder(NotificationCategory::Leads, "New lead", "Acme")
            .event_type("lead.created")
            .priority(Priority::High)
            .build();
        let recipients = vec![Recipient::new("alice"), Recipient::new("bob")];

        let results = adapter
            .deliver(ChannelDelivery {
                channel: NotificationChannel::InApp,
                recipients: &recipients,
                request: &request,
            })
            .await;

        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.status == DispatchStatus::Sent));

        let page = orchestrator
            .list_notifications(ListParams::for_user("alice"))
            .await
            .unwrap();
        assert_eq!(page.items.len(), 1);
        let stored = &page.items[0];
        assert_eq!(stored.category, NotificationCategory::Leads);
        assert_eq!(stored.metadata.event_type.as_deref(), Some("lead.created"));
        assert_eq!(stored.metadata.priority, Some(Priority::High));
    }

    #[tokio::test]
    async fn test_in_app_override_applies() {
        let (adapter, orchestrator) = adapter();
        let request = NotificationRequest::builder(NotificationCategory::System, "Generic", "Body")
            .priority(Priority::Low)
            .in_app(InAppOverride {
                title: Some("Approve budget".to_string()),
                notification_type: Some(NotificationType::Approval),
                actions: vec![NewAction::new("approve", "Approve")],
                priority: Some(Priority::High),
                metadata: Some(NotificationMetadata::default().with_hint("icon", "wallet".into())),
                ..Default::default()
            })
            .build();
        let recipients = vec![Recipient::new("alice")];

        adapter
            .deliver(ChannelDelivery {
                channel: NotificationChannel::InApp,
                recipients: &recipients,
                request: &request,
            })
            .await;

        let page = orchestrator
            .list_notifications(ListParams::for_user("alice"))
            .await
            .unwrap();
        let stored = &page.items[0];
        assert_eq!(stored.title, "Approve budget");
        assert_eq!(stored.message, "Body");
        assert_eq!(stored.notification_type, NotificationType::Approval);
        assert_eq!(stored.actions.len(), 1);
        assert_eq!(stored.metadata.priority, Some(Priority::High));
        assert_eq!(stored.metadata.hints["icon"], "wallet");
    }

    #[tokio::test]
    async fn test_invalid_notification_reports_failed() {
        let (adapter, _) = adapter();
        let request = NotificationRequest::builder(NotificationCategory::General, "", "Body").build();
        let recipients = vec![Recipient::new("alice")];

        let results = adapter
            .deliver(ChannelDelivery {
                channel: NotificationChannel::InApp,
                recipients: &recipients,
                request: &request,
            })
            .await;

        assert_eq!(results[0].status, DispatchStatus::Failed);
        assert!(results[0].reason.is_some());
    }
}
