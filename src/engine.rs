use std::sync::Arc;

use crate::channels::{
    AdapterRegistry, EmailChannelAdapter, InAppChannelAdapter, WhatsAppChannelAdapter,
};
use crate::config::Settings;
use crate::directory::{create_user_directory, UserDirectory};
use crate::dispatch::UnifiedNotificationService;
use crate::error::Result;
use crate::events::{Actioned, Errors, NotificationEventHub, Read, Subscription};
use crate::jobs::{create_job_queue, JobQueue};
use crate::notification::{create_notification_store, NotificationOrchestrator, NotificationStore};
use crate::postgres::PostgresPool;
use crate::preference::{create_preference_store, PreferenceService, PreferenceStore};

/// Storage collaborators the engine is assembled from.
pub struct EngineParts {
    pub notifications: Arc<dyn NotificationStore>,
    pub preferences: Arc<dyn PreferenceStore>,
    pub directory: Arc<dyn UserDirectory>,
    pub jobs: Arc<dyn JobQueue>,
}

/// Composition root wiring stores, the event hub and the services.
#[derive(Clone)]
pub struct NotificationEngine {
    pub settings: Arc<Settings>,
    pub events: NotificationEventHub,
    pub preferences: PreferenceService,
    pub orchestrator: Arc<NotificationOrchestrator>,
    pub directory: Arc<dyn UserDirectory>,
    pub jobs: Arc<dyn JobQueue>,
    pub dispatcher: Arc<UnifiedNotificationService>,
}

impl NotificationEngine {
    /// Build every component from settings. Postgres-backed stores are used
    /// only when `pool` is given.
    pub fn new(settings: Settings, pool: Option<&PostgresPool>) -> Self {
        let parts = EngineParts {
            notifications: create_notification_store(&settings.storage, pool),
            preferences: create_preference_store(&settings.storage, pool),
            directory: create_user_directory(&settings.storage, pool),
            jobs: create_job_queue(&settings.jobs, pool),
        };

        Self::from_parts(settings, parts)
    }

    pub fn from_parts(settings: Settings, parts: EngineParts) -> Self {
        let events = NotificationEventHub::new();
        let preferences = PreferenceService::new(parts.preferences);
        let orchestrator = Arc::new(NotificationOrchestrator::new(
            parts.notifications,
            events.clone(),
        ));

        let adapters = AdapterRegistry::new()
            .with(Arc::new(InAppChannelAdapter::new(orchestrator.clone())))
            .with(Arc::new(EmailChannelAdapter::new(
                parts.jobs.clone(),
                &settings.jobs,
                &settings.dispatch,
            )))
            .with(Arc::new(WhatsAppChannelAdapter::new(
                parts.jobs.clone(),
                &settings.jobs,
                &settings.dispatch,
            )));

        let dispatcher = Arc::new(UnifiedNotificationService::new(
            preferences.clone(),
            parts.directory.clone(),
            adapters,
        ));

        tracing::info!(
            notification_store = orchestrator.store().backend_name(),
            preference_store = preferences.store().backend_name(),
            directory = parts.directory.backend_name(),
            job_queue = parts.jobs.backend_name(),
            "Notification engine assembled"
        );

        Self {
            settings: Arc::new(settings),
            events,
            preferences,
            orchestrator,
            directory: parts.directory,
            jobs: parts.jobs,
            dispatcher,
        }
    }

    /// Seed default preferences for every user known to the directory.
    pub async fn backfill_default_preferences(&self) -> Result<usize> {
        let user_ids = self.directory.list_user_ids().await?;
        self.preferences.backfill_defaults(user_ids).await
    }

    /// Log `read`, `actioned` and listener faults. Dropping the returned
    /// subscriptions does not detach them; call `unsubscribe`.
    pub fn attach_logging_relay(&self) -> Vec<Subscription> {
        vec![
            self.events.on::<Read, _>(|event| {
                tracing::info!(
                    user_id = %event.user_id,
                    count = event.ids.len(),
                    status = %event.status,
                    "Notifications marked"
                );
                Ok(())
            }),
            self.events.on::<Actioned, _>(|log| {
                tracing::info!(
                    notification_id = %log.notification_id,
                    action_key = %log.action_key,
                    acted_by = %log.acted_by,
                    "Notification actioned"
                );
                Ok(())
            }),
            self.events.on::<Errors, _>(|fault| {
                tracing::error!(
                    topic = fault.topic,
                    listener_id = fault.listener_id,
                    error = %fault.message,
                    "Event listener failed"
                );
                Ok(())
            }),
        ]
    }
}
