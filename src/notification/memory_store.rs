//! In-memory notification store.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::StoreError;

use super::store::NotificationStore;
use super::types::{
    ListQuery, MarkOutcome, Notification, NotificationActionLog, NotificationStatus,
};

/// Notifications with their actions and logs embedded.
///
/// A single lock covers the whole map so that bulk marks and action logging
/// are all-or-nothing.
#[derive(Default)]
pub struct MemoryNotificationStore {
    notifications: RwLock<HashMap<Uuid, Notification>>,
}

impl MemoryNotificationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of stored notifications.
    pub async fn len(&self) -> usize {
        self.notifications.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.notifications.read().await.is_empty()
    }
}

#[async_trait]
impl NotificationStore for MemoryNotificationStore {
    async fn insert_notification(
        &self,
        notification: Notification,
    ) -> Result<Notification, StoreError> {
        let mut notifications = self.notifications.write().await;

        if notifications.contains_key(&notification.id) {
            return Err(StoreError::Duplicate(format!(
                "notification {}",
                notification.id
            )));
        }

        notifications.insert(notification.id, notification.clone());
        Ok(notification)
    }

    async fn get_notification(&self, id: Uuid) -> Result<Option<Notification>, StoreError> {
        Ok(self.notifications.read().await.get(&id).cloned())
    }

    async fn list_notifications(
        &self,
        query: &ListQuery,
    ) -> Result<Vec<Notification>, StoreError> {
        let notifications = self.notifications.read().await;

        let mut items: Vec<Notification> = notifications
            .values()
            .filter(|n| query.matches(n))
            .cloned()
            .collect();

        items.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        items.truncate(query.limit as usize);

        Ok(items)
    }

    async fn mark_notifications(
        &self,
        user_id: &str,
        ids: &[Uuid],
        status: NotificationStatus,
        at: DateTime<Utc>,
    ) -> Result<MarkOutcome, StoreError> {
        let mut notifications = self.notifications.write().await;

        let matched = ids
            .iter()
            .filter(|id| {
                notifications
                    .get(id)
                    .map_or(false, |n| n.user_id == user_id)
            })
            .count();

        if matched < ids.len() {
            return Ok(MarkOutcome::Rejected { matched });
        }

        for id in ids {
            if let Some(notification) = notifications.get_mut(id) {
                notification.status = status;
                notification.read_at = match status {
                    NotificationStatus::Read => Some(at),
                    NotificationStatus::Unread => None,
                };
            }
        }

        Ok(MarkOutcome::Applied(matched))
    }

    async fn record_action(
        &self,
        log: NotificationActionLog,
    ) -> Result<Option<NotificationActionLog>, StoreError> {
        let mut notifications = self.notifications.write().await;

        let Some(notification) = notifications.get_mut(&log.notification_id) else {
            return Err(StoreError::Unavailable(format!(
                "notification {} disappeared while recording action",
                log.notification_id
            )));
        };

        if !notification.action_logs.is_empty() {
            return Ok(None);
        }

        notification.status = NotificationStatus::Read;
        notification.read_at = Some(log.acted_at);
        notification.action_logs.push(log.clone());

        Ok(Some(log))
    }

    async fn count_unread(&self, user_id: &str) -> Result<u64, StoreError> {
        let notifications = self.notifications.read().await;
        Ok(notifications
            .values()
            .filter(|n| n.user_id == user_id && n.status == NotificationStatus::Unread)
            .count() as u64)
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
