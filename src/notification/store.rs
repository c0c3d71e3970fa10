//! Storage abstraction for notifications, their actions and action logs.
//!
//! Multi-row writes are atomic in every implementation: a notification and
//! its actions persist together, a bulk mark applies to every requested row or
//! to none, and an action log is written together with the status change.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::StoreError;

use super::types::{
    ListQuery, MarkOutcome, Notification, NotificationActionLog, NotificationStatus,
};

#[async_trait]
pub trait NotificationStore: Send + Sync {
    /// Persist a notification together with its actions.
    async fn insert_notification(&self, notification: Notification)
        -> Result<Notification, StoreError>;

    /// Hydrated notification by id, regardless of owner.
    async fn get_notification(&self, id: Uuid) -> Result<Option<Notification>, StoreError>;

    /// Matching notifications ordered by `created_at` descending, at most
    /// `query.limit` of them.
    async fn list_notifications(&self, query: &ListQuery)
        -> Result<Vec<Notification>, StoreError>;

    /// Set `status` on every id owned by `user_id`.
    ///
    /// `ids` must already be de-duplicated. When fewer rows match than ids were
    /// given the change is discarded and `MarkOutcome::Rejected` is returned.
    async fn mark_notifications(
        &self,
        user_id: &str,
        ids: &[Uuid],
        status: NotificationStatus,
        at: DateTime<Utc>,
    ) -> Result<MarkOutcome, StoreError>;

    /// Append an action log and force the notification to `read`.
    ///
    /// Returns `None` without writing when the notification already has a log.
    async fn record_action(
        &self,
        log: NotificationActionLog,
    ) -> Result<Option<NotificationActionLog>, StoreError>;

    async fn count_unread(&self, user_id: &str) -> Result<u64, StoreError>;

    /// Get the backend name for logging/metrics.
    fn backend_name(&self) -> &'static str;
}
