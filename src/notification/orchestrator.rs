use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::error::{NotificationError, Result};
use crate::events::{Actioned, Created, NotificationEventHub, Read};
use crate::metrics::LifecycleMetrics;

use super::grouping::{clamp_limit, group_notifications};
use super::store::NotificationStore;
use super::types::{
    ExecuteAction, ListParams, ListQuery, MarkOutcome, NewNotification, Notification,
    NotificationActionLog, NotificationPage, NotificationStatus, NotificationType, ReadEvent,
};

pub const MAX_COMMENT_LENGTH: usize = 1000;
const MAX_ACTION_KEY_LENGTH: usize = 50;
const MAX_ACTION_LABEL_LENGTH: usize = 100;
const MAX_CATEGORY_LENGTH: usize = 50;

/// Coordinates the notification lifecycle against the store and publishes
/// lifecycle events once writes are durable.
#[derive(Clone)]
pub struct NotificationOrchestrator {
    store: Arc<dyn NotificationStore>,
    events: NotificationEventHub,
}

impl NotificationOrchestrator {
    pub fn new(store: Arc<dyn NotificationStore>, events: NotificationEventHub) -> Self {
        Self { store, events }
    }

    pub fn events(&self) -> &NotificationEventHub {
        &self.events
    }

    pub fn store(&self) -> &Arc<dyn NotificationStore> {
        &self.store
    }

    /// Store a notification and its actions atomically, then emit `created`.
    #[tracing::instrument(
        name = "notification.create",
        skip(self, input),
        fields(user_id = %input.user_id, notification_type = input.notification_type.as_str())
    )]
    pub async fn create_notification(&self, input: NewNotification) -> Result<Notification> {
        validate_new_notification(&input)?;

        let notification = self
            .store
            .insert_notification(input.into_notification(Utc::now()))
            .await?;

        LifecycleMetrics::record_created();
        tracing::debug!(notification_id = %notification.id, "Notification created");

        self.events.emit::<Created>(notification.clone());

        Ok(notification)
    }

    /// Notification by id, only when owned by `user_id`.
    pub async fn get_notification(&self, id: Uuid, user_id: &str) -> Result<Notification> {
        match self.store.get_notification(id).await? {
            Some(notification) if notification.user_id == user_id => Ok(notification),
            _ => Err(NotificationError::NotFound(id)),
        }
    }

    /// One page of a user's notifications, newest first, grouped by day.
    #[tracing::instrument(name = "notification.list", skip(self, params), fields(user_id = %params.user_id))]
    pub async fn list_notifications(&self, params: ListParams) -> Result<NotificationPage> {
        let query = ListQuery {
            limit: clamp_limit(params.limit),
            user_id: params.user_id,
            status: params.status,
            notification_type: params.notification_type,
            category: params.category,
            before: params.before,
            after: params.after,
            cursor: params.cursor,
        };

        let items = self.store.list_notifications(&query).await?;
        let groups = group_notifications(&items, Utc::now());
        let next_cursor = items.last().map(|n| n.created_at);

        Ok(NotificationPage {
            items,
            groups,
            next_cursor,
        })
    }

    /// Set the status of the caller's notifications, all or nothing.
    ///
    /// Fails with `NotOwned` and changes nothing when any id is missing or
    /// belongs to another user. Emits `read` only when rows were updated.
    #[tracing::instrument(
        name = "notification.mark",
        skip(self, ids),
        fields(requested = ids.len(), status = %status)
    )]
    pub async fn mark_notifications(
        &self,
        ids: &[Uuid],
        status: NotificationStatus,
        user_id: &str,
    ) -> Result<usize> {
        let mut seen = HashSet::with_capacity(ids.len());
        let unique: Vec<Uuid> = ids.iter().copied().filter(|id| seen.insert(*id)).collect();

        if unique.is_empty() {
            return Ok(0);
        }

        match self
            .store
            .mark_notifications(user_id, &unique, status, Utc::now())
            .await?
        {
            MarkOutcome::Applied(updated) => {
                LifecycleMetrics::record_marked(status.as_str(), updated as u64);

                if updated > 0 {
                    self.events.emit::<Read>(ReadEvent {
                        user_id: user_id.to_string(),
                        ids: unique,
                        status,
                    });
                }

                Ok(updated)
            }
            MarkOutcome::Rejected { matched } => {
                tracing::warn!(
                    user_id = %user_id,
                    requested = unique.len(),
                    matched,
                    "Rejected bulk mark containing notifications not owned by the caller"
                );
                Err(NotificationError::NotOwned {
                    requested: unique.len(),
                    matched,
                })
            }
        }
    }

    /// Invoke a registered action on an approval notification.
    ///
    /// Checks run in order: existence, type, ownership, registration, required
    /// comment. On success the log is stored, the notification is read and
    /// `actioned` is emitted.
    #[tracing::instrument(
        name = "notification.execute_action",
        skip(self, input),
        fields(notification_id = %input.notification_id, action_key = %input.action_key)
    )]
    pub async fn execute_action(&self, input: ExecuteAction) -> Result<NotificationActionLog> {
        let comment = normalize_comment(input.comment)?;

        let notification = self
            .store
            .get_notification(input.notification_id)
            .await?
            .ok_or(NotificationError::NotFound(input.notification_id))?;

        if notification.notification_type != NotificationType::Approval {
            return Err(NotificationError::InvalidType);
        }

        if notification.user_id != input.acted_by {
            return Err(NotificationError::NotOwner {
                notification_id: notification.id,
                actor: input.acted_by,
            });
        }

        let action = notification
            .find_action(&input.action_key)
            .ok_or_else(|| NotificationError::ActionNotRegistered(input.action_key.clone()))?;

        if action.requires_comment && comment.is_none() {
            return Err(NotificationError::CommentRequired(action.action_key.clone()));
        }

        if !notification.action_logs.is_empty() {
            return Err(NotificationError::AlreadyActioned(notification.id));
        }

        let log = NotificationActionLog {
            id: Uuid::new_v4(),
            notification_id: notification.id,
            action_key: action.action_key.clone(),
            acted_by: input.acted_by,
            comment,
            acted_at: Utc::now(),
        };

        // The store re-checks under its own lock/constraint
        let log = self
            .store
            .record_action(log)
            .await?
            .ok_or(NotificationError::AlreadyActioned(notification.id))?;

        LifecycleMetrics::record_action(&log.action_key);
        tracing::info!(acted_by = %log.acted_by, "Notification action executed");

        self.events.emit::<Actioned>(log.clone());

        Ok(log)
    }

    pub async fn get_unread_count(&self, user_id: &str) -> Result<u64> {
        Ok(self.store.count_unread(user_id).await?)
    }
}

/// Trim a comment; blank comments count as absent.
fn normalize_comment(comment: Option<String>) -> Result<Option<String>> {
    let Some(comment) = comment else {
        return Ok(None);
    };

    let trimmed = comment.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }

    if trimmed.chars().count() > MAX_COMMENT_LENGTH {
        return Err(NotificationError::Validation(format!(
            "comment must be at most {} characters",
            MAX_COMMENT_LENGTH
        )));
    }

    Ok(Some(trimmed.to_string()))
}

fn validate_new_notification(input: &NewNotification) -> Result<()> {
    if input.user_id.trim().is_empty() {
        return Err(NotificationError::Validation("user id is required".into()));
    }
    if input.title.trim().is_empty() {
        return Err(NotificationError::Validation("title is required".into()));
    }
    if input.message.trim().is_empty() {
        return Err(NotificationError::Validation("message is required".into()));
    }
    if input.category.as_str().len() > MAX_CATEGORY_LENGTH {
        return Err(NotificationError::Validation(format!(
            "category must be at most {} characters",
            MAX_CATEGORY_LENGTH
        )));
    }

    let mut keys = HashSet::new();
    for action in &input.actions {
        let key_len = action.action_key.chars().count();
        if key_len == 0 || key_len > MAX_ACTION_KEY_LENGTH {
            return Err(NotificationError::Validation(format!(
                "action key must be 1..={} characters",
                MAX_ACTION_KEY_LENGTH
            )));
        }

        let label_len = action.label.chars().count();
        if label_len == 0 || label_len > MAX_ACTION_LABEL_LENGTH {
            return Err(NotificationError::Validation(format!(
                "action label must be 1..={} characters",
                MAX_ACTION_LABEL_LENGTH
            )));
        }

        if !keys.insert(action.action_key.as_str()) {
            return Err(NotificationError::Validation(format!(
                "duplicate action key: {}",
                action.action_key
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::events::Errors;
    use crate::notification::memory_store::MemoryNotificationStore;
    use crate::notification::types::{GroupKey, NewAction};
    use chrono::Duration;
    use std::sync::Mutex;

    struct Fixture {
        orchestrator: NotificationOrchestrator,
        store: Arc<MemoryNotificationStore>,
        hub: NotificationEventHub,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryNotificationStore::new());
        let hub = NotificationEventHub::new();
        Fixture {
            orchestrator: NotificationOrchestrator::new(store.clone(), hub.clone()),
            store,
            hub,
        }
    }

    fn approval_for(user_id: &str) -> NewNotification {
        NewNotification::approval(user_id, "Expense approval", "Approve the Q3 expense report")
            .action(NewAction::new("approve", "Approve"))
            .action(NewAction::new("reject", "Reject").requiring_comment())
    }

    #[tokio::test]
    async fn test_create_emits_created_event() {
        let f = fixture();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = seen.clone();
        f.hub.on_created_for_user("user-1", move |n| {
            s.lock().unwrap().push(n.id);
            Ok(())
        });

        let created = f.orchestrator.create_notification(approval_for("user-1")).await.unwrap();

        assert_eq!(*seen.lock().unwrap(), vec![created.id]);
        assert_eq!(created.actions.len(), 2);
        assert_eq!(f.store.len().await, 1);
    }

    #[tokio::test]
    async fn test_create_rejects_duplicate_action_keys() {
        let f = fixture();
        let input = NewNotification::approval("user-1", "t", "m")
            .action(NewAction::new("approve", "Approve"))
            .action(NewAction::new("approve", "Approve again"));

        let err = f.orchestrator.create_notification(input).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(f.store.is_empty().await);
    }

    #[tokio::test]
    async fn test_reject_requires_comment_then_approve_marks_read() {
        let f = fixture();
        let created = f.orchestrator.create_notification(approval_for("user-1")).await.unwrap();

        let err = f
            .orchestrator
            .execute_action(ExecuteAction::new(created.id, "reject", "user-1"))
            .await
            .unwrap_err();
        assert!(matches!(err, NotificationError::CommentRequired(_)));

        let blank = f
            .orchestrator
            .execute_action(ExecuteAction::new(created.id, "reject", "user-1").with_comment("   "))
            .await
            .unwrap_err();
        assert!(matches!(blank, NotificationError::CommentRequired(_)));

        let log = f
            .orchestrator
            .execute_action(ExecuteAction::new(created.id, "approve", "user-1"))
            .await
            .unwrap();
        assert_eq!(log.action_key, "approve");

        let stored = f.orchestrator.get_notification(created.id, "user-1").await.unwrap();
        assert_eq!(stored.status, NotificationStatus::Read);
        assert!(stored.read_at.is_some());
        assert_eq!(stored.action_logs.len(), 1);
    }

    #[tokio::test]
    async fn test_execute_action_validation_order() {
        let f = fixture();

        let missing = f
            .orchestrator
            .execute_action(ExecuteAction::new(Uuid::new_v4(), "approve", "user-1"))
            .await
            .unwrap_err();
        assert!(matches!(missing, NotificationError::NotFound(_)));

        let info = f
            .orchestrator
            .create_notification(NewNotification::informational("user-1", "FYI", "Heads up"))
            .await
            .unwrap();
        let wrong_type = f
            .orchestrator
            .execute_action(ExecuteAction::new(info.id, "approve", "user-2"))
            .await
            .unwrap_err();
        assert!(matches!(wrong_type, NotificationError::InvalidType));

        let approval = f.orchestrator.create_notification(approval_for("user-1")).await.unwrap();
        let not_owner = f
            .orchestrator
            .execute_action(ExecuteAction::new(approval.id, "unknown", "user-2"))
            .await
            .unwrap_err();
        assert!(matches!(not_owner, NotificationError::NotOwner { .. }));

        let unregistered = f
            .orchestrator
            .execute_action(ExecuteAction::new(approval.id, "escalate", "user-1"))
            .await
            .unwrap_err();
        assert!(matches!(unregistered, NotificationError::ActionNotRegistered(_)));
    }

    #[tokio::test]
    async fn test_action_can_only_run_once() {
        let f = fixture();
        let created = f.orchestrator.create_notification(approval_for("user-1")).await.unwrap();

        f.orchestrator
            .execute_action(
                ExecuteAction::new(created.id, "reject", "user-1").with_comment("  Missing receipts "),
            )
            .await
            .unwrap();

        let err = f
            .orchestrator
            .execute_action(ExecuteAction::new(created.id, "approve", "user-1"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);

        let stored = f.orchestrator.get_notification(created.id, "user-1").await.unwrap();
        assert_eq!(stored.action_logs[0].comment.as_deref(), Some("Missing receipts"));
    }

    #[tokio::test]
    async fn test_overlong_comment_rejected() {
        let f = fixture();
        let created = f.orchestrator.create_notification(approval_for("user-1")).await.unwrap();

        let err = f
            .orchestrator
            .execute_action(
                ExecuteAction::new(created.id, "reject", "user-1")
                    .with_comment("x".repeat(MAX_COMMENT_LENGTH + 1)),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, NotificationError::Validation(_)));
    }

    #[tokio::test]
    async fn test_mark_is_all_or_nothing() {
        let f = fixture();
        let mine = f
            .orchestrator
            .create_notification(NewNotification::informational("user-1", "a", "b"))
            .await
            .unwrap();
        let theirs = f
            .orchestrator
            .create_notification(NewNotification::informational("user-2", "a", "b"))
            .await
            .unwrap();

        let events = Arc::new(Mutex::new(Vec::new()));
        let e = events.clone();
        f.hub.on::<Read, _>(move |event| {
            e.lock().unwrap().push(event.clone());
            Ok(())
        });

        let err = f
            .orchestrator
            .mark_notifications(&[mine.id, theirs.id], NotificationStatus::Read, "user-1")
            .await
            .unwrap_err();
        assert!(matches!(err, NotificationError::NotOwned { requested: 2, matched: 1 }));
        assert_eq!(f.orchestrator.get_unread_count("user-1").await.unwrap(), 1);
        assert!(events.lock().unwrap().is_empty());

        let updated = f
            .orchestrator
            .mark_notifications(&[mine.id, mine.id], NotificationStatus::Read, "user-1")
            .await
            .unwrap();
        assert_eq!(updated, 1);
        assert_eq!(f.orchestrator.get_unread_count("user-1").await.unwrap(), 0);

        let events = events.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].ids, vec![mine.id]);
    }

    #[tokio::test]
    async fn test_mark_empty_ids_is_noop() {
        let f = fixture();
        let updated = f
            .orchestrator
            .mark_notifications(&[], NotificationStatus::Read, "user-1")
            .await
            .unwrap();
        assert_eq!(updated, 0);
    }

    #[tokio::test]
    async fn test_get_notification_hides_foreign_records() {
        let f = fixture();
        let created = f
            .orchestrator
            .create_notification(NewNotification::informational("user-1", "a", "b"))
            .await
            .unwrap();

        let err = f.orchestrator.get_notification(created.id, "user-2").await.unwrap_err();
        assert!(matches!(err, NotificationError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_list_groups_and_cursor() {
        let f = fixture();
        let now = Utc::now();
        for days in [0, 1, 5, 14] {
            let notification = NewNotification::informational("user-1", "title", "message")
                .into_notification(now - Duration::days(days));
            f.store.insert_notification(notification).await.unwrap();
        }

        let page = f
            .orchestrator
            .list_notifications(ListParams::for_user("user-1"))
            .await
            .unwrap();
        assert_eq!(page.items.len(), 4);
        for key in [GroupKey::Today, GroupKey::Yesterday, GroupKey::ThisWeek, GroupKey::Earlier] {
            assert_eq!(page.group(key).unwrap().notifications.len(), 1);
        }
        assert_eq!(page.next_cursor, Some(page.items[3].created_at));

        let first = f
            .orchestrator
            .list_notifications(ListParams {
                limit: Some(2),
                ..ListParams::for_user("user-1")
            })
            .await
            .unwrap();
        let second = f
            .orchestrator
            .list_notifications(ListParams {
                limit: Some(2),
                cursor: first.next_cursor,
                ..ListParams::for_user("user-1")
            })
            .await
            .unwrap();
        assert_eq!(second.items.len(), 2);
        assert!(second.items[0].created_at < first.items[1].created_at);

        let empty = f
            .orchestrator
            .list_notifications(ListParams::for_user("nobody"))
            .await
            .unwrap();
        assert!(empty.items.is_empty());
        assert!(empty.next_cursor.is_none());
    }

    #[tokio::test]
    async fn test_listener_failure_does_not_fail_create() {
        let f = fixture();
        f.hub.on::<Created, _>(|_| Err(anyhow::anyhow!("socket closed")));
        let faults = Arc::new(Mutex::new(0));
        let c = faults.clone();
        f.hub.on::<Errors, _>(move |_| {
            *c.lock().unwrap() += 1;
            Ok(())
        });

        f.orchestrator
            .create_notification(NewNotification::informational("user-1", "a", "b"))
            .await
            .unwrap();
        assert_eq!(*faults.lock().unwrap(), 1);
    }
}
