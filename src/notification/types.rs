use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::preference::NotificationCategory;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationType {
    Informational,
    Approval,
}

impl NotificationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationType::Informational => "informational",
            NotificationType::Approval => "approval",
        }
    }
}

impl FromStr for NotificationType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "informational" => Ok(NotificationType::Informational),
            "approval" => Ok(NotificationType::Approval),
            other => Err(format!("Unknown notification type: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationStatus {
    Unread,
    Read,
}

impl NotificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationStatus::Unread => "unread",
            NotificationStatus::Read => "read",
        }
    }
}

impl FromStr for NotificationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unread" => Ok(NotificationStatus::Unread),
            "read" => Ok(NotificationStatus::Read),
            other => Err(format!("Unknown notification status: {}", other)),
        }
    }
}

impl fmt::Display for NotificationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Priority levels for notifications
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
}

impl Priority {
    /// Numeric value for priority comparison and job ordering
    pub fn as_weight(&self) -> i32 {
        match self {
            Priority::Low => 1,
            Priority::Normal => 2,
            Priority::High => 3,
        }
    }
}

impl PartialOrd for Priority {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Priority {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.as_weight().cmp(&other.as_weight())
    }
}

/// Structured context describing what a notification refers to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum MetadataContext {
    /// An entity awaiting a decision from the recipient
    #[serde(rename_all = "camelCase")]
    Approval {
        entity_type: String,
        entity_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        requested_by: Option<String>,
    },
    /// A deep link into the application
    #[serde(rename_all = "camelCase")]
    Link {
        url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        label: Option<String>,
    },
    /// Platform-level notice
    #[serde(rename_all = "camelCase")]
    System {
        component: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        severity: Option<String>,
    },
}

/// Typed notification metadata.
///
/// `hints` is reserved for integration-specific rendering data (for example
/// an email subject override) and is carried through untouched.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<MetadataContext>,
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub hints: serde_json::Map<String, serde_json::Value>,
}

impl NotificationMetadata {
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn with_event_type(mut self, event_type: impl Into<String>) -> Self {
        self.event_type = Some(event_type.into());
        self
    }

    pub fn with_context(mut self, context: MetadataContext) -> Self {
        self.context = Some(context);
        self
    }

    pub fn with_hint(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.hints.insert(key.into(), value);
        self
    }

    /// Overlay `other`: its present fields win and its hints are added.
    pub fn merge(mut self, other: NotificationMetadata) -> Self {
        if other.priority.is_some() {
            self.priority = other.priority;
        }
        if other.event_type.is_some() {
            self.event_type = other.event_type;
        }
        if other.context.is_some() {
            self.context = other.context;
        }
        self.hints.extend(other.hints);
        self
    }

    /// Flatten into a JSON object for job payloads.
    pub fn to_json_map(&self) -> serde_json::Map<String, serde_json::Value> {
        match serde_json::to_value(self) {
            Ok(serde_json::Value::Object(map)) => map,
            _ => serde_json::Map::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationAction {
    pub id: Uuid,
    pub notification_id: Uuid,
    pub action_key: String,
    pub label: String,
    pub requires_comment: bool,
}

/// Append-only record of an executed action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationActionLog {
    pub id: Uuid,
    pub notification_id: Uuid,
    pub action_key: String,
    pub acted_by: String,
    pub comment: Option<String>,
    pub acted_at: DateTime<Utc>,
}

/// A stored notification hydrated with its actions and action logs.
///
/// `status == Unread` if and only if `read_at` is `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: Uuid,
    pub user_id: String,
    #[serde(rename = "type")]
    pub notification_type: NotificationType,
    pub title: String,
    pub message: String,
    pub metadata: NotificationMetadata,
    pub status: NotificationStatus,
    pub category: NotificationCategory,
    pub created_at: DateTime<Utc>,
    pub read_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub group_key: Option<NaiveDate>,
    #[serde(default)]
    pub actions: Vec<NotificationAction>,
    #[serde(default)]
    pub action_logs: Vec<NotificationActionLog>,
}

impl Notification {
    pub fn is_read(&self) -> bool {
        self.status == NotificationStatus::Read
    }

    pub fn find_action(&self, action_key: &str) -> Option<&NotificationAction> {
        self.actions.iter().find(|a| a.action_key == action_key)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAction {
    pub action_key: String,
    pub label: String,
    #[serde(default)]
    pub requires_comment: bool,
}

impl NewAction {
    pub fn new(action_key: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            action_key: action_key.into(),
            label: label.into(),
            requires_comment: false,
        }
    }

    pub fn requiring_comment(mut self) -> Self {
        self.requires_comment = true;
        self
    }
}

/// Input for creating one notification for one user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewNotification {
    pub user_id: String,
    #[serde(rename = "type")]
    pub notification_type: NotificationType,
    pub title: String,
    pub message: String,
    #[serde(default)]
    pub metadata: NotificationMetadata,
    pub category: NotificationCategory,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub group_key: Option<NaiveDate>,
    #[serde(default)]
    pub actions: Vec<NewAction>,
}

impl NewNotification {
    pub fn new(
        user_id: impl Into<String>,
        notification_type: NotificationType,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            notification_type,
            title: title.into(),
            message: message.into(),
            metadata: NotificationMetadata::default(),
            category: NotificationCategory::General,
            expires_at: None,
            group_key: None,
            actions: Vec::new(),
        }
    }

    pub fn informational(
        user_id: impl Into<String>,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::new(user_id, NotificationType::Informational, title, message)
    }

    pub fn approval(
        user_id: impl Into<String>,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::new(user_id, NotificationType::Approval, title, message)
    }

    pub fn category(mut self, category: NotificationCategory) -> Self {
        self.category = category;
        self
    }

    pub fn metadata(mut self, metadata: NotificationMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.metadata.priority = Some(priority);
        self
    }

    pub fn expires_at(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    pub fn group_key(mut self, group_key: NaiveDate) -> Self {
        self.group_key = Some(group_key);
        self
    }

    pub fn action(mut self, action: NewAction) -> Self {
        self.actions.push(action);
        self
    }

    /// Materialise the record written by the store.
    pub(crate) fn into_notification(self, now: DateTime<Utc>) -> Notification {
        let id = Uuid::new_v4();
        let actions = self
            .actions
            .into_iter()
            .map(|action| NotificationAction {
                id: Uuid::new_v4(),
                notification_id: id,
                action_key: action.action_key,
                label: action.label,
                requires_comment: action.requires_comment,
            })
            .collect();

        Notification {
            id,
            user_id: self.user_id,
            notification_type: self.notification_type,
            title: self.title,
            message: self.message,
            metadata: self.metadata,
            status: NotificationStatus::Unread,
            category: self.category,
            created_at: now,
            read_at: None,
            expires_at: self.expires_at,
            group_key: Some(self.group_key.unwrap_or_else(|| now.date_naive())),
            actions,
            action_logs: Vec::new(),
        }
    }
}

/// Filters for a page of a user's notifications.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListParams {
    pub user_id: String,
    #[serde(default)]
    pub status: Option<NotificationStatus>,
    #[serde(default, rename = "type")]
    pub notification_type: Option<NotificationType>,
    #[serde(default)]
    pub category: Option<NotificationCategory>,
    #[serde(default)]
    pub before: Option<DateTime<Utc>>,
    #[serde(default)]
    pub after: Option<DateTime<Utc>>,
    /// Only items created strictly before this instant
    #[serde(default)]
    pub cursor: Option<DateTime<Utc>>,
    #[serde(default)]
    pub limit: Option<u32>,
}

impl ListParams {
    pub fn for_user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            ..Default::default()
        }
    }
}

/// `ListParams` with the limit resolved, as handed to the store.
#[derive(Debug, Clone, PartialEq)]
pub struct ListQuery {
    pub user_id: String,
    pub status: Option<NotificationStatus>,
    pub notification_type: Option<NotificationType>,
    pub category: Option<NotificationCategory>,
    pub before: Option<DateTime<Utc>>,
    pub after: Option<DateTime<Utc>>,
    pub cursor: Option<DateTime<Utc>>,
    pub limit: u32,
}

impl ListQuery {
    /// Whether a notification passes every filter except the limit.
    pub fn matches(&self, notification: &Notification) -> bool {
        notification.user_id == self.user_id
            && self.status.map_or(true, |s| notification.status == s)
            && self
                .notification_type
                .map_or(true, |t| notification.notification_type == t)
            && self
                .category
                .as_ref()
                .map_or(true, |c| &notification.category == c)
            && self.before.map_or(true, |b| notification.created_at < b)
            && self.after.map_or(true, |a| notification.created_at > a)
            && self.cursor.map_or(true, |c| notification.created_at < c)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum GroupKey {
    Today,
    Yesterday,
    ThisWeek,
    Earlier,
}

impl GroupKey {
    pub fn title(&self) -> &'static str {
        match self {
            GroupKey::Today => "Today",
            GroupKey::Yesterday => "Yesterday",
            GroupKey::ThisWeek => "This Week",
            GroupKey::Earlier => "Earlier",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationGroup {
    pub key: GroupKey,
    pub title: &'static str,
    pub notifications: Vec<Notification>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationPage {
    pub items: Vec<Notification>,
    pub groups: Vec<NotificationGroup>,
    pub next_cursor: Option<DateTime<Utc>>,
}

impl NotificationPage {
    pub fn group(&self, key: GroupKey) -> Option<&NotificationGroup> {
        self.groups.iter().find(|g| g.key == key)
    }
}

/// Request to invoke a registered action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteAction {
    pub notification_id: Uuid,
    pub action_key: String,
    pub acted_by: String,
    #[serde(default)]
    pub comment: Option<String>,
}

impl ExecuteAction {
    pub fn new(
        notification_id: Uuid,
        action_key: impl Into<String>,
        acted_by: impl Into<String>,
    ) -> Self {
        Self {
            notification_id,
            action_key: action_key.into(),
            acted_by: acted_by.into(),
            comment: None,
        }
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }
}

/// Payload of the `read` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadEvent {
    pub user_id: String,
    pub ids: Vec<Uuid>,
    pub status: NotificationStatus,
}

/// Result of an owner-filtered bulk status change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkOutcome {
    Applied(usize),
    /// Fewer rows matched than ids were requested; nothing was written.
    Rejected { matched: usize },
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_priority_ordering() {
        assert!(Priority::High > Priority::Normal);
        assert!(Priority::Normal > Priority::Low);
        assert_eq!(Priority::default(), Priority::Normal);
    }

    #[test]
    fn test_metadata_serialization() {
        let metadata = NotificationMetadata::default()
            .with_priority(Priority::High)
            .with_context(MetadataContext::Approval {
                entity_type: "leave-request".to_string(),
                entity_id: "lr-42".to_string(),
                requested_by: None,
            })
            .with_hint("emailSubject", serde_json::json!("Approval needed"));

        let json = serde_json::to_value(&metadata).unwrap();
        assert_eq!(json["priority"], "high");
        assert_eq!(json["context"]["kind"], "approval");
        assert_eq!(json["context"]["entityId"], "lr-42");
        assert_eq!(json["hints"]["emailSubject"], "Approval needed");

        let back: NotificationMetadata = serde_json::from_value(json).unwrap();
        assert_eq!(back, metadata);
    }

    #[test]
    fn test_metadata_merge_prefers_overlay() {
        let base = NotificationMetadata::default()
            .with_priority(Priority::Low)
            .with_event_type("lead.assigned")
            .with_hint("a", serde_json::json!(1));
        let overlay = NotificationMetadata::default()
            .with_priority(Priority::High)
            .with_hint("b", serde_json::json!(2));

        let merged = base.merge(overlay);
        assert_eq!(merged.priority, Some(Priority::High));
        assert_eq!(merged.event_type.as_deref(), Some("lead.assigned"));
        assert_eq!(merged.hints.len(), 2);
    }

    #[test]
    fn test_empty_metadata_from_object() {
        let metadata: NotificationMetadata = serde_json::from_str("{}").unwrap();
        assert_eq!(metadata, NotificationMetadata::default());
    }

    #[test]
    fn test_into_notification_defaults_group_key() {
        let now = Utc::now();
        let notification = NewNotification::approval("user-1", "Approve", "Please review")
            .action(NewAction::new("approve", "Approve"))
            .action(NewAction::new("reject", "Reject").requiring_comment())
            .into_notification(now);

        assert_eq!(notification.status, NotificationStatus::Unread);
        assert!(notification.read_at.is_none());
        assert_eq!(notification.group_key, Some(now.date_naive()));
        assert_eq!(notification.actions.len(), 2);
        assert!(notification.actions.iter().all(|a| a.notification_id == notification.id));
        assert!(notification.find_action("reject").unwrap().requires_comment);
    }

    #[test]
    fn test_list_query_matches_cursor_strictly() {
        let now = Utc::now();
        let notification = NewNotification::informational("user-1", "t", "m").into_notification(now);

        let mut query = ListQuery {
            user_id: "user-1".to_string(),
            status: None,
            notification_type: None,
            category: None,
            before: None,
            after: None,
            cursor: Some(now),
            limit: 20,
        };
        assert!(!query.matches(&notification));

        query.cursor = Some(now + Duration::milliseconds(1));
        assert!(query.matches(&notification));

        query.status = Some(NotificationStatus::Read);
        assert!(!query.matches(&notification));
    }
}
