//! PostgreSQL notification store.
//!
//! Tables:
//! - `notifications`
//! - `notification_actions` - unique on `(notification_id, action_key)`
//! - `notification_action_logs` - unique on `notification_id`

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::StoreError;
use crate::preference::NotificationCategory;

use super::store::NotificationStore;
use super::types::{
    ListQuery, MarkOutcome, Notification, NotificationAction, NotificationActionLog,
    NotificationMetadata, NotificationStatus,
};

/// Actions in declaration order within each notification.
const SELECT_ACTIONS: &str = r#"
    SELECT id, notification_id, action_key, label, requires_comment
    FROM notification_actions
    WHERE notification_id = ANY($1)
    ORDER BY notification_id, position
"#;

const NOTIFICATION_COLUMNS: &str = "id, user_id, type, title, message, metadata, status, \
     category, created_at, read_at, expires_at, group_key";

fn duplicate_or(error: sqlx::Error, id: Uuid) -> StoreError {
    match error.as_database_error() {
        Some(db) if db.is_unique_violation() => {
            StoreError::Duplicate(format!("notification {}", id))
        }
        _ => StoreError::Postgres(error),
    }
}

#[derive(sqlx::FromRow)]
struct NotificationRow {
    id: Uuid,
    user_id: String,
    #[sqlx(rename = "type")]
    notification_type: String,
    title: String,
    message: String,
    metadata: Json<NotificationMetadata>,
    status: String,
    category: String,
    created_at: DateTime<Utc>,
    read_at: Option<DateTime<Utc>>,
    expires_at: Option<DateTime<Utc>>,
    group_key: Option<NaiveDate>,
}

impl NotificationRow {
    fn into_notification(
        self,
        actions: Vec<NotificationAction>,
        action_logs: Vec<NotificationActionLog>,
    ) -> Result<Notification, StoreError> {
        Ok(Notification {
            id: self.id,
            user_id: self.user_id,
            notification_type: self.notification_type.parse().map_err(StoreError::Corrupt)?,
            title: self.title,
            message: self.message,
            metadata: self.metadata.0,
            status: self.status.parse().map_err(StoreError::Corrupt)?,
            category: NotificationCategory::from(self.category),
            created_at: self.created_at,
            read_at: self.read_at,
            expires_at: self.expires_at,
            group_key: self.group_key,
            actions,
            action_logs,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ActionRow {
    id: Uuid,
    notification_id: Uuid,
    action_key: String,
    label: String,
    requires_comment: bool,
}

#[derive(sqlx::FromRow)]
struct ActionLogRow {
    id: Uuid,
    notification_id: Uuid,
    action_key: String,
    acted_by: String,
    comment: Option<String>,
    acted_at: DateTime<Utc>,
}

impl From<ActionLogRow> for NotificationActionLog {
    fn from(row: ActionLogRow) -> Self {
        Self {
            id: row.id,
            notification_id: row.notification_id,
            action_key: row.action_key,
            acted_by: row.acted_by,
            comment: row.comment,
            acted_at: row.acted_at,
        }
    }
}

pub struct PostgresNotificationStore {
    pool: PgPool,
}

impl PostgresNotificationStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Attach actions and logs to a batch of notification rows, keeping order.
    async fn hydrate(&self, rows: Vec<NotificationRow>) -> Result<Vec<Notification>, StoreError> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();

        let action_rows: Vec<ActionRow> = sqlx::query_as(SELECT_ACTIONS)
            .bind(&ids)
            .fetch_all(&self.pool)
            .await?;

        let log_rows: Vec<ActionLogRow> = sqlx::query_as(
            r#"
            SELECT id, notification_id, action_key, acted_by, comment, acted_at
            FROM notification_action_logs
            WHERE notification_id = ANY($1)
            ORDER BY acted_at
            "#,
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        let mut actions: HashMap<Uuid, Vec<NotificationAction>> = HashMap::new();
        for row in action_rows {
            actions
                .entry(row.notification_id)
                .or_default()
                .push(NotificationAction {
                    id: row.id,
                    notification_id: row.notification_id,
                    action_key: row.action_key,
                    label: row.label,
                    requires_comment: row.requires_comment,
                });
        }

        let mut logs: HashMap<Uuid, Vec<NotificationActionLog>> = HashMap::new();
        for row in log_rows {
            logs.entry(row.notification_id).or_default().push(row.into());
        }

        rows.into_iter()
            .map(|row| {
                let id = row.id;
                row.into_notification(
                    actions.remove(&id).unwrap_or_default(),
                    logs.remove(&id).unwrap_or_default(),
                )
            })
            .collect()
    }
}

#[async_trait]
impl NotificationStore for PostgresNotificationStore {
    async fn insert_notification(
        &self,
        notification: Notification,
    ) -> Result<Notification, StoreError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO notifications
                (id, user_id, type, title, message, metadata, status, category,
                 created_at, read_at, expires_at, group_key)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(notification.id)
        .bind(&notification.user_id)
        .bind(notification.notification_type.as_str())
        .bind(&notification.title)
        .bind(&notification.message)
        .bind(Json(&notification.metadata))
        .bind(notification.status.as_str())
        .bind(notification.category.as_str())
        .bind(notification.created_at)
        .bind(notification.read_at)
        .bind(notification.expires_at)
        .bind(notification.group_key)
        .execute(&mut *tx)
        .await
        .map_err(|e| duplicate_or(e, notification.id))?;

        for (position, action) in (0_i32..).zip(&notification.actions) {
            sqlx::query(
                r#"
                INSERT INTO notification_actions
                    (id, notification_id, action_key, label, requires_comment, position)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(action.id)
            .bind(notification.id)
            .bind(&action.action_key)
            .bind(&action.label)
            .bind(action.requires_comment)
            .bind(position)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        tracing::debug!(
            notification_id = %notification.id,
            user_id = %notification.user_id,
            actions = notification.actions.len(),
            "Notification stored in PostgreSQL"
        );

        Ok(notification)
    }

    async fn get_notification(&self, id: Uuid) -> Result<Option<Notification>, StoreError> {
        let row: Option<NotificationRow> = sqlx::query_as(&format!(
            "SELECT {} FROM notifications WHERE id = $1",
            NOTIFICATION_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(self.hydrate(vec![row]).await?.pop()),
            None => Ok(None),
        }
    }

    async fn list_notifications(
        &self,
        query: &ListQuery,
    ) -> Result<Vec<Notification>, StoreError> {
        let sql = format!(
            r#"
            SELECT {}
            FROM notifications
            WHERE user_id = $1
              AND ($2::text IS NULL OR status = $2)
              AND ($3::text IS NULL OR type = $3)
              AND ($4::text IS NULL OR category = $4)
              AND ($5::timestamptz IS NULL OR created_at < $5)
              AND ($6::timestamptz IS NULL OR created_at > $6)
              AND ($7::timestamptz IS NULL OR created_at < $7)
            ORDER BY created_at DESC
            LIMIT $8
            "#,
            NOTIFICATION_COLUMNS
        );

        let rows: Vec<NotificationRow> = sqlx::query_as(&sql)
            .bind(&query.user_id)
            .bind(query.status.map(|s| s.as_str()))
            .bind(query.notification_type.map(|t| t.as_str()))
            .bind(query.category.as_ref().map(|c| c.as_str().to_string()))
            .bind(query.before)
            .bind(query.after)
            .bind(query.cursor)
            .bind(query.limit as i64)
            .fetch_all(&self.pool)
            .await?;

        self.hydrate(rows).await
    }

    async fn mark_notifications(
        &self,
        user_id: &str,
        ids: &[Uuid],
        status: NotificationStatus,
        at: DateTime<Utc>,
    ) -> Result<MarkOutcome, StoreError> {
        let read_at = match status {
            NotificationStatus::Read => Some(at),
            NotificationStatus::Unread => None,
        };

        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE notifications
            SET status = $1, read_at = $2
            WHERE id = ANY($3) AND user_id = $4
            "#,
        )
        .bind(status.as_str())
        .bind(read_at)
        .bind(ids)
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

        let matched = result.rows_affected() as usize;

        if matched < ids.len() {
            tx.rollback().await?;
            tracing::debug!(
                user_id = %user_id,
                requested = ids.len(),
                matched,
                "Bulk mark rolled back"
            );
            return Ok(MarkOutcome::Rejected { matched });
        }

        tx.commit().await?;

        Ok(MarkOutcome::Applied(matched))
    }

    async fn record_action(
        &self,
        log: NotificationActionLog,
    ) -> Result<Option<NotificationActionLog>, StoreError> {
        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO notification_action_logs
                (id, notification_id, action_key, acted_by, comment, acted_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (notification_id) DO NOTHING
            "#,
        )
        .bind(log.id)
        .bind(log.notification_id)
        .bind(&log.action_key)
        .bind(&log.acted_by)
        .bind(&log.comment)
        .bind(log.acted_at)
        .execute(&mut *tx)
        .await?;

        if inserted.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(None);
        }

        sqlx::query(
            r#"
            UPDATE notifications
            SET status = 'read', read_at = $2
            WHERE id = $1
            "#,
        )
        .bind(log.notification_id)
        .bind(log.acted_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(Some(log))
    }

    async fn count_unread(&self, user_id: &str) -> Result<u64, StoreError> {
        let (count,): (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*)
            FROM notifications
            WHERE user_id = $1 AND status = 'unread'
            "#,
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(count.max(0) as u64)
    }

    fn backend_name(&self) -> &'static str {
        "postgres"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notification::types::NotificationType;

    fn row(status: &str) -> NotificationRow {
        NotificationRow {
            id: Uuid::new_v4(),
            user_id: "user-1".to_string(),
            notification_type: "approval".to_string(),
            title: "title".to_string(),
            message: "message".to_string(),
            metadata: Json(NotificationMetadata::default()),
            status: status.to_string(),
            category: "leads".to_string(),
            created_at: Utc::now(),
            read_at: None,
            expires_at: None,
            group_key: None,
        }
    }

    #[test]
    fn test_row_into_notification() {
        let notification = row("unread").into_notification(Vec::new(), Vec::new()).unwrap();
        assert_eq!(notification.notification_type, NotificationType::Approval);
        assert_eq!(notification.status, NotificationStatus::Unread);
        assert_eq!(notification.category, NotificationCategory::Leads);
    }

    #[test]
    fn test_actions_read_back_in_declared_order() {
        assert!(SELECT_ACTIONS.contains("ORDER BY notification_id, position"));
        assert!(!SELECT_ACTIONS.contains("created_at"));
    }

    #[test]
    fn test_unknown_status_is_corrupt() {
        let result = row("archived").into_notification(Vec::new(), Vec::new());
        assert!(matches!(result, Err(StoreError::Corrupt(_))));
    }
}
