//! PostgreSQL preference store.
//!
//! Tables:
//! - `user_notification_preferences` - unique on `(user_id, category, channel)`
//! - `notification_channel_overrides` - unique on `(category, channel)`

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::StoreError;

use super::resolution::missing_defaults;
use super::store::PreferenceStore;
use super::types::{
    ChannelOverride, DeliveryWindow, NotificationCategory, NotificationChannel, PreferenceUpsert,
    UserNotificationPreference,
};

#[derive(sqlx::FromRow)]
struct PreferenceRow {
    id: Uuid,
    user_id: String,
    category: String,
    channel: String,
    enabled: bool,
    delivery_window: Option<Json<DeliveryWindow>>,
    source: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<PreferenceRow> for UserNotificationPreference {
    type Error = StoreError;

    fn try_from(row: PreferenceRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            user_id: row.user_id,
            category: NotificationCategory::from(row.category),
            channel: row
                .channel
                .parse()
                .map_err(|e: super::types::UnknownChannel| StoreError::Corrupt(e.to_string()))?,
            enabled: row.enabled,
            delivery_window: row.delivery_window.map(|Json(window)| window),
            source: row
                .source
                .parse()
                .map_err(|e: super::types::UnknownSource| StoreError::Corrupt(e.to_string()))?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct OverrideRow {
    id: Uuid,
    category: String,
    channel: String,
    enforced: bool,
    reason: Option<String>,
    effective_from: DateTime<Utc>,
    effective_to: Option<DateTime<Utc>>,
}

impl TryFrom<OverrideRow> for ChannelOverride {
    type Error = StoreError;

    fn try_from(row: OverrideRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            category: NotificationCategory::from(row.category),
            channel: row
                .channel
                .parse()
                .map_err(|e: super::types::UnknownChannel| StoreError::Corrupt(e.to_string()))?,
            enforced: row.enforced,
            reason: row.reason,
            effective_from: row.effective_from,
            effective_to: row.effective_to,
        })
    }
}

pub struct PostgresPreferenceStore {
    pool: PgPool,
}

impl PostgresPreferenceStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PreferenceStore for PostgresPreferenceStore {
    async fn ensure_defaults(&self, user_id: &str) -> Result<usize, StoreError> {
        let existing: Vec<(String, String)> = sqlx::query_as(
            r#"
            SELECT category, channel
            FROM user_notification_preferences
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        let existing: HashSet<(NotificationCategory, NotificationChannel)> = existing
            .into_iter()
            .filter_map(|(category, channel)| {
                channel
                    .parse()
                    .ok()
                    .map(|channel| (NotificationCategory::from(category), channel))
            })
            .collect();

        let missing = missing_defaults(user_id, &existing, Utc::now());
        if missing.is_empty() {
            return Ok(0);
        }

        let ids: Vec<Uuid> = missing.iter().map(|r| r.id).collect();
        let categories: Vec<String> = missing.iter().map(|r| r.category.to_string()).collect();
        let channels: Vec<String> = missing.iter().map(|r| r.channel.to_string()).collect();
        let enabled: Vec<bool> = missing.iter().map(|r| r.enabled).collect();

        // A concurrent seeder may have inserted some of these rows already
        let result = sqlx::query(
            r#"
            INSERT INTO user_notification_preferences (id, user_id, category, channel, enabled, source)
            SELECT id, $2, category, channel, enabled, 'default'
            FROM UNNEST($1::uuid[], $3::text[], $4::text[], $5::bool[])
                AS seed(id, category, channel, enabled)
            ON CONFLICT (user_id, category, channel) DO NOTHING
            "#,
        )
        .bind(&ids)
        .bind(user_id)
        .bind(&categories)
        .bind(&channels)
        .bind(&enabled)
        .execute(&self.pool)
        .await?;

        let inserted = result.rows_affected() as usize;

        tracing::debug!(
            user_id = %user_id,
            inserted = inserted,
            "Seeded default notification preferences"
        );

        Ok(inserted)
    }

    async fn list_preferences(
        &self,
        user_id: &str,
    ) -> Result<Vec<UserNotificationPreference>, StoreError> {
        let rows: Vec<PreferenceRow> = sqlx::query_as(
            r#"
            SELECT id, user_id, category, channel, enabled, delivery_window, source,
                   created_at, updated_at
            FROM user_notification_preferences
            WHERE user_id = $1
            ORDER BY category, channel
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(UserNotificationPreference::try_from).collect()
    }

    async fn list_overrides(&self) -> Result<Vec<ChannelOverride>, StoreError> {
        let rows: Vec<OverrideRow> = sqlx::query_as(
            r#"
            SELECT id, category, channel, enforced, reason, effective_from, effective_to
            FROM notification_channel_overrides
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(ChannelOverride::try_from).collect()
    }

    async fn upsert_preferences(
        &self,
        user_id: &str,
        items: &[PreferenceUpsert],
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        for item in items {
            sqlx::query(
                r#"
                INSERT INTO user_notification_preferences
                    (id, user_id, category, channel, enabled, delivery_window, source, created_at, updated_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, NOW(), NOW())
                ON CONFLICT (user_id, category, channel) DO UPDATE SET
                    enabled = EXCLUDED.enabled,
                    delivery_window = EXCLUDED.delivery_window,
                    source = EXCLUDED.source,
                    updated_at = NOW()
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(user_id)
            .bind(item.category.as_str())
            .bind(item.channel.as_str())
            .bind(item.enabled)
            .bind(item.delivery_window.clone().map(Json))
            .bind(item.source.as_str())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        Ok(())
    }

    async fn put_override(&self, channel_override: ChannelOverride) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO notification_channel_overrides
                (id, category, channel, enforced, reason, effective_from, effective_to)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (category, channel) DO UPDATE SET
                enforced = EXCLUDED.enforced,
                reason = EXCLUDED.reason,
                effective_from = EXCLUDED.effective_from,
                effective_to = EXCLUDED.effective_to,
                updated_at = NOW()
            "#,
        )
        .bind(channel_override.id)
        .bind(channel_override.category.as_str())
        .bind(channel_override.channel.as_str())
        .bind(channel_override.enforced)
        .bind(&channel_override.reason)
        .bind(channel_override.effective_from)
        .bind(channel_override.effective_to)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "postgres"
    }
}
