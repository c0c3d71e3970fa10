//! In-memory preference store.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use uuid::Uuid;

use crate::error::StoreError;

use super::resolution::missing_defaults;
use super::store::PreferenceStore;
use super::types::{
    ChannelOverride, NotificationCategory, NotificationChannel, PreferenceUpsert,
    UserNotificationPreference,
};

type PreferenceKey = (NotificationCategory, NotificationChannel);

/// Preferences keyed by user.
///
/// Each user's rows live under one map entry, so holding the entry guard makes
/// seeding and upserts atomic per user.
#[derive(Default)]
pub struct MemoryPreferenceStore {
    preferences: DashMap<String, HashMap<PreferenceKey, UserNotificationPreference>>,
    overrides: DashMap<PreferenceKey, ChannelOverride>,
}

impl MemoryPreferenceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored rows for a user.
    pub fn preference_count(&self, user_id: &str) -> usize {
        self.preferences
            .get(user_id)
            .map(|rows| rows.len())
            .unwrap_or(0)
    }
}

#[async_trait]
impl PreferenceStore for MemoryPreferenceStore {
    async fn ensure_defaults(&self, user_id: &str) -> Result<usize, StoreError> {
        let mut rows = self.preferences.entry(user_id.to_string()).or_default();

        let existing: HashSet<PreferenceKey> = rows.keys().cloned().collect();
        let missing = missing_defaults(user_id, &existing, Utc::now());

        let mut inserted = 0;
        for row in missing {
            let key = (row.category.clone(), row.channel);
            if let std::collections::hash_map::Entry::Vacant(slot) = rows.entry(key) {
                slot.insert(row);
                inserted += 1;
            }
        }

        Ok(inserted)
    }

    async fn list_preferences(
        &self,
        user_id: &str,
    ) -> Result<Vec<UserNotificationPreference>, StoreError> {
        let mut rows: Vec<UserNotificationPreference> = self
            .preferences
            .get(user_id)
            .map(|rows| rows.values().cloned().collect())
            .unwrap_or_default();

        rows.sort_by(|a, b| {
            a.category
                .as_str()
                .cmp(b.category.as_str())
                .then(a.channel.as_str().cmp(b.channel.as_str()))
        });

        Ok(rows)
    }

    async fn list_overrides(&self) -> Result<Vec<ChannelOverride>, StoreError> {
        Ok(self.overrides.iter().map(|o| o.value().clone()).collect())
    }

    async fn upsert_preferences(
        &self,
        user_id: &str,
        items: &[PreferenceUpsert],
    ) -> Result<(), StoreError> {
        let now = Utc::now();
        let mut rows = self.preferences.entry(user_id.to_string()).or_default();

        for item in items {
            let key = (item.category.clone(), item.channel);
            rows.entry(key)
                .and_modify(|row| {
                    row.enabled = item.enabled;
                    row.delivery_window = item.delivery_window.clone();
                    row.source = item.source;
                    row.updated_at = now;
                })
                .or_insert_with(|| UserNotificationPreference {
                    id: Uuid::new_v4(),
                    user_id: user_id.to_string(),
                    category: item.category.clone(),
                    channel: item.channel,
                    enabled: item.enabled,
                    delivery_window: item.delivery_window.clone(),
                    source: item.source,
                    created_at: now,
                    updated_at: now,
                });
        }

        Ok(())
    }

    async fn put_override(&self, channel_override: ChannelOverride) -> Result<(), StoreError> {
        let key = (channel_override.category.clone(), channel_override.channel);
        self.overrides.insert(key, channel_override);
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preference::types::PreferenceSource;
    use std::sync::Arc;

    fn full_matrix() -> usize {
        NotificationCategory::KNOWN.len() * NotificationChannel::ALL.len()
    }

    #[tokio::test]
    async fn test_ensure_defaults_is_idempotent() {
        let store = MemoryPreferenceStore::new();

        assert_eq!(store.ensure_defaults("user-1").await.unwrap(), full_matrix());
        assert_eq!(store.ensure_defaults("user-1").await.unwrap(), 0);
        assert_eq!(store.preference_count("user-1"), full_matrix());
    }

    #[tokio::test]
    async fn test_concurrent_ensure_defaults() {
        let store = Arc::new(MemoryPreferenceStore::new());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move { store.ensure_defaults("user-1").await })
            })
            .collect();

        let mut inserted = 0;
        for handle in handles {
            inserted += handle.await.unwrap().unwrap();
        }

        assert_eq!(inserted, full_matrix());
        assert_eq!(store.preference_count("user-1"), full_matrix());
    }

    #[tokio::test]
    async fn test_upsert_updates_existing_row() {
        let store = MemoryPreferenceStore::new();
        store.ensure_defaults("user-1").await.unwrap();

        store
            .upsert_preferences(
                "user-1",
                &[PreferenceUpsert {
                    category: NotificationCategory::Leads,
                    channel: NotificationChannel::Email,
                    enabled: false,
                    delivery_window: None,
                    source: PreferenceSource::User,
                }],
            )
            .await
            .unwrap();

        let rows = store.list_preferences("user-1").await.unwrap();
        assert_eq!(rows.len(), full_matrix());

        let leads_email = rows
            .iter()
            .find(|r| {
                r.category == NotificationCategory::Leads && r.channel == NotificationChannel::Email
            })
            .unwrap();
        assert!(!leads_email.enabled);
        assert_eq!(leads_email.source, PreferenceSource::User);
    }

    #[tokio::test]
    async fn test_put_override_replaces_pair() {
        let store = MemoryPreferenceStore::new();

        store
            .put_override(ChannelOverride::new(
                NotificationCategory::System,
                NotificationChannel::Email,
                true,
                "first",
            ))
            .await
            .unwrap();
        store
            .put_override(ChannelOverride::new(
                NotificationCategory::System,
                NotificationChannel::Email,
                false,
                "second",
            ))
            .await
            .unwrap();

        let overrides = store.list_overrides().await.unwrap();
        assert_eq!(overrides.len(), 1);
        assert!(!overrides[0].enforced);
    }
}
