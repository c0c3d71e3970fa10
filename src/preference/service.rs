use std::sync::Arc;

use chrono::Utc;

use crate::error::{NotificationError, Result};
use crate::metrics::LifecycleMetrics;

use super::resolution::{build_view, prepare_upsert};
use super::store::PreferenceStore;
use super::types::{PreferenceCatalog, PreferenceSummary, PreferenceUpdate};

/// Reads and writes per-user preferences, seeding defaults lazily.
#[derive(Clone)]
pub struct PreferenceService {
    store: Arc<dyn PreferenceStore>,
}

impl PreferenceService {
    pub fn new(store: Arc<dyn PreferenceStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn PreferenceStore> {
        &self.store
    }

    /// Seed any missing default rows. Safe to call concurrently.
    pub async fn ensure_defaults_for_user(&self, user_id: &str) -> Result<usize> {
        let inserted = self.store.ensure_defaults(user_id).await?;
        if inserted > 0 {
            LifecycleMetrics::record_preferences_seeded(inserted as u64);
            tracing::debug!(user_id = %user_id, inserted, "Default preferences seeded");
        }
        Ok(inserted)
    }

    /// Seed defaults for many users, returning the total rows inserted.
    pub async fn backfill_defaults<I, S>(&self, user_ids: I) -> Result<usize>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut total = 0;
        let mut users = 0;
        for user_id in user_ids {
            total += self.ensure_defaults_for_user(user_id.as_ref()).await?;
            users += 1;
        }

        tracing::info!(users, inserted = total, "Preference backfill complete");

        Ok(total)
    }

    /// Resolved preferences of a user, one view per stored row.
    #[tracing::instrument(name = "preferences.get", skip(self))]
    pub async fn get_user_preferences(&self, user_id: &str) -> Result<PreferenceSummary> {
        self.ensure_defaults_for_user(user_id).await?;

        let (records, overrides) = tokio::try_join!(
            self.store.list_preferences(user_id),
            self.store.list_overrides()
        )?;

        let now = Utc::now();
        let preferences = records
            .iter()
            .map(|record| build_view(record, &overrides, now))
            .collect();

        Ok(PreferenceSummary {
            user_id: user_id.to_string(),
            preferences,
            metadata: PreferenceCatalog::default(),
        })
    }

    /// Apply a batch of changes. Every delivery window is validated before
    /// anything is written.
    #[tracing::instrument(name = "preferences.update", skip(self, items), fields(items = items.len()))]
    pub async fn update_user_preferences(
        &self,
        user_id: &str,
        items: Vec<PreferenceUpdate>,
    ) -> Result<()> {
        if items.is_empty() {
            return Ok(());
        }

        for item in &items {
            if let Some(window) = &item.delivery_window {
                window.validate().map_err(NotificationError::Validation)?;
            }
        }

        self.ensure_defaults_for_user(user_id).await?;

        let upserts: Vec<_> = items.into_iter().map(prepare_upsert).collect();
        self.store.upsert_preferences(user_id, &upserts).await?;

        tracing::info!(user_id = %user_id, count = upserts.len(), "Preferences updated");

        Ok(())
    }
}
