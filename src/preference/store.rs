//! Storage abstraction for preferences and channel overrides.
//!
//! Implementations must make `ensure_defaults` insert-or-ignore so that
//! concurrent calls for the same user never fail or duplicate rows.

use async_trait::async_trait;

use crate::error::StoreError;

use super::types::{ChannelOverride, PreferenceUpsert, UserNotificationPreference};

#[async_trait]
pub trait PreferenceStore: Send + Sync {
    /// Insert default rows for every missing `(category, channel)` pair.
    ///
    /// Returns the number of rows actually inserted.
    async fn ensure_defaults(&self, user_id: &str) -> Result<usize, StoreError>;

    /// All stored preferences of a user, ordered by category then channel.
    async fn list_preferences(
        &self,
        user_id: &str,
    ) -> Result<Vec<UserNotificationPreference>, StoreError>;

    /// All override rows, active or not.
    async fn list_overrides(&self) -> Result<Vec<ChannelOverride>, StoreError>;

    /// Insert or update each item keyed by `(user_id, category, channel)`.
    async fn upsert_preferences(
        &self,
        user_id: &str,
        items: &[PreferenceUpsert],
    ) -> Result<(), StoreError>;

    /// Insert or replace the override for its `(category, channel)` pair.
    async fn put_override(&self, channel_override: ChannelOverride) -> Result<(), StoreError>;

    /// Get the backend name for logging/metrics.
    fn backend_name(&self) -> &'static str;
}
