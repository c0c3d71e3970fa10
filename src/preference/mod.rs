//! Per-user, per-category, per-channel delivery preferences with
//! administrator overrides.
//!
//! - `types`: categories, channels and preference records
//! - `resolution`: default matrix and effective-value rules
//! - `store`: storage trait with memory and PostgreSQL implementations
//! - `service`: lazy seeding, reads and batched updates

mod memory_store;
mod postgres_store;
mod resolution;
mod service;
mod store;
mod types;

use std::sync::Arc;

use crate::config::StorageConfig;
use crate::postgres::PostgresPool;

pub use memory_store::MemoryPreferenceStore;
pub use postgres_store::PostgresPreferenceStore;
pub use resolution::{build_view, derive_source, missing_defaults, resolve_default};
pub use service::PreferenceService;
pub use store::PreferenceStore;
pub use types::{
    ChannelOverride, DeliveryWindow, NotificationCategory, NotificationChannel, PreferenceCatalog,
    PreferenceSource, PreferenceSummary, PreferenceUpdate, PreferenceUpsert, PreferenceView,
    UnknownChannel, UnknownSource, UserNotificationPreference,
};

/// Create a preference store based on configuration.
///
/// Falls back to the in-memory store when `"postgres"` is requested without a pool.
pub fn create_preference_store(
    settings: &StorageConfig,
    postgres_pool: Option<&PostgresPool>,
) -> Arc<dyn PreferenceStore> {
    match (settings.backend.as_str(), postgres_pool) {
        ("postgres", Some(pool)) => {
            tracing::info!(backend = "postgres", "Creating PostgreSQL preference store");
            Arc::new(PostgresPreferenceStore::new(pool.pool().clone()))
        }
        ("postgres", None) => {
            tracing::warn!(
                "PostgreSQL preference store requested but no pool provided, falling back to memory"
            );
            Arc::new(MemoryPreferenceStore::new())
        }
        _ => {
            tracing::info!(backend = "memory", "Creating in-memory preference store");
            Arc::new(MemoryPreferenceStore::new())
        }
    }
}
