//! Notification records, storage and the lifecycle orchestrator.
//!
//! # Store Architecture
//!
//! - `MemoryNotificationStore`: single-lock in-memory storage (default, tests)
//! - `PostgresNotificationStore`: transactional storage on `sqlx`
//!
//! Use `create_notification_store()` to pick one from configuration.

mod grouping;
mod memory_store;
mod orchestrator;
mod postgres_store;
mod store;
mod types;

use std::sync::Arc;

use crate::config::StorageConfig;
use crate::postgres::PostgresPool;

pub use grouping::{clamp_limit, group_key_for, group_notifications, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};
pub use memory_store::MemoryNotificationStore;
pub use orchestrator::{NotificationOrchestrator, MAX_COMMENT_LENGTH};
pub use postgres_store::PostgresNotificationStore;
pub use store::NotificationStore;
pub use types::{
    ExecuteAction, GroupKey, ListParams, ListQuery, MarkOutcome, MetadataContext, NewAction,
    NewNotification, Notification, NotificationAction, NotificationActionLog, NotificationGroup,
    NotificationMetadata, NotificationPage, NotificationStatus, NotificationType, Priority,
    ReadEvent,
};

/// Create a notification store based on configuration.
///
/// Returns the appropriate store implementation based on the `backend` setting:
/// - `"postgres"`: Returns a `PostgresNotificationStore` if a PostgreSQL pool is provided
/// - `"memory"` (default): Returns a `MemoryNotificationStore`
pub fn create_notification_store(
    settings: &StorageConfig,
    postgres_pool: Option<&PostgresPool>,
) -> Arc<dyn NotificationStore> {
    match settings.backend.as_str() {
        "postgres" => {
            if let Some(pool) = postgres_pool {
                tracing::info!(backend = "postgres", "Creating PostgreSQL notification store");
                Arc::new(PostgresNotificationStore::new(pool.pool().clone()))
            } else {
                tracing::warn!(
                    "PostgreSQL notification store requested but no pool provided, falling back to memory"
                );
                Arc::new(MemoryNotificationStore::new())
            }
        }
        _ => {
            tracing::info!(backend = "memory", "Creating in-memory notification store");
            Arc::new(MemoryNotificationStore::new())
        }
    }
}
