//! Read-only access to users, their contact details and role membership.
//!
//! The directory is owned by the surrounding application; the engine only
//! expands role codes and loads the contact profile of each recipient.

mod memory;
mod postgres;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::StorageConfig;
use crate::error::StoreError;
use crate::postgres::PostgresPool;

pub use memory::MemoryUserDirectory;
pub use postgres::PostgresUserDirectory;

/// Minimal contact profile of a dispatch recipient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recipient {
    pub user_id: String,
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone_number: Option<String>,
}

impl Recipient {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            name: None,
            email: None,
            phone_number: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn with_phone(mut self, phone_number: impl Into<String>) -> Self {
        self.phone_number = Some(phone_number.into());
        self
    }

    /// Email address, ignoring blank values.
    pub fn email_address(&self) -> Option<&str> {
        self.email.as_deref().filter(|e| !e.trim().is_empty())
    }

    /// Phone number, ignoring blank values.
    pub fn phone(&self) -> Option<&str> {
        self.phone_number.as_deref().filter(|p| !p.trim().is_empty())
    }
}

#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// De-duplicated ids of users holding any of the role codes.
    async fn user_ids_for_roles(&self, role_codes: &[String]) -> Result<Vec<String>, StoreError>;

    /// Contact profiles for the given ids, in input order. Unknown ids are
    /// omitted.
    async fn fetch_recipients(&self, user_ids: &[String]) -> Result<Vec<Recipient>, StoreError>;

    /// Every known user id.
    async fn list_user_ids(&self) -> Result<Vec<String>, StoreError>;

    fn backend_name(&self) -> &'static str;
}

/// Create a user directory based on configuration.
///
/// Follows `storage.backend`; falls back to an empty in-memory directory when
/// `"postgres"` is requested without a pool.
pub fn create_user_directory(
    settings: &StorageConfig,
    postgres_pool: Option<&PostgresPool>,
) -> Arc<dyn UserDirectory> {
    match (settings.backend.as_str(), postgres_pool) {
        ("postgres", Some(pool)) => {
            tracing::info!(backend = "postgres", "Creating PostgreSQL user directory");
            Arc::new(PostgresUserDirectory::new(pool.pool().clone()))
        }
        ("postgres", None) => {
            tracing::warn!(
                "PostgreSQL user directory requested but no pool provided, falling back to memory"
            );
            Arc::new(MemoryUserDirectory::new())
        }
        _ => {
            tracing::info!(backend = "memory", "Creating in-memory user directory");
            Arc::new(MemoryUserDirectory::new())
        }
    }
}
