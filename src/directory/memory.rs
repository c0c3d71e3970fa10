use std::collections::HashSet;

use async_trait::async_trait;
use dashmap::DashMap;

use crate::error::StoreError;

use super::{Recipient, UserDirectory};

/// In-memory directory for tests and single-process deployments.
#[derive(Default)]
pub struct MemoryUserDirectory {
    users: DashMap<String, Recipient>,
    /// role code -> user ids
    roles: DashMap<String, HashSet<String>>,
}

impl MemoryUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert_user(&self, recipient: Recipient) {
        self.users.insert(recipient.user_id.clone(), recipient);
    }

    pub fn assign_role(&self, role_code: &str, user_id: &str) {
        self.roles
            .entry(role_code.to_string())
            .or_default()
            .insert(user_id.to_string());
    }

    pub fn user_count(&self) -> usize {
        self.users.len()
    }
}

#[async_trait]
impl UserDirectory for MemoryUserDirectory {
    async fn user_ids_for_roles(&self, role_codes: &[String]) -> Result<Vec<String>, StoreError> {
        let mut seen = HashSet::new();
        let mut ids = Vec::new();

        for code in role_codes {
            if let Some(members) = self.roles.get(code) {
                let mut members: Vec<&String> = members.iter().collect();
                members.sort();
                for id in members {
                    if seen.insert(id.clone()) {
                        ids.push(id.clone());
                    }
                }
            }
        }

        Ok(ids)
    }

    async fn fetch_recipients(&self, user_ids: &[String]) -> Result<Vec<Recipient>, StoreError> {
        Ok(user_ids
            .iter()
            .filter_map(|id| self.users.get(id).map(|r| r.value().clone()))
            .collect())
    }

    async fn list_user_ids(&self) -> Result<Vec<String>, StoreError> {
        let mut ids: Vec<String> = self.users.iter().map(|r| r.key().clone()).collect();
        ids.sort();
        Ok(ids)
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_roles_expand_without_duplicates() {
        let directory = MemoryUserDirectory::new();
        directory.assign_role("finance", "alice");
        directory.assign_role("finance", "bob");
        directory.assign_role("admin", "alice");

        let ids = directory
            .user_ids_for_roles(&["finance".to_string(), "admin".to_string(), "ghost".to_string()])
            .await
            .unwrap();
        assert_eq!(ids, vec!["alice".to_string(), "bob".to_string()]);
    }

    #[tokio::test]
    async fn test_fetch_recipients_skips_unknown() {
        let directory = MemoryUserDirectory::new();
        directory.upsert_user(Recipient::new("alice").with_email("alice@example.com"));

        let recipients = directory
            .fetch_recipients(&["ghost".to_string(), "alice".to_string()])
            .await
            .unwrap();
        assert_eq!(recipients.len(), 1);
        assert_eq!(recipients[0].user_id, "alice");
    }
}
