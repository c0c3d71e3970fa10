use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::PgPool;

use crate::error::StoreError;

use super::{Recipient, UserDirectory};

/// Directory backed by the `users`, `roles` and `roles_to_users` tables.
pub struct PostgresUserDirectory {
    pool: PgPool,
}

impl PostgresUserDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserDirectory for PostgresUserDirectory {
    async fn user_ids_for_roles(&self, role_codes: &[String]) -> Result<Vec<String>, StoreError> {
        if role_codes.is_empty() {
            return Ok(Vec::new());
        }

        let rows: Vec<(String,)> = sqlx::query_as(
            r#"
            SELECT DISTINCT ru.user_id
            FROM roles_to_users ru
            JOIN roles r ON r.id = ru.role_id
            WHERE r.code = ANY($1)
            ORDER BY ru.user_id
            "#,
        )
        .bind(role_codes)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    async fn fetch_recipients(&self, user_ids: &[String]) -> Result<Vec<Recipient>, StoreError> {
        if user_ids.is_empty() {
            return Ok(Vec::new());
        }

        let rows: Vec<(String, Option<String>, Option<String>, Option<String>)> = sqlx::query_as(
            r#"
            SELECT id, name, email, phone_number
            FROM users
            WHERE id = ANY($1)
            "#,
        )
        .bind(user_ids)
        .fetch_all(&self.pool)
        .await?;

        let mut by_id: HashMap<String, Recipient> = rows
            .into_iter()
            .map(|(user_id, name, email, phone_number)| {
                (
                    user_id.clone(),
                    Recipient {
                        user_id,
                        name,
                        email,
                        phone_number,
                    },
                )
            })
            .collect();

        Ok(user_ids.iter().filter_map(|id| by_id.remove(id)).collect())
    }

    async fn list_user_ids(&self) -> Result<Vec<String>, StoreError> {
        let rows: Vec<(String,)> = sqlx::query_as("SELECT id FROM users ORDER BY id")
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    fn backend_name(&self) -> &'static str {
        "postgres"
    }
}
