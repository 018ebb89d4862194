//! Client repository

use mailcadence_common::types::MailingId;
use sqlx::PgPool;

use crate::models::Client;

/// Client repository
#[derive(Clone)]
pub struct ClientRepository {
    pool: PgPool,
}

impl ClientRepository {
    /// Create a new client repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// List the recipients of a mailing
    pub async fn list_by_mailing(&self, mailing_id: MailingId) -> Result<Vec<Client>, sqlx::Error> {
        sqlx::query_as::<_, Client>(
            r#"
            SELECT c.* FROM clients c
            JOIN mailing_clients mc ON mc.client_id = c.id
            WHERE mc.mailing_id = $1
            ORDER BY c.email ASC
            "#,
        )
        .bind(mailing_id)
        .fetch_all(&self.pool)
        .await
    }

    /// Count clients; emails are unique so this is the unique client count
    pub async fn count(&self) -> Result<i64, sqlx::Error> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM clients")
            .fetch_one(&self.pool)
            .await?;
        Ok(count.0)
    }
}
