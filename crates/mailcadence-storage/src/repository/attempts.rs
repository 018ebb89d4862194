//! Mailing attempt repository

use mailcadence_common::types::MailingId;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{CreateMailingAttempt, MailingAttempt};

/// Mailing attempt repository. Attempts are never updated.
#[derive(Clone)]
pub struct MailingAttemptRepository {
    pool: PgPool,
}

impl MailingAttemptRepository {
    /// Create a new mailing attempt repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Append an attempt
    pub async fn create(&self, input: CreateMailingAttempt) -> Result<MailingAttempt, sqlx::Error> {
        let id = Uuid::now_v7();

        sqlx::query_as::<_, MailingAttempt>(
            r#"
            INSERT INTO mailing_attempts (id, mailing_id, client_id, status, log_message)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(input.mailing_id)
        .bind(input.client_id)
        .bind(input.status.as_str())
        .bind(&input.log_message)
        .fetch_one(&self.pool)
        .await
    }

    /// List the latest attempts of a mailing, newest first.
    ///
    /// A negative limit yields no rows.
    pub async fn list_by_mailing(
        &self,
        mailing_id: MailingId,
        limit: i64,
    ) -> Result<Vec<MailingAttempt>, sqlx::Error> {
        let limit = clamp_limit(limit);

        sqlx::query_as::<_, MailingAttempt>(
            r#"
            SELECT * FROM mailing_attempts
            WHERE mailing_id = $1
            ORDER BY attempted_at DESC
            LIMIT $2
            "#,
        )
        .bind(mailing_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
    }
}

fn clamp_limit(limit: i64) -> i64 {
    limit.max(0)
}
