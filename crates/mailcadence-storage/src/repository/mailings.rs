//! Mailing repository

use chrono::{DateTime, Utc};
use mailcadence_common::types::MailingId;
use sqlx::PgPool;

use crate::models::{DispatchUpdate, Mailing, MailingStatus, UpdateMailing};

/// Mailing repository
#[derive(Clone)]
pub struct MailingRepository {
    pool: PgPool,
}

impl MailingRepository {
    /// Create a new mailing repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get a mailing by ID
    pub async fn get(&self, id: MailingId) -> Result<Option<Mailing>, sqlx::Error> {
        sqlx::query_as::<_, Mailing>("SELECT * FROM mailings WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    /// Get mailings whose scheduled time is at or before `now`
    pub async fn get_due(&self, now: DateTime<Utc>) -> Result<Vec<Mailing>, sqlx::Error> {
        sqlx::query_as::<_, Mailing>(
            r#"
            SELECT * FROM mailings
            WHERE scheduled_time <= $1
            ORDER BY scheduled_time ASC
            "#,
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await
    }

    /// Apply a user edit; absent fields are left unchanged
    pub async fn update(
        &self,
        id: MailingId,
        input: &UpdateMailing,
    ) -> Result<Option<Mailing>, sqlx::Error> {
        let periodicity = input
            .periodicity
            .flatten()
            .map(|p| p.as_str().to_string());

        sqlx::query_as::<_, Mailing>(
            r#"
            UPDATE mailings SET
                title = COALESCE($2, title),
                message = COALESCE($3, message),
                scheduled_time = COALESCE($4, scheduled_time),
                periodicity = CASE WHEN $5 THEN $6 ELSE periodicity END
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&input.title)
        .bind(&input.message)
        .bind(input.scheduled_time)
        .bind(input.periodicity.is_some())
        .bind(periodicity)
        .fetch_optional(&self.pool)
        .await
    }

    /// Write a dispatch outcome if nobody touched the row since it was read.
    ///
    /// The `mailings_bump_version` trigger increments the version on every
    /// update, including this one. Returns false when the version no longer
    /// matches.
    pub async fn apply_dispatch(&self, update: &DispatchUpdate) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE mailings SET
                status = $2,
                scheduled_time = $3
            WHERE id = $1 AND version = $4
            "#,
        )
        .bind(update.mailing_id)
        .bind(update.status.as_str())
        .bind(update.scheduled_time)
        .bind(update.expected_version)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Move a mailing to `to` if its current status is one of `from`
    pub async fn transition_status(
        &self,
        id: MailingId,
        from: &[MailingStatus],
        to: MailingStatus,
    ) -> Result<Option<Mailing>, sqlx::Error> {
        let from: Vec<String> = from.iter().map(|s| s.as_str().to_string()).collect();

        sqlx::query_as::<_, Mailing>(
            r#"
            UPDATE mailings SET status = $2
            WHERE id = $1 AND status = ANY($3)
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(to.as_str())
        .bind(&from)
        .fetch_optional(&self.pool)
        .await
    }

    /// Count all mailings
    pub async fn count(&self) -> Result<i64, sqlx::Error> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM mailings")
            .fetch_one(&self.pool)
            .await?;
        Ok(count.0)
    }

    /// Count mailings that are new or sent
    pub async fn count_active(&self) -> Result<i64, sqlx::Error> {
        let count: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM mailings WHERE status IN ('new', 'sent')")
                .fetch_one(&self.pool)
                .await?;
        Ok(count.0)
    }
}
