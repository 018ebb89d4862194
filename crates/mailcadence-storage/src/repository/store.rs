//! Mailing store - the persistence surface used by the dispatcher

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mailcadence_common::types::MailingId;
use mailcadence_common::{Error, Result};

use super::attempts::MailingAttemptRepository;
use super::clients::ClientRepository;
use super::mailings::MailingRepository;
use crate::db::DatabasePool;
use crate::models::{
    Client, CreateMailingAttempt, DispatchUpdate, Mailing, MailingAttempt, MailingStats,
    MailingStatus, UpdateMailing,
};

/// Mailing store trait
#[async_trait]
pub trait MailingStore: Send + Sync {
    /// Mailings with `scheduled_time <= now`, whatever their status
    async fn due_mailings(&self, now: DateTime<Utc>) -> Result<Vec<Mailing>>;

    /// Recipients of a mailing
    async fn clients_of(&self, mailing_id: MailingId) -> Result<Vec<Client>>;

    /// Append an attempt record
    async fn record_attempt(&self, input: CreateMailingAttempt) -> Result<MailingAttempt>;

    /// Persist status and schedule in one conditional write.
    ///
    /// Returns false if the mailing changed since it was read.
    async fn apply_dispatch(&self, update: DispatchUpdate) -> Result<bool>;

    async fn get_mailing(&self, id: MailingId) -> Result<Option<Mailing>>;

    /// Apply a user edit. Bumps the version so an in-flight dispatch of the
    /// old contents loses its write-back.
    async fn update_mailing(
        &self,
        id: MailingId,
        input: UpdateMailing,
    ) -> Result<Option<Mailing>>;

    /// Move to `to` if the current status is one of `from`; None otherwise
    async fn transition_status(
        &self,
        id: MailingId,
        from: &[MailingStatus],
        to: MailingStatus,
    ) -> Result<Option<Mailing>>;

    /// Latest attempts of a mailing, newest first
    async fn attempts_of(&self, mailing_id: MailingId, limit: i64) -> Result<Vec<MailingAttempt>>;

    async fn stats(&self) -> Result<MailingStats>;
}

fn db_err(e: sqlx::Error) -> Error {
    Error::Database(e.to_string())
}

/// PostgreSQL mailing store
#[derive(Clone)]
pub struct DbMailingStore {
    mailings: MailingRepository,
    clients: ClientRepository,
    attempts: MailingAttemptRepository,
}

impl DbMailingStore {
    pub fn new(db_pool: &DatabasePool) -> Self {
        let pool = db_pool.pool().clone();
        Self {
            mailings: MailingRepository::new(pool.clone()),
            clients: ClientRepository::new(pool.clone()),
            attempts: MailingAttemptRepository::new(pool),
        }
    }
}

#[async_trait]
impl MailingStore for DbMailingStore {
    async fn due_mailings(&self, now: DateTime<Utc>) -> Result<Vec<Mailing>> {
        self.mailings.get_due(now).await.map_err(db_err)
    }

    async fn clients_of(&self, mailing_id: MailingId) -> Result<Vec<Client>> {
        self.clients.list_by_mailing(mailing_id).await.map_err(db_err)
    }

    async fn record_attempt(&self, input: CreateMailingAttempt) -> Result<MailingAttempt> {
        self.attempts.create(input).await.map_err(db_err)
    }

    async fn apply_dispatch(&self, update: DispatchUpdate) -> Result<bool> {
        self.mailings.apply_dispatch(&update).await.map_err(db_err)
    }

    async fn get_mailing(&self, id: MailingId) -> Result<Option<Mailing>> {
        self.mailings.get(id).await.map_err(db_err)
    }

    async fn update_mailing(
        &self,
        id: MailingId,
        input: UpdateMailing,
    ) -> Result<Option<Mailing>> {
        self.mailings.update(id, &input).await.map_err(db_err)
    }

    async fn transition_status(
        &self,
        id: MailingId,
        from: &[MailingStatus],
        to: MailingStatus,
    ) -> Result<Option<Mailing>> {
        self.mailings
            .transition_status(id, from, to)
            .await
            .map_err(db_err)
    }

    async fn attempts_of(&self, mailing_id: MailingId, limit: i64) -> Result<Vec<MailingAttempt>> {
        self.attempts
            .list_by_mailing(mailing_id, limit)
            .await
            .map_err(db_err)
    }

    async fn stats(&self) -> Result<MailingStats> {
        Ok(MailingStats {
            total_mailings: self.mailings.count().await.map_err(db_err)?,
            active_mailings: self.mailings.count_active().await.map_err(db_err)?,
            unique_clients: self.clients.count().await.map_err(db_err)?,
        })
    }
}
