//! In-memory mailing store
//!
//! Backs tests and local runs without PostgreSQL. Semantics follow the
//! database store, including version checks on dispatch writes.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mailcadence_common::types::{ClientId, MailingId};
use mailcadence_common::{Error, Result};
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::models::{
    Client, CreateClient, CreateMailing, CreateMailingAttempt, DispatchUpdate, Mailing,
    MailingAttempt, MailingStats, MailingStatus, UpdateMailing,
};
use crate::repository::MailingStore;

#[derive(Default)]
struct Inner {
    clients: HashMap<ClientId, Client>,
    mailings: HashMap<MailingId, Mailing>,
    recipients: HashMap<MailingId, Vec<ClientId>>,
    attempts: Vec<MailingAttempt>,
    failing: HashSet<MailingId>,
    due_query_fails: bool,
}

/// In-memory mailing store
#[derive(Default)]
pub struct InMemoryMailingStore {
    inner: RwLock<Inner>,
}

impl InMemoryMailingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a client; emails are unique
    pub async fn insert_client(&self, input: CreateClient) -> Result<Client> {
        let mut inner = self.inner.write().await;

        if inner.clients.values().any(|c| c.email == input.email) {
            return Err(Error::Validation(format!(
                "Client with email {} already exists",
                input.email
            )));
        }

        let now = Utc::now();
        let client = Client {
            id: Uuid::now_v7(),
            owner_id: input.owner_id,
            email: input.email,
            last_name: input.last_name,
            first_name: input.first_name,
            second_name: input.second_name,
            comment: input.comment,
            created_at: now,
            updated_at: now,
        };
        inner.clients.insert(client.id, client.clone());
        Ok(client)
    }

    /// Add a mailing in `new` status
    pub async fn insert_mailing(&self, input: CreateMailing) -> Result<Mailing> {
        let mut inner = self.inner.write().await;

        if let Some(missing) = input
            .client_ids
            .iter()
            .find(|id| !inner.clients.contains_key(*id))
        {
            return Err(Error::NotFound(format!("Client {}", missing)));
        }

        let now = Utc::now();
        let mailing = Mailing {
            id: Uuid::now_v7(),
            owner_id: input.owner_id,
            title: input.title,
            message: input.message,
            status: MailingStatus::New.to_string(),
            scheduled_time: input.scheduled_time,
            periodicity: input.periodicity.map(|p| p.to_string()),
            version: 0,
            created_at: now,
            updated_at: now,
        };
        inner.recipients.insert(mailing.id, input.client_ids);
        inner.mailings.insert(mailing.id, mailing.clone());
        Ok(mailing)
    }

    /// Every attempt, in insertion order
    pub async fn attempts(&self) -> Vec<MailingAttempt> {
        self.inner.read().await.attempts.clone()
    }

    /// Make every write touching `mailing_id` fail with a database error
    pub async fn fail_writes_for(&self, mailing_id: MailingId) {
        self.inner.write().await.failing.insert(mailing_id);
    }

    /// Make the due-mailings query fail with a database error
    pub async fn fail_due_queries(&self) {
        self.inner.write().await.due_query_fails = true;
    }

    fn check_writable(inner: &Inner, mailing_id: MailingId) -> Result<()> {
        if inner.failing.contains(&mailing_id) {
            return Err(Error::Database(format!(
                "write rejected for mailing {}",
                mailing_id
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl MailingStore for InMemoryMailingStore {
    async fn due_mailings(&self, now: DateTime<Utc>) -> Result<Vec<Mailing>> {
        let inner = self.inner.read().await;
        if inner.due_query_fails {
            return Err(Error::Database("due mailings query rejected".to_string()));
        }

        let mut due: Vec<Mailing> = inner
            .mailings
            .values()
            .filter(|m| m.is_due(now))
            .cloned()
            .collect();
        due.sort_by_key(|m| m.scheduled_time);
        Ok(due)
    }

    async fn clients_of(&self, mailing_id: MailingId) -> Result<Vec<Client>> {
        let inner = self.inner.read().await;
        let mut clients: Vec<Client> = inner
            .recipients
            .get(&mailing_id)
            .into_iter()
            .flatten()
            .filter_map(|id| inner.clients.get(id).cloned())
            .collect();
        clients.sort_by(|a, b| a.email.cmp(&b.email));
        Ok(clients)
    }

    async fn record_attempt(&self, input: CreateMailingAttempt) -> Result<MailingAttempt> {
        let mut inner = self.inner.write().await;
        Self::check_writable(&inner, input.mailing_id)?;

        if !inner.mailings.contains_key(&input.mailing_id) {
            return Err(Error::NotFound(format!("Mailing {}", input.mailing_id)));
        }

        let attempt = MailingAttempt {
            id: Uuid::now_v7(),
            mailing_id: input.mailing_id,
            client_id: input.client_id,
            status: input.status.to_string(),
            log_message: input.log_message,
            attempted_at: Utc::now(),
        };
        inner.attempts.push(attempt.clone());
        Ok(attempt)
    }

    async fn apply_dispatch(&self, update: DispatchUpdate) -> Result<bool> {
        let mut inner = self.inner.write().await;
        Self::check_writable(&inner, update.mailing_id)?;

        match inner.mailings.get_mut(&update.mailing_id) {
            Some(mailing) if mailing.version == update.expected_version => {
                mailing.status = update.status.to_string();
                mailing.scheduled_time = update.scheduled_time;
                mailing.version += 1;
                mailing.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn get_mailing(&self, id: MailingId) -> Result<Option<Mailing>> {
        Ok(self.inner.read().await.mailings.get(&id).cloned())
    }

    async fn update_mailing(
        &self,
        id: MailingId,
        input: UpdateMailing,
    ) -> Result<Option<Mailing>> {
        let mut inner = self.inner.write().await;
        Self::check_writable(&inner, id)?;

        let Some(mailing) = inner.mailings.get_mut(&id) else {
            return Ok(None);
        };

        if let Some(title) = input.title {
            mailing.title = title;
        }
        if let Some(message) = input.message {
            mailing.message = message;
        }
        if let Some(scheduled_time) = input.scheduled_time {
            mailing.scheduled_time = scheduled_time;
        }
        if let Some(periodicity) = input.periodicity {
            mailing.periodicity = periodicity.map(|p| p.to_string());
        }
        mailing.version += 1;
        mailing.updated_at = Utc::now();

        Ok(Some(mailing.clone()))
    }

    async fn transition_status(
        &self,
        id: MailingId,
        from: &[MailingStatus],
        to: MailingStatus,
    ) -> Result<Option<Mailing>> {
        let mut inner = self.inner.write().await;
        Self::check_writable(&inner, id)?;

        let Some(mailing) = inner.mailings.get_mut(&id) else {
            return Ok(None);
        };
        match mailing.status_enum() {
            Some(current) if from.contains(&current) => {
                mailing.status = to.to_string();
                mailing.version += 1;
                mailing.updated_at = Utc::now();
                Ok(Some(mailing.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn attempts_of(&self, mailing_id: MailingId, limit: i64) -> Result<Vec<MailingAttempt>> {
        let inner = self.inner.read().await;
        let limit = usize::try_from(limit.max(0)).unwrap_or(usize::MAX);
        Ok(inner
            .attempts
            .iter()
            .rev()
            .filter(|a| a.mailing_id == mailing_id)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn stats(&self) -> Result<MailingStats> {
        let inner = self.inner.read().await;
        Ok(MailingStats {
            total_mailings: inner.mailings.len() as i64,
            active_mailings: inner.mailings.values().filter(|m| m.is_active()).count() as i64,
            unique_clients: inner.clients.len() as i64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Periodicity;
    use pretty_assertions::assert_eq;

    fn client_input(email: &str) -> CreateClient {
        CreateClient {
            owner_id: Uuid::nil(),
            email: email.to_string(),
            last_name: "Petrova".to_string(),
            first_name: "Anna".to_string(),
            second_name: None,
            comment: None,
        }
    }

    async fn seeded() -> (InMemoryMailingStore, Mailing) {
        let store = InMemoryMailingStore::new();
        let a = store.insert_client(client_input("a@x.com")).await.unwrap();
        let mailing = store
            .insert_mailing(CreateMailing {
                owner_id: Uuid::nil(),
                title: "Weekly".to_string(),
                message: "News".to_string(),
                scheduled_time: Utc::now(),
                periodicity: Some(Periodicity::Weekly),
                client_ids: vec![a.id],
            })
            .await
            .unwrap();
        (store, mailing)
    }

    #[tokio::test]
    async fn test_duplicate_client_email_rejected() {
        let store = InMemoryMailingStore::new();
        store.insert_client(client_input("a@x.com")).await.unwrap();
        let err = store.insert_client(client_input("a@x.com")).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[tokio::test]
    async fn test_apply_dispatch_checks_version() {
        let (store, mailing) = seeded().await;

        let update = DispatchUpdate {
            mailing_id: mailing.id,
            expected_version: mailing.version,
            status: MailingStatus::Sent,
            scheduled_time: mailing.scheduled_time,
        };
        assert!(store.apply_dispatch(update.clone()).await.unwrap());
        // Same version again is stale now
        assert!(!store.apply_dispatch(update).await.unwrap());

        let stored = store.get_mailing(mailing.id).await.unwrap().unwrap();
        assert_eq!(stored.status, "sent");
        assert_eq!(stored.version, 1);
    }

    #[tokio::test]
    async fn test_user_edit_invalidates_pending_dispatch() {
        let (store, mailing) = seeded().await;

        let edited = store
            .update_mailing(
                mailing.id,
                UpdateMailing {
                    scheduled_time: Some(mailing.scheduled_time + chrono::Duration::days(2)),
                    periodicity: Some(None),
                    ..UpdateMailing::default()
                },
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(edited.version, mailing.version + 1);
        assert_eq!(edited.periodicity, None);

        let applied = store
            .apply_dispatch(DispatchUpdate {
                mailing_id: mailing.id,
                expected_version: mailing.version,
                status: MailingStatus::Sent,
                scheduled_time: mailing.scheduled_time,
            })
            .await
            .unwrap();
        assert!(!applied);

        let stored = store.get_mailing(mailing.id).await.unwrap().unwrap();
        assert_eq!(stored.scheduled_time, edited.scheduled_time);
        assert_eq!(stored.status_enum(), Some(MailingStatus::New));
    }

    #[tokio::test]
    async fn test_transition_requires_expected_status() {
        let (store, mailing) = seeded().await;

        let none = store
            .transition_status(mailing.id, &[MailingStatus::Declined], MailingStatus::New)
            .await
            .unwrap();
        assert!(none.is_none());

        let declined = store
            .transition_status(
                mailing.id,
                &[MailingStatus::New, MailingStatus::Sent],
                MailingStatus::Declined,
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(declined.status_enum(), Some(MailingStatus::Declined));
    }

    #[tokio::test]
    async fn test_failing_writes() {
        let (store, mailing) = seeded().await;
        store.fail_writes_for(mailing.id).await;

        let err = store
            .record_attempt(CreateMailingAttempt {
                mailing_id: mailing.id,
                client_id: None,
                status: MailingStatus::Sent,
                log_message: None,
            })
            .await
            .unwrap_err();
        assert!(err.is_persistence());
        assert!(store.attempts().await.is_empty());
    }

    #[tokio::test]
    async fn test_stats() {
        let (store, mailing) = seeded().await;
        store
            .transition_status(mailing.id, &[MailingStatus::New], MailingStatus::Declined)
            .await
            .unwrap();

        let stats = store.stats().await.unwrap();
        assert_eq!(
            stats,
            MailingStats {
                total_mailings: 1,
                active_mailings: 0,
                unique_clients: 1,
            }
        );
    }
}
