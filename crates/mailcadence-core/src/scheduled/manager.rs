//! Mailing Manager - Manual lifecycle actions outside the dispatch cycle

use crate::access::{can, Action, Actor, Resource};
use mailcadence_common::types::MailingId;
use mailcadence_storage::models::{Mailing, MailingAttempt, MailingStats, MailingStatus};
use mailcadence_storage::repository::MailingStore;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

/// Mailing manager errors
#[derive(Error, Debug)]
pub enum MailingError {
    #[error("Mailing not found")]
    NotFound,

    #[error("Not allowed to {0:?} this mailing")]
    Forbidden(Action),

    #[error("Mailing is {current}, cannot move it to {target}")]
    InvalidTransition {
        current: String,
        target: MailingStatus,
    },

    #[error(transparent)]
    Storage(#[from] mailcadence_common::Error),
}

/// Mailing Manager
pub struct MailingManager {
    store: Arc<dyn MailingStore>,
}

impl MailingManager {
    pub fn new(store: Arc<dyn MailingStore>) -> Self {
        Self { store }
    }

    /// Disable a mailing. It stays `Declined` until reactivated.
    pub async fn cancel(
        &self,
        actor: &Actor,
        mailing_id: MailingId,
    ) -> Result<Mailing, MailingError> {
        let updated = self
            .transition(
                actor,
                mailing_id,
                Action::Cancel,
                &[MailingStatus::New, MailingStatus::Sent],
                MailingStatus::Declined,
            )
            .await?;

        info!("Mailing {} cancelled by {}", mailing_id, actor.user_id);
        Ok(updated)
    }

    /// Put a declined mailing back in the queue
    pub async fn reactivate(
        &self,
        actor: &Actor,
        mailing_id: MailingId,
    ) -> Result<Mailing, MailingError> {
        let updated = self
            .transition(
                actor,
                mailing_id,
                Action::Reactivate,
                &[MailingStatus::Declined],
                MailingStatus::New,
            )
            .await?;

        info!(
            "Mailing {} reactivated by {}, next run {}",
            mailing_id, actor.user_id, updated.scheduled_time
        );
        Ok(updated)
    }

    /// Most recent attempts, newest first
    pub async fn attempts(
        &self,
        actor: &Actor,
        mailing_id: MailingId,
        limit: u32,
    ) -> Result<Vec<MailingAttempt>, MailingError> {
        self.authorized(actor, mailing_id, Action::View).await?;
        Ok(self.store.attempts_of(mailing_id, i64::from(limit)).await?)
    }

    pub async fn stats(&self) -> Result<MailingStats, MailingError> {
        Ok(self.store.stats().await?)
    }

    async fn authorized(
        &self,
        actor: &Actor,
        mailing_id: MailingId,
        action: Action,
    ) -> Result<Mailing, MailingError> {
        let mailing = self
            .store
            .get_mailing(mailing_id)
            .await?
            .ok_or(MailingError::NotFound)?;

        if !can(actor, action, Resource::Mailing(&mailing)) {
            return Err(MailingError::Forbidden(action));
        }
        Ok(mailing)
    }

    async fn transition(
        &self,
        actor: &Actor,
        mailing_id: MailingId,
        action: Action,
        from: &[MailingStatus],
        to: MailingStatus,
    ) -> Result<Mailing, MailingError> {
        let mailing = self.authorized(actor, mailing_id, action).await?;

        if !mailing.status_enum().is_some_and(|s| from.contains(&s)) {
            return Err(MailingError::InvalidTransition {
                current: mailing.status,
                target: to,
            });
        }

        // The status check is repeated in the write in case a cycle got there first
        match self.store.transition_status(mailing_id, from, to).await? {
            Some(updated) => Ok(updated),
            None => {
                let current = self
                    .store
                    .get_mailing(mailing_id)
                    .await?
                    .ok_or(MailingError::NotFound)?;
                Err(MailingError::InvalidTransition {
                    current: current.status,
                    target: to,
                })
            }
        }
    }
}
