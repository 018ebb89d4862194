//! Shared fixtures for dispatch tests

use super::clock::Clock;
use super::transport::{MailTransport, OutgoingEmail, TransportError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use mailcadence_common::types::ClientId;
use mailcadence_storage::models::{Client, CreateClient, CreateMailing, Mailing, Periodicity};
use mailcadence_storage::InMemoryMailingStore;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use uuid::Uuid;

/// Transport that fails for chosen recipients and records the rest
#[derive(Default)]
pub(crate) struct ScriptedTransport {
    failing: HashSet<String>,
    delay: Option<Duration>,
    sent: Mutex<Vec<OutgoingEmail>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedTransport {
    pub(crate) fn failing(addresses: &[&str]) -> Self {
        Self {
            failing: addresses.iter().map(|a| a.to_string()).collect(),
            ..Self::default()
        }
    }

    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub(crate) fn sent(&self) -> Vec<OutgoingEmail> {
        self.sent.lock().unwrap().clone()
    }

    pub(crate) fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MailTransport for ScriptedTransport {
    async fn send(&self, email: &OutgoingEmail) -> Result<(), TransportError> {
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.failing.contains(&email.to) {
            return Err(TransportError::Permanent(format!(
                "550 mailbox unavailable: {}",
                email.to
            )));
        }
        self.sent.lock().unwrap().push(email.clone());
        Ok(())
    }
}

/// Fixed instant that counts how often it is read
pub(crate) struct CountingClock {
    instant: DateTime<Utc>,
    reads: AtomicUsize,
}

impl CountingClock {
    pub(crate) fn new(instant: DateTime<Utc>) -> Self {
        Self {
            instant,
            reads: AtomicUsize::new(0),
        }
    }

    pub(crate) fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

impl Clock for CountingClock {
    fn now(&self) -> DateTime<Tz> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.instant.with_timezone(&Tz::UTC)
    }
}

pub(crate) async fn client(store: &InMemoryMailingStore, email: &str) -> Client {
    store
        .insert_client(CreateClient {
            owner_id: Uuid::nil(),
            email: email.to_string(),
            last_name: "Ivanova".to_string(),
            first_name: "Maria".to_string(),
            second_name: None,
            comment: None,
        })
        .await
        .unwrap()
}

pub(crate) async fn mailing(
    store: &InMemoryMailingStore,
    scheduled_time: DateTime<Utc>,
    periodicity: Option<Periodicity>,
    client_ids: Vec<ClientId>,
) -> Mailing {
    store
        .insert_mailing(CreateMailing {
            owner_id: Uuid::nil(),
            title: "Monthly news".to_string(),
            message: "What happened this month".to_string(),
            scheduled_time,
            periodicity,
            client_ids,
        })
        .await
        .unwrap()
}
