//! Dispatch Engine - One pass over the due mailings

use super::clock::Clock;
use super::transport::{MailTransport, OutgoingEmail, TransportError};
use chrono::{DateTime, Utc};
use mailcadence_common::Result;
use mailcadence_storage::models::{
    Client, CreateMailingAttempt, DispatchUpdate, Mailing, MailingStatus, Periodicity,
};
use mailcadence_storage::repository::MailingStore;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Default upper bound for a single send
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(30);

/// Summary of one dispatch cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    /// Mailings with scheduled time at or before now
    pub due: usize,
    /// Declined or finished mailings left untouched
    pub skipped: usize,
    /// Mailings whose outcome was written back
    pub dispatched: usize,
    /// Mailings edited concurrently; their outcome was discarded
    pub conflicts: usize,
    /// Mailings abandoned because of a persistence error
    pub failed: usize,
    pub attempts_sent: usize,
    pub attempts_declined: usize,
}

/// Result of dispatching a single mailing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MailingOutcome {
    pub status: MailingStatus,
    pub scheduled_time: DateTime<Utc>,
    pub sent: usize,
    pub declined: usize,
    /// False when the mailing changed underneath the cycle
    pub applied: bool,
}

/// Next dispatch time after an aggregate outcome.
///
/// Only a successful periodic mailing moves forward, counted from `now`.
pub fn next_scheduled_time(
    status: MailingStatus,
    periodicity: Option<Periodicity>,
    now: DateTime<Utc>,
    current: DateTime<Utc>,
) -> DateTime<Utc> {
    match (status, periodicity) {
        (MailingStatus::Sent, Some(periodicity)) => now + periodicity.offset(),
        _ => current,
    }
}

/// Dispatch engine
pub struct DispatchEngine {
    store: Arc<dyn MailingStore>,
    transport: Arc<dyn MailTransport>,
    clock: Arc<dyn Clock>,
    from_address: String,
    send_timeout: Duration,
}

impl DispatchEngine {
    /// Create a new dispatch engine
    pub fn new(
        store: Arc<dyn MailingStore>,
        transport: Arc<dyn MailTransport>,
        clock: Arc<dyn Clock>,
        from_address: impl Into<String>,
    ) -> Self {
        Self {
            store,
            transport,
            clock,
            from_address: from_address.into(),
            send_timeout: DEFAULT_SEND_TIMEOUT,
        }
    }

    /// Set the per-send timeout
    pub fn with_send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = timeout;
        self
    }

    /// Run one dispatch cycle.
    ///
    /// Transport failures end up on attempt records. A persistence error on
    /// one mailing is logged and the cycle moves on; only a failing due-query
    /// aborts the cycle.
    pub async fn run_cycle(&self) -> Result<CycleReport> {
        let now_local = self.clock.now();
        let now = now_local.with_timezone(&Utc);

        let mailings = self.store.due_mailings(now).await?;
        let mut report = CycleReport {
            due: mailings.len(),
            ..CycleReport::default()
        };

        if mailings.is_empty() {
            debug!("No mailings due at {}", now_local);
            return Ok(report);
        }

        debug!("Processing {} due mailings at {}", mailings.len(), now_local);

        for mailing in &mailings {
            if !mailing.is_dispatchable() {
                debug!(
                    "Skipping mailing {} in status {} (periodicity: {:?})",
                    mailing.id, mailing.status, mailing.periodicity
                );
                report.skipped += 1;
                continue;
            }

            match self.dispatch_mailing(mailing, now).await {
                Ok(outcome) => {
                    report.attempts_sent += outcome.sent;
                    report.attempts_declined += outcome.declined;
                    if outcome.applied {
                        report.dispatched += 1;
                    } else {
                        report.conflicts += 1;
                    }
                }
                Err(e) => {
                    error!("Failed to persist dispatch of mailing {}: {}", mailing.id, e);
                    report.failed += 1;
                }
            }
        }

        if report.dispatched > 0 || report.failed > 0 {
            info!(
                due = report.due,
                dispatched = report.dispatched,
                skipped = report.skipped,
                conflicts = report.conflicts,
                failed = report.failed,
                sent = report.attempts_sent,
                declined = report.attempts_declined,
                "Dispatch cycle finished"
            );
        }

        Ok(report)
    }

    /// Send a mailing to all of its clients and write the outcome back
    pub async fn dispatch_mailing(
        &self,
        mailing: &Mailing,
        now: DateTime<Utc>,
    ) -> Result<MailingOutcome> {
        let clients = self.store.clients_of(mailing.id).await?;

        if clients.is_empty() {
            info!(
                "Mailing {} has no recipients, treating as delivered",
                mailing.id
            );
        }

        let mut sent = 0;
        let mut declined = 0;

        for client in &clients {
            let (status, log_message) = match self.deliver(mailing, client).await {
                Ok(()) => {
                    info!("Mailing {} sent to {}", mailing.id, client.email);
                    sent += 1;
                    (
                        MailingStatus::Sent,
                        format!("Sent to {} <{}>", client.full_name(), client.email),
                    )
                }
                Err(e) => {
                    warn!("Mailing {} to {} failed: {}", mailing.id, client.email, e);
                    declined += 1;
                    (
                        MailingStatus::Declined,
                        format!("Failed to send to {}: {}", client.email, e),
                    )
                }
            };

            self.store
                .record_attempt(CreateMailingAttempt {
                    mailing_id: mailing.id,
                    client_id: Some(client.id),
                    status,
                    log_message: Some(log_message),
                })
                .await?;
        }

        let status = if declined == 0 {
            MailingStatus::Sent
        } else {
            MailingStatus::Declined
        };
        let scheduled_time = next_scheduled_time(
            status,
            mailing.periodicity_enum(),
            now,
            mailing.scheduled_time,
        );

        let applied = self
            .store
            .apply_dispatch(DispatchUpdate {
                mailing_id: mailing.id,
                expected_version: mailing.version,
                status,
                scheduled_time,
            })
            .await?;

        if applied {
            debug!(
                "Mailing {} is now {} (next run {})",
                mailing.id, status, scheduled_time
            );
        } else {
            warn!(
                "Mailing {} was modified during dispatch; keeping the concurrent edit",
                mailing.id
            );
        }

        Ok(MailingOutcome {
            status,
            scheduled_time,
            sent,
            declined,
            applied,
        })
    }

    /// One bounded send
    async fn deliver(
        &self,
        mailing: &Mailing,
        client: &Client,
    ) -> std::result::Result<(), TransportError> {
        let email = OutgoingEmail {
            from: self.from_address.clone(),
            to: client.email.clone(),
            subject: mailing.title.clone(),
            body: mailing.message.clone(),
        };

        match tokio::time::timeout(self.send_timeout, self.transport.send(&email)).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout(self.send_timeout)),
        }
    }
}
