//! Database models

use chrono::{DateTime, Duration, Utc};
use mailcadence_common::types::{ClientId, MailingAttemptId, MailingId, UserId};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Mailing status, shared by mailings and their attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MailingStatus {
    New,
    Sent,
    Declined,
}

impl MailingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MailingStatus::New => "new",
            MailingStatus::Sent => "sent",
            MailingStatus::Declined => "declined",
        }
    }
}

impl std::fmt::Display for MailingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MailingStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "new" => Ok(MailingStatus::New),
            "sent" => Ok(MailingStatus::Sent),
            "declined" => Ok(MailingStatus::Declined),
            _ => Err(format!("Invalid mailing status: {}", s)),
        }
    }
}

/// Recurrence policy applied after a successful dispatch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Periodicity {
    Daily,
    Weekly,
    Monthly,
}

impl Periodicity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Periodicity::Daily => "daily",
            Periodicity::Weekly => "weekly",
            Periodicity::Monthly => "monthly",
        }
    }

    /// Fixed offset to the next dispatch. Months are always 30 days.
    pub fn offset(&self) -> Duration {
        match self {
            Periodicity::Daily => Duration::days(1),
            Periodicity::Weekly => Duration::days(7),
            Periodicity::Monthly => Duration::days(30),
        }
    }
}

impl std::fmt::Display for Periodicity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Periodicity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "daily" => Ok(Periodicity::Daily),
            "weekly" => Ok(Periodicity::Weekly),
            "monthly" => Ok(Periodicity::Monthly),
            _ => Err(format!("Invalid periodicity: {}", s)),
        }
    }
}

/// Client model
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Client {
    pub id: ClientId,
    pub owner_id: UserId,
    pub email: String,
    pub last_name: String,
    pub first_name: String,
    pub second_name: Option<String>,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Client {
    /// "Last First Second", skipping the missing second name
    pub fn full_name(&self) -> String {
        let mut name = format!("{} {}", self.last_name, self.first_name);
        if let Some(second) = self.second_name.as_deref().filter(|s| !s.is_empty()) {
            name.push(' ');
            name.push_str(second);
        }
        name
    }

    /// "Last F. S."
    pub fn initials(&self) -> String {
        let mut initials = self.last_name.clone();
        for part in [Some(self.first_name.as_str()), self.second_name.as_deref()]
            .into_iter()
            .flatten()
        {
            if let Some(c) = part.chars().next() {
                initials.push(' ');
                initials.push(c);
                initials.push('.');
            }
        }
        initials
    }
}

/// Create client input
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateClient {
    pub owner_id: UserId,
    pub email: String,
    pub last_name: String,
    pub first_name: String,
    pub second_name: Option<String>,
    pub comment: Option<String>,
}

/// Mailing model
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Mailing {
    pub id: MailingId,
    pub owner_id: UserId,
    pub title: String,
    pub message: String,
    pub status: String,
    pub scheduled_time: DateTime<Utc>,
    pub periodicity: Option<String>,
    /// Bumped on every write; dispatch updates are conditional on it
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Mailing {
    /// Get status enum
    pub fn status_enum(&self) -> Option<MailingStatus> {
        self.status.parse().ok()
    }

    /// Get periodicity enum; unknown values are treated as absent
    pub fn periodicity_enum(&self) -> Option<Periodicity> {
        self.periodicity.as_deref().and_then(|p| p.parse().ok())
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.scheduled_time <= now
    }

    /// Whether the dispatch cycle may deliver this mailing.
    ///
    /// Declined mailings are paused until someone reactivates them, and a
    /// sent mailing without periodicity is finished.
    pub fn is_dispatchable(&self) -> bool {
        match self.status_enum() {
            Some(MailingStatus::New) => true,
            Some(MailingStatus::Sent) => self.periodicity_enum().is_some(),
            Some(MailingStatus::Declined) | None => false,
        }
    }

    /// Active mailings are the ones still producing deliveries
    pub fn is_active(&self) -> bool {
        matches!(
            self.status_enum(),
            Some(MailingStatus::New) | Some(MailingStatus::Sent)
        )
    }
}

/// Create mailing input
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateMailing {
    pub owner_id: UserId,
    pub title: String,
    pub message: String,
    pub scheduled_time: DateTime<Utc>,
    pub periodicity: Option<Periodicity>,
    pub client_ids: Vec<ClientId>,
}

/// Update mailing input (user edits)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateMailing {
    pub title: Option<String>,
    pub message: Option<String>,
    pub scheduled_time: Option<DateTime<Utc>>,
    pub periodicity: Option<Option<Periodicity>>,
}

/// Outcome of one dispatch, written back as a single conditional update
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchUpdate {
    pub mailing_id: MailingId,
    /// Version read when the mailing was selected
    pub expected_version: i64,
    pub status: MailingStatus,
    pub scheduled_time: DateTime<Utc>,
}

/// Mailing attempt model (append-only audit record)
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct MailingAttempt {
    pub id: MailingAttemptId,
    pub mailing_id: MailingId,
    pub client_id: Option<ClientId>,
    pub status: String,
    pub log_message: Option<String>,
    pub attempted_at: DateTime<Utc>,
}

impl MailingAttempt {
    /// Get status enum
    pub fn status_enum(&self) -> Option<MailingStatus> {
        self.status.parse().ok()
    }
}

/// Create mailing attempt input
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateMailingAttempt {
    pub mailing_id: MailingId,
    pub client_id: Option<ClientId>,
    pub status: MailingStatus,
    pub log_message: Option<String>,
}

/// Overview counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MailingStats {
    pub total_mailings: i64,
    /// New plus sent
    pub active_mailings: i64,
    pub unique_clients: i64,
}
