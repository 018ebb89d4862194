//! Common types for Mailcadence

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for accounts owning clients and mailings
pub type UserId = Uuid;

/// Unique identifier for clients
pub type ClientId = Uuid;

/// Unique identifier for mailings
pub type MailingId = Uuid;

/// Unique identifier for mailing attempts
pub type MailingAttemptId = Uuid;

/// Email address
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EmailAddress {
    pub local: String,
    pub domain: String,
}

impl EmailAddress {
    /// Create a new email address
    pub fn new(local: impl Into<String>, domain: impl Into<String>) -> Self {
        Self {
            local: local.into(),
            domain: domain.into(),
        }
    }

    /// Parse an email address from a string
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        let (local, domain) = s.split_once('@')?;
        if local.is_empty() || domain.is_empty() || domain.contains('@') {
            return None;
        }
        if s.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return None;
        }
        Some(Self::new(local, domain))
    }
}

impl std::fmt::Display for EmailAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.local, self.domain)
    }
}

impl std::str::FromStr for EmailAddress {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
            .ok_or_else(|| crate::Error::Validation(format!("Invalid email address: {}", s)))
    }
}

/// Account role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    /// Regular account; manages its own clients and mailings
    User,
    /// Oversees every mailing and may disable them
    Manager,
    /// Maintains blog content only
    ContentManager,
}

impl std::fmt::Display for UserRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UserRole::User => write!(f, "user"),
            UserRole::Manager => write!(f, "manager"),
            UserRole::ContentManager => write!(f, "content_manager"),
        }
    }
}

impl std::str::FromStr for UserRole {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(UserRole::User),
            "manager" => Ok(UserRole::Manager),
            "content_manager" => Ok(UserRole::ContentManager),
            _ => Err(crate::Error::Validation(format!("Invalid user role: {}", s))),
        }
    }
}
