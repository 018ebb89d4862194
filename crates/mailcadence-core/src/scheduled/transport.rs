//! Mail transports - one message, one recipient per send

use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use mailcadence_common::config::{Config, SmtpConfig, TransportKind};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

/// A single outgoing message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingEmail {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// Expected delivery failures; recorded on the attempt, never propagated
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Invalid address {address}: {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("Failed to build email: {0}")]
    Build(String),

    #[error("Permanent failure: {0}")]
    Permanent(String),

    #[error("Temporary failure: {0}")]
    Temporary(String),

    #[error("Send timed out after {0:?}")]
    Timeout(Duration),
}

/// Mail transport trait
#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn send(&self, email: &OutgoingEmail) -> Result<(), TransportError>;
}

/// SMTP relay transport
pub struct SmtpTransport {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpTransport {
    /// Build the relay connection settings; nothing is contacted yet
    pub fn from_config(config: &SmtpConfig) -> mailcadence_common::Result<Self> {
        let builder = if config.use_tls {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)
        } else if config.use_starttls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
        } else {
            Ok(AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host))
        };
        let builder = builder.map_err(|e| {
            mailcadence_common::Error::Config(format!("Failed to create SMTP transport: {}", e))
        })?;

        let mut builder = builder
            .port(config.port)
            .timeout(Some(Duration::from_secs(config.timeout_secs)));

        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        info!(
            host = %config.host,
            port = config.port,
            tls = config.use_tls,
            starttls = config.use_starttls,
            "SMTP transport configured"
        );

        Ok(Self {
            mailer: builder.build(),
        })
    }

    fn build_message(email: &OutgoingEmail) -> Result<Message, TransportError> {
        let from: Mailbox = email.from.parse().map_err(|e: lettre::address::AddressError| {
            TransportError::InvalidAddress {
                address: email.from.clone(),
                reason: e.to_string(),
            }
        })?;
        let to: Mailbox = email.to.parse().map_err(|e: lettre::address::AddressError| {
            TransportError::InvalidAddress {
                address: email.to.clone(),
                reason: e.to_string(),
            }
        })?;

        Message::builder()
            .from(from)
            .to(to)
            .subject(&email.subject)
            .header(ContentType::TEXT_PLAIN)
            .body(email.body.clone())
            .map_err(|e| TransportError::Build(e.to_string()))
    }
}

#[async_trait]
impl MailTransport for SmtpTransport {
    async fn send(&self, email: &OutgoingEmail) -> Result<(), TransportError> {
        let message = Self::build_message(email)?;

        match self.mailer.send(message).await {
            Ok(response) => {
                debug!(to = %email.to, code = %response.code(), "SMTP accepted message");
                Ok(())
            }
            Err(e) if e.is_permanent() => Err(TransportError::Permanent(e.to_string())),
            Err(e) => Err(TransportError::Temporary(e.to_string())),
        }
    }
}

/// Logs messages instead of delivering them
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleTransport;

#[async_trait]
impl MailTransport for ConsoleTransport {
    async fn send(&self, email: &OutgoingEmail) -> Result<(), TransportError> {
        info!(
            from = %email.from,
            to = %email.to,
            subject = %email.subject,
            body_len = email.body.len(),
            "Console transport: message not delivered"
        );
        Ok(())
    }
}

/// Check the sender with the same parser used when building messages
pub fn validate_sender(address: &str) -> mailcadence_common::Result<Mailbox> {
    address.parse().map_err(|e: lettre::address::AddressError| {
        mailcadence_common::Error::Config(format!(
            "Invalid sender address {:?}: {}",
            address, e
        ))
    })
}

/// Pick the transport named in the configuration.
///
/// An unusable sender address is a configuration error here rather than a
/// failed attempt on every recipient later.
pub fn build_transport(config: &Config) -> mailcadence_common::Result<Arc<dyn MailTransport>> {
    validate_sender(&config.smtp.from_address)?;

    match config.scheduler.transport {
        TransportKind::Smtp => Ok(Arc::new(SmtpTransport::from_config(&config.smtp)?)),
        TransportKind::Console => Ok(Arc::new(ConsoleTransport)),
    }
}
