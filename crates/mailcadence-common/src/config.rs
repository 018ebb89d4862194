//! Configuration for Mailcadence

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable pointing at the configuration file
pub const CONFIG_ENV_VAR: &str = "MAILCADENCE_CONFIG";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Database configuration
    pub database: DatabaseConfig,

    /// Outbound SMTP configuration
    #[serde(default)]
    pub smtp: SmtpConfig,

    /// Dispatch scheduler configuration
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database backend: only "postgres" is supported
    #[serde(default = "default_db_backend")]
    pub backend: String,

    /// Database URL
    pub url: Option<String>,

    /// Maximum connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum connections
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
}

fn default_db_backend() -> String {
    "postgres".to_string()
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    1
}

/// Outbound SMTP configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmtpConfig {
    /// Relay host
    #[serde(default = "default_smtp_host")]
    pub host: String,

    /// Relay port
    #[serde(default = "default_smtp_port")]
    pub port: u16,

    /// Username for SMTP AUTH
    pub username: Option<String>,

    /// Password for SMTP AUTH
    pub password: Option<String>,

    /// Implicit TLS (SMTPS)
    #[serde(default)]
    pub use_tls: bool,

    /// Upgrade with STARTTLS
    #[serde(default = "default_use_starttls")]
    pub use_starttls: bool,

    /// Sender address used for every mailing
    #[serde(default)]
    pub from_address: String,

    /// Connection timeout in seconds
    #[serde(default = "default_smtp_timeout")]
    pub timeout_secs: u64,
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            host: default_smtp_host(),
            port: default_smtp_port(),
            username: None,
            password: None,
            use_tls: false,
            use_starttls: default_use_starttls(),
            from_address: String::new(),
            timeout_secs: default_smtp_timeout(),
        }
    }
}

fn default_smtp_host() -> String {
    "localhost".to_string()
}

fn default_smtp_port() -> u16 {
    587
}

fn default_use_starttls() -> bool {
    true
}

fn default_smtp_timeout() -> u64 {
    30
}

/// Which transport delivers mailings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    /// Real delivery through the configured SMTP relay
    Smtp,
    /// Log messages instead of sending them
    Console,
}

impl Default for TransportKind {
    fn default() -> Self {
        TransportKind::Smtp
    }
}

/// Dispatch scheduler configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Seconds between dispatch cycles
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    /// Delay before the scheduler starts after boot
    #[serde(default = "default_startup_delay_secs")]
    pub startup_delay_secs: u64,

    /// IANA timezone used to read the clock
    #[serde(default = "default_timezone")]
    pub timezone: String,

    /// Upper bound for a single send
    #[serde(default = "default_send_timeout_secs")]
    pub send_timeout_secs: u64,

    /// Transport used for delivery
    #[serde(default)]
    pub transport: TransportKind,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            startup_delay_secs: default_startup_delay_secs(),
            timezone: default_timezone(),
            send_timeout_secs: default_send_timeout_secs(),
            transport: TransportKind::default(),
        }
    }
}

fn default_interval_secs() -> u64 {
    10
}

fn default_startup_delay_secs() -> u64 {
    2
}

fn default_timezone() -> String {
    "UTC".to_string()
}

fn default_send_timeout_secs() -> u64 {
    30
}

impl SchedulerConfig {
    /// Parse the configured timezone
    pub fn tz(&self) -> crate::Result<Tz> {
        self.timezone
            .parse::<Tz>()
            .map_err(|e| {
                crate::Error::Config(format!("Invalid timezone '{}': {}", self.timezone, e))
            })
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: "json" or "text"
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

impl Config {
    /// Load configuration from file
    pub fn from_file(path: &Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| crate::Error::Config(format!("Failed to read config file: {}", e)))?;

        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string
    pub fn from_toml(content: &str) -> crate::Result<Self> {
        toml::from_str(content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))
    }

    /// Load configuration from an explicit path, the environment, or default locations
    pub fn load(explicit: Option<&Path>) -> crate::Result<Self> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }

        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            return Self::from_file(Path::new(&path));
        }

        let paths = [
            PathBuf::from("./config.toml"),
            PathBuf::from("/etc/mailcadence/config.toml"),
        ];

        for path in paths {
            if path.exists() {
                return Self::from_file(&path);
            }
        }

        Err(crate::Error::Config(
            "No configuration file found".to_string(),
        ))
    }

    /// Reject configurations the dispatcher cannot run with.
    pub fn validate(&self) -> crate::Result<()> {
        if self.database.backend != "postgres" {
            return Err(crate::Error::Config(format!(
                "Unsupported database backend: {}",
                self.database.backend
            )));
        }

        if self.database.url.as_deref().map_or(true, str::is_empty) {
            return Err(crate::Error::Config(
                "Database URL required for PostgreSQL".to_string(),
            ));
        }

        self.scheduler.tz()?;

        if self.scheduler.interval_secs == 0 {
            return Err(crate::Error::Config(
                "scheduler.interval_secs must be greater than zero".to_string(),
            ));
        }

        if self.scheduler.send_timeout_secs == 0 {
            return Err(crate::Error::Config(
                "scheduler.send_timeout_secs must be greater than zero".to_string(),
            ));
        }

        if crate::types::EmailAddress::parse(&self.smtp.from_address).is_none() {
            return Err(crate::Error::Config(format!(
                "smtp.from_address is not a valid address: '{}'",
                self.smtp.from_address
            )));
        }

        if self.scheduler.transport == TransportKind::Smtp {
            if self.smtp.host.is_empty() {
                return Err(crate::Error::Config("smtp.host is required".to_string()));
            }
            if self.smtp.username.is_some() != self.smtp.password.is_some() {
                return Err(crate::Error::Config(
                    "smtp.username and smtp.password must be set together".to_string(),
                ));
            }
        }

        Ok(())
    }
}
