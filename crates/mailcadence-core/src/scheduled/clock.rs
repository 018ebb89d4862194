//! Clock - the dispatcher's source of "now"

use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use mailcadence_common::config::SchedulerConfig;
use std::sync::{PoisonError, RwLock};

/// Supplies the current time in the configured timezone
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Tz>;
}

/// Wall clock
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    tz: Tz,
}

impl SystemClock {
    pub fn new(tz: Tz) -> Self {
        Self { tz }
    }

    /// Build from configuration; an unknown timezone is a configuration error
    pub fn from_config(config: &SchedulerConfig) -> mailcadence_common::Result<Self> {
        Ok(Self::new(config.tz()?))
    }
}

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Tz> {
        Utc::now().with_timezone(&self.tz)
    }
}

/// Manually driven clock for tests and dry runs
#[derive(Debug)]
pub struct FixedClock {
    tz: Tz,
    instant: RwLock<DateTime<Utc>>,
}

impl FixedClock {
    pub fn new(instant: DateTime<Utc>, tz: Tz) -> Self {
        Self {
            tz,
            instant: RwLock::new(instant),
        }
    }

    pub fn utc(instant: DateTime<Utc>) -> Self {
        Self::new(instant, Tz::UTC)
    }

    pub fn advance(&self, by: Duration) {
        let mut instant = self.instant.write().unwrap_or_else(PoisonError::into_inner);
        *instant += by;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Tz> {
        self.instant
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .with_timezone(&self.tz)
    }
}
