//! Scheduled Dispatch Module - Mailing delivery engine and its periodic scheduler

mod clock;
mod engine;
mod manager;
mod scheduler;
mod transport;

#[cfg(test)]
pub(crate) mod test_support;

pub use clock::{Clock, FixedClock, SystemClock};
pub use engine::{
    next_scheduled_time, CycleReport, DispatchEngine, MailingOutcome, DEFAULT_SEND_TIMEOUT,
};
pub use manager::{MailingError, MailingManager};
pub use scheduler::{Scheduler, SchedulerError, DEFAULT_PERIOD};
pub use transport::{
    build_transport, validate_sender, ConsoleTransport, MailTransport, OutgoingEmail,
    SmtpTransport, TransportError,
};
