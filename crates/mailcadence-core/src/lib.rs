//! Mailcadence Core - Mailing dispatch and scheduling
//!
//! This crate sends due mailings to their clients, records every delivery
//! attempt, and reschedules periodic mailings. The scheduler drives the
//! dispatch engine on a fixed interval.

pub mod access;
pub mod scheduled;

pub use access::{can, Action, Actor, Resource};
pub use scheduled::{
    build_transport, Clock, CycleReport, DispatchEngine, MailTransport, MailingError,
    MailingManager, Scheduler, SchedulerError, SystemClock,
};
