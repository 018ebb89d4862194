//! Repository layer for data access

pub mod attempts;
pub mod clients;
pub mod mailings;
pub mod store;

pub use attempts::MailingAttemptRepository;
pub use clients::ClientRepository;
pub use mailings::MailingRepository;
pub use store::{DbMailingStore, MailingStore};
