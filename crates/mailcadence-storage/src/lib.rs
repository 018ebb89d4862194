//! Mailcadence Storage - Database access for mailings, clients and attempts
//!
//! This crate provides the PostgreSQL repositories and the `MailingStore`
//! abstraction the dispatcher works against, plus an in-memory store.

pub mod db;
pub mod memory;
pub mod models;
pub mod repository;

pub use db::DatabasePool;
pub use memory::InMemoryMailingStore;
pub use models::*;
pub use repository::*;
