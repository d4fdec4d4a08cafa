//! # reonika-store
//!
//! SQLite-backed reference implementation of the hosted platform's data
//! store for REonika.
//!
//! The crate exposes a synchronous `Database` handle that wraps a
//! `rusqlite::Connection` and provides typed CRUD helpers for profiles,
//! chats and ephemeral messages. Participant checks performed here stand in
//! for the platform's row-level security policies.

pub mod chats;
pub mod database;
pub mod messages;
pub mod migrations;
pub mod profiles;

mod error;
mod rows;

pub use database::Database;
pub use error::{Result, StoreError};
