//! # tandem-store
//!
//! Durable storage for Tandem, backed by SQLite.
//!
//! The crate exposes a synchronous `Database` handle that wraps a
//! `rusqlite::Connection` and provides typed CRUD helpers for users, the
//! friend graph, the mirrored request collections and direct messages.
//!
//! Each helper is a single statement. Nothing here spans two users in one
//! transaction; callers that need both sides of a relationship updated
//! issue two calls and handle a failure between them.

pub mod database;
pub mod friends;
pub mod messages;
pub mod migrations;
pub mod models;
pub mod requests;
pub mod users;

mod error;

pub use database::Database;
pub use error::StoreError;
pub use models::*;
