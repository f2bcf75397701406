//! # tandem-shared
//!
//! Types shared by the Tandem server and client: identifiers, domain
//! records, the realtime wire protocol and the HTTP request/response
//! bodies.

pub mod api;
pub mod constants;
pub mod error;
pub mod models;
pub mod protocol;
pub mod types;

pub use error::ProtocolError;
