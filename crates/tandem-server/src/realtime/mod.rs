//! Presence tracking and realtime delivery.
//!
//! The registry itself stays private to this module; everything else goes
//! through [`Dispatcher`].

mod dispatcher;
mod presence;
pub mod socket;

pub use dispatcher::{Connection, Dispatcher};
