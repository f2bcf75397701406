//! Client side of Tandem: a typed HTTP client, the realtime socket, and
//! the session state a UI renders from.

pub mod api;
pub mod error;
pub mod realtime;
pub mod session;

pub use api::ApiClient;
pub use error::ClientError;
pub use realtime::RealtimeConnection;
pub use session::{Notification, Session, SessionState};
