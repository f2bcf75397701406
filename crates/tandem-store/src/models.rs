//! Store-side records.
//!
//! The public shapes (`UserProfile`, `Message`, the request entries) live in
//! `tandem-shared` so the client sees exactly what the server persists. The
//! types here exist only on the server side of that boundary.

use chrono::{DateTime, SecondsFormat, Utc};

pub use tandem_shared::models::{
    Message, MessageContent, ReceivedRequest, SentRequest, UserProfile, UserSummary,
};
pub use tandem_shared::types::{MessageId, RequestId, RequestStatus, UserId};

// ---------------------------------------------------------------------------
// User
// ---------------------------------------------------------------------------

/// A stored account: the public profile plus the password credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    pub profile: UserProfile,
    /// Argon2 PHC string. Opaque to the store.
    pub password_hash: String,
}

/// Fields accepted by a profile update. `None` leaves a column unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileUpdate {
    pub full_name: Option<String>,
    pub bio: Option<String>,
    pub avatar: Option<String>,
}

// ---------------------------------------------------------------------------
// Timestamps
// ---------------------------------------------------------------------------

/// Fixed-width RFC-3339 so lexical order in SQLite matches time order.
pub(crate) fn encode_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn decode_ts(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

// ---------------------------------------------------------------------------
// Row decoding
// ---------------------------------------------------------------------------

/// Read a UUID stored as TEXT, reporting a conversion failure for the column.
pub(crate) fn uuid_col(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<uuid::Uuid> {
    let s: String = row.get(idx)?;
    uuid::Uuid::parse_str(&s).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

/// Read a required RFC-3339 timestamp column.
pub(crate) fn ts_col(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let s: String = row.get(idx)?;
    decode_ts(&s).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            rusqlite::types::Type::Text,
            format!("invalid timestamp: {s}").into(),
        )
    })
}

/// Read a request status column.
pub(crate) fn status_col(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<RequestStatus> {
    let s: String = row.get(idx)?;
    s.parse::<RequestStatus>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}
