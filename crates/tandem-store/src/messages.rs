use std::collections::HashMap;

use rusqlite::params;

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::{decode_ts, encode_ts, uuid_col, Message, MessageContent, MessageId, UserId};

/// A row as read from disk, before the timestamp and content are validated.
struct RawMessage {
    id: MessageId,
    sender_id: UserId,
    receiver_id: UserId,
    text: Option<String>,
    image: Option<String>,
    seen: bool,
    created_at: Option<String>,
}

impl RawMessage {
    /// `None` when the row has no usable timestamp or no content.
    fn into_message(self) -> Option<Message> {
        let created_at = self.created_at.as_deref().and_then(decode_ts)?;
        let content = MessageContent::new(self.text, self.image).ok()?;
        Some(Message {
            id: self.id,
            sender_id: self.sender_id,
            receiver_id: self.receiver_id,
            content,
            seen: self.seen,
            created_at,
        })
    }
}

impl Database {
    pub fn insert_message(&self, message: &Message) -> Result<()> {
        self.conn().execute(
            "INSERT INTO messages (id, sender_id, receiver_id, text, image, seen, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                message.id.to_string(),
                message.sender_id.to_string(),
                message.receiver_id.to_string(),
                message.content.text(),
                message.content.image(),
                message.seen,
                encode_ts(&message.created_at),
            ],
        )?;
        Ok(())
    }

    pub fn get_message(&self, id: MessageId) -> Result<Message> {
        let raw = self
            .conn()
            .query_row(
                "SELECT id, sender_id, receiver_id, text, image, seen, created_at
                 FROM messages WHERE id = ?1",
                params![id.to_string()],
                row_to_raw,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })?;
        raw.into_message()
            .ok_or_else(|| StoreError::Corrupt(format!("message {id}")))
    }

    /// All messages exchanged between `a` and `b`, oldest first.
    ///
    /// Rows with a missing or unparseable timestamp (or no content) are
    /// skipped rather than failing the whole read.
    pub fn conversation(&self, a: UserId, b: UserId) -> Result<Vec<Message>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, sender_id, receiver_id, text, image, seen, created_at
             FROM messages
             WHERE (sender_id = ?1 AND receiver_id = ?2)
                OR (sender_id = ?2 AND receiver_id = ?1)
             ORDER BY created_at, rowid",
        )?;
        let rows = stmt.query_map(params![a.to_string(), b.to_string()], row_to_raw)?;

        let mut messages = Vec::new();
        for row in rows {
            let raw = row?;
            let id = raw.id;
            match raw.into_message() {
                Some(message) => messages.push(message),
                None => tracing::debug!(message = %id, "skipping message with invalid timestamp"),
            }
        }
        Ok(messages)
    }

    /// Mark every unseen message from `sender` to `receiver` as seen.
    /// Returns how many flipped.
    pub fn mark_conversation_seen(&self, receiver: UserId, sender: UserId) -> Result<usize> {
        let affected = self.conn().execute(
            "UPDATE messages SET seen = 1
             WHERE sender_id = ?1 AND receiver_id = ?2 AND seen = 0",
            params![sender.to_string(), receiver.to_string()],
        )?;
        Ok(affected)
    }

    /// Mark one message addressed to `receiver` as seen. Returns `false` if
    /// no such message exists for that receiver.
    pub fn mark_message_seen(&self, id: MessageId, receiver: UserId) -> Result<bool> {
        let affected = self.conn().execute(
            "UPDATE messages SET seen = 1 WHERE id = ?1 AND receiver_id = ?2",
            params![id.to_string(), receiver.to_string()],
        )?;
        Ok(affected > 0)
    }

    /// Unseen message count per sender for `receiver`. Senders with nothing
    /// unseen are absent.
    pub fn unseen_counts(&self, receiver: UserId) -> Result<HashMap<UserId, u32>> {
        let mut stmt = self.conn().prepare(
            "SELECT sender_id, COUNT(*) FROM messages
             WHERE receiver_id = ?1 AND seen = 0
             GROUP BY sender_id",
        )?;
        let rows = stmt.query_map(params![receiver.to_string()], |row| {
            Ok((UserId(uuid_col(row, 0)?), row.get::<_, u32>(1)?))
        })?;

        let mut counts = HashMap::new();
        for row in rows {
            let (sender, count) = row?;
            counts.insert(sender, count);
        }
        Ok(counts)
    }
}

fn row_to_raw(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawMessage> {
    Ok(RawMessage {
        id: MessageId(uuid_col(row, 0)?),
        sender_id: UserId(uuid_col(row, 1)?),
        receiver_id: UserId(uuid_col(row, 2)?),
        text: row.get(3)?,
        image: row.get(4)?,
        seen: row.get(5)?,
        created_at: row.get(6)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn message(from: UserId, to: UserId, text: &str, offset_secs: i64) -> Message {
        Message {
            id: MessageId::new(),
            sender_id: from,
            receiver_id: to,
            content: MessageContent::Text(text.to_string()),
            seen: false,
            created_at: Utc::now() + Duration::seconds(offset_secs),
        }
    }

    #[test]
    fn conversation_is_ordered_and_bidirectional() {
        let db = Database::open_in_memory().unwrap();
        let (a, b, c) = (UserId::new(), UserId::new(), UserId::new());

        db.insert_message(&message(a, b, "second", 2)).unwrap();
        db.insert_message(&message(b, a, "first", 1)).unwrap();
        db.insert_message(&message(a, c, "elsewhere", 0)).unwrap();

        let texts: Vec<_> = db
            .conversation(a, b)
            .unwrap()
            .into_iter()
            .map(|m| m.content.text().unwrap().to_string())
            .collect();
        assert_eq!(texts, vec!["first", "second"]);
    }

    #[test]
    fn invalid_timestamps_are_skipped() {
        let db = Database::open_in_memory().unwrap();
        let (a, b) = (UserId::new(), UserId::new());
        db.insert_message(&message(a, b, "ok", 0)).unwrap();

        db.conn()
            .execute(
                "INSERT INTO messages (id, sender_id, receiver_id, text, seen, created_at)
                 VALUES (?1, ?2, ?3, 'broken', 0, 'not-a-date'),
                        (?4, ?2, ?3, 'missing', 0, NULL)",
                params![
                    MessageId::new().to_string(),
                    a.to_string(),
                    b.to_string(),
                    MessageId::new().to_string(),
                ],
            )
            .unwrap();

        let convo = db.conversation(a, b).unwrap();
        assert_eq!(convo.len(), 1);
        assert_eq!(convo[0].content.text(), Some("ok"));
    }

    #[test]
    fn seen_flags_and_counts() {
        let db = Database::open_in_memory().unwrap();
        let (a, b) = (UserId::new(), UserId::new());
        let first = message(a, b, "1", 0);
        db.insert_message(&first).unwrap();
        db.insert_message(&message(a, b, "2", 1)).unwrap();
        db.insert_message(&message(b, a, "reply", 2)).unwrap();

        assert_eq!(db.unseen_counts(b).unwrap().get(&a), Some(&2));
        assert_eq!(db.unseen_counts(a).unwrap().get(&b), Some(&1));

        assert!(db.mark_message_seen(first.id, b).unwrap());
        assert!(!db.mark_message_seen(first.id, a).unwrap());
        assert!(db.get_message(first.id).unwrap().seen);
        assert_eq!(db.unseen_counts(b).unwrap().get(&a), Some(&1));

        assert_eq!(db.mark_conversation_seen(b, a).unwrap(), 1);
        assert_eq!(db.mark_conversation_seen(b, a).unwrap(), 0);
        assert!(db.unseen_counts(b).unwrap().is_empty());
    }
}
