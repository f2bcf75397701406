//! The two request collections.
//!
//! `friend_requests` holds what a user has received, `sent_requests` what
//! they have sent. A request lives in both, under the same id, owned by the
//! target and the sender respectively. The helpers below touch exactly one
//! side; keeping the pair in step is the caller's job.

use rusqlite::{params, OptionalExtension};

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::{
    encode_ts, status_col, ts_col, uuid_col, ReceivedRequest, RequestId, RequestStatus,
    SentRequest, UserId,
};

impl Database {
    /// Append to `owner`'s received collection. A second pending request
    /// from the same sender is rejected with [`StoreError::Conflict`].
    pub fn insert_received_request(&self, owner: UserId, req: &ReceivedRequest) -> Result<()> {
        self.conn()
            .execute(
                "INSERT INTO friend_requests (id, owner_id, from_id, status, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    req.id.to_string(),
                    owner.to_string(),
                    req.from.to_string(),
                    req.status.as_str(),
                    encode_ts(&req.created_at),
                ],
            )
            .map_err(|e| StoreError::from_write(e, "pending request already exists"))?;
        Ok(())
    }

    /// Append to `owner`'s sent collection.
    pub fn insert_sent_request(&self, owner: UserId, req: &SentRequest) -> Result<()> {
        self.conn()
            .execute(
                "INSERT INTO sent_requests (id, owner_id, to_id, status, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    req.id.to_string(),
                    owner.to_string(),
                    req.to.to_string(),
                    req.status.as_str(),
                    encode_ts(&req.created_at),
                ],
            )
            .map_err(|e| StoreError::from_write(e, "sent request already exists"))?;
        Ok(())
    }

    /// Remove a received entry. Used to roll back a half-written send.
    pub fn delete_received_request(&self, owner: UserId, id: RequestId) -> Result<bool> {
        let affected = self.conn().execute(
            "DELETE FROM friend_requests WHERE owner_id = ?1 AND id = ?2",
            params![owner.to_string(), id.to_string()],
        )?;
        Ok(affected > 0)
    }

    /// Whether a pending request from `from` to `to` currently exists.
    pub fn has_pending_request(&self, from: UserId, to: UserId) -> Result<bool> {
        let found: Option<i64> = self
            .conn()
            .query_row(
                "SELECT 1 FROM friend_requests
                 WHERE owner_id = ?1 AND from_id = ?2 AND status = 'pending'",
                params![to.to_string(), from.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// The pending entry `id` in `owner`'s received collection, if any.
    pub fn find_pending_received(
        &self,
        owner: UserId,
        id: RequestId,
    ) -> Result<Option<ReceivedRequest>> {
        let req = self
            .conn()
            .query_row(
                "SELECT id, from_id, status, created_at FROM friend_requests
                 WHERE owner_id = ?1 AND id = ?2 AND status = 'pending'",
                params![owner.to_string(), id.to_string()],
                row_to_received,
            )
            .optional()?;
        Ok(req)
    }

    /// Move a received entry out of `pending`. Returns `false` when the entry
    /// is missing or no longer pending, so two racing transitions cannot both
    /// succeed.
    pub fn resolve_received_request(
        &self,
        owner: UserId,
        id: RequestId,
        status: RequestStatus,
    ) -> Result<bool> {
        let affected = self.conn().execute(
            "UPDATE friend_requests SET status = ?3
             WHERE owner_id = ?1 AND id = ?2 AND status = 'pending'",
            params![owner.to_string(), id.to_string(), status.as_str()],
        )?;
        Ok(affected > 0)
    }

    /// Move a sent entry out of `pending`. Same contract as
    /// [`Database::resolve_received_request`].
    pub fn resolve_sent_request(
        &self,
        owner: UserId,
        id: RequestId,
        status: RequestStatus,
    ) -> Result<bool> {
        let affected = self.conn().execute(
            "UPDATE sent_requests SET status = ?3
             WHERE owner_id = ?1 AND id = ?2 AND status = 'pending'",
            params![owner.to_string(), id.to_string(), status.as_str()],
        )?;
        Ok(affected > 0)
    }

    /// `owner`'s received collection in insertion order.
    pub fn list_received_requests(&self, owner: UserId) -> Result<Vec<ReceivedRequest>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, from_id, status, created_at FROM friend_requests
             WHERE owner_id = ?1 ORDER BY seq",
        )?;
        let rows = stmt.query_map(params![owner.to_string()], row_to_received)?;

        let mut reqs = Vec::new();
        for row in rows {
            reqs.push(row?);
        }
        Ok(reqs)
    }

    /// `owner`'s sent collection in insertion order.
    pub fn list_sent_requests(&self, owner: UserId) -> Result<Vec<SentRequest>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, to_id, status, created_at FROM sent_requests
             WHERE owner_id = ?1 ORDER BY seq",
        )?;
        let rows = stmt.query_map(params![owner.to_string()], row_to_sent)?;

        let mut reqs = Vec::new();
        for row in rows {
            reqs.push(row?);
        }
        Ok(reqs)
    }

    /// Sent entries still `pending` whose received counterpart has already
    /// reached a terminal status. Yields `(sender, id, terminal status)`.
    pub fn stale_sent_mirrors(&self) -> Result<Vec<(UserId, RequestId, RequestStatus)>> {
        let mut stmt = self.conn().prepare(
            "SELECT s.owner_id, s.id, r.status
             FROM sent_requests s
             JOIN friend_requests r
               ON r.id = s.id AND r.owner_id = s.to_id AND r.from_id = s.owner_id
             WHERE s.status = 'pending' AND r.status != 'pending'",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                UserId(uuid_col(row, 0)?),
                RequestId(uuid_col(row, 1)?),
                status_col(row, 2)?,
            ))
        })?;

        let mut stale = Vec::new();
        for row in rows {
            stale.push(row?);
        }
        Ok(stale)
    }
}

fn row_to_received(row: &rusqlite::Row<'_>) -> rusqlite::Result<ReceivedRequest> {
    Ok(ReceivedRequest {
        id: RequestId(uuid_col(row, 0)?),
        from: UserId(uuid_col(row, 1)?),
        status: status_col(row, 2)?,
        created_at: ts_col(row, 3)?,
    })
}

fn row_to_sent(row: &rusqlite::Row<'_>) -> rusqlite::Result<SentRequest> {
    Ok(SentRequest {
        id: RequestId(uuid_col(row, 0)?),
        to: UserId(uuid_col(row, 1)?),
        status: status_col(row, 2)?,
        created_at: ts_col(row, 3)?,
    })
}
