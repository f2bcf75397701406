use chrono::Utc;
use rusqlite::{params, OptionalExtension};

use crate::database::Database;
use crate::error::Result;
use crate::models::{encode_ts, ts_col, uuid_col, UserId, UserProfile};

impl Database {
    /// Add `friend` to `user`'s friend set. One direction only; the reverse
    /// edge is a separate call. Returns `false` if the edge already existed.
    pub fn add_friend(&self, user: UserId, friend: UserId) -> Result<bool> {
        let affected = self.conn().execute(
            "INSERT OR IGNORE INTO friends (user_id, friend_id, created_at)
             VALUES (?1, ?2, ?3)",
            params![user.to_string(), friend.to_string(), encode_ts(&Utc::now())],
        )?;
        Ok(affected > 0)
    }

    pub fn remove_friend(&self, user: UserId, friend: UserId) -> Result<bool> {
        let affected = self.conn().execute(
            "DELETE FROM friends WHERE user_id = ?1 AND friend_id = ?2",
            params![user.to_string(), friend.to_string()],
        )?;
        Ok(affected > 0)
    }

    /// Whether `friend` is in `user`'s friend set.
    pub fn is_friend(&self, user: UserId, friend: UserId) -> Result<bool> {
        let found: Option<i64> = self
            .conn()
            .query_row(
                "SELECT 1 FROM friends WHERE user_id = ?1 AND friend_id = ?2",
                params![user.to_string(), friend.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Profiles of `user`'s friends, oldest friendship first.
    pub fn list_friends(&self, user: UserId) -> Result<Vec<UserProfile>> {
        let mut stmt = self.conn().prepare(
            "SELECT u.id, u.email, u.full_name, u.bio, u.avatar, u.created_at
             FROM friends f
             JOIN users u ON u.id = f.friend_id
             WHERE f.user_id = ?1
             ORDER BY f.created_at, u.id",
        )?;
        let rows = stmt.query_map(params![user.to_string()], |row| {
            Ok(UserProfile {
                id: UserId(uuid_col(row, 0)?),
                email: row.get(1)?,
                full_name: row.get(2)?,
                bio: row.get(3)?,
                avatar: row.get(4)?,
                created_at: ts_col(row, 5)?,
            })
        })?;

        let mut friends = Vec::new();
        for row in rows {
            friends.push(row?);
        }
        Ok(friends)
    }

    /// Every directed friend edge whose reverse edge is missing.
    pub fn one_sided_friendships(&self) -> Result<Vec<(UserId, UserId)>> {
        let mut stmt = self.conn().prepare(
            "SELECT a.user_id, a.friend_id
             FROM friends a
             WHERE a.user_id != a.friend_id
               AND NOT EXISTS (SELECT 1 FROM friends b
                               WHERE b.user_id = a.friend_id AND b.friend_id = a.user_id)",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((UserId(uuid_col(row, 0)?), UserId(uuid_col(row, 1)?)))
        })?;

        let mut edges = Vec::new();
        for row in rows {
            edges.push(row?);
        }
        Ok(edges)
    }

    /// Users listed in their own friend set.
    pub fn self_friendships(&self) -> Result<Vec<UserId>> {
        let mut stmt = self
            .conn()
            .prepare("SELECT user_id FROM friends WHERE user_id = friend_id")?;
        let rows = stmt.query_map([], |row| uuid_col(row, 0).map(UserId))?;

        let mut ids = Vec::new();
        for row in rows {
            ids.push(row?);
        }
        Ok(ids)
    }
}
