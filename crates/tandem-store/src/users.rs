use rusqlite::{params, OptionalExtension};

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::{
    encode_ts, ts_col, uuid_col, ProfileUpdate, UserId, UserProfile, UserRecord,
};

const USER_COLUMNS: &str = "id, email, full_name, bio, avatar, password_hash, created_at";

impl Database {
    /// Insert a new account. A second account with the same email (case
    /// insensitive) is rejected with [`StoreError::Conflict`].
    pub fn insert_user(&self, record: &UserRecord) -> Result<()> {
        let p = &record.profile;
        self.conn()
            .execute(
                "INSERT INTO users (id, email, full_name, bio, avatar, password_hash, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    p.id.to_string(),
                    p.email,
                    p.full_name,
                    p.bio,
                    p.avatar,
                    record.password_hash,
                    encode_ts(&p.created_at),
                ],
            )
            .map_err(|e| StoreError::from_write(e, "email already registered"))?;
        Ok(())
    }

    pub fn get_user(&self, id: UserId) -> Result<UserRecord> {
        self.conn()
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
                params![id.to_string()],
                row_to_user,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })
    }

    pub fn get_profile(&self, id: UserId) -> Result<UserProfile> {
        self.get_user(id).map(|u| u.profile)
    }

    pub fn user_exists(&self, id: UserId) -> Result<bool> {
        let found: Option<i64> = self
            .conn()
            .query_row(
                "SELECT 1 FROM users WHERE id = ?1",
                params![id.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    pub fn find_user_by_email(&self, email: &str) -> Result<Option<UserRecord>> {
        let user = self
            .conn()
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?1"),
                params![email.trim()],
                row_to_user,
            )
            .optional()?;
        Ok(user)
    }

    /// Apply the supplied profile fields and return the updated profile.
    pub fn update_profile(&self, id: UserId, update: &ProfileUpdate) -> Result<UserProfile> {
        let affected = self.conn().execute(
            "UPDATE users SET
                full_name = COALESCE(?2, full_name),
                bio       = COALESCE(?3, bio),
                avatar    = COALESCE(?4, avatar)
             WHERE id = ?1",
            params![id.to_string(), update.full_name, update.bio, update.avatar],
        )?;
        if affected == 0 {
            return Err(StoreError::NotFound);
        }
        self.get_profile(id)
    }

    /// Case-insensitive substring search over name and email on behalf of
    /// `owner`.
    ///
    /// The owner and anyone with a pending request to or from the owner are
    /// never returned. Friends are returned only when `include_friends` is
    /// set; the flag in each tuple tells whether the hit is a friend.
    pub fn search_users(
        &self,
        owner: UserId,
        query: &str,
        include_friends: bool,
        limit: usize,
    ) -> Result<Vec<(UserProfile, bool)>> {
        let mut stmt = self.conn().prepare(
            "SELECT u.id, u.email, u.full_name, u.bio, u.avatar, u.password_hash, u.created_at,
                    EXISTS (SELECT 1 FROM friends f
                            WHERE f.user_id = ?1 AND f.friend_id = u.id) AS is_friend
             FROM users u
             WHERE u.id != ?1
               AND (instr(unicode_lower(u.full_name), unicode_lower(?2)) > 0
                    OR instr(unicode_lower(u.email), unicode_lower(?2)) > 0)
               AND u.id NOT IN (SELECT to_id FROM sent_requests
                                WHERE owner_id = ?1 AND status = 'pending')
               AND u.id NOT IN (SELECT from_id FROM friend_requests
                                WHERE owner_id = ?1 AND status = 'pending')
               AND (?3 OR NOT EXISTS (SELECT 1 FROM friends f
                                      WHERE f.user_id = ?1 AND f.friend_id = u.id))
             ORDER BY u.full_name COLLATE NOCASE, u.id
             LIMIT ?4",
        )?;

        let rows = stmt.query_map(
            params![owner.to_string(), query, include_friends, limit as i64],
            |row| {
                let user = row_to_user(row)?;
                let is_friend: bool = row.get(7)?;
                Ok((user.profile, is_friend))
            },
        )?;

        let mut hits = Vec::new();
        for row in rows {
            hits.push(row?);
        }
        Ok(hits)
    }
}

fn row_to_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<UserRecord> {
    Ok(UserRecord {
        profile: UserProfile {
            id: UserId(uuid_col(row, 0)?),
            email: row.get(1)?,
            full_name: row.get(2)?,
            bio: row.get(3)?,
            avatar: row.get(4)?,
            created_at: ts_col(row, 6)?,
        },
        password_hash: row.get(5)?,
    })
}

/// Build a fresh account record for tests and fixtures.
#[cfg(test)]
pub(crate) fn test_user(name: &str) -> UserRecord {
    UserRecord {
        profile: UserProfile {
            id: UserId::new(),
            full_name: name.to_string(),
            email: format!("{}@example.com", name.to_lowercase()),
            bio: String::new(),
            avatar: None,
            created_at: chrono::Utc::now(),
        },
        password_hash: "$argon2id$test".to_string(),
    }
}
