//! v001 -- Initial schema creation.
//!
//! Creates `users`, `friends`, the two mirrored request collections
//! (`friend_requests` received, `sent_requests` sent) and `messages`.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Users
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS users (
    id            TEXT PRIMARY KEY NOT NULL,          -- UUID v4
    email         TEXT NOT NULL UNIQUE COLLATE NOCASE,
    full_name     TEXT NOT NULL,
    bio           TEXT NOT NULL DEFAULT '',
    avatar        TEXT,                               -- opaque reference
    password_hash TEXT NOT NULL,                      -- Argon2 PHC string
    created_at    TEXT NOT NULL                       -- RFC-3339
);

-- ----------------------------------------------------------------
-- Friends (one row per direction)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS friends (
    user_id    TEXT NOT NULL,
    friend_id  TEXT NOT NULL,
    created_at TEXT NOT NULL,

    PRIMARY KEY (user_id, friend_id),
    FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE,
    FOREIGN KEY (friend_id) REFERENCES users(id) ON DELETE CASCADE
);

-- ----------------------------------------------------------------
-- Requests received (owner = target)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS friend_requests (
    seq        INTEGER PRIMARY KEY AUTOINCREMENT,  -- insertion order
    id         TEXT NOT NULL,                      -- shared with the mirror
    owner_id   TEXT NOT NULL,
    from_id    TEXT NOT NULL,
    status     TEXT NOT NULL,                      -- pending|accepted|rejected
    created_at TEXT NOT NULL,

    UNIQUE (owner_id, id),
    FOREIGN KEY (owner_id) REFERENCES users(id) ON DELETE CASCADE
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_friend_requests_one_pending
    ON friend_requests(owner_id, from_id) WHERE status = 'pending';

-- ----------------------------------------------------------------
-- Requests sent (owner = sender)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS sent_requests (
    seq        INTEGER PRIMARY KEY AUTOINCREMENT,
    id         TEXT NOT NULL,
    owner_id   TEXT NOT NULL,
    to_id      TEXT NOT NULL,
    status     TEXT NOT NULL,
    created_at TEXT NOT NULL,

    UNIQUE (owner_id, id),
    FOREIGN KEY (owner_id) REFERENCES users(id) ON DELETE CASCADE
);

-- ----------------------------------------------------------------
-- Direct messages
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS messages (
    id          TEXT PRIMARY KEY NOT NULL,   -- UUID v4
    sender_id   TEXT NOT NULL,
    receiver_id TEXT NOT NULL,
    text        TEXT,
    image       TEXT,
    seen        INTEGER NOT NULL DEFAULT 0,  -- boolean 0/1
    created_at  TEXT                         -- RFC-3339; may be missing on legacy rows
);

CREATE INDEX IF NOT EXISTS idx_messages_pair
    ON messages(sender_id, receiver_id, created_at);

CREATE INDEX IF NOT EXISTS idx_messages_unseen
    ON messages(receiver_id, seen);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
