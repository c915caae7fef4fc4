//! v001 -- Initial schema creation.
//!
//! Creates `records` (the conversation tree) and `participants` (the owner
//! and vet directory).

use rusqlite::Connection;

const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Conversation records
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS records (
    conversation_key TEXT NOT NULL,
    record_id        TEXT NOT NULL,            -- store-assigned, UUID v4 (simple)
    body             TEXT NOT NULL,            -- JSON object, camelCase fields
    inserted_at      INTEGER NOT NULL,         -- ms since epoch, server clock

    PRIMARY KEY (conversation_key, record_id)
);

-- ----------------------------------------------------------------
-- Participant directory
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS participants (
    role          TEXT NOT NULL,               -- 'users' | 'vets'
    id            TEXT NOT NULL,
    username      TEXT NOT NULL,
    profile_image TEXT,
    blocked       INTEGER NOT NULL DEFAULT 0,

    PRIMARY KEY (role, id)
);
"#;

pub fn up(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(UP_SQL)
}
