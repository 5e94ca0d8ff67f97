use rusqlite::{Connection, Result};

/// Initialise conversation and memory tables. Safe to call on every startup.
pub fn init_db(conn: &Connection) -> Result<()> {
    create_conversations_table(conn)?;
    create_messages_table(conn)?;
    create_memories_table(conn)?;
    Ok(())
}

fn create_conversations_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS conversations (
            id              TEXT PRIMARY KEY,
            user_id         TEXT NOT NULL,
            personality_id  TEXT NOT NULL,
            title           TEXT,
            created_at      TEXT NOT NULL,
            updated_at      TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_conversations_user
            ON conversations(user_id, updated_at DESC);",
    )
}

/// Append-only message log - independent of the bounded short-term buffer.
fn create_messages_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS messages (
            id              TEXT PRIMARY KEY,
            conversation_id TEXT NOT NULL,
            role            TEXT NOT NULL,
            content         TEXT NOT NULL,
            timestamp       TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_messages_conversation
            ON messages(conversation_id, timestamp);",
    )
}

/// Embeddings are little-endian f32 BLOBs; similarity is computed in-process.
fn create_memories_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS memories (
            id               TEXT PRIMARY KEY,
            user_id          TEXT NOT NULL,
            personality_id   TEXT NOT NULL,
            conversation_id  TEXT NOT NULL,
            content          TEXT NOT NULL,
            embedding        BLOB NOT NULL,
            memory_type      TEXT NOT NULL,
            category         TEXT,
            importance       REAL NOT NULL,
            related_entities TEXT,
            access_count     INTEGER NOT NULL DEFAULT 0,
            last_accessed    TEXT,
            decay_factor     REAL NOT NULL DEFAULT 1.0,
            is_active        INTEGER NOT NULL DEFAULT 1,
            superseded_by    TEXT,
            created_at       TEXT NOT NULL,
            updated_at       TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_memories_scope
            ON memories(user_id, personality_id, is_active);
        CREATE INDEX IF NOT EXISTS idx_memories_conversation
            ON memories(conversation_id);",
    )
}
