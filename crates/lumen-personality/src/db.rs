use rusqlite::{Connection, Result};

/// Initialise personality tables. Safe to call on every startup.
pub fn init_db(conn: &Connection) -> Result<()> {
    create_personalities_table(conn)?;
    create_relationship_table(conn)?;
    Ok(())
}

fn create_personalities_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS personalities (
            id                  TEXT PRIMARY KEY,
            owner_user_id       TEXT NOT NULL,
            name                TEXT NOT NULL,
            archetype           TEXT,
            relationship_type   TEXT NOT NULL DEFAULT 'assistant',
            traits              TEXT NOT NULL,
            behaviors           TEXT NOT NULL,
            backstory           TEXT,
            custom_instructions TEXT,
            speaking_style      TEXT,
            version             INTEGER NOT NULL DEFAULT 1,
            created_at          TEXT NOT NULL,
            updated_at          TEXT NOT NULL,
            UNIQUE(owner_user_id, name)
        );
        CREATE INDEX IF NOT EXISTS idx_personalities_owner
            ON personalities(owner_user_id);",
    )
}

fn create_relationship_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS relationship_state (
            user_id            TEXT NOT NULL,
            personality_id     TEXT NOT NULL,
            total_messages     INTEGER NOT NULL DEFAULT 0,
            depth_score        REAL NOT NULL DEFAULT 0,
            trust_level        REAL NOT NULL DEFAULT 5,
            days_known         INTEGER NOT NULL DEFAULT 0,
            first_interaction  TEXT NOT NULL,
            last_interaction   TEXT NOT NULL,
            milestones         TEXT NOT NULL DEFAULT '[]',
            positive_reactions INTEGER NOT NULL DEFAULT 0,
            negative_reactions INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (user_id, personality_id)
        );",
    )
}
