use rusqlite::{Connection, Result};

/// Initialise user-scoped tables. Safe to call on every startup.
pub fn init_db(conn: &Connection) -> Result<()> {
    create_users_table(conn)?;
    create_preferences_table(conn)?;
    create_emotions_table(conn)?;
    create_goals_table(conn)?;
    create_goal_progress_table(conn)?;
    Ok(())
}

fn create_users_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS users (
            id          TEXT PRIMARY KEY,
            external_id TEXT NOT NULL UNIQUE,
            created_at  TEXT NOT NULL,
            last_active TEXT NOT NULL
        );",
    )
}

fn create_preferences_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS user_preferences (
            user_id           TEXT PRIMARY KEY,
            language          TEXT,
            formality         TEXT,
            tone              TEXT,
            emoji_usage       INTEGER,
            response_length   TEXT,
            explanation_style TEXT,
            updated_at        TEXT NOT NULL
        );",
    )
}

fn create_emotions_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS emotions (
            id              TEXT PRIMARY KEY,
            user_id         TEXT NOT NULL,
            conversation_id TEXT,
            emotion         TEXT NOT NULL,
            confidence      REAL NOT NULL,
            intensity       TEXT NOT NULL,
            indicators      TEXT NOT NULL,
            message_snippet TEXT NOT NULL,
            detected_at     TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_emotions_user
            ON emotions(user_id, detected_at);",
    )
}

fn create_goals_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS goals (
            id                TEXT PRIMARY KEY,
            user_id           TEXT NOT NULL,
            title             TEXT NOT NULL,
            description       TEXT,
            category          TEXT NOT NULL,
            status            TEXT NOT NULL DEFAULT 'active',
            progress          REAL NOT NULL DEFAULT 0,
            target_date       TEXT,
            completed_at      TEXT,
            last_mentioned_at TEXT,
            mention_count     INTEGER NOT NULL DEFAULT 0,
            motivation        TEXT,
            obstacles         TEXT NOT NULL DEFAULT '[]',
            milestones        TEXT NOT NULL DEFAULT '[]',
            progress_notes    TEXT NOT NULL DEFAULT '[]',
            created_at        TEXT NOT NULL,
            updated_at        TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_goals_user
            ON goals(user_id, status);",
    )
}

fn create_goal_progress_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS goal_progress (
            id              TEXT PRIMARY KEY,
            goal_id         TEXT NOT NULL,
            user_id         TEXT NOT NULL,
            kind            TEXT NOT NULL,
            content         TEXT NOT NULL,
            sentiment       TEXT,
            emotion         TEXT,
            conversation_id TEXT,
            created_at      TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_goal_progress_goal
            ON goal_progress(goal_id, created_at);",
    )
}
