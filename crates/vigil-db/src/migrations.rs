use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 =
        conn.query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |r| r.get(0))?;

    if version < 1 {
        info!("Running migration v1 (cards, comments)");
        conn.execute_batch(
            "
            CREATE TABLE cards (
                id                  INTEGER PRIMARY KEY AUTOINCREMENT,
                group_id            INTEGER NOT NULL,
                author_id           INTEGER NOT NULL,
                title               TEXT NOT NULL,
                body                TEXT NOT NULL DEFAULT '',
                category            TEXT,
                status              TEXT NOT NULL DEFAULT 'active',
                position            INTEGER NOT NULL DEFAULT 0,
                comment_count       INTEGER NOT NULL DEFAULT 0,
                last_comment_at     TEXT,
                is_comments_closed  INTEGER NOT NULL DEFAULT 0,
                created_at          TEXT NOT NULL,
                updated_at          TEXT NOT NULL
            );

            CREATE INDEX idx_cards_partition
                ON cards(group_id, status, position, id);

            CREATE TABLE comments (
                id                  INTEGER PRIMARY KEY AUTOINCREMENT,
                card_id             INTEGER NOT NULL REFERENCES cards(id) ON DELETE CASCADE,
                author_id           INTEGER NOT NULL,
                parent_comment_id   INTEGER REFERENCES comments(id) ON DELETE CASCADE,
                thread_root_id      INTEGER,
                depth               INTEGER NOT NULL DEFAULT 0,
                body                TEXT NOT NULL,
                created_at          TEXT NOT NULL,
                updated_at          TEXT,
                deleted_at          TEXT
            );

            CREATE INDEX idx_comments_card
                ON comments(card_id, depth, deleted_at, created_at);

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    if version < 2 {
        info!("Running migration v2 (card participants)");
        conn.execute_batch(
            "
            CREATE TABLE card_participants (
                card_id     INTEGER NOT NULL REFERENCES cards(id) ON DELETE CASCADE,
                user_id     INTEGER NOT NULL,
                created_at  TEXT NOT NULL DEFAULT (datetime('now')),
                PRIMARY KEY (card_id, user_id)
            );

            INSERT INTO schema_version (version) VALUES (2);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
