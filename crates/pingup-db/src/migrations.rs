use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 =
        conn.query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |r| r.get(0))?;

    if version < 1 {
        info!("Running migration v1 (initial schema)");
        conn.execute_batch(
            "
            CREATE TABLE users (
                id               TEXT PRIMARY KEY,
                email            TEXT NOT NULL,
                full_name        TEXT NOT NULL,
                username         TEXT NOT NULL UNIQUE,
                bio              TEXT NOT NULL DEFAULT 'Hey there! I am using PingUp.',
                profile_picture  TEXT NOT NULL DEFAULT '',
                cover_photo      TEXT NOT NULL DEFAULT '',
                location         TEXT NOT NULL DEFAULT '',
                created_at       TEXT NOT NULL
            );

            -- Graph sets. followers and following are separate sets that are
            -- written together, not views of one edge table.
            CREATE TABLE user_followers (
                user_id   TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                other_id  TEXT NOT NULL,
                PRIMARY KEY (user_id, other_id)
            );

            CREATE TABLE user_following (
                user_id   TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                other_id  TEXT NOT NULL,
                PRIMARY KEY (user_id, other_id)
            );

            CREATE TABLE user_connections (
                user_id   TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                other_id  TEXT NOT NULL,
                PRIMARY KEY (user_id, other_id)
            );

            CREATE TABLE messages (
                id            TEXT PRIMARY KEY,
                from_user_id  TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                to_user_id    TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                text          TEXT,
                message_type  TEXT NOT NULL CHECK (message_type IN ('text', 'image')),
                media_url     TEXT,
                seen          INTEGER NOT NULL DEFAULT 0,
                created_at    TEXT NOT NULL
            );

            CREATE INDEX idx_messages_pair
                ON messages(from_user_id, to_user_id, created_at);
            CREATE INDEX idx_messages_recipient
                ON messages(to_user_id, created_at);

            CREATE TABLE connection_requests (
                id            TEXT PRIMARY KEY,
                from_user_id  TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                to_user_id    TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                status        TEXT NOT NULL DEFAULT 'pending'
                              CHECK (status IN ('pending', 'accepted')),
                created_at    TEXT NOT NULL
            );

            -- At most one request per unordered pair.
            CREATE UNIQUE INDEX idx_connection_requests_pair
                ON connection_requests(min(from_user_id, to_user_id), max(from_user_id, to_user_id));
            CREATE INDEX idx_connection_requests_sender
                ON connection_requests(from_user_id, created_at);

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
