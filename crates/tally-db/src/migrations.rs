use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS groups (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            name        TEXT NOT NULL,
            created_by  INTEGER NOT NULL,
            created_at  TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS group_members (
            group_id    INTEGER NOT NULL REFERENCES groups(id),
            user_id     INTEGER NOT NULL,
            role        TEXT NOT NULL DEFAULT 'member',
            PRIMARY KEY (group_id, user_id)
        );

        CREATE TABLE IF NOT EXISTS personal_messages (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            sender_id   INTEGER NOT NULL,
            receiver_id INTEGER NOT NULL,
            body        TEXT NOT NULL,
            is_seen     INTEGER NOT NULL DEFAULT 0,
            created_at  TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE INDEX IF NOT EXISTS idx_personal_messages_pair
            ON personal_messages(sender_id, receiver_id, created_at);

        CREATE INDEX IF NOT EXISTS idx_personal_messages_unseen
            ON personal_messages(receiver_id, is_seen);

        CREATE TABLE IF NOT EXISTS group_messages (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            group_id    INTEGER NOT NULL REFERENCES groups(id),
            sender_id   INTEGER NOT NULL,
            body        TEXT NOT NULL,
            created_at  TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE INDEX IF NOT EXISTS idx_group_messages_group
            ON group_messages(group_id, created_at);

        -- One coarse flag per (group, member): 0 means the member has
        -- something unseen in that group. Rows are created alongside the
        -- membership row, so a member always has a marker.
        CREATE TABLE IF NOT EXISTS group_seen_markers (
            group_id    INTEGER NOT NULL REFERENCES groups(id),
            user_id     INTEGER NOT NULL,
            is_seen     INTEGER NOT NULL DEFAULT 1,
            PRIMARY KEY (group_id, user_id)
        );

        -- Task CRUD lives elsewhere; the table is here because deleting a
        -- group must null out task references as part of the cascade.
        CREATE TABLE IF NOT EXISTS tasks (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            title       TEXT NOT NULL,
            group_id    INTEGER REFERENCES groups(id),
            created_at  TEXT NOT NULL DEFAULT (datetime('now'))
        );
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
