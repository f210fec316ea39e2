use rusqlite::Connection;

use crate::error::Result;

/// Initialise the task schema in `conn`.
///
/// Creates the `tasks` and `reminders` tables (idempotent) plus an index on
/// `start_at` so listing in calendar order stays cheap.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS tasks (
            id              TEXT    NOT NULL PRIMARY KEY,
            title           TEXT    NOT NULL,
            start_at        TEXT    NOT NULL,   -- local wall time, %Y-%m-%dT%H:%M:%S
            end_at          TEXT,               -- same format or NULL
            all_day         INTEGER NOT NULL DEFAULT 0,
            recurrence      TEXT,               -- FREQ=...;... descriptor or NULL
            sound           INTEGER NOT NULL DEFAULT 1,
            vibrate         INTEGER NOT NULL DEFAULT 1,
            snooze_minutes  INTEGER,            -- NULL means no snooze offered
            created_at      TEXT    NOT NULL
        ) STRICT;

        CREATE TABLE IF NOT EXISTS reminders (
            task_id         TEXT    NOT NULL REFERENCES tasks(id) ON DELETE CASCADE,
            position        INTEGER NOT NULL,
            kind            TEXT    NOT NULL,   -- start | end
            offset_value    INTEGER NOT NULL,
            offset_unit     TEXT    NOT NULL,   -- minutes | hours | days | weeks | months
            PRIMARY KEY (task_id, position)
        ) STRICT;

        CREATE INDEX IF NOT EXISTS idx_tasks_start_at ON tasks (start_at);
        ",
    )?;
    Ok(())
}
