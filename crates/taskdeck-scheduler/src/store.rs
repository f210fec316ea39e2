use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{NaiveDateTime, Utc};
use rusqlite::{Connection, OptionalExtension};
use taskdeck_core::{ItemId, ReminderSpec};
use tokio::sync::watch;
use tracing::{debug, info, instrument};

use crate::{
    db::init_db,
    error::{Result, SchedulerError},
    rule::{parse_rule, RuleParse},
    task::{NewTask, Task},
    tracker::ItemLookup,
};

const TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// SQLite-backed task collection.
///
/// Every mutation republishes the full task list on a `watch` channel, which
/// is what the alert engine subscribes to. Lookups by id go straight to the
/// database so a task deleted after its alert was computed resolves to `None`.
pub struct TaskStore {
    conn: Arc<Mutex<Connection>>,
    tasks_tx: watch::Sender<Arc<Vec<Task>>>,
}

impl TaskStore {
    pub fn new(conn: Connection) -> Result<Self> {
        init_db(&conn)?;
        let initial = load_all(&conn)?;
        let (tasks_tx, _rx) = watch::channel(Arc::new(initial));
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            tasks_tx,
        })
    }

    /// Receiver that always holds the current full task list.
    pub fn subscribe(&self) -> watch::Receiver<Arc<Vec<Task>>> {
        self.tasks_tx.subscribe()
    }

    #[instrument(skip(self, new), fields(title = %new.title))]
    pub fn add_task(&self, new: NewTask) -> Result<Task> {
        new.validate()?;
        if let Some(RuleParse::NoRule(reason)) = new.recurrence.as_deref().map(parse_rule) {
            return Err(SchedulerError::InvalidTask(format!(
                "unusable recurrence descriptor: {reason:?}"
            )));
        }

        let task = Task {
            id: ItemId::new(),
            title: new.title,
            start: new.start,
            end: new.end,
            all_day: new.all_day,
            recurrence: new.recurrence,
            reminders: new.reminders,
            sound: new.sound,
            vibrate: new.vibrate,
            snooze_minutes: new.snooze_minutes,
            created_at: Utc::now().to_rfc3339(),
        };

        {
            let mut conn = self.lock()?;
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO tasks
                 (id, title, start_at, end_at, all_day, recurrence,
                  sound, vibrate, snooze_minutes, created_at)
                 VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10)",
                rusqlite::params![
                    task.id.as_str(),
                    task.title,
                    format_time(task.start),
                    task.end.map(format_time),
                    task.all_day,
                    task.recurrence,
                    task.sound,
                    task.vibrate,
                    task.snooze_minutes,
                    task.created_at,
                ],
            )?;
            for (position, reminder) in task.reminders.iter().enumerate() {
                tx.execute(
                    "INSERT INTO reminders (task_id, position, kind, offset_value, offset_unit)
                     VALUES (?1,?2,?3,?4,?5)",
                    rusqlite::params![
                        task.id.as_str(),
                        position as i64,
                        reminder.kind.to_string(),
                        reminder.offset_value,
                        reminder.offset_unit.to_string(),
                    ],
                )?;
            }
            tx.commit()?;
        }

        info!(task_id = %task.id, "task added");
        self.publish()?;
        Ok(task)
    }

    /// Remove a task and its reminders. Returns `TaskNotFound` if no row is deleted.
    pub fn remove_task(&self, id: &ItemId) -> Result<()> {
        {
            let mut conn = self.lock()?;
            let tx = conn.transaction()?;
            tx.execute("DELETE FROM reminders WHERE task_id = ?1", [id.as_str()])?;
            let n = tx.execute("DELETE FROM tasks WHERE id = ?1", [id.as_str()])?;
            if n == 0 {
                return Err(SchedulerError::TaskNotFound { id: id.to_string() });
            }
            tx.commit()?;
        }
        info!(task_id = %id, "task removed");
        self.publish()
    }

    pub fn get_task(&self, id: &ItemId) -> Result<Option<Task>> {
        let conn = self.lock()?;
        load_one(&conn, id)
    }

    /// Return all tasks ordered by start time.
    pub fn list_tasks(&self) -> Result<Vec<Task>> {
        let conn = self.lock()?;
        load_all(&conn)
    }

    /// Re-read the table and republish if another connection changed it.
    /// Returns whether subscribers were notified.
    pub fn reload(&self) -> Result<bool> {
        let fresh = self.list_tasks()?;
        let changed = self.tasks_tx.send_if_modified(|current| {
            if **current == fresh {
                return false;
            }
            *current = Arc::new(fresh);
            true
        });
        if changed {
            debug!("task collection changed on disk");
        }
        Ok(changed)
    }

    /// Wake subscribers without touching the data, so derived state such as
    /// alert candidates is rebuilt against the current time.
    pub fn touch(&self) {
        self.tasks_tx.send_modify(|_| {});
    }

    fn publish(&self) -> Result<()> {
        let tasks = self.list_tasks()?;
        self.tasks_tx.send_replace(Arc::new(tasks));
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| SchedulerError::LockPoisoned)
    }
}

#[async_trait]
impl ItemLookup<Task> for TaskStore {
    async fn find(&self, id: &ItemId) -> Result<Option<Task>> {
        self.get_task(id)
    }
}

// --- row mapping -----------------------------------------------------------

type TaskRow = (
    String,         // id
    String,         // title
    String,         // start_at
    Option<String>, // end_at
    bool,           // all_day
    Option<String>, // recurrence
    bool,           // sound
    bool,           // vibrate
    Option<u32>,    // snooze_minutes
    String,         // created_at
);

const SELECT_TASK: &str = "SELECT id, title, start_at, end_at, all_day, recurrence,
                                  sound, vibrate, snooze_minutes, created_at
                           FROM tasks";

fn read_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<TaskRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
        row.get(8)?,
        row.get(9)?,
    ))
}

fn load_one(conn: &Connection, id: &ItemId) -> Result<Option<Task>> {
    let row = conn
        .query_row(
            &format!("{SELECT_TASK} WHERE id = ?1"),
            [id.as_str()],
            read_row,
        )
        .optional()?;
    row.map(|row| build_task(conn, row)).transpose()
}

fn load_all(conn: &Connection) -> Result<Vec<Task>> {
    let rows: Vec<TaskRow> = {
        let mut stmt = conn.prepare(&format!("{SELECT_TASK} ORDER BY start_at, created_at"))?;
        let rows = stmt.query_map([], read_row)?;
        rows.collect::<rusqlite::Result<_>>()?
    };
    rows.into_iter().map(|row| build_task(conn, row)).collect()
}

fn build_task(conn: &Connection, row: TaskRow) -> Result<Task> {
    let (id, title, start_at, end_at, all_day, recurrence, sound, vibrate, snooze_minutes, created_at) =
        row;
    let corrupt = |reason: String| SchedulerError::CorruptRow {
        id: id.clone(),
        reason,
    };
    let start = parse_time(&start_at).map_err(|e| corrupt(format!("start_at: {e}")))?;
    let end = end_at
        .as_deref()
        .map(parse_time)
        .transpose()
        .map_err(|e| corrupt(format!("end_at: {e}")))?;
    let reminders = load_reminders(conn, &id)?;

    Ok(Task {
        id: ItemId::from(id),
        title,
        start,
        end,
        all_day,
        recurrence,
        reminders,
        sound,
        vibrate,
        snooze_minutes,
        created_at,
    })
}

fn load_reminders(conn: &Connection, task_id: &str) -> Result<Vec<ReminderSpec>> {
    let mut stmt = conn.prepare_cached(
        "SELECT kind, offset_value, offset_unit FROM reminders
         WHERE task_id = ?1 ORDER BY position",
    )?;
    let rows = stmt
        .query_map([task_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, u32>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    rows.into_iter()
        .map(|(kind, value, unit)| -> Result<ReminderSpec> {
            let corrupt = |reason: String| SchedulerError::CorruptRow {
                id: task_id.to_string(),
                reason,
            };
            Ok(ReminderSpec::new(
                kind.parse().map_err(corrupt)?,
                value,
                unit.parse().map_err(corrupt)?,
            ))
        })
        .collect()
}

fn format_time(t: NaiveDateTime) -> String {
    t.format(TIME_FORMAT).to_string()
}

fn parse_time(s: &str) -> std::result::Result<NaiveDateTime, chrono::ParseError> {
    NaiveDateTime::parse_from_str(s, TIME_FORMAT)
}
