use thiserror::Error;

/// Errors that can occur within the scheduler subsystem.
///
/// Recurrence parsing and alert computation never produce these; malformed
/// descriptors degrade to "no rule" instead. Only storage and task
/// validation fail loudly.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Underlying SQLite / rusqlite error.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// No task with the given ID exists in the store.
    #[error("Task not found: {id}")]
    TaskNotFound { id: String },

    /// The task definition is rejected before it reaches storage.
    #[error("Invalid task: {0}")]
    InvalidTask(String),

    /// A stored row could not be decoded back into a task.
    #[error("Corrupt row for task {id}: {reason}")]
    CorruptRow { id: String, reason: String },

    /// A thread panicked while holding the store lock.
    #[error("Store lock poisoned")]
    LockPoisoned,
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
