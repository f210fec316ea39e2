use thiserror::Error;

#[derive(Debug, Error)]
pub enum TaskdeckError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid reminder: {0}")]
    InvalidReminder(String),
}

impl TaskdeckError {
    /// Short, stable error code for structured logs.
    pub fn code(&self) -> &'static str {
        match self {
            TaskdeckError::Config(_) => "CONFIG_ERROR",
            TaskdeckError::InvalidReminder(_) => "INVALID_REMINDER",
        }
    }
}

pub type Result<T> = std::result::Result<T, TaskdeckError>;
