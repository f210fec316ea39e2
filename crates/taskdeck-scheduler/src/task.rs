use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use taskdeck_core::{ItemId, ReminderSpec, Schedulable};

use crate::error::{Result, SchedulerError};

/// A persisted task record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: ItemId,
    pub title: String,
    /// Local start; midnight for all-day tasks.
    pub start: NaiveDateTime,
    pub end: Option<NaiveDateTime>,
    pub all_day: bool,
    /// Recurrence descriptor, e.g. `FREQ=WEEKLY;BYDAY=MO,WE`.
    pub recurrence: Option<String>,
    pub reminders: Vec<ReminderSpec>,
    pub sound: bool,
    pub vibrate: bool,
    pub snooze_minutes: Option<u32>,
    /// ISO-8601 timestamp of creation.
    pub created_at: String,
}

impl Schedulable for Task {
    fn id(&self) -> &ItemId {
        &self.id
    }

    fn title(&self) -> &str {
        &self.title
    }

    fn start(&self) -> NaiveDateTime {
        self.start
    }

    fn end(&self) -> Option<NaiveDateTime> {
        self.end
    }

    fn all_day(&self) -> bool {
        self.all_day
    }

    fn recurrence(&self) -> Option<&str> {
        self.recurrence.as_deref()
    }

    fn reminders(&self) -> &[ReminderSpec] {
        &self.reminders
    }

    fn sound(&self) -> bool {
        self.sound
    }

    fn vibrate(&self) -> bool {
        self.vibrate
    }

    fn snooze_minutes(&self) -> Option<u32> {
        self.snooze_minutes
    }
}

/// Input for [`crate::store::TaskStore::add_task`].
#[derive(Debug, Clone, PartialEq)]
pub struct NewTask {
    pub title: String,
    pub start: NaiveDateTime,
    pub end: Option<NaiveDateTime>,
    pub all_day: bool,
    pub recurrence: Option<String>,
    pub reminders: Vec<ReminderSpec>,
    pub sound: bool,
    pub vibrate: bool,
    pub snooze_minutes: Option<u32>,
}

impl NewTask {
    pub fn new(title: impl Into<String>, start: NaiveDateTime) -> Self {
        Self {
            title: title.into(),
            start,
            end: None,
            all_day: false,
            recurrence: None,
            reminders: Vec::new(),
            sound: true,
            vibrate: true,
            snooze_minutes: None,
        }
    }

    pub fn ending(mut self, end: NaiveDateTime) -> Self {
        self.end = Some(end);
        self
    }

    /// Marks the task all-day and snaps its start to midnight.
    pub fn all_day(mut self) -> Self {
        self.all_day = true;
        self.start = self.start.date().and_time(chrono::NaiveTime::MIN);
        self
    }

    pub fn repeating(mut self, descriptor: impl Into<String>) -> Self {
        self.recurrence = Some(descriptor.into());
        self
    }

    pub fn remind(mut self, reminder: ReminderSpec) -> Self {
        self.reminders.push(reminder);
        self
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.title.trim().is_empty() {
            return Err(SchedulerError::InvalidTask("title must not be empty".into()));
        }
        if self.end.is_some_and(|end| end < self.start) {
            return Err(SchedulerError::InvalidTask(
                "end must not be before start".into(),
            ));
        }
        Ok(())
    }
}
