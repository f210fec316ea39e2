use std::collections::BTreeSet;

use chrono::{NaiveDate, NaiveDateTime, Weekday};
use serde::{Deserialize, Serialize};
use taskdeck_core::{ItemId, ReminderSpec, Schedulable};

/// Sentinel in `by_month_day` meaning "the last day of the month".
pub const LAST_DAY_OF_MONTH: i32 = -1;

/// The two supported recurrence classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Frequency {
    Weekly,
    Monthly,
}

impl std::fmt::Display for Frequency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Frequency::Weekly => "WEEKLY",
            Frequency::Monthly => "MONTHLY",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for Frequency {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "WEEKLY" => Ok(Frequency::Weekly),
            "MONTHLY" => Ok(Frequency::Monthly),
            other => Err(format!("unsupported frequency: {other}")),
        }
    }
}

/// A parsed recurrence rule. Immutable once built.
///
/// `by_day` only matters for [`Frequency::Weekly`]; `by_month` and
/// `by_month_day` only for [`Frequency::Monthly`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecurrenceRule {
    frequency: Frequency,
    interval: u32,
    by_day: Vec<Weekday>,
    by_month: BTreeSet<u32>,
    by_month_day: Vec<i32>,
    until: Option<NaiveDate>,
}

impl RecurrenceRule {
    /// # Panics
    ///
    /// Panics if `interval` is zero. The parser clamps user input, so only a
    /// direct caller can trip this.
    pub fn new(frequency: Frequency, interval: u32) -> Self {
        assert!(interval >= 1, "recurrence interval must be at least 1");
        Self {
            frequency,
            interval,
            by_day: Vec::new(),
            by_month: BTreeSet::new(),
            by_month_day: Vec::new(),
            until: None,
        }
    }

    pub fn weekly(interval: u32, days: impl IntoIterator<Item = Weekday>) -> Self {
        Self::new(Frequency::Weekly, interval).with_days(days)
    }

    pub fn monthly(interval: u32, month_days: impl IntoIterator<Item = i32>) -> Self {
        Self::new(Frequency::Monthly, interval).with_month_days(month_days)
    }

    /// Weekdays are kept Monday-first and deduplicated.
    pub fn with_days(mut self, days: impl IntoIterator<Item = Weekday>) -> Self {
        for day in days {
            if !self.by_day.contains(&day) {
                self.by_day.push(day);
            }
        }
        self.by_day.sort_by_key(|d| d.num_days_from_monday());
        self
    }

    /// # Panics
    ///
    /// Panics on a month outside 1–12.
    pub fn with_months(mut self, months: impl IntoIterator<Item = u32>) -> Self {
        for month in months {
            assert!((1..=12).contains(&month), "month out of range: {month}");
            self.by_month.insert(month);
        }
        self
    }

    /// # Panics
    ///
    /// Panics on an entry that is neither 1–31 nor [`LAST_DAY_OF_MONTH`].
    pub fn with_month_days(mut self, month_days: impl IntoIterator<Item = i32>) -> Self {
        for day in month_days {
            assert!(is_valid_month_day(day), "month day out of range: {day}");
            self.by_month_day.push(day);
        }
        self
    }

    pub fn with_until(mut self, until: NaiveDate) -> Self {
        self.until = Some(until);
        self
    }

    pub fn frequency(&self) -> Frequency {
        self.frequency
    }

    pub fn interval(&self) -> u32 {
        self.interval
    }

    pub fn by_day(&self) -> &[Weekday] {
        &self.by_day
    }

    pub fn by_month(&self) -> &BTreeSet<u32> {
        &self.by_month
    }

    pub fn by_month_day(&self) -> &[i32] {
        &self.by_month_day
    }

    pub fn until(&self) -> Option<NaiveDate> {
        self.until
    }
}

pub(crate) fn is_valid_month_day(day: i32) -> bool {
    day == LAST_DAY_OF_MONTH || (1..=31).contains(&day)
}

/// One concrete calendar instance of an item. Produced on demand, never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Occurrence {
    pub start: NaiveDateTime,
    pub end: Option<NaiveDateTime>,
    pub all_day: bool,
    /// Already in the past relative to the `now` it was computed for.
    pub expired: bool,
}

impl Occurrence {
    pub fn new(
        start: NaiveDateTime,
        end: Option<NaiveDateTime>,
        all_day: bool,
        now: NaiveDateTime,
    ) -> Self {
        // All-day items stay live until their end has passed.
        let expired = match (all_day, end) {
            (true, Some(end)) => end < now,
            _ => start < now,
        };
        Self {
            start,
            end,
            all_day,
            expired,
        }
    }

    /// The item itself viewed as its single occurrence.
    pub fn of<T: Schedulable>(item: &T, now: NaiveDateTime) -> Self {
        Self::new(item.start(), item.end(), item.all_day(), now)
    }
}

/// Half-open local time range `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl Window {
    pub fn new(start: NaiveDateTime, end: NaiveDateTime) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, at: NaiveDateTime) -> bool {
        self.start <= at && at < self.end
    }
}

/// A candidate alert: "item X wants attention at time T".
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpcomingAlert {
    pub item_id: ItemId,
    pub trigger_time: NaiveDateTime,
    /// `None` for the implicit at-start alert of a timed item.
    pub reminder: Option<ReminderSpec>,
    unique_key: String,
}

impl UpcomingAlert {
    /// `epoch_millis` is `trigger_time` as milliseconds since the Unix epoch.
    pub fn new(
        item_id: ItemId,
        trigger_time: NaiveDateTime,
        reminder: Option<ReminderSpec>,
        epoch_millis: i64,
    ) -> Self {
        let unique_key = format!("{}_{}", item_id, epoch_millis);
        Self {
            item_id,
            trigger_time,
            reminder,
            unique_key,
        }
    }

    /// `{item_id}_{epoch_millis}` — identifies this alert for at-most-once delivery.
    pub fn unique_key(&self) -> &str {
        &self.unique_key
    }
}

/// An alert the tracker has decided to present, with its resolved item.
#[derive(Debug, Clone)]
pub struct SurfacedAlert<T> {
    pub alert: UpcomingAlert,
    pub item: T,
}
