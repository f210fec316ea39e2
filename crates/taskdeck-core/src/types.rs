use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::error::TaskdeckError;

/// Unique identifier for a schedulable item (UUIDv7 — time-sortable for easier log correlation).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ItemId(pub String);

impl ItemId {
    pub fn new() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Default for ItemId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<String> for ItemId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ItemId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Which end of an occurrence a reminder is measured from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReminderKind {
    Start,
    End,
}

impl fmt::Display for ReminderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReminderKind::Start => write!(f, "start"),
            ReminderKind::End => write!(f, "end"),
        }
    }
}

impl std::str::FromStr for ReminderKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "start" => Ok(ReminderKind::Start),
            "end" => Ok(ReminderKind::End),
            other => Err(format!("unknown reminder kind: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OffsetUnit {
    Minutes,
    Hours,
    Days,
    Weeks,
    Months,
}

impl OffsetUnit {
    /// Single-letter suffix used in the compact `start:15m` notation.
    pub fn suffix(&self) -> &'static str {
        match self {
            OffsetUnit::Minutes => "m",
            OffsetUnit::Hours => "h",
            OffsetUnit::Days => "d",
            OffsetUnit::Weeks => "w",
            OffsetUnit::Months => "mo",
        }
    }

    fn noun(&self, n: u32) -> &'static str {
        match (self, n == 1) {
            (OffsetUnit::Minutes, true) => "minute",
            (OffsetUnit::Minutes, false) => "minutes",
            (OffsetUnit::Hours, true) => "hour",
            (OffsetUnit::Hours, false) => "hours",
            (OffsetUnit::Days, true) => "day",
            (OffsetUnit::Days, false) => "days",
            (OffsetUnit::Weeks, true) => "week",
            (OffsetUnit::Weeks, false) => "weeks",
            (OffsetUnit::Months, true) => "month",
            (OffsetUnit::Months, false) => "months",
        }
    }
}

impl fmt::Display for OffsetUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OffsetUnit::Minutes => "minutes",
            OffsetUnit::Hours => "hours",
            OffsetUnit::Days => "days",
            OffsetUnit::Weeks => "weeks",
            OffsetUnit::Months => "months",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for OffsetUnit {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "minutes" => Ok(OffsetUnit::Minutes),
            "hours" => Ok(OffsetUnit::Hours),
            "days" => Ok(OffsetUnit::Days),
            "weeks" => Ok(OffsetUnit::Weeks),
            "months" => Ok(OffsetUnit::Months),
            other => Err(format!("unknown offset unit: {other}")),
        }
    }
}

/// "Remind me N units before the start (or end)".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReminderSpec {
    pub kind: ReminderKind,
    pub offset_value: u32,
    pub offset_unit: OffsetUnit,
}

impl ReminderSpec {
    pub fn new(kind: ReminderKind, offset_value: u32, offset_unit: OffsetUnit) -> Self {
        Self {
            kind,
            offset_value,
            offset_unit,
        }
    }

    pub fn before_start(offset_value: u32, offset_unit: OffsetUnit) -> Self {
        Self::new(ReminderKind::Start, offset_value, offset_unit)
    }

    pub fn before_end(offset_value: u32, offset_unit: OffsetUnit) -> Self {
        Self::new(ReminderKind::End, offset_value, offset_unit)
    }

    /// Human label, e.g. "15 minutes before start" or "at end".
    pub fn label(&self) -> String {
        if self.offset_value == 0 {
            return format!("at {}", self.kind);
        }
        format!(
            "{} {} before {}",
            self.offset_value,
            self.offset_unit.noun(self.offset_value),
            self.kind
        )
    }
}

/// Compact form: `start:15m`, `end:2h`, `start:1mo`.
impl fmt::Display for ReminderSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}{}",
            self.kind,
            self.offset_value,
            self.offset_unit.suffix()
        )
    }
}

impl std::str::FromStr for ReminderSpec {
    type Err = TaskdeckError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let invalid = || TaskdeckError::InvalidReminder(s.to_string());
        let (kind, offset) = s.trim().split_once(':').ok_or_else(invalid)?;
        let kind: ReminderKind = kind.to_ascii_lowercase().parse().map_err(|_| invalid())?;

        let digits = offset.chars().take_while(|c| c.is_ascii_digit()).count();
        let (value, unit) = offset.split_at(digits);
        let offset_value: u32 = value.parse().map_err(|_| invalid())?;
        let offset_unit = match unit.to_ascii_lowercase().as_str() {
            "m" | "min" => OffsetUnit::Minutes,
            "h" => OffsetUnit::Hours,
            "d" => OffsetUnit::Days,
            "w" => OffsetUnit::Weeks,
            "mo" => OffsetUnit::Months,
            _ => return Err(invalid()),
        };
        Ok(Self::new(kind, offset_value, offset_unit))
    }
}

/// Anything that can appear on the calendar and carry reminders.
///
/// Implemented by each concrete entity (tasks today). The alert pipeline is
/// generic over this trait so it never needs to know the concrete type.
pub trait Schedulable: Clone + Send + Sync + 'static {
    fn id(&self) -> &ItemId;
    fn title(&self) -> &str;

    /// Local start of the item, or of the first occurrence for recurring items.
    fn start(&self) -> NaiveDateTime;
    fn end(&self) -> Option<NaiveDateTime>;
    fn all_day(&self) -> bool;

    /// Raw recurrence descriptor, e.g. `FREQ=WEEKLY;BYDAY=MO`.
    fn recurrence(&self) -> Option<&str>;
    fn reminders(&self) -> &[ReminderSpec];

    fn is_recurring(&self) -> bool {
        self.recurrence().is_some()
    }

    fn sound(&self) -> bool {
        true
    }

    fn vibrate(&self) -> bool {
        true
    }

    /// Snooze length offered when the alert is shown, if any.
    fn snooze_minutes(&self) -> Option<u32> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reminder_compact_form_parses() {
        let spec: ReminderSpec = "start:15m".parse().unwrap();
        assert_eq!(spec, ReminderSpec::before_start(15, OffsetUnit::Minutes));
        assert_eq!(spec.to_string(), "start:15m");

        let spec: ReminderSpec = "END:1mo".parse().unwrap();
        assert_eq!(spec, ReminderSpec::before_end(1, OffsetUnit::Months));
    }

    #[test]
    fn reminder_rejects_garbage() {
        assert!("start".parse::<ReminderSpec>().is_err());
        assert!("middle:5m".parse::<ReminderSpec>().is_err());
        assert!("start:5y".parse::<ReminderSpec>().is_err());
        assert!("start:-5m".parse::<ReminderSpec>().is_err());
    }

    #[test]
    fn reminder_labels() {
        assert_eq!(
            ReminderSpec::before_start(1, OffsetUnit::Hours).label(),
            "1 hour before start"
        );
        assert_eq!(
            ReminderSpec::before_end(3, OffsetUnit::Weeks).label(),
            "3 weeks before end"
        );
        assert_eq!(ReminderSpec::before_start(0, OffsetUnit::Days).label(), "at start");
    }

    #[test]
    fn item_ids_are_unique() {
        assert_ne!(ItemId::new(), ItemId::new());
        assert_eq!(ItemId::from("abc").as_str(), "abc");
    }
}
