use chrono::{Duration, Months, NaiveDateTime};
use taskdeck_core::{OffsetUnit, ReminderKind, ReminderSpec};

use crate::types::Occurrence;

/// When `reminder` should fire for `occurrence`.
///
/// Returns `None` for an END reminder on an occurrence without an end, or if
/// the subtraction leaves chrono's representable range.
///
/// MONTHS is calendar subtraction on the anchor's date: the day is clamped to
/// the last day of the target month (2024-03-31 minus one month is
/// 2024-02-29) and time-of-day is kept. Every other unit is a fixed duration.
pub fn compute_trigger(occurrence: &Occurrence, reminder: &ReminderSpec) -> Option<NaiveDateTime> {
    let anchor = match reminder.kind {
        ReminderKind::Start => occurrence.start,
        ReminderKind::End => occurrence.end?,
    };
    subtract_offset(anchor, reminder.offset_value, reminder.offset_unit)
}

fn subtract_offset(anchor: NaiveDateTime, value: u32, unit: OffsetUnit) -> Option<NaiveDateTime> {
    let value = i64::from(value);
    let fixed = match unit {
        OffsetUnit::Minutes => Duration::minutes(value),
        OffsetUnit::Hours => Duration::hours(value),
        OffsetUnit::Days => Duration::days(value),
        OffsetUnit::Weeks => Duration::days(value * 7),
        OffsetUnit::Months => {
            let months = u32::try_from(value).ok()?;
            return anchor.checked_sub_months(Months::new(months));
        }
    };
    anchor.checked_sub_signed(fixed)
}
