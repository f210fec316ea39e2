use chrono::{Datelike, NaiveDate, NaiveDateTime};
use taskdeck_core::Schedulable;

use crate::types::{Frequency, Occurrence, RecurrenceRule, Window, LAST_DAY_OF_MONTH};

/// Expand `item` under `rule` into the occurrences whose start falls inside
/// `window`, in ascending order, at most one per calendar date.
///
/// Dates are scanned one at a time from the window's first date up to (but
/// excluding) the date of `window.end`. Walking day by day keeps month-length
/// and last-day-of-month handling trivially correct; callers keep windows
/// bounded (see [`crate::aggregate::horizon`]).
pub fn generate_occurrences<T: Schedulable>(
    item: &T,
    rule: &RecurrenceRule,
    window: Window,
    now: NaiveDateTime,
) -> Vec<Occurrence> {
    let base = item.start();
    let base_date = base.date();
    let duration = item.end().map(|end| end - base);
    let last_date = window.end.date();

    window
        .start
        .date()
        .iter_days()
        .take_while(|date| *date < last_date)
        .filter(|date| date_matches(rule, base_date, *date))
        .map(|date| date.and_time(base.time()))
        .filter(|start| window.contains(*start))
        .map(|start| {
            let end = duration.map(|d| start + d);
            Occurrence::new(start, end, item.all_day(), now)
        })
        .collect()
}

/// Membership test for a single calendar date.
pub fn date_matches(rule: &RecurrenceRule, base: NaiveDate, date: NaiveDate) -> bool {
    if date < base {
        return false;
    }
    if rule.until().is_some_and(|until| date > until) {
        return false;
    }
    let interval = i64::from(rule.interval());
    match rule.frequency() {
        Frequency::Weekly => {
            if !rule.by_day().contains(&date.weekday()) {
                return false;
            }
            let weeks = (date - base).num_days() / 7;
            weeks % interval == 0
        }
        Frequency::Monthly => {
            let months = months_between(base, date);
            if months < 0 || months % interval != 0 {
                return false;
            }
            if !rule.by_month().is_empty() && !rule.by_month().contains(&date.month()) {
                return false;
            }
            rule.by_month_day().iter().any(|&day| {
                (day == LAST_DAY_OF_MONTH && is_last_day_of_month(date))
                    || day == date.day() as i32
            })
        }
    }
}

/// Whole calendar months from `from`'s month to `to`'s month, ignoring days.
fn months_between(from: NaiveDate, to: NaiveDate) -> i64 {
    let years = i64::from(to.year() - from.year());
    years * 12 + i64::from(to.month()) - i64::from(from.month())
}

fn is_last_day_of_month(date: NaiveDate) -> bool {
    date.succ_opt().map_or(true, |next| next.month() != date.month())
}
