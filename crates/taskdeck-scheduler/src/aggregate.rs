use chrono::{Duration, Months, NaiveDateTime};
use taskdeck_core::{Clock, Schedulable};
use tracing::debug;

use crate::{
    occurrence::generate_occurrences,
    rule::{parse_rule, RuleParse},
    trigger::compute_trigger,
    types::{Occurrence, UpcomingAlert, Window},
};

/// Lookahead for the next occurrence of a recurring item: one year and a day.
pub fn horizon(now: NaiveDateTime) -> Window {
    let year_out = now
        .checked_add_months(Months::new(12))
        .unwrap_or(NaiveDateTime::MAX);
    let end = year_out
        .checked_add_signed(Duration::days(1))
        .unwrap_or(NaiveDateTime::MAX);
    Window::new(now, end)
}

/// Every alert `item` still has ahead of it.
///
/// Recurring items only contribute alerts for their next occurrence; later
/// ones are picked up when the collection is refreshed after that occurrence.
pub fn upcoming_alerts<T: Schedulable>(item: &T, clock: &dyn Clock) -> Vec<UpcomingAlert> {
    let now = clock.now();
    if !item.is_recurring() {
        return alerts_for_occurrence(item, &Occurrence::of(item, now), now, clock);
    }

    let Some(descriptor) = item.recurrence() else {
        return Vec::new();
    };
    let rule = match parse_rule(descriptor) {
        RuleParse::Rule { rule, .. } => rule,
        RuleParse::NoRule(reason) => {
            debug!(item_id = %item.id(), ?reason, "recurring item has no usable rule");
            return Vec::new();
        }
    };
    match generate_occurrences(item, &rule, horizon(now), now).first() {
        Some(next) => alerts_for_occurrence(item, next, now, clock),
        None => Vec::new(),
    }
}

/// Flatten [`upcoming_alerts`] over a whole collection, preserving item order.
pub fn collect_candidates<T: Schedulable>(items: &[T], clock: &dyn Clock) -> Vec<UpcomingAlert> {
    items
        .iter()
        .flat_map(|item| upcoming_alerts(item, clock))
        .collect()
}

fn alerts_for_occurrence<T: Schedulable>(
    item: &T,
    occurrence: &Occurrence,
    now: NaiveDateTime,
    clock: &dyn Clock,
) -> Vec<UpcomingAlert> {
    let alert = |at: NaiveDateTime, reminder| {
        UpcomingAlert::new(item.id().clone(), at, reminder, clock.epoch_millis(at))
    };

    let mut alerts: Vec<UpcomingAlert> = item
        .reminders()
        .iter()
        .filter_map(|reminder| {
            compute_trigger(occurrence, reminder)
                .filter(|at| *at > now)
                .map(|at| alert(at, Some(*reminder)))
        })
        .collect();

    if !occurrence.all_day && occurrence.start > now {
        alerts.push(alert(occurrence.start, None));
    }
    alerts
}
