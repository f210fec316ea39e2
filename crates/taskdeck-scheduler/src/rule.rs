//! Recurrence descriptor parsing and rendering.
//!
//! The descriptor is the string stored alongside a task:
//!
//! ```text
//! FREQ=MONTHLY;INTERVAL=1;BYMONTHDAY=1,15,-1;UNTIL=20251231
//! ```
//!
//! Parsing never fails. An unusable `FREQ` yields [`RuleParse::NoRule`];
//! anything else that cannot be understood is dropped and listed in
//! [`RuleParse::Rule::ignored`] so callers can surface or log it.

use std::fmt;

use chrono::{NaiveDate, Weekday};
use tracing::debug;

use crate::types::{is_valid_month_day, Frequency, RecurrenceRule};

const KEY_FREQ: &str = "FREQ";
const KEY_INTERVAL: &str = "INTERVAL";
const KEY_UNTIL: &str = "UNTIL";
const KEY_BYDAY: &str = "BYDAY";
const KEY_BYMONTH: &str = "BYMONTH";
const KEY_BYMONTHDAY: &str = "BYMONTHDAY";

/// Why a descriptor produced no rule at all.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NoRuleReason {
    /// Empty or whitespace-only descriptor.
    Blank,
    /// No `FREQ` key, or `FREQ` with an empty value.
    MissingFrequency,
    /// `FREQ` names something other than WEEKLY or MONTHLY.
    UnsupportedFrequency(String),
}

/// Why a single field (or list entry) was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    UnknownKey,
    /// Valid key, but meaningless for the rule's frequency.
    NotApplicable,
    /// Token without `=`.
    MissingValue,
    Malformed,
    OutOfRange,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IgnoredField {
    pub key: String,
    pub value: String,
    pub reason: IgnoreReason,
}

impl IgnoredField {
    fn new(key: &str, value: &str, reason: IgnoreReason) -> Self {
        Self {
            key: key.to_string(),
            value: value.to_string(),
            reason,
        }
    }
}

/// Outcome of [`parse_rule`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleParse {
    NoRule(NoRuleReason),
    Rule {
        rule: RecurrenceRule,
        ignored: Vec<IgnoredField>,
    },
}

impl RuleParse {
    pub fn rule(&self) -> Option<&RecurrenceRule> {
        match self {
            RuleParse::Rule { rule, .. } => Some(rule),
            RuleParse::NoRule(_) => None,
        }
    }

    pub fn into_rule(self) -> Option<RecurrenceRule> {
        match self {
            RuleParse::Rule { rule, .. } => Some(rule),
            RuleParse::NoRule(_) => None,
        }
    }

    pub fn ignored(&self) -> &[IgnoredField] {
        match self {
            RuleParse::Rule { ignored, .. } => ignored,
            RuleParse::NoRule(_) => &[],
        }
    }
}

/// Parse a `KEY=VALUE;KEY=VALUE` descriptor. Keys are case-insensitive and
/// the last occurrence of a duplicated key wins.
pub fn parse_rule(descriptor: &str) -> RuleParse {
    if descriptor.trim().is_empty() {
        return RuleParse::NoRule(NoRuleReason::Blank);
    }

    let mut ignored = Vec::new();
    // Insertion-ordered so diagnostics follow the descriptor; values are
    // overwritten in place on duplicates.
    let mut fields: Vec<(String, String)> = Vec::new();
    for token in descriptor.split(';').map(str::trim).filter(|t| !t.is_empty()) {
        let Some((key, value)) = token.split_once('=') else {
            ignored.push(IgnoredField::new(token, "", IgnoreReason::MissingValue));
            continue;
        };
        let key = key.trim().to_ascii_uppercase();
        let value = value.trim().to_string();
        match fields.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => fields.push((key, value)),
        }
    }

    let frequency = match fields.iter().find(|(k, _)| k == KEY_FREQ) {
        None => return RuleParse::NoRule(NoRuleReason::MissingFrequency),
        Some((_, v)) if v.is_empty() => {
            return RuleParse::NoRule(NoRuleReason::MissingFrequency)
        }
        Some((_, v)) => match v.parse::<Frequency>() {
            Ok(f) => f,
            Err(_) => return RuleParse::NoRule(NoRuleReason::UnsupportedFrequency(v.clone())),
        },
    };

    let interval = fields
        .iter()
        .find(|(k, _)| k == KEY_INTERVAL)
        .map_or(1, |(_, v)| parse_interval(v, &mut ignored));
    let mut rule = RecurrenceRule::new(frequency, interval);

    for (key, value) in &fields {
        match (key.as_str(), frequency) {
            (KEY_FREQ, _) | (KEY_INTERVAL, _) => {}
            (KEY_UNTIL, _) => match parse_until(value) {
                Some(date) => rule = rule.with_until(date),
                None => ignored.push(IgnoredField::new(key, value, IgnoreReason::Malformed)),
            },
            (KEY_BYDAY, Frequency::Weekly) => {
                let days = split_list(value).filter_map(|token| match parse_weekday(token) {
                    Some(day) => Some(day),
                    None => {
                        ignored.push(IgnoredField::new(key, token, IgnoreReason::Malformed));
                        None
                    }
                });
                rule = rule.with_days(days.collect::<Vec<_>>());
            }
            (KEY_BYMONTH, Frequency::Monthly) => {
                let mut months = Vec::new();
                for token in split_list(value) {
                    match token.parse::<i64>() {
                        Ok(m) if (1..=12).contains(&m) => months.push(m as u32),
                        Ok(_) => ignored.push(IgnoredField::new(key, token, IgnoreReason::OutOfRange)),
                        Err(_) => ignored.push(IgnoredField::new(key, token, IgnoreReason::Malformed)),
                    }
                }
                rule = rule.with_months(months);
            }
            (KEY_BYMONTHDAY, Frequency::Monthly) => {
                let mut days = Vec::new();
                for token in split_list(value) {
                    match token.parse::<i64>().map(i32::try_from) {
                        Ok(Ok(d)) if is_valid_month_day(d) => days.push(d),
                        Ok(_) => ignored.push(IgnoredField::new(key, token, IgnoreReason::OutOfRange)),
                        Err(_) => ignored.push(IgnoredField::new(key, token, IgnoreReason::Malformed)),
                    }
                }
                rule = rule.with_month_days(days);
            }
            (KEY_BYDAY | KEY_BYMONTH | KEY_BYMONTHDAY, _) => {
                ignored.push(IgnoredField::new(key, value, IgnoreReason::NotApplicable));
            }
            _ => ignored.push(IgnoredField::new(key, value, IgnoreReason::UnknownKey)),
        }
    }

    if !ignored.is_empty() {
        debug!(%descriptor, dropped = ignored.len(), "recurrence descriptor had ignored fields");
    }
    RuleParse::Rule { rule, ignored }
}

fn parse_interval(value: &str, ignored: &mut Vec<IgnoredField>) -> u32 {
    match value.parse::<i64>() {
        Ok(n) if n >= 1 => u32::try_from(n).unwrap_or(u32::MAX),
        Ok(_) => {
            ignored.push(IgnoredField::new(KEY_INTERVAL, value, IgnoreReason::OutOfRange));
            1
        }
        Err(_) => {
            ignored.push(IgnoredField::new(KEY_INTERVAL, value, IgnoreReason::Malformed));
            1
        }
    }
}

/// Strict `YYYYMMDD`.
fn parse_until(value: &str) -> Option<NaiveDate> {
    if value.len() != 8 || !value.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    NaiveDate::parse_from_str(value, "%Y%m%d").ok()
}

fn split_list(value: &str) -> impl Iterator<Item = &str> {
    value.split(',').map(str::trim).filter(|t| !t.is_empty())
}

fn parse_weekday(code: &str) -> Option<Weekday> {
    match code.to_ascii_uppercase().as_str() {
        "MO" => Some(Weekday::Mon),
        "TU" => Some(Weekday::Tue),
        "WE" => Some(Weekday::Wed),
        "TH" => Some(Weekday::Thu),
        "FR" => Some(Weekday::Fri),
        "SA" => Some(Weekday::Sat),
        "SU" => Some(Weekday::Sun),
        _ => None,
    }
}

fn weekday_code(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "MO",
        Weekday::Tue => "TU",
        Weekday::Wed => "WE",
        Weekday::Thu => "TH",
        Weekday::Fri => "FR",
        Weekday::Sat => "SA",
        Weekday::Sun => "SU",
    }
}

fn join<T: ToString>(items: impl IntoIterator<Item = T>) -> String {
    items
        .into_iter()
        .map(|i| i.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

/// Canonical descriptor; [`parse_rule`] reads it back to an equal rule.
impl fmt::Display for RecurrenceRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{KEY_FREQ}={};{KEY_INTERVAL}={}", self.frequency(), self.interval())?;
        match self.frequency() {
            Frequency::Weekly => {
                if !self.by_day().is_empty() {
                    write!(f, ";{KEY_BYDAY}={}", join(self.by_day().iter().map(|d| weekday_code(*d))))?;
                }
            }
            Frequency::Monthly => {
                if !self.by_month().is_empty() {
                    write!(f, ";{KEY_BYMONTH}={}", join(self.by_month()))?;
                }
                if !self.by_month_day().is_empty() {
                    write!(f, ";{KEY_BYMONTHDAY}={}", join(self.by_month_day()))?;
                }
            }
        }
        if let Some(until) = self.until() {
            write!(f, ";{KEY_UNTIL}={}", until.format("%Y%m%d"))?;
        }
        Ok(())
    }
}
