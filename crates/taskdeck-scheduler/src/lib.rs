//! `taskdeck-scheduler` — recurrence expansion and reminder alerting for tasks.
//!
//! # Overview
//!
//! Tasks live in a SQLite [`store::TaskStore`], which republishes the whole
//! collection on every change. The [`engine::AlertEngine`] rebuilds the list
//! of upcoming alerts from that collection and, once per tick, asks the
//! [`tracker::AlertTracker`] to surface at most one due alert.
//!
//! # Pipeline
//!
//! | Stage                              | Input                    | Output                |
//! |------------------------------------|--------------------------|-----------------------|
//! | [`rule::parse_rule`]               | `FREQ=...;` descriptor   | [`RecurrenceRule`]    |
//! | [`occurrence::generate_occurrences`] | item + rule + window   | [`Occurrence`]s       |
//! | [`trigger::compute_trigger`]       | occurrence + reminder    | trigger time          |
//! | [`aggregate::collect_candidates`]  | item collection          | [`UpcomingAlert`]s    |
//! | [`tracker::AlertTracker::tick`]    | candidates + now         | surfaced alert        |
//!
//! Only `WEEKLY` and `MONTHLY` frequencies are understood. Anything else
//! parses to "no rule" and the item produces no alerts.

pub mod aggregate;
pub mod db;
pub mod engine;
pub mod error;
pub mod occurrence;
pub mod rule;
pub mod store;
pub mod task;
pub mod tracker;
pub mod trigger;
pub mod types;

pub use aggregate::{collect_candidates, upcoming_alerts};
pub use engine::{AlertEngine, AlertHandle};
pub use error::{Result, SchedulerError};
pub use rule::{parse_rule, RuleParse};
pub use store::TaskStore;
pub use task::{NewTask, Task};
pub use tracker::{AlertTracker, ItemLookup};
pub use types::{Frequency, Occurrence, RecurrenceRule, SurfacedAlert, UpcomingAlert, Window};
