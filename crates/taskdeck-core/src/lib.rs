//! `taskdeck-core` — types shared by every taskdeck crate.
//!
//! Configuration loading, the workspace error type, the injectable [`clock::Clock`]
//! and the [`types::Schedulable`] capability implemented by anything that can
//! carry reminders.

pub mod clock;
pub mod config;
pub mod error;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::TaskdeckConfig;
pub use error::{Result, TaskdeckError};
pub use types::{ItemId, OffsetUnit, ReminderKind, ReminderSpec, Schedulable};
