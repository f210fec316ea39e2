use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use clap::{Args, Parser, Subcommand};
use taskdeck_core::ReminderSpec;

#[derive(Debug, Parser)]
#[command(name = "taskdeck", version, about = "Recurring tasks with reminder alerts")]
pub struct Cli {
    /// Config file (overrides TASKDECK_CONFIG and ~/.taskdeck/taskdeck.toml).
    #[arg(long, global = true)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Add a task.
    Add(AddArgs),
    /// List all tasks in start order.
    List {
        #[arg(long)]
        json: bool,
    },
    /// Expand a task's occurrences over the next N days.
    Occurrences {
        id: String,
        /// Lookahead in days, at most a century.
        #[arg(long, default_value_t = 30, value_parser = clap::value_parser!(u32).range(1..=36_600))]
        days: u32,
        #[arg(long)]
        json: bool,
    },
    /// Show the pending alerts across all tasks, soonest first.
    Next {
        #[arg(long, default_value_t = 10)]
        limit: usize,
        #[arg(long)]
        json: bool,
    },
    /// Delete a task and its reminders.
    Remove { id: String },
    /// Run the alert engine in the foreground until interrupted.
    ///
    /// Each task contributes alerts for its next occurrence only. Alert
    /// candidates are rebuilt after every printed alert and whenever the task
    /// data changes, which is how a recurring task moves on to its following
    /// occurrence.
    Watch {
        /// Seconds between re-reads of the database for changes made elsewhere.
        #[arg(long, default_value_t = 30)]
        reload_secs: u64,
    },
}

#[derive(Debug, Args)]
pub struct AddArgs {
    pub title: String,

    /// `YYYY-MM-DD HH:MM`, or just `YYYY-MM-DD` with --all-day.
    #[arg(long, value_parser = parse_local)]
    pub start: NaiveDateTime,

    #[arg(long, value_parser = parse_local)]
    pub end: Option<NaiveDateTime>,

    #[arg(long)]
    pub all_day: bool,

    /// Recurrence descriptor, e.g. `FREQ=WEEKLY;BYDAY=MO,WE`.
    #[arg(long)]
    pub repeat: Option<String>,

    /// Reminder in compact form (`start:15m`, `end:1h`, `start:1mo`). Repeatable.
    #[arg(long = "remind")]
    pub reminders: Vec<ReminderSpec>,

    #[arg(long)]
    pub no_sound: bool,

    #[arg(long)]
    pub no_vibrate: bool,

    /// Minutes offered by the snooze action.
    #[arg(long)]
    pub snooze: Option<u32>,
}

/// Accepts `YYYY-MM-DD HH:MM[:SS]`, the same with a `T` separator, or a bare date (midnight).
fn parse_local(s: &str) -> Result<NaiveDateTime, String> {
    let s = s.trim();
    for format in ["%Y-%m-%d %H:%M", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(t) = NaiveDateTime::parse_from_str(s, format) {
            return Ok(t);
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map(|d| d.and_time(NaiveTime::MIN))
        .map_err(|_| format!("expected YYYY-MM-DD[ HH:MM], got {s:?}"))
}
