use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use chrono::{NaiveDateTime, TimeDelta};
use taskdeck_core::{Clock, ItemId, Schedulable};
use taskdeck_scheduler::{
    collect_candidates, occurrence::generate_occurrences, parse_rule, AlertEngine, NewTask,
    Occurrence, RuleParse, SurfacedAlert, Task, TaskStore, UpcomingAlert, Window,
};
use tokio::sync::watch;
use tracing::{info, warn};

use crate::cli::AddArgs;

const TIME: &str = "%Y-%m-%d %H:%M";

pub fn add(store: &TaskStore, args: AddArgs) -> anyhow::Result<()> {
    let mut new = NewTask::new(args.title, args.start);
    if let Some(end) = args.end {
        new = new.ending(end);
    }
    if args.all_day {
        new = new.all_day();
    }
    if let Some(descriptor) = args.repeat {
        report_descriptor(&descriptor);
        new = new.repeating(descriptor);
    }
    new.reminders = args.reminders;
    new.sound = !args.no_sound;
    new.vibrate = !args.no_vibrate;
    new.snooze_minutes = args.snooze;

    let task = store.add_task(new)?;
    println!("{}", task.id);
    Ok(())
}

/// Warn about descriptor fields that will be ignored.
fn report_descriptor(descriptor: &str) {
    if let RuleParse::Rule { rule, ignored } = parse_rule(descriptor) {
        for field in &ignored {
            warn!(key = %field.key, value = %field.value, reason = ?field.reason, "descriptor field ignored");
        }
        if !ignored.is_empty() {
            info!(canonical = %rule, "effective recurrence");
        }
    }
}

pub fn list(store: &TaskStore, json: bool) -> anyhow::Result<()> {
    let tasks = store.list_tasks()?;
    if json {
        println!("{}", serde_json::to_string_pretty(&tasks)?);
        return Ok(());
    }
    for task in &tasks {
        println!("{}", describe(task));
        for reminder in task.reminders() {
            println!("    - {}", reminder.label());
        }
    }
    Ok(())
}

pub fn occurrences(
    store: &TaskStore,
    clock: &dyn Clock,
    id: &str,
    days: u32,
    json: bool,
) -> anyhow::Result<()> {
    let task = find(store, id)?;
    let now = clock.now();
    let window = lookahead(now, days)?;

    let occurrences: Vec<Occurrence> = match task.recurrence() {
        Some(descriptor) => match parse_rule(descriptor).into_rule() {
            Some(rule) => generate_occurrences(&task, &rule, window, now),
            None => bail!("task {id} has an unusable recurrence descriptor: {descriptor}"),
        },
        None => {
            let single = Occurrence::of(&task, now);
            if window.contains(single.start) {
                vec![single]
            } else {
                Vec::new()
            }
        }
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&occurrences)?);
        return Ok(());
    }
    for occurrence in &occurrences {
        match occurrence.end {
            Some(end) => println!("{} → {}", occurrence.start.format(TIME), end.format(TIME)),
            None => println!("{}", occurrence.start.format(TIME)),
        }
    }
    Ok(())
}

/// `[now, now + days)`, or an error when that leaves the representable range.
fn lookahead(now: NaiveDateTime, days: u32) -> anyhow::Result<Window> {
    let Some(end) = TimeDelta::try_days(i64::from(days)).and_then(|d| now.checked_add_signed(d))
    else {
        bail!("--days {days} reaches past the last representable date");
    };
    Ok(Window::new(now, end))
}

pub fn next(store: &TaskStore, clock: &dyn Clock, limit: usize, json: bool) -> anyhow::Result<()> {
    let tasks = store.list_tasks()?;
    let mut alerts = collect_candidates(&tasks, clock);
    alerts.sort_by_key(|a| a.trigger_time);
    alerts.truncate(limit);

    if json {
        println!("{}", serde_json::to_string_pretty(&alerts)?);
        return Ok(());
    }
    for alert in &alerts {
        let title = tasks
            .iter()
            .find(|t| t.id == alert.item_id)
            .map(|t| t.title.as_str())
            .unwrap_or("?");
        println!("{}  {}  ({})", alert.trigger_time.format(TIME), title, reason(alert));
    }
    Ok(())
}

pub fn remove(store: &TaskStore, id: &str) -> anyhow::Result<()> {
    store.remove_task(&ItemId::from(id))?;
    println!("removed {id}");
    Ok(())
}

/// Run the engine until Ctrl-C, printing and dismissing each surfaced alert.
pub async fn watch(
    store: Arc<TaskStore>,
    clock: Arc<dyn Clock>,
    period: Duration,
    reload_every: Duration,
) -> anyhow::Result<()> {
    let (engine, handle) =
        AlertEngine::new(store.subscribe(), Arc::clone(&store), clock, period);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let engine_task = tokio::spawn(engine.run(shutdown_rx));

    let mut surfaced = handle.subscribe();
    let mut reload = tokio::time::interval(reload_every.max(Duration::from_secs(1)));
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    println!("watching {} task(s); Ctrl-C to stop", store.list_tasks()?.len());

    loop {
        tokio::select! {
            changed = surfaced.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = surfaced.borrow_and_update().clone();
                if let Some(alert) = current {
                    print_alert(&alert);
                    handle.dismiss();
                    // Candidates only cover each recurring task's next
                    // occurrence; rebuild so the one after it is scheduled.
                    store.touch();
                }
            }
            _ = reload.tick() => {
                if let Err(e) = store.reload() {
                    warn!("task reload failed: {e}");
                }
            }
            _ = &mut ctrl_c => {
                info!("interrupt received");
                break;
            }
        }
    }

    let _ = shutdown_tx.send(true);
    engine_task.await.context("alert engine task panicked")?;
    Ok(())
}

fn print_alert(surfaced: &SurfacedAlert<Task>) {
    let task = &surfaced.item;
    let mut flags = Vec::new();
    if task.sound() {
        flags.push("sound".to_string());
    }
    if task.vibrate() {
        flags.push("vibrate".to_string());
    }
    if let Some(minutes) = task.snooze_minutes() {
        flags.push(format!("snooze {minutes}m"));
    }
    println!(
        "[{}] {}: {} [{}]",
        surfaced.alert.trigger_time.format(TIME),
        task.title(),
        reason(&surfaced.alert),
        flags.join(", ")
    );
}

fn reason(alert: &UpcomingAlert) -> String {
    match &alert.reminder {
        Some(reminder) => reminder.label(),
        None => "starting now".to_string(),
    }
}

fn describe(task: &Task) -> String {
    let when = if task.all_day {
        format!("{} (all day)", task.start.format("%Y-%m-%d"))
    } else {
        task.start.format(TIME).to_string()
    };
    let repeat = task
        .recurrence
        .as_deref()
        .map(|r| format!("  [{r}]"))
        .unwrap_or_default();
    format!("{}  {}  {}{}", task.id, when, task.title, repeat)
}

fn find(store: &TaskStore, id: &str) -> anyhow::Result<Task> {
    store
        .get_task(&ItemId::from(id))?
        .with_context(|| format!("no task with id {id}"))
}
