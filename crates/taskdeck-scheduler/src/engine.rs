use std::sync::Arc;
use std::time::Duration;

use taskdeck_core::{Clock, Schedulable};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::{
    aggregate::collect_candidates,
    tracker::{AlertTracker, ItemLookup, SurfacedSlot},
    types::{SurfacedAlert, UpcomingAlert},
};

/// Latest candidate list. Replaced wholesale, never edited in place.
pub type CandidateSnapshot = Arc<Vec<UpcomingAlert>>;

/// Cloneable handle for observing and dismissing alerts while the engine runs.
pub struct AlertHandle<T> {
    surfaced: SurfacedSlot<T>,
    candidates: watch::Receiver<CandidateSnapshot>,
}

impl<T> Clone for AlertHandle<T> {
    fn clone(&self) -> Self {
        Self {
            surfaced: Arc::clone(&self.surfaced),
            candidates: self.candidates.clone(),
        }
    }
}

impl<T: Schedulable> AlertHandle<T> {
    /// Receiver that wakes whenever an alert is surfaced or dismissed.
    pub fn subscribe(&self) -> watch::Receiver<Option<SurfacedAlert<T>>> {
        self.surfaced.subscribe()
    }

    pub fn current(&self) -> Option<SurfacedAlert<T>> {
        self.surfaced.borrow().clone()
    }

    /// Clear the surfaced alert. Returns what was showing, if anything.
    pub fn dismiss(&self) -> Option<SurfacedAlert<T>> {
        let previous = self.surfaced.send_replace(None);
        if let Some(ref surfaced) = previous {
            info!(item_id = %surfaced.alert.item_id, key = %surfaced.alert.unique_key(), "alert dismissed");
        }
        previous
    }

    /// The candidate list the next tick will read.
    pub fn candidates(&self) -> CandidateSnapshot {
        Arc::clone(&self.candidates.borrow())
    }
}

/// Drives the alert tracker: one refresh task rebuilding candidates whenever
/// the item collection changes, and one fixed-period tick loop.
pub struct AlertEngine<T, L: ?Sized> {
    tracker: AlertTracker<T>,
    items: watch::Receiver<Arc<Vec<T>>>,
    lookup: Arc<L>,
    clock: Arc<dyn Clock>,
    period: Duration,
    candidates_tx: watch::Sender<CandidateSnapshot>,
    candidates_rx: watch::Receiver<CandidateSnapshot>,
}

impl<T, L> AlertEngine<T, L>
where
    T: Schedulable,
    L: ItemLookup<T> + ?Sized + 'static,
{
    /// `items` is the continuously-updated collection; `lookup` resolves a
    /// single item when its alert comes due.
    pub fn new(
        items: watch::Receiver<Arc<Vec<T>>>,
        lookup: Arc<L>,
        clock: Arc<dyn Clock>,
        period: Duration,
    ) -> (Self, AlertHandle<T>) {
        let tracker = AlertTracker::new();
        let (candidates_tx, candidates_rx) = watch::channel(Arc::new(Vec::new()));
        let handle = AlertHandle {
            surfaced: tracker.slot(),
            candidates: candidates_rx.clone(),
        };
        let engine = Self {
            tracker,
            items,
            lookup,
            clock,
            period,
            candidates_tx,
            candidates_rx,
        };
        (engine, handle)
    }

    /// Main event loop. Ticks every `period` until `shutdown` broadcasts `true`
    /// (or its sender is dropped), then stops the refresh task too.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!(period_ms = self.period.as_millis() as u64, "alert engine started");

        let refresher = tokio::spawn(refresh_candidates(
            self.items.clone(),
            self.candidates_tx.clone(),
            Arc::clone(&self.clock),
            shutdown.clone(),
        ));

        let mut interval = tokio::time::interval(self.period);
        // A slow lookup delays the next tick instead of bunching them up.
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.tick().await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("alert engine shutting down");
                        break;
                    }
                }
            }
        }

        refresher.abort();
        let _ = refresher.await;
    }

    async fn tick(&mut self) {
        let now = self.clock.now();
        // Cheap Arc clone; the refresh task may swap in a new list mid-tick.
        let snapshot = Arc::clone(&self.candidates_rx.borrow());
        self.tracker.tick(now, &snapshot, self.lookup.as_ref()).await;
    }
}

/// Rebuild the candidate list from the full collection now and after every change.
async fn refresh_candidates<T: Schedulable>(
    mut items: watch::Receiver<Arc<Vec<T>>>,
    candidates: watch::Sender<CandidateSnapshot>,
    clock: Arc<dyn Clock>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        let collection = Arc::clone(&items.borrow_and_update());
        let fresh = collect_candidates(&collection, clock.as_ref());
        debug!(items = collection.len(), candidates = fresh.len(), "alert candidates refreshed");
        candidates.send_replace(Arc::new(fresh));

        tokio::select! {
            changed = items.changed() => {
                if changed.is_err() {
                    debug!("item collection closed; keeping last candidates");
                    return;
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use async_trait::async_trait;
    use chrono::{FixedOffset, NaiveDate, NaiveDateTime, Offset, Utc};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use taskdeck_core::{ItemId, ManualClock, OffsetUnit, ReminderSpec};

    #[derive(Debug, Clone)]
    struct Item {
        id: ItemId,
        start: NaiveDateTime,
        reminders: Vec<ReminderSpec>,
    }

    impl Schedulable for Item {
        fn id(&self) -> &ItemId {
            &self.id
        }
        fn title(&self) -> &str {
            "item"
        }
        fn start(&self) -> NaiveDateTime {
            self.start
        }
        fn end(&self) -> Option<NaiveDateTime> {
            None
        }
        fn all_day(&self) -> bool {
            false
        }
        fn recurrence(&self) -> Option<&str> {
            None
        }
        fn reminders(&self) -> &[ReminderSpec] {
            &self.reminders
        }
    }

    /// Looks items up in the same collection the engine watches.
    struct Collection(watch::Receiver<Arc<Vec<Item>>>);

    #[async_trait]
    impl ItemLookup<Item> for Collection {
        async fn find(&self, id: &ItemId) -> Result<Option<Item>> {
            Ok(self.0.borrow().iter().find(|i| &i.id == id).cloned())
        }
    }

    /// Wall clock that follows tokio's (paused) timer.
    struct TimerClock {
        base: NaiveDateTime,
        origin: tokio::time::Instant,
    }

    impl TimerClock {
        fn starting_at(base: NaiveDateTime) -> Self {
            Self {
                base,
                origin: tokio::time::Instant::now(),
            }
        }
    }

    impl Clock for TimerClock {
        fn now(&self) -> NaiveDateTime {
            self.base + chrono::Duration::from_std(self.origin.elapsed()).unwrap()
        }
        fn offset(&self) -> FixedOffset {
            Utc.fix()
        }
    }

    /// Lookup that takes several tick periods and records overlap.
    struct SlowLookup {
        items: HashMap<ItemId, Item>,
        delay: Duration,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        calls: AtomicUsize,
    }

    impl SlowLookup {
        fn new(items: &[Item], delay: Duration) -> Self {
            Self {
                items: items.iter().map(|i| (i.id.clone(), i.clone())).collect(),
                delay,
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl ItemLookup<Item> for SlowLookup {
        async fn find(&self, id: &ItemId) -> Result<Option<Item>> {
            let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(running, Ordering::SeqCst);
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(self.items.get(id).cloned())
        }
    }

    fn starting_in(id: &str, secs: i64) -> Item {
        Item {
            id: ItemId::from(id),
            start: t0() + chrono::Duration::seconds(secs),
            reminders: Vec::new(),
        }
    }

    fn t0() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 10)
            .unwrap()
            .and_hms_opt(8, 0, 0)
            .unwrap()
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(1_500)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn surfaces_due_reminder_then_stays_quiet_after_dismiss() {
        let clock = Arc::new(ManualClock::new(t0()));
        let item = Item {
            id: ItemId::from("standup"),
            start: t0() + chrono::Duration::hours(1),
            reminders: vec![ReminderSpec::before_start(30, OffsetUnit::Minutes)],
        };
        let (items_tx, items_rx) = watch::channel(Arc::new(vec![item]));
        let lookup = Arc::new(Collection(items_rx.clone()));
        let (engine, handle) =
            AlertEngine::new(items_rx, lookup, clock.clone(), Duration::from_secs(1));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(engine.run(shutdown_rx));

        settle().await;
        assert_eq!(handle.candidates().len(), 2);
        assert!(handle.current().is_none());

        clock.advance(chrono::Duration::minutes(30));
        settle().await;
        let surfaced = handle.current().expect("reminder should surface");
        assert_eq!(surfaced.item.id.as_str(), "standup");
        assert!(surfaced.alert.reminder.is_some());

        assert!(handle.dismiss().is_some());
        settle().await;
        assert!(handle.current().is_none());

        // The implicit at-start alert is a separate key.
        clock.advance(chrono::Duration::minutes(30));
        settle().await;
        assert!(handle.current().unwrap().alert.reminder.is_none());

        drop(items_tx);
        shutdown_tx.send(true).unwrap();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn collection_updates_replace_candidates() {
        let clock = Arc::new(ManualClock::new(t0()));
        let (items_tx, items_rx) = watch::channel(Arc::new(Vec::<Item>::new()));
        let lookup = Arc::new(Collection(items_rx.clone()));
        let (engine, handle) =
            AlertEngine::new(items_rx, lookup, clock.clone(), Duration::from_secs(1));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(engine.run(shutdown_rx));

        settle().await;
        assert!(handle.candidates().is_empty());

        let item = Item {
            id: ItemId::from("late"),
            start: t0() + chrono::Duration::seconds(2),
            reminders: Vec::new(),
        };
        items_tx.send_replace(Arc::new(vec![item]));
        settle().await;
        assert_eq!(handle.candidates().len(), 1);

        clock.advance(chrono::Duration::seconds(2));
        let mut surfaced = handle.subscribe();
        surfaced
            .wait_for(|s| s.is_some())
            .await
            .expect("engine alive");

        // Deleting the item drops its candidates on the next refresh.
        items_tx.send_replace(Arc::new(Vec::new()));
        settle().await;
        assert!(handle.candidates().is_empty());

        drop(shutdown_tx);
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn ticks_wait_for_slow_lookups_and_never_overlap() {
        // Due at +1s, +2s and +3s; each lookup takes five tick periods.
        let items = vec![starting_in("a", 1), starting_in("b", 2), starting_in("c", 3)];
        let lookup = Arc::new(SlowLookup::new(&items, Duration::from_secs(5)));
        let clock = Arc::new(TimerClock::starting_at(t0()));
        let (_items_tx, items_rx) = watch::channel(Arc::new(items));
        let (engine, handle) =
            AlertEngine::new(items_rx, Arc::clone(&lookup), clock, Duration::from_secs(1));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(engine.run(shutdown_rx));

        tokio::time::sleep(Duration::from_secs(15)).await;

        assert_eq!(lookup.max_in_flight.load(Ordering::SeqCst), 1);
        // "a" alone in the first due tick; "b" and "c" come due together in
        // the next one, where "c" loses to "b".
        assert_eq!(lookup.calls.load(Ordering::SeqCst), 2);
        assert_eq!(handle.current().unwrap().item.id.as_str(), "b");

        shutdown_tx.send(true).unwrap();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn candidates_swapped_mid_lookup_do_not_change_that_tick() {
        let a = starting_in("a", 1);
        let later = starting_in("later", 60);
        let lookup = Arc::new(SlowLookup::new(&[a.clone()], Duration::from_secs(5)));
        let clock = Arc::new(TimerClock::starting_at(t0()));
        let (items_tx, items_rx) = watch::channel(Arc::new(vec![a]));
        let (engine, handle) =
            AlertEngine::new(items_rx, Arc::clone(&lookup), clock, Duration::from_secs(1));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(engine.run(shutdown_rx));

        // "a" is being looked up between +1s and +6s.
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(lookup.calls.load(Ordering::SeqCst), 1);
        assert!(handle.current().is_none());
        items_tx.send_replace(Arc::new(vec![later]));

        tokio::time::sleep(Duration::from_secs(4)).await;
        assert_eq!(handle.current().unwrap().item.id.as_str(), "a");
        let ids: Vec<_> = handle
            .candidates()
            .iter()
            .map(|c| c.item_id.to_string())
            .collect();
        assert_eq!(ids, ["later"]);

        shutdown_tx.send(true).unwrap();
        task.await.unwrap();
    }
}
