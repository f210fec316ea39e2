use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use taskdeck_core::{ItemId, Schedulable};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::{
    error::Result,
    types::{SurfacedAlert, UpcomingAlert},
};

/// Point lookup of a fully resolved item.
///
/// `Ok(None)` is an ordinary outcome (the item was deleted after its alert was
/// computed); `Err` is logged by the tracker and treated the same way.
#[async_trait]
pub trait ItemLookup<T>: Send + Sync {
    async fn find(&self, id: &ItemId) -> Result<Option<T>>;
}

/// Shared slot holding the currently surfaced alert, if any.
pub type SurfacedSlot<T> = Arc<watch::Sender<Option<SurfacedAlert<T>>>>;

/// Decides which due alert to surface, at most once per unique key.
///
/// Owned by the tick task; nothing else touches `triggered`. The surfaced
/// slot is shared with [`crate::engine::AlertHandle`] so dismissals can
/// clear it from outside.
pub struct AlertTracker<T> {
    triggered: HashSet<String>,
    surfaced: SurfacedSlot<T>,
}

impl<T: Schedulable> AlertTracker<T> {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self::with_slot(Arc::new(tx))
    }

    pub fn with_slot(surfaced: SurfacedSlot<T>) -> Self {
        Self {
            triggered: HashSet::new(),
            surfaced,
        }
    }

    pub fn slot(&self) -> SurfacedSlot<T> {
        Arc::clone(&self.surfaced)
    }

    pub fn is_triggered(&self, key: &str) -> bool {
        self.triggered.contains(key)
    }

    /// Keys marked so far. Grows for the life of the process.
    pub fn triggered_count(&self) -> usize {
        self.triggered.len()
    }

    /// Run one tick against `candidates` as of `now`.
    ///
    /// Every candidate that is due and not yet triggered is marked triggered
    /// up front. They are then resolved in list order and the first one whose
    /// item still exists is surfaced. The others stay marked and will never
    /// surface, even after a dismiss.
    ///
    /// Returns the alert surfaced by this tick, if any. When nothing qualifies
    /// the slot is left as it was.
    pub async fn tick<L>(
        &mut self,
        now: NaiveDateTime,
        candidates: &[UpcomingAlert],
        lookup: &L,
    ) -> Option<UpcomingAlert>
    where
        L: ItemLookup<T> + ?Sized,
    {
        let due: Vec<&UpcomingAlert> = candidates
            .iter()
            .filter(|a| a.trigger_time <= now)
            .filter(|a| self.triggered.insert(a.unique_key().to_string()))
            .collect();
        if due.len() > 1 {
            debug!(count = due.len(), "several alerts due in one tick; only one will surface");
        }

        for alert in due {
            let item = match lookup.find(&alert.item_id).await {
                Ok(Some(item)) => item,
                Ok(None) => {
                    warn!(item_id = %alert.item_id, key = %alert.unique_key(), "alert item no longer exists");
                    continue;
                }
                Err(e) => {
                    warn!(item_id = %alert.item_id, key = %alert.unique_key(), "alert item lookup failed: {e}");
                    continue;
                }
            };

            info!(
                item_id = %alert.item_id,
                key = %alert.unique_key(),
                trigger_time = %alert.trigger_time,
                "surfacing alert"
            );
            self.surfaced.send_replace(Some(SurfacedAlert {
                alert: alert.clone(),
                item,
            }));
            return Some(alert.clone());
        }
        None
    }
}

impl<T: Schedulable> Default for AlertTracker<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SchedulerError;
    use chrono::{Duration, NaiveDate};
    use std::collections::HashMap;
    use std::sync::Mutex;
    use taskdeck_core::ReminderSpec;

    #[derive(Debug, Clone, PartialEq)]
    struct Item {
        id: ItemId,
        start: NaiveDateTime,
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
            &[]
        }
    }

    #[derive(Default)]
    struct Lookup {
        items: HashMap<ItemId, Item>,
        failing: Option<ItemId>,
        calls: Mutex<Vec<ItemId>>,
    }

    impl Lookup {
        fn with(items: &[&str]) -> Self {
            let items = items
                .iter()
                .map(|id| {
                    let id = ItemId::from(*id);
                    (id.clone(), Item { id, start: t0() })
                })
                .collect();
            Self {
                items,
                ..Default::default()
            }
        }

        fn calls(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl ItemLookup<Item> for Lookup {
        async fn find(&self, id: &ItemId) -> Result<Option<Item>> {
            self.calls.lock().unwrap().push(id.clone());
            if self.failing.as_ref() == Some(id) {
                return Err(SchedulerError::LockPoisoned);
            }
            Ok(self.items.get(id).cloned())
        }
    }

    fn t0() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 10)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap()
    }

    fn alert(id: &str, at: NaiveDateTime) -> UpcomingAlert {
        UpcomingAlert::new(ItemId::from(id), at, None, at.and_utc().timestamp_millis())
    }

    fn surfaced_id(tracker: &AlertTracker<Item>) -> Option<String> {
        let slot = tracker.slot();
        let id = slot.borrow().as_ref().map(|s| s.item.id.to_string());
        id
    }

    #[tokio::test]
    async fn nothing_due_leaves_state_idle() {
        let mut tracker = AlertTracker::<Item>::new();
        let lookup = Lookup::with(&["a"]);
        let candidates = [alert("a", t0() + Duration::minutes(1))];

        assert!(tracker.tick(t0(), &candidates, &lookup).await.is_none());
        assert_eq!(surfaced_id(&tracker), None);
        assert_eq!(lookup.calls(), 0);
        assert_eq!(tracker.triggered_count(), 0);
    }

    #[tokio::test]
    async fn due_alert_surfaces_exactly_once() {
        let mut tracker = AlertTracker::<Item>::new();
        let lookup = Lookup::with(&["a"]);
        let candidates = [alert("a", t0())];

        let first = tracker.tick(t0(), &candidates, &lookup).await;
        assert_eq!(first.as_ref().map(|a| a.item_id.as_str()), Some("a"));
        assert_eq!(surfaced_id(&tracker).as_deref(), Some("a"));

        tracker.slot().send_replace(None);
        for s in 1..5 {
            let later = t0() + Duration::seconds(s);
            assert!(tracker.tick(later, &candidates, &lookup).await.is_none());
        }
        assert_eq!(surfaced_id(&tracker), None);
        assert_eq!(lookup.calls(), 1);
    }

    #[tokio::test]
    async fn only_first_qualifier_surfaces_and_the_rest_are_burned() {
        let mut tracker = AlertTracker::<Item>::new();
        let lookup = Lookup::with(&["a", "b"]);
        let candidates = [alert("a", t0()), alert("b", t0() - Duration::minutes(5))];

        tracker.tick(t0(), &candidates, &lookup).await;
        assert_eq!(surfaced_id(&tracker).as_deref(), Some("a"));
        assert!(tracker.is_triggered(candidates[0].unique_key()));
        assert!(tracker.is_triggered(candidates[1].unique_key()));
        assert_eq!(lookup.calls(), 1);

        // Dismiss and tick again: "b" lost the first tick and never surfaces.
        tracker.slot().send_replace(None);
        assert!(tracker.tick(t0(), &candidates, &lookup).await.is_none());
        assert_eq!(surfaced_id(&tracker), None);
    }

    #[tokio::test]
    async fn candidates_due_later_are_not_burned() {
        let mut tracker = AlertTracker::<Item>::new();
        let lookup = Lookup::with(&["a", "b"]);
        let candidates = [alert("a", t0()), alert("b", t0() + Duration::seconds(2))];

        tracker.tick(t0(), &candidates, &lookup).await;
        assert!(!tracker.is_triggered(candidates[1].unique_key()));

        tracker.slot().send_replace(None);
        tracker.tick(t0() + Duration::seconds(2), &candidates, &lookup).await;
        assert_eq!(surfaced_id(&tracker).as_deref(), Some("b"));
    }

    #[tokio::test]
    async fn missing_item_is_marked_and_scan_continues() {
        let mut tracker = AlertTracker::<Item>::new();
        let lookup = Lookup::with(&["b"]);
        let candidates = [alert("gone", t0()), alert("b", t0())];

        let surfaced = tracker.tick(t0(), &candidates, &lookup).await;
        assert_eq!(surfaced.map(|a| a.item_id), Some(ItemId::from("b")));
        assert!(tracker.is_triggered(candidates[0].unique_key()));

        tracker.slot().send_replace(None);
        assert!(tracker.tick(t0(), &candidates, &lookup).await.is_none());
        assert_eq!(lookup.calls(), 2);
    }

    #[tokio::test]
    async fn lookup_error_behaves_like_missing_item() {
        let mut tracker = AlertTracker::<Item>::new();
        let mut lookup = Lookup::with(&["a"]);
        lookup.failing = Some(ItemId::from("a"));
        let candidates = [alert("a", t0())];

        assert!(tracker.tick(t0(), &candidates, &lookup).await.is_none());
        assert!(tracker.is_triggered(candidates[0].unique_key()));
    }

    #[tokio::test]
    async fn surfaced_alert_is_sticky_until_dismissed() {
        let mut tracker = AlertTracker::<Item>::new();
        let lookup = Lookup::with(&["a"]);
        tracker.tick(t0(), &[alert("a", t0())], &lookup).await;

        // Later ticks with nothing due keep it in place.
        tracker.tick(t0() + Duration::seconds(1), &[], &lookup).await;
        assert_eq!(surfaced_id(&tracker).as_deref(), Some("a"));
    }

    #[tokio::test]
    async fn same_item_at_a_new_time_is_a_new_key() {
        let mut tracker = AlertTracker::<Item>::new();
        let lookup = Lookup::with(&["a"]);
        tracker.tick(t0(), &[alert("a", t0())], &lookup).await;

        let next_week = t0() + Duration::weeks(1);
        let surfaced = tracker.tick(next_week, &[alert("a", next_week)], &lookup).await;
        assert!(surfaced.is_some());
        assert_eq!(tracker.triggered_count(), 2);
    }
}
