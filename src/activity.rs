/// Debounced session activity tracking
///
/// Each process remembers when it last scheduled a last-active write per
/// session and skips writes inside the debounce interval. Instances do not
/// coordinate; redundant writes across processes are idempotent.
use crate::{clock::SharedClock, config::ActivityConfig, metrics, store::SessionStore};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, warn};

#[derive(Clone)]
pub struct ActivityTracker {
    store: Arc<dyn SessionStore>,
    clock: SharedClock,
    /// session id -> epoch millis of the last scheduled write
    last_scheduled: Arc<Mutex<HashMap<String, i64>>>,
    debounce_millis: i64,
    max_entries: usize,
}

impl ActivityTracker {
    pub fn new(store: Arc<dyn SessionStore>, clock: SharedClock, config: &ActivityConfig) -> Self {
        Self {
            store,
            clock,
            last_scheduled: Arc::new(Mutex::new(HashMap::new())),
            debounce_millis: config.debounce_secs.saturating_mul(1000),
            max_entries: config.max_entries,
        }
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, i64>> {
        self.last_scheduled.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Schedule a last-active update unless one was scheduled recently
    ///
    /// Returns whether a write was scheduled. The write runs in the
    /// background; failures are logged and dropped.
    pub fn touch(&self, session_id: &str) -> bool {
        let now = self.clock.now();
        let now_millis = now.timestamp_millis();

        {
            let mut entries = self.entries();
            if let Some(last) = entries.get(session_id) {
                if now_millis - last < self.debounce_millis {
                    return false;
                }
            }
            entries.insert(session_id.to_string(), now_millis);

            if entries.len() > self.max_entries {
                let cutoff = now_millis - 2 * self.debounce_millis;
                entries.retain(|_, last| *last >= cutoff);
                debug!("Activity map swept, {} sessions remain", entries.len());
            }
            metrics::ACTIVITY_TRACKED_SESSIONS.set(entries.len() as i64);
        }

        self.persist(session_id.to_string(), now);
        true
    }

    fn persist(&self, session_id: String, at: DateTime<Utc>) {
        let store = Arc::clone(&self.store);
        tokio::spawn(async move {
            if let Err(e) = store.update_session_last_active(&session_id, at).await {
                warn!("Failed to record activity for session {}: {}", session_id, e);
            }
        });
    }

    /// Sessions currently remembered
    pub fn tracked(&self) -> usize {
        self.entries().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::store::MemorySessionStore;
    use chrono::Duration;

    async fn settle() {
        for _ in 0..8 {
            tokio::task::yield_now().await;
        }
    }

    fn tracker(max_entries: usize) -> (ActivityTracker, MemorySessionStore, ManualClock) {
        let clock = ManualClock::starting_now();
        let store = MemorySessionStore::new();
        let config = ActivityConfig {
            debounce_secs: 60,
            max_entries,
        };
        let tracker = ActivityTracker::new(Arc::new(store.clone()), Arc::new(clock.clone()), &config);
        (tracker, store, clock)
    }

    #[tokio::test]
    async fn test_touches_are_debounced() {
        let (tracker, store, clock) = tracker(1000);

        assert!(tracker.touch("s1"));
        assert!(!tracker.touch("s1"));
        clock.advance(Duration::seconds(59));
        assert!(!tracker.touch("s1"));
        clock.advance(Duration::seconds(1));
        assert!(tracker.touch("s1"));

        settle().await;
        assert_eq!(store.activity_updates(), 2);
    }

    #[tokio::test]
    async fn test_sessions_debounce_independently() {
        let (tracker, _store, _clock) = tracker(1000);
        assert!(tracker.touch("s1"));
        assert!(tracker.touch("s2"));
        assert_eq!(tracker.tracked(), 2);
    }

    #[tokio::test]
    async fn test_map_is_swept_past_capacity() {
        let (tracker, _store, clock) = tracker(2);
        tracker.touch("old-1");
        tracker.touch("old-2");

        clock.advance(Duration::seconds(121));
        tracker.touch("new");
        assert_eq!(tracker.tracked(), 1);
    }

    #[tokio::test]
    async fn test_store_failures_are_swallowed() {
        let (tracker, store, _clock) = tracker(1000);
        store.set_failing(true);
        assert!(tracker.touch("s1"));
        assert!(!tracker.touch("s1"));
        settle().await;
        assert_eq!(store.activity_updates(), 0);
    }
}
