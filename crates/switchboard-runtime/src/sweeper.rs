//! Periodic session eviction.

use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::debug;

use switchboard_framework::SessionStore;

/// Spawns a task calling [`SessionStore::sweep`] every `interval` until
/// `cancel` fires.
pub fn spawn_sweeper(
    sessions: SessionStore,
    interval: Duration,
    cancel: CancellationToken,
    tasks: &TaskTracker,
) {
    tasks.spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let evicted = sessions.sweep();
                    if evicted > 0 {
                        debug!(evicted, remaining = sessions.len(), "Session sweep");
                    }
                }
            }
        }
        debug!("Session sweeper stopped");
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use switchboard_core::ConversationKey;

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_evicts_idle_sessions() {
        let torn_down = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&torn_down);
        let store = SessionStore::with_teardown(Duration::from_secs(60), move |_, _, _| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let session = store.acquire(ConversationKey::Chat(1)).unwrap();
        session.insert("greeting", String::from("hi"));
        drop(session);

        let cancel = CancellationToken::new();
        let tasks = TaskTracker::new();
        spawn_sweeper(store.clone(), Duration::from_secs(1), cancel.clone(), &tasks);

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(store.len(), 1);

        tokio::time::sleep(Duration::from_secs(32)).await;
        assert!(store.is_empty());
        assert_eq!(torn_down.load(Ordering::SeqCst), 1);

        cancel.cancel();
        tasks.close();
        tasks.wait().await;
    }
}
