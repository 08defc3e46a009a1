//! Per-conversation session state.
//!
//! A [`SessionStore`] maps each [`ConversationKey`] to one live session: a
//! small heterogeneous key/value map shared by every dispatch in that
//! conversation. Sessions idle for longer than the configured timeout are
//! evicted by [`SessionStore::sweep`], and each stored value is handed to the
//! teardown hook exactly once.
//!
//! # Lifecycle
//!
//! ```text
//! acquire(key) ──▶ Session handle ──▶ (dispatch runs) ──▶ drop = release
//!      │                                                     │
//!      └── creates the session on first use                  └── refreshes last access
//!
//! sweep() ──▶ idle and unreferenced? ──▶ remove ──▶ teardown(value) for each value
//! ```
//!
//! A session with an outstanding handle is never idle. Removal happens under
//! the map's shard lock, so a concurrent `acquire` either sees the old session
//! before it is evicted or creates a fresh one afterwards; a torn-down session
//! is never handed out again.
//!
//! Handles outlive removal: a session invalidated or evicted while still
//! referenced stays usable through its handles, and values stored on it after
//! removal are torn down when the last handle drops.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::{debug, trace};

use switchboard_core::ConversationKey;

/// A value stored in a session.
pub type SessionValue = Arc<dyn Any + Send + Sync>;

/// Called once for every value of an evicted session.
pub type SessionTeardown = Arc<dyn Fn(&ConversationKey, &str, SessionValue) + Send + Sync>;

/// Default idle timeout: one hour.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(3600);

tokio::task_local! {
    static CURRENT_SESSION: Session;
}

// ============================================================================
// SessionEntry
// ============================================================================

struct SessionEntry {
    key: ConversationKey,
    values: Mutex<HashMap<String, SessionValue>>,
    last_access: Mutex<Instant>,
    in_use: AtomicUsize,
    /// Set once the entry has been removed from its store.
    detached: AtomicBool,
    teardown: Option<SessionTeardown>,
}

impl SessionEntry {
    fn new(key: ConversationKey, teardown: Option<SessionTeardown>) -> Self {
        Self {
            key,
            values: Mutex::new(HashMap::new()),
            last_access: Mutex::new(Instant::now()),
            in_use: AtomicUsize::new(0),
            detached: AtomicBool::new(false),
            teardown,
        }
    }

    /// Marks the entry removed, then tears down what it holds.
    ///
    /// The flag is set before draining so a handle that stores a value after
    /// the drain sees it when released.
    fn detach(&self) {
        self.detached.store(true, Ordering::Release);
        self.tear_down();
    }

    fn tear_down(&self) {
        let values: Vec<(String, SessionValue)> = self.values.lock().drain().collect();
        let Some(teardown) = &self.teardown else {
            return;
        };
        for (name, value) in values {
            teardown(&self.key, &name, value);
        }
    }

    fn touch(&self) {
        *self.last_access.lock() = Instant::now();
    }

    fn is_idle(&self, now: Instant, timeout: Duration) -> bool {
        self.in_use.load(Ordering::Acquire) == 0
            && now.saturating_duration_since(*self.last_access.lock()) >= timeout
    }
}

// ============================================================================
// Session
// ============================================================================

/// A handle to one conversation's session.
///
/// Cloning the handle is cheap. The session stays pinned (never idle) while
/// any handle is alive; dropping the last one refreshes its last access time.
pub struct Session {
    entry: Arc<SessionEntry>,
}

impl Session {
    fn pin(entry: Arc<SessionEntry>) -> Self {
        entry.in_use.fetch_add(1, Ordering::AcqRel);
        entry.touch();
        Self { entry }
    }

    /// The session bound to the current dispatch, if any.
    pub fn current() -> Option<Session> {
        CURRENT_SESSION.try_with(Session::clone).ok()
    }

    /// Runs `fut` with `self` as the current session.
    pub async fn scope<F: Future>(self, fut: F) -> F::Output {
        CURRENT_SESSION.scope(self, fut).await
    }

    pub fn key(&self) -> ConversationKey {
        self.entry.key
    }

    /// Returns the raw value stored under `key`.
    pub fn get_value(&self, key: &str) -> Option<SessionValue> {
        self.entry.values.lock().get(key).cloned()
    }

    /// Returns the value under `key` if it has type `T`.
    pub fn get<T: Any + Send + Sync>(&self, key: &str) -> Option<Arc<T>> {
        self.get_value(key)?.downcast::<T>().ok()
    }

    /// Stores `value` under `key`, returning the previous value.
    pub fn insert<T: Any + Send + Sync>(&self, key: impl Into<String>, value: T) -> Option<SessionValue> {
        self.insert_value(key, Arc::new(value))
    }

    pub fn insert_value(&self, key: impl Into<String>, value: SessionValue) -> Option<SessionValue> {
        self.entry.values.lock().insert(key.into(), value)
    }

    /// Removes the value under `key` without running teardown.
    pub fn remove(&self, key: &str) -> Option<SessionValue> {
        self.entry.values.lock().remove(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entry.values.lock().contains_key(key)
    }

    /// Returns the value under `key`, creating it with `init` if absent.
    ///
    /// Creation and insertion happen under the session lock, so concurrent
    /// callers observe a single value.
    pub fn compute_if_absent(&self, key: &str, init: impl FnOnce() -> SessionValue) -> SessionValue {
        let mut values = self.entry.values.lock();
        match values.get(key) {
            Some(value) => Arc::clone(value),
            None => {
                let value = init();
                values.insert(key.to_string(), Arc::clone(&value));
                value
            }
        }
    }

    /// Typed [`compute_if_absent`](Self::compute_if_absent).
    ///
    /// Returns `None` when a value of another type already occupies `key`.
    pub fn get_or_insert_with<T, F>(&self, key: &str, init: F) -> Option<Arc<T>>
    where
        T: Any + Send + Sync,
        F: FnOnce() -> T,
    {
        self.compute_if_absent(key, || Arc::new(init()))
            .downcast::<T>()
            .ok()
    }

    pub fn len(&self) -> usize {
        self.entry.values.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entry.values.lock().is_empty()
    }

    /// Whether `other` refers to the same live session.
    pub fn same_session(&self, other: &Session) -> bool {
        Arc::ptr_eq(&self.entry, &other.entry)
    }
}

impl Clone for Session {
    fn clone(&self) -> Self {
        Self::pin(Arc::clone(&self.entry))
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.entry.touch();
        let previous = self.entry.in_use.fetch_sub(1, Ordering::AcqRel);
        if previous == 1 && self.entry.detached.load(Ordering::Acquire) {
            trace!(conversation = %self.entry.key, "Last handle of removed session released");
            self.entry.tear_down();
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let keys: Vec<String> = self.entry.values.lock().keys().cloned().collect();
        f.debug_struct("Session")
            .field("key", &self.entry.key)
            .field("values", &keys)
            .finish()
    }
}

// ============================================================================
// SessionStore
// ============================================================================

struct StoreInner {
    sessions: DashMap<ConversationKey, Arc<SessionEntry>>,
    idle_timeout: Duration,
    teardown: Option<SessionTeardown>,
    closed: AtomicBool,
}

/// Concurrent map from conversation to session with idle eviction.
///
/// Cheap to clone; clones share the same sessions.
#[derive(Clone)]
pub struct SessionStore {
    inner: Arc<StoreInner>,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(DEFAULT_IDLE_TIMEOUT)
    }
}

impl SessionStore {
    pub fn new(idle_timeout: Duration) -> Self {
        Self::build(idle_timeout, None)
    }

    /// Creates a store that calls `teardown` for each value of an evicted
    /// session.
    pub fn with_teardown<F>(idle_timeout: Duration, teardown: F) -> Self
    where
        F: Fn(&ConversationKey, &str, SessionValue) + Send + Sync + 'static,
    {
        Self::build(idle_timeout, Some(Arc::new(teardown)))
    }

    pub(crate) fn build(idle_timeout: Duration, teardown: Option<SessionTeardown>) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                sessions: DashMap::new(),
                idle_timeout,
                teardown,
                closed: AtomicBool::new(false),
            }),
        }
    }

    pub fn idle_timeout(&self) -> Duration {
        self.inner.idle_timeout
    }

    /// Returns the live session for `key`, creating it if absent.
    ///
    /// Returns `None` once the store is closed.
    pub fn acquire(&self, key: ConversationKey) -> Option<Session> {
        if self.inner.closed.load(Ordering::Acquire) {
            return None;
        }

        let entry = self
            .inner
            .sessions
            .entry(key)
            .or_insert_with(|| {
                trace!(conversation = %key, "Session created");
                Arc::new(SessionEntry::new(key, self.inner.teardown.clone()))
            });

        // Pinned while the shard lock is held so a sweep cannot evict it
        // between lookup and pin.
        Some(Session::pin(Arc::clone(entry.value())))
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        self.inner.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.sessions.is_empty()
    }

    pub fn contains(&self, key: &ConversationKey) -> bool {
        self.inner.sessions.contains_key(key)
    }

    /// Evicts every idle, unreferenced session and tears it down.
    ///
    /// Returns the number of sessions evicted.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let timeout = self.inner.idle_timeout;

        let candidates: Vec<ConversationKey> = self
            .inner
            .sessions
            .iter()
            .filter(|e| e.value().is_idle(now, timeout))
            .map(|e| *e.key())
            .collect();

        let mut evicted = 0;
        for key in candidates {
            // Re-check under the shard lock; the session may have been
            // acquired since the scan.
            if let Some((_, entry)) = self
                .inner
                .sessions
                .remove_if(&key, |_, e| e.is_idle(now, timeout))
            {
                debug!(conversation = %key, "Session evicted");
                entry.detach();
                evicted += 1;
            }
        }
        evicted
    }

    /// Removes the session for `key` and tears it down.
    ///
    /// Outstanding handles keep working on the detached session; the next
    /// `acquire` creates a fresh one. Values they store afterwards are torn
    /// down when the last of them drops.
    pub fn invalidate(&self, key: &ConversationKey) -> bool {
        match self.inner.sessions.remove(key) {
            Some((_, entry)) => {
                debug!(conversation = %key, "Session invalidated");
                entry.detach();
                true
            }
            None => false,
        }
    }

    /// Removes and tears down every session.
    pub fn invalidate_all(&self) -> usize {
        let keys: Vec<ConversationKey> = self.inner.sessions.iter().map(|e| *e.key()).collect();
        keys.iter().filter(|key| self.invalidate(key)).count()
    }

    /// Refuses further acquisitions and tears down every session.
    pub fn close(&self) -> usize {
        self.inner.closed.store(true, Ordering::Release);
        self.invalidate_all()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }
}

impl fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionStore")
            .field("sessions", &self.inner.sessions.len())
            .field("idle_timeout", &self.inner.idle_timeout)
            .field("closed", &self.is_closed())
            .finish()
    }
}
