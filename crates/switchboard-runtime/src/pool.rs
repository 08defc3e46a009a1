//! Bounded dispatch pool.
//!
//! The dispatcher is wrapped in a tower stack:
//!
//! ```text
//! ConcurrencyLimit(max_concurrency) ─▶ Timeout(handler_timeout)? ─▶ Dispatcher
//! ```
//!
//! [`DispatchPool::submit`] waits for a concurrency permit before spawning,
//! so a producer feeding updates faster than they are handled is slowed
//! down instead of queueing without bound. The permit travels with the
//! spawned future and is released when that dispatch ends.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures::FutureExt;
use tokio_util::task::TaskTracker;
use tower::timeout::error::Elapsed;
use tower::util::BoxCloneSyncService;
use tower::{BoxError, Service, ServiceBuilder, ServiceExt};
use tracing::{Instrument, trace, warn};

use switchboard_framework::{DispatchOutcome, Inbound};

use crate::error::{RuntimeError, RuntimeResult};

/// The layered dispatch service.
pub type DispatchService = BoxCloneSyncService<Inbound, DispatchOutcome, BoxError>;

/// Runs dispatches on spawned tasks, at most `max_concurrency` at a time.
#[derive(Clone)]
pub struct DispatchPool {
    service: DispatchService,
    tasks: TaskTracker,
    max_concurrency: usize,
    timeout: Option<Duration>,
    timed_out: Arc<AtomicU64>,
}

impl DispatchPool {
    pub fn new<S>(inner: S, max_concurrency: usize, timeout: Option<Duration>) -> Self
    where
        S: Service<Inbound, Response = DispatchOutcome, Error = BoxError> + Clone + Send + Sync + 'static,
        S::Future: Send + 'static,
    {
        let service = ServiceBuilder::new()
            .concurrency_limit(max_concurrency)
            .option_layer(timeout.map(tower::timeout::TimeoutLayer::new))
            .service(inner);

        Self {
            service: BoxCloneSyncService::new(service),
            tasks: TaskTracker::new(),
            max_concurrency,
            timeout,
            timed_out: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    /// Dispatches currently running.
    pub fn in_flight(&self) -> usize {
        self.tasks.len()
    }

    pub fn timed_out(&self) -> u64 {
        self.timed_out.load(Ordering::Relaxed)
    }

    /// Waits for a free slot, then starts dispatching `inbound`.
    pub async fn submit(&self, inbound: Inbound) -> RuntimeResult<()> {
        let mut service = self.service.clone();
        service.ready().await.map_err(RuntimeError::Service)?;
        self.spawn(service, inbound);
        Ok(())
    }

    /// Starts dispatching `inbound` if a slot is free right now.
    pub fn try_submit(&self, inbound: Inbound) -> RuntimeResult<()> {
        let mut service = self.service.clone();
        let ready = service.ready().now_or_never().map(|r| r.map(|_| ()));
        match ready {
            Some(Ok(())) => {
                self.spawn(service, inbound);
                Ok(())
            }
            Some(Err(err)) => Err(RuntimeError::Service(err)),
            None => Err(RuntimeError::Saturated(self.max_concurrency)),
        }
    }

    fn spawn(&self, mut service: DispatchService, inbound: Inbound) {
        let update_id = inbound.update.update_id;
        let fut = service.call(inbound);
        let timed_out = Arc::clone(&self.timed_out);
        let timeout = self.timeout;

        let task = async move {
            match fut.await {
                Ok(outcome) => trace!(?outcome, "Dispatch finished"),
                Err(err) if err.is::<Elapsed>() => {
                    timed_out.fetch_add(1, Ordering::Relaxed);
                    warn!(update_id, timeout = ?timeout, "Dispatch timed out");
                }
                // Dispatch errors are logged inside the dispatch span.
                Err(_) => {}
            }
        };
        self.tasks.spawn(task.in_current_span());
    }

    /// Stops accepting work into the tracker and waits for running dispatches.
    pub async fn drain(&self) {
        self.tasks.close();
        self.tasks.wait().await;
    }
}

impl std::fmt::Debug for DispatchPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchPool")
            .field("max_concurrency", &self.max_concurrency)
            .field("timeout", &self.timeout)
            .field("in_flight", &self.tasks.len())
            .finish()
    }
}
