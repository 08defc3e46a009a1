//! Runtime orchestration.
//!
//! [`SwitchboardRuntime`] owns the whole lifecycle:
//!
//! 1. **Configuring**: handlers, resolvers, return-value handlers and
//!    collaborators are registered.
//! 2. **Running**: `start()` seals the routes, builds the dispatcher and its
//!    worker pool and starts the session sweeper. Updates go in through
//!    `submit()` / `try_submit()`.
//! 3. **Stopped**: `stop()` drains in-flight dispatches and deliveries and
//!    tears down every session.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use switchboard_runtime::SwitchboardRuntime;
//!
//! let runtime = SwitchboardRuntime::builder()
//!     .config_file("config/switchboard.toml")
//!     .build()?;
//!
//! runtime.register("echo", echo, [Mapping::new(token).pattern("echo *")])?;
//! runtime.set_delivery(my_delivery)?;
//! runtime.run().await?;
//! ```

use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use switchboard_core::{
    BotToken, BoxedDelivery, BoxedObserver, ConversationKey, Delivery, EventClassifier, Mapping,
    PatternMatcher, RegistryBuilder, ResultObserver, Update,
};
use switchboard_framework::{
    ArgumentResolver, BoxedHandler, BoxedResolver, BoxedReturnHandler, Dispatcher, Handler,
    Inbound, ReturnValueHandler, SessionStore, SessionTeardown, SessionValue, StatsSnapshot,
    into_handler,
};

use crate::config::{ConfigLoader, ConfigResult, SwitchboardConfig};
use crate::error::{RuntimeError, RuntimeResult};
use crate::logging;
use crate::pool::DispatchPool;
use crate::sweeper::spawn_sweeper;

/// Counters reported by [`SwitchboardRuntime::stats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RuntimeStats {
    pub dispatch: StatsSnapshot,
    /// Dispatches cut off by the handler timeout.
    pub timed_out: u64,
    /// Dispatches currently running.
    pub in_flight: usize,
    /// Live sessions.
    pub sessions: usize,
}

struct Setup {
    routes: RegistryBuilder<BoxedHandler>,
    resolvers: Vec<BoxedResolver>,
    return_handlers: Vec<BoxedReturnHandler>,
    delivery: Option<BoxedDelivery>,
    observer: Option<BoxedObserver>,
    teardown: Option<SessionTeardown>,
}

struct Running {
    dispatcher: Dispatcher,
    pool: DispatchPool,
    sweeper: CancellationToken,
    background: TaskTracker,
}

impl Running {
    fn snapshot(&self) -> RuntimeStats {
        RuntimeStats {
            dispatch: self.dispatcher.stats(),
            timed_out: self.pool.timed_out(),
            in_flight: self.pool.in_flight(),
            sessions: self.dispatcher.sessions().len(),
        }
    }
}

enum State {
    Configuring(Box<Setup>),
    Running(Running),
    /// Holds the counters as they were when the runtime stopped.
    Stopped(RuntimeStats),
}

/// The Switchboard runtime.
pub struct SwitchboardRuntime {
    config: SwitchboardConfig,
    state: Mutex<State>,
}

impl SwitchboardRuntime {
    /// Creates a runtime from configuration found in the current directory.
    ///
    /// Falls back to defaults when no valid configuration can be loaded.
    pub fn new() -> Self {
        let config = ConfigLoader::new()
            .with_current_dir()
            .load()
            .unwrap_or_else(|e| {
                eprintln!("Warning: Failed to load config ({e}), using defaults");
                SwitchboardConfig::default()
            });

        Self::from_config(&config)
    }

    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::new()
    }

    /// Creates a runtime from configuration and initializes logging from it.
    pub fn from_config(config: &SwitchboardConfig) -> Self {
        logging::init_from_config(&config.logging);

        let matcher = PatternMatcher::with_separator(config.routing.path_separator.clone());
        info!(
            log_level = %config.logging.level,
            max_concurrency = config.dispatch.max_concurrency,
            idle_timeout_secs = config.session.idle_timeout_secs,
            "Runtime initialized from configuration"
        );

        Self {
            config: config.clone(),
            state: Mutex::new(State::Configuring(Box::new(Setup {
                routes: RegistryBuilder::with_matcher(matcher),
                resolvers: Vec::new(),
                return_handlers: Vec::new(),
                delivery: None,
                observer: None,
                teardown: None,
            }))),
        }
    }

    pub fn config(&self) -> &SwitchboardConfig {
        &self.config
    }

    pub fn is_running(&self) -> bool {
        matches!(*self.state.lock(), State::Running(_))
    }

    fn configure<R>(&self, f: impl FnOnce(&mut Setup) -> R) -> RuntimeResult<R> {
        match &mut *self.state.lock() {
            State::Configuring(setup) => Ok(f(setup)),
            _ => Err(RuntimeError::AlreadyStarted),
        }
    }

    // =========================================================================
    // Registration
    // =========================================================================

    /// Registers an async function under `handler_id` for every mapping.
    ///
    /// ```rust,ignore
    /// runtime.register(
    ///     "pick",
    ///     pick,
    ///     [Mapping::new(token).pattern("test {var:[0-9]}").kind(EventKind::CallbackQuery)],
    /// )?;
    /// ```
    pub fn register<F, T, I>(&self, handler_id: &str, handler: F, mappings: I) -> RuntimeResult<()>
    where
        F: Handler<T>,
        T: 'static,
        I: IntoIterator<Item = Mapping>,
    {
        self.register_boxed(handler_id, into_handler(handler), mappings)
    }

    /// Registers an already erased handler.
    pub fn register_boxed<I>(&self, handler_id: &str, handler: BoxedHandler, mappings: I) -> RuntimeResult<()>
    where
        I: IntoIterator<Item = Mapping>,
    {
        self.configure(|setup| setup.routes.register(handler_id, handler, mappings))??;
        debug!(handler = handler_id, "Registered handler");
        Ok(())
    }

    /// Adds an argument resolver, consulted before the built-ins in
    /// registration order.
    pub fn argument_resolver(&self, resolver: impl ArgumentResolver) -> RuntimeResult<()> {
        self.configure(|setup| setup.resolvers.push(Arc::new(resolver)))
    }

    /// Adds a return-value handler, consulted before the built-ins in
    /// registration order.
    pub fn return_value_handler(&self, handler: impl ReturnValueHandler) -> RuntimeResult<()> {
        self.configure(|setup| setup.return_handlers.push(Arc::new(handler)))
    }

    pub fn set_delivery(&self, delivery: impl Delivery) -> RuntimeResult<()> {
        self.configure(|setup| setup.delivery = Some(Arc::new(delivery)))
    }

    /// Receives every delivery completion. Failures are logged when unset.
    pub fn set_result_observer(&self, observer: impl ResultObserver) -> RuntimeResult<()> {
        self.configure(|setup| setup.observer = Some(Arc::new(observer)))
    }

    /// Called once per value of every evicted or invalidated session.
    pub fn set_session_teardown<F>(&self, teardown: F) -> RuntimeResult<()>
    where
        F: Fn(&ConversationKey, &str, SessionValue) + Send + Sync + 'static,
    {
        self.configure(|setup| setup.teardown = Some(Arc::new(teardown)))
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Seals the routes and starts dispatching.
    pub async fn start(&self) -> RuntimeResult<()> {
        let mut state = self.state.lock();
        let mut setup = match std::mem::replace(&mut *state, State::Stopped(RuntimeStats::default())) {
            State::Configuring(setup) => setup,
            other => {
                *state = other;
                return Err(RuntimeError::AlreadyStarted);
            }
        };
        let Some(delivery) = setup.delivery.take() else {
            *state = State::Configuring(setup);
            return Err(RuntimeError::DeliveryNotConfigured);
        };

        let Setup {
            routes,
            resolvers,
            return_handlers,
            observer,
            teardown,
            ..
        } = *setup;

        let dispatch = &self.config.dispatch;
        let session = &self.config.session;

        let sessions = match teardown {
            Some(teardown) => SessionStore::with_teardown(session.idle_timeout(), move |key, name, value| {
                teardown(key, name, value)
            }),
            None => SessionStore::new(session.idle_timeout()),
        };

        let registry = routes.seal();
        info!(
            routes = registry.route_count(),
            tokens = registry.tokens().count(),
            "Routes sealed"
        );

        let mut builder = Dispatcher::builder(registry, delivery)
            .classifier(EventClassifier::new().command_prefix(dispatch.command_prefix_char()))
            .sessions(sessions.clone())
            .unsupported_updates(dispatch.unsupported_updates);
        for resolver in resolvers {
            builder = builder.argument_resolver_boxed(resolver);
        }
        for handler in return_handlers {
            builder = builder.return_value_handler_boxed(handler);
        }
        if let Some(observer) = observer {
            builder = builder.result_observer_boxed(observer);
        }
        let dispatcher = builder.build();

        let pool = DispatchPool::new(
            dispatcher.clone(),
            dispatch.max_concurrency,
            dispatch.handler_timeout(),
        );

        let sweeper = CancellationToken::new();
        let background = TaskTracker::new();
        spawn_sweeper(sessions, session.sweep_interval(), sweeper.clone(), &background);

        *state = State::Running(Running {
            dispatcher,
            pool,
            sweeper,
            background,
        });

        info!(
            max_concurrency = dispatch.max_concurrency,
            handler_timeout = ?dispatch.handler_timeout(),
            "Runtime started"
        );
        Ok(())
    }

    fn pool(&self) -> RuntimeResult<DispatchPool> {
        match &*self.state.lock() {
            State::Running(running) => Ok(running.pool.clone()),
            _ => Err(RuntimeError::NotRunning),
        }
    }

    /// Submits one update, waiting while every dispatch slot is busy.
    ///
    /// Returns once dispatch has started, not when it finishes.
    pub async fn submit(
        &self,
        token: impl Into<BotToken>,
        bot: impl Into<Arc<str>>,
        update: impl Into<Arc<Update>>,
    ) -> RuntimeResult<()> {
        let pool = self.pool()?;
        pool.submit(Inbound::new(token, bot, update)).await
    }

    /// Submits one update without waiting, failing with
    /// [`RuntimeError::Saturated`] when no slot is free.
    pub fn try_submit(
        &self,
        token: impl Into<BotToken>,
        bot: impl Into<Arc<str>>,
        update: impl Into<Arc<Update>>,
    ) -> RuntimeResult<()> {
        self.pool()?.try_submit(Inbound::new(token, bot, update))
    }

    /// Parses a raw platform payload and submits it.
    pub async fn submit_json(
        &self,
        token: impl Into<BotToken>,
        bot: impl Into<Arc<str>>,
        raw: &str,
    ) -> RuntimeResult<()> {
        let update = Update::from_json(raw)?;
        self.submit(token, bot, update).await
    }

    /// Stops intake, waits for running dispatches and their deliveries, then
    /// tears down every session.
    pub async fn stop(&self) -> RuntimeResult<()> {
        let running = {
            let mut state = self.state.lock();
            match std::mem::replace(&mut *state, State::Stopped(RuntimeStats::default())) {
                State::Running(running) => running,
                other => {
                    *state = other;
                    return Err(RuntimeError::NotRunning);
                }
            }
        };

        info!(in_flight = running.pool.in_flight(), "Stopping runtime");

        running.pool.drain().await;
        let deliveries = running.dispatcher.deliveries();
        deliveries.close();
        deliveries.wait().await;

        running.sweeper.cancel();
        running.background.close();
        running.background.wait().await;

        let closed = running.dispatcher.sessions().close();
        let stats = running.snapshot();
        info!(
            sessions_closed = closed,
            received = stats.dispatch.received,
            failed = stats.dispatch.failed,
            delivered = stats.dispatch.delivered,
            timed_out = stats.timed_out,
            "Runtime stopped"
        );
        *self.state.lock() = State::Stopped(stats);
        Ok(())
    }

    /// Current counters; all zero before start, final values after stop.
    pub fn stats(&self) -> RuntimeStats {
        match &*self.state.lock() {
            State::Configuring(_) => RuntimeStats::default(),
            State::Running(running) => running.snapshot(),
            State::Stopped(stats) => *stats,
        }
    }

    /// The session store of the running dispatcher.
    pub fn sessions(&self) -> Option<SessionStore> {
        match &*self.state.lock() {
            State::Running(running) => Some(running.dispatcher.sessions().clone()),
            _ => None,
        }
    }

    /// Starts, runs until Ctrl+C or SIGTERM, then stops.
    pub async fn run(&self) -> RuntimeResult<()> {
        self.start().await?;
        info!("Switchboard runtime is now running. Press Ctrl+C to stop.");
        wait_for_shutdown().await;
        self.stop().await
    }

    /// Starts, runs until `shutdown` completes, then stops.
    pub async fn run_until<F>(&self, shutdown: F) -> RuntimeResult<()>
    where
        F: Future<Output = ()>,
    {
        self.start().await?;
        shutdown.await;
        self.stop().await
    }
}

impl Default for SwitchboardRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SwitchboardRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match &*self.state.lock() {
            State::Configuring(_) => "configuring",
            State::Running(_) => "running",
            State::Stopped(_) => "stopped",
        };
        f.debug_struct("SwitchboardRuntime")
            .field("state", &state)
            .finish()
    }
}

/// Waits for Ctrl+C, or SIGTERM on unix.
async fn wait_for_shutdown() {
    #[cfg(unix)]
    {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = signal::ctrl_c() => info!("Received Ctrl+C, shutting down"),
                    _ = sigterm.recv() => info!("Received SIGTERM, shutting down"),
                }
                return;
            }
            Err(err) => warn!(error = %err, "Cannot listen for SIGTERM, waiting for Ctrl+C only"),
        }
    }

    match signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl+C, shutting down"),
        Err(err) => warn!(error = %err, "Cannot listen for Ctrl+C, shutting down"),
    }
}

// =============================================================================
// RuntimeBuilder
// =============================================================================

/// Builder for a [`SwitchboardRuntime`] with custom configuration sources.
///
/// ```rust,ignore
/// let runtime = SwitchboardRuntime::builder()
///     .config_file("config/production.toml")
///     .profile("production")
///     .build()?;
/// ```
pub struct RuntimeBuilder {
    config_loader: ConfigLoader,
}

impl RuntimeBuilder {
    pub fn new() -> Self {
        Self {
            config_loader: ConfigLoader::new().with_current_dir(),
        }
    }

    pub fn config_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.file(path);
        self
    }

    pub fn profile(mut self, profile: impl AsRef<str>) -> Self {
        self.config_loader = self.config_loader.profile(profile);
        self
    }

    pub fn search_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.search_path(path);
        self
    }

    pub fn without_env(mut self) -> Self {
        self.config_loader = self.config_loader.without_env();
        self
    }

    /// Layers a configuration over the defaults.
    pub fn merge(mut self, config: SwitchboardConfig) -> Self {
        self.config_loader = self.config_loader.merge(config);
        self
    }

    pub fn build(self) -> ConfigResult<SwitchboardRuntime> {
        let config = self.config_loader.load()?;
        Ok(SwitchboardRuntime::from_config(&config))
    }
}

impl Default for RuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex as SyncMutex;
    use std::time::Duration;
    use switchboard_core::{ApiResponse, Chat, Message, OutboundRequest, delivery_fn};
    use switchboard_framework::{SessionState, Text};

    #[derive(Debug, Default)]
    struct Visits(SyncMutex<Vec<String>>);

    async fn echo(text: Text) -> String {
        text.0
    }

    async fn remember(text: Text, visits: SessionState<Visits>) {
        visits.0.0.lock().push(text.0);
    }

    fn runtime(config: SwitchboardConfig) -> (SwitchboardRuntime, Arc<SyncMutex<Vec<OutboundRequest>>>) {
        let runtime = SwitchboardRuntime::from_config(&config);
        let sent = Arc::new(SyncMutex::new(Vec::new()));
        let sink = Arc::clone(&sent);
        runtime
            .set_delivery(delivery_fn(move |_token, request| {
                let sink = Arc::clone(&sink);
                async move {
                    sink.lock().push(request);
                    Ok(ApiResponse::success(serde_json::Value::Bool(true)))
                }
            }))
            .unwrap();
        (runtime, sent)
    }

    fn message(chat: i64, text: &str) -> Update {
        let mut update = Update::new(chat);
        update.message = Some(Message::text(1, Chat::private(chat), text));
        update
    }

    #[tokio::test]
    async fn test_lifecycle_errors() {
        let runtime = SwitchboardRuntime::from_config(&SwitchboardConfig::default());
        assert!(matches!(
            runtime.submit("t", "b", message(1, "x")).await,
            Err(RuntimeError::NotRunning)
        ));
        assert!(matches!(runtime.start().await, Err(RuntimeError::DeliveryNotConfigured)));
        assert!(matches!(runtime.stop().await, Err(RuntimeError::NotRunning)));

        let (runtime, _) = self::runtime(SwitchboardConfig::default());
        runtime.start().await.unwrap();
        assert!(runtime.is_running());
        assert!(matches!(
            runtime.register("echo", echo, [Mapping::new("t")]),
            Err(RuntimeError::AlreadyStarted)
        ));
        assert!(matches!(runtime.start().await, Err(RuntimeError::AlreadyStarted)));

        runtime.stop().await.unwrap();
        assert!(!runtime.is_running());
        assert!(matches!(
            runtime.try_submit("t", "b", message(1, "x")),
            Err(RuntimeError::NotRunning)
        ));
    }

    #[tokio::test]
    async fn test_invalid_pattern_rejected() {
        let (runtime, _) = runtime(SwitchboardConfig::default());
        let err = runtime
            .register("bad", echo, [Mapping::new("t").pattern("{n:[0-9}")])
            .unwrap_err();
        assert!(matches!(err, RuntimeError::Registry(_)));
    }

    #[tokio::test]
    async fn test_submit_and_stop_drains() {
        let (runtime, sent) = runtime(SwitchboardConfig::default());
        runtime
            .register("echo", echo, [Mapping::new("t").pattern("echo *")])
            .unwrap();
        runtime.start().await.unwrap();

        for chat in 0..20 {
            runtime.submit("t", "b", message(chat, "echo hi")).await.unwrap();
        }
        runtime
            .submit_json("t", "b", r#"{"update_id": 99, "message": {"message_id": 1, "chat": {"id": 5, "type": "private"}, "text": "echo json"}}"#)
            .await
            .unwrap();
        assert!(matches!(
            runtime.submit_json("t", "b", "not json").await,
            Err(RuntimeError::MalformedUpdate(_))
        ));

        let sessions = runtime.sessions().unwrap();
        runtime.stop().await.unwrap();

        assert_eq!(sent.lock().len(), 21);
        assert!(sessions.is_closed());
        assert!(sessions.is_empty());
    }

    #[tokio::test]
    async fn test_session_teardown_on_stop() {
        let (runtime, _) = runtime(SwitchboardConfig::default());
        let torn_down = Arc::new(SyncMutex::new(Vec::new()));
        let sink = Arc::clone(&torn_down);
        runtime
            .set_session_teardown(move |key, name, _value| sink.lock().push((*key, name.to_string())))
            .unwrap();
        runtime
            .register("remember", remember, [Mapping::new("t")])
            .unwrap();
        runtime.start().await.unwrap();

        runtime.submit("t", "b", message(7, "a")).await.unwrap();
        runtime.submit("t", "b", message(8, "b")).await.unwrap();
        runtime.stop().await.unwrap();

        let mut torn_down = torn_down.lock().clone();
        torn_down.sort();
        assert_eq!(torn_down.len(), 2);
        assert_eq!(torn_down[0].0, ConversationKey::Chat(7));
        assert!(torn_down[0].1.ends_with("Visits"));
    }

    #[tokio::test]
    async fn test_run_until() {
        let (runtime, _) = runtime(SwitchboardConfig::default());
        runtime
            .run_until(tokio::time::sleep(Duration::from_millis(10)))
            .await
            .unwrap();
        assert!(!runtime.is_running());
    }
}
