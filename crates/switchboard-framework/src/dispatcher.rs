//! The dispatch pipeline.
//!
//! ```text
//! Inbound ─▶ classify ─▶ lookup ─▶ acquire session ─▶ resolve args ─▶ invoke
//!                                                                        │
//!            observer ◀─ delivery (detached) ◀─ outbound? ◀─ return chain ◀┘
//! ```
//!
//! Each stage failing ends the dispatch of that one event only. Nothing is
//! delivered unless the handler completed and the return chain produced a
//! request. Delivery runs on its own task; its completion reaches the
//! [`ResultObserver`] and never the dispatching caller.
//!
//! [`Dispatcher`] is cheap to clone and implements
//! `tower::Service<Inbound>`, so worker pools can stack tower layers
//! (concurrency limits, timeouts) on top of it.

use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::{Context, Poll};

use futures::FutureExt;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use tokio_util::task::TaskTracker;
use tower::{BoxError, Service};
use tracing::{Instrument, debug, error, info_span, trace, warn};

use switchboard_core::{
    BotToken, BoxedDelivery, BoxedObserver, DeliveryReport, Event, EventClassifier, EventKind,
    LoggingObserver, LookupResult, MappingRegistry, OutboundRequest, ResultObserver, Update,
};

use crate::context::DispatchContext;
use crate::error::{DispatchError, DispatchResult};
use crate::handler::{BoxedHandler, panic_message};
use crate::resolver::{ArgumentResolver, ArgumentResolverChain, BoxedResolver};
use crate::returns::{BoxedReturnHandler, ReturnValueChain, ReturnValueHandler};
use crate::session::SessionStore;
use crate::value::dump_arguments;

// ============================================================================
// Inbound / Outcome
// ============================================================================

/// One raw update addressed to one bot.
#[derive(Debug, Clone)]
pub struct Inbound {
    pub token: BotToken,
    /// The receiving bot's handle, used to recognize `/cmd@handle`.
    pub bot: Arc<str>,
    pub update: Arc<Update>,
}

impl Inbound {
    pub fn new(token: impl Into<BotToken>, bot: impl Into<Arc<str>>, update: impl Into<Arc<Update>>) -> Self {
        Self {
            token: token.into(),
            bot: bot.into(),
            update: update.into(),
        }
    }
}

/// How the dispatch of one event ended, when it did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The handler produced a request and it was handed to delivery.
    Delivered { handler: Arc<str>, method: String },
    /// The handler ran and produced nothing to send.
    NoAction { handler: Arc<str> },
    /// No route matched.
    Unrouted,
    /// The update shape is not supported; dropped before routing.
    Unsupported,
}

/// What to do with updates of an unsupported shape.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnsupportedPolicy {
    /// Drop with a debug log.
    #[default]
    Drop,
    /// Drop with a warning.
    Warn,
}

// ============================================================================
// Stats
// ============================================================================

#[derive(Debug, Default)]
struct DispatchStats {
    received: AtomicU64,
    unsupported: AtomicU64,
    unrouted: AtomicU64,
    invoked: AtomicU64,
    failed: AtomicU64,
    delivered: AtomicU64,
    delivery_failed: AtomicU64,
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

/// Point-in-time dispatch counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Updates handed to the dispatcher.
    pub received: u64,
    /// Dropped as unsupported.
    pub unsupported: u64,
    /// No route matched.
    pub unrouted: u64,
    /// Handlers invoked.
    pub invoked: u64,
    /// Dispatches that ended in an error.
    pub failed: u64,
    /// Requests handed to delivery.
    pub delivered: u64,
    /// Deliveries that failed or were rejected by the platform.
    pub delivery_failed: u64,
}

impl StatsSnapshot {
    /// Events that ended without reaching a handler.
    pub fn suppressed(&self) -> u64 {
        self.unsupported + self.unrouted
    }
}

// ============================================================================
// DispatcherBuilder
// ============================================================================

/// Assembles a [`Dispatcher`] from a sealed registry and a delivery channel.
pub struct DispatcherBuilder {
    registry: MappingRegistry<BoxedHandler>,
    delivery: BoxedDelivery,
    classifier: EventClassifier,
    sessions: Option<SessionStore>,
    resolvers: Vec<BoxedResolver>,
    return_handlers: Vec<BoxedReturnHandler>,
    observer: Option<BoxedObserver>,
    unsupported: UnsupportedPolicy,
}

impl DispatcherBuilder {
    pub fn new(registry: MappingRegistry<BoxedHandler>, delivery: BoxedDelivery) -> Self {
        Self {
            registry,
            delivery,
            classifier: EventClassifier::new(),
            sessions: None,
            resolvers: Vec::new(),
            return_handlers: Vec::new(),
            observer: None,
            unsupported: UnsupportedPolicy::default(),
        }
    }

    pub fn classifier(mut self, classifier: EventClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    /// Uses an existing session store instead of a default one.
    pub fn sessions(mut self, sessions: SessionStore) -> Self {
        self.sessions = Some(sessions);
        self
    }

    /// Adds a resolver ahead of the built-ins.
    pub fn argument_resolver(mut self, resolver: impl ArgumentResolver) -> Self {
        self.resolvers.push(Arc::new(resolver));
        self
    }

    /// Adds a return-value handler ahead of the built-ins.
    pub fn return_value_handler(mut self, handler: impl ReturnValueHandler) -> Self {
        self.return_handlers.push(Arc::new(handler));
        self
    }

    pub fn argument_resolver_boxed(mut self, resolver: BoxedResolver) -> Self {
        self.resolvers.push(resolver);
        self
    }

    pub fn return_value_handler_boxed(mut self, handler: BoxedReturnHandler) -> Self {
        self.return_handlers.push(handler);
        self
    }

    pub fn result_observer(self, observer: impl ResultObserver) -> Self {
        self.result_observer_boxed(Arc::new(observer))
    }

    pub fn result_observer_boxed(mut self, observer: BoxedObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn unsupported_updates(mut self, policy: UnsupportedPolicy) -> Self {
        self.unsupported = policy;
        self
    }

    pub fn build(self) -> Dispatcher {
        let resolvers = ArgumentResolverChain::with_builtins(self.resolvers);
        check_parameters(&self.registry, &resolvers);

        Dispatcher {
            inner: Arc::new(Inner {
                registry: self.registry,
                classifier: self.classifier,
                sessions: self.sessions.unwrap_or_default(),
                resolvers,
                returns: ReturnValueChain::with_builtins(self.return_handlers),
                delivery: self.delivery,
                observer: self.observer.unwrap_or_else(|| Arc::new(LoggingObserver)),
                unsupported: self.unsupported,
                stats: DispatchStats::default(),
                deliveries: TaskTracker::new(),
            }),
        }
    }
}

/// Warns about required parameters no resolver serves; warms the memo.
fn check_parameters(registry: &MappingRegistry<BoxedHandler>, resolvers: &ArgumentResolverChain) {
    for token in registry.tokens() {
        for route in registry.routes(token) {
            for param in route.handler().params() {
                if !param.is_optional() && !resolvers.supports(param) {
                    warn!(
                        handler = route.handler_id(),
                        param = param.type_name(),
                        "No argument resolver supports parameter; dispatches to this handler will fail"
                    );
                }
            }
        }
    }
}

// ============================================================================
// Dispatcher
// ============================================================================

struct Inner {
    registry: MappingRegistry<BoxedHandler>,
    classifier: EventClassifier,
    sessions: SessionStore,
    resolvers: ArgumentResolverChain,
    returns: ReturnValueChain,
    delivery: BoxedDelivery,
    observer: BoxedObserver,
    unsupported: UnsupportedPolicy,
    stats: DispatchStats,
    deliveries: TaskTracker,
}

/// Routes events to handlers and hands their output to delivery.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<Inner>,
}

impl Dispatcher {
    pub fn builder(registry: MappingRegistry<BoxedHandler>, delivery: BoxedDelivery) -> DispatcherBuilder {
        DispatcherBuilder::new(registry, delivery)
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.inner.sessions
    }

    pub fn registry(&self) -> &MappingRegistry<BoxedHandler> {
        &self.inner.registry
    }

    /// Tracks in-flight deliveries; close and wait on it to drain them.
    pub fn deliveries(&self) -> &TaskTracker {
        &self.inner.deliveries
    }

    pub fn stats(&self) -> StatsSnapshot {
        let s = &self.inner.stats;
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        StatsSnapshot {
            received: load(&s.received),
            unsupported: load(&s.unsupported),
            unrouted: load(&s.unrouted),
            invoked: load(&s.invoked),
            failed: load(&s.failed),
            delivered: load(&s.delivered),
            delivery_failed: load(&s.delivery_failed),
        }
    }

    /// Dispatches one update end to end.
    ///
    /// Returns once the handler and the return chain have run; delivery of
    /// the resulting request continues in the background.
    pub async fn dispatch(&self, inbound: Inbound) -> DispatchResult<DispatchOutcome> {
        bump(&self.inner.stats.received);

        let event = self
            .inner
            .classifier
            .classify(inbound.token, inbound.update, &inbound.bot);

        let span = info_span!(
            "dispatch",
            token = %event.token(),
            update_id = event.update_id(),
            conversation = %event.conversation(),
            kind = %event.kind(),
        );

        let result = AssertUnwindSafe(self.route(event))
            .catch_unwind()
            .instrument(span.clone())
            .await
            .unwrap_or_else(|panic| {
                let message = panic_message(&*panic);
                span.in_scope(|| error!(panic = %message, "Dispatch panicked"));
                Err(DispatchError::Panicked(message))
            });
        if result.is_err() {
            bump(&self.inner.stats.failed);
        }
        result
    }

    async fn route(&self, event: Event) -> DispatchResult<DispatchOutcome> {
        let inner = &self.inner;

        if event.kind() == EventKind::Unsupported {
            bump(&inner.stats.unsupported);
            match inner.unsupported {
                UnsupportedPolicy::Drop => debug!("Dropping unsupported update"),
                UnsupportedPolicy::Warn => warn!("Dropping unsupported update"),
            }
            return Ok(DispatchOutcome::Unsupported);
        }

        let LookupResult {
            handler,
            handler_id,
            matched_pattern,
            variables,
        } = inner.registry.lookup(&event);

        let (Some(handler), Some(handler_id), Some(pattern)) = (handler, handler_id, matched_pattern)
        else {
            bump(&inner.stats.unrouted);
            debug!(text = event.text().unwrap_or(""), "No route matched");
            return Ok(DispatchOutcome::Unrouted);
        };

        let conversation = event.conversation();
        let session = inner.sessions.acquire(conversation).ok_or_else(|| {
            error!(handler = %handler_id, "No session available");
            DispatchError::SessionUnavailable(conversation)
        })?;

        trace!(handler = %handler_id, pattern = %pattern, "Route matched");
        let ctx = DispatchContext::new(event, session.clone(), handler_id, pattern, variables);
        session.scope(self.invoke(handler, ctx)).await
    }

    async fn invoke(&self, handler: BoxedHandler, ctx: DispatchContext) -> DispatchResult<DispatchOutcome> {
        let inner = &self.inner;

        let args = inner
            .resolvers
            .resolve_all(handler.params(), &ctx)
            .map_err(|source| {
                error!(
                    handler = ctx.handler_id(),
                    pattern = ctx.matched_pattern(),
                    error = %source,
                    "Argument resolution failed"
                );
                DispatchError::Resolution {
                    handler: ctx.handler_id().to_string(),
                    pattern: ctx.matched_pattern().to_string(),
                    source,
                }
            })?;

        let arguments = dump_arguments(&args);
        bump(&inner.stats.invoked);

        let value = handler.invoke(args).await.map_err(|source| {
            error!(
                handler = ctx.handler_id(),
                function = handler.type_name(),
                pattern = ctx.matched_pattern(),
                arguments = %arguments,
                error = %source,
                "Handler invocation failed"
            );
            DispatchError::Invocation {
                handler: ctx.handler_id().to_string(),
                pattern: ctx.matched_pattern().to_string(),
                arguments,
                source,
            }
        })?;

        let outbound = inner.returns.handle(value, &ctx).map_err(|source| {
            error!(
                handler = ctx.handler_id(),
                error = %source,
                "Return value handling failed"
            );
            DispatchError::ReturnHandling {
                handler: ctx.handler_id().to_string(),
                source,
            }
        })?;

        match outbound {
            Some(request) => {
                let method = request.method().to_string();
                self.deliver(&ctx, request);
                Ok(DispatchOutcome::Delivered {
                    handler: ctx.handler_id_arc(),
                    method,
                })
            }
            None => {
                trace!(handler = ctx.handler_id(), "No outbound action");
                Ok(DispatchOutcome::NoAction {
                    handler: ctx.handler_id_arc(),
                })
            }
        }
    }

    fn deliver(&self, ctx: &DispatchContext, request: OutboundRequest) {
        bump(&self.inner.stats.delivered);

        let inner = Arc::clone(&self.inner);
        let event = ctx.event();
        let token = event.token().clone();
        let update_id = event.update_id();
        let conversation = event.conversation();
        let handler_id = ctx.handler_id_arc();
        let method = request.method().to_string();

        let task = async move {
            let outcome = inner.delivery.deliver(&token, request).await;
            if !matches!(&outcome, Ok(response) if response.ok) {
                bump(&inner.stats.delivery_failed);
            }
            inner.observer.on_result(DeliveryReport {
                token,
                update_id,
                conversation,
                handler_id,
                method,
                outcome,
            });
        };

        self.inner
            .deliveries
            .spawn(task.instrument(tracing::Span::current()));
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("registry", &self.inner.registry)
            .field("sessions", &self.inner.sessions)
            .field("unsupported", &self.inner.unsupported)
            .finish()
    }
}

impl Service<Inbound> for Dispatcher {
    type Response = DispatchOutcome;
    type Error = BoxError;
    type Future = BoxFuture<'static, Result<DispatchOutcome, BoxError>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, inbound: Inbound) -> Self::Future {
        let dispatcher = self.clone();
        async move { dispatcher.dispatch(inbound).await.map_err(BoxError::from) }.boxed()
    }
}
