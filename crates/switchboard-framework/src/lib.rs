//! # Switchboard Framework
//!
//! The dispatch side of Switchboard: turning a routed event into a handler
//! call and the handler's output into a delivery.
//!
//! This layer provides:
//! - Handler trait for plain async functions with injected parameters
//! - Argument resolvers and return-value handlers, both pluggable
//! - A per-conversation session store with idle expiry
//! - The [`Dispatcher`], a `tower::Service` over inbound updates
//!
//! ```rust,ignore
//! use switchboard_core::{Mapping, RegistryBuilder};
//! use switchboard_framework::{Dispatcher, Inbound, Text, into_handler};
//!
//! async fn echo(text: Text) -> String {
//!     text.0
//! }
//!
//! let mut routes = RegistryBuilder::new();
//! routes.register("echo", into_handler(echo), [Mapping::new("token").pattern("echo *")])?;
//!
//! let dispatcher = Dispatcher::builder(routes.seal(), delivery).build();
//! dispatcher.dispatch(Inbound::new("token", "my_bot", update)).await?;
//! ```

pub mod context;
pub mod dispatcher;
pub mod error;
pub mod handler;
pub mod param;
pub mod resolver;
pub mod returns;
pub mod session;
pub mod value;

pub use context::DispatchContext;
pub use dispatcher::{
    DispatchOutcome, Dispatcher, DispatcherBuilder, Inbound, StatsSnapshot, UnsupportedPolicy,
};
pub use error::{
    DispatchError, DispatchResult, InvocationError, ResolveError, ResolveResult, ReturnError,
    ReturnResult,
};
pub use handler::{BoxedHandler, ErasedHandler, Handler, HandlerFn, InvocationResult, into_handler};
pub use param::{
    BotHandle, ChatId, MatchedPattern, Param, ParamDescriptor, PathVars, SessionSlot,
    SessionState, Text, UserId,
};
pub use resolver::{
    ArgumentResolver, ArgumentResolverChain, BoxedResolver, EventResolver, FnResolver,
    RouteResolver, SessionResolver, resolver_fn,
};
pub use returns::{
    BoxedReturnHandler, FallbackReturn, OutboundPassthrough, ReturnValueChain,
    ReturnValueHandler, TextReply, UnitReturn,
};
pub use session::{DEFAULT_IDLE_TIMEOUT, Session, SessionStore, SessionTeardown, SessionValue};
pub use value::{Argument, ErasedValue, IntoReturnValue, ReturnValue, ValueType, dump_arguments};
