//! # Switchboard Core
//!
//! The data model and routing engine of the Switchboard dispatcher.
//!
//! ## Architecture Layers
//!
//! ### Foundation Layer
//!
//! - **Update model**: serde types for the platform payload ([`Update`])
//! - **Events**: the normalized, immutable view of one update ([`Event`], [`EventKind`])
//! - **Classification**: [`EventClassifier`] derives kind, text, chat, user and
//!   the [`ConversationKey`] sessions are scoped by
//!
//! ### Routing Layer
//!
//! - **Patterns**: Ant-style globs with `{name:regex}` captures ([`AntPattern`])
//! - **Mappings**: what a handler declares ([`Mapping`], [`KindSet`])
//! - **Registry**: [`RegistryBuilder`] collects routes, [`MappingRegistry`]
//!   answers lookups once sealed
//!
//! ### Integration Layer
//!
//! - **Outbound model**: [`OutboundRequest`], [`ApiResponse`]
//! - **Delivery**: the [`Delivery`] collaborator and [`ResultObserver`]
//!
//! ## Flow
//!
//! ```text
//! ┌────────┐     ┌────────────┐     ┌───────┐     ┌─────────────────┐
//! │ Update │────▶│ Classifier │────▶│ Event │────▶│ MappingRegistry │──▶ handler
//! └────────┘     └────────────┘     └───────┘     └─────────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use switchboard_core::{EventClassifier, EventKind, Mapping, RegistryBuilder, Update};
//! use std::sync::Arc;
//!
//! let mut builder = RegistryBuilder::new();
//! builder.register(
//!     "digits",
//!     "digits-handler",
//!     [Mapping::new("token").pattern("test {var:[0-9]}").kind(EventKind::CallbackQuery)],
//! )?;
//! let registry = builder.seal();
//!
//! let update = Arc::new(Update::from_json(raw)?);
//! let event = EventClassifier::new().classify("token".into(), update, "my_bot");
//! let found = registry.lookup(&event);
//! ```

pub mod error;
pub mod foundation;
pub mod integration;
pub mod routing;

pub use error::{
    DeliveryError, DeliveryResult, PatternError, PatternResult, RegistryError, RegistryResult,
};

pub use foundation::{
    BotToken, CallbackQuery, Chat, ChosenInlineResult, ConversationKey, DEFAULT_COMMAND_PREFIX,
    Event, EventClassifier, EventKind, InlineQuery, Message, Poll, PreCheckoutQuery, ShippingQuery,
    Update, User,
};

pub use routing::{
    AntPattern, KindSet, LookupResult, Mapping, MappingRegistry, PathVariables, PatternMatcher,
    RegistryBuilder, Route, Specificity,
};

pub use integration::{
    ApiResponse, BoxedDelivery, BoxedObserver, Delivery, DeliveryFn, DeliveryReport,
    LoggingObserver, OutboundRequest, ResultObserver, delivery_fn,
};

/// Prelude for common imports.
pub mod prelude {
    pub use super::foundation::{BotToken, ConversationKey, Event, EventKind, Update};
    pub use super::integration::{ApiResponse, Delivery, OutboundRequest, ResultObserver};
    pub use super::routing::{Mapping, PathVariables};
}
