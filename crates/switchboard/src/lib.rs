//! # Switchboard
//!
//! A pattern-routed, session-aware event dispatcher for chat bots.
//!
//! ## Overview
//!
//! Handlers are plain async functions. Each one declares, per bot token,
//! which event kinds and which Ant-style text patterns it answers. Incoming
//! updates are classified, routed to the most specific matching handler,
//! invoked with injected arguments inside the conversation's session, and
//! whatever the handler returns is turned into an outbound API request.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────┐     ┌──────────────┐     ┌────────────┐     ┌─────────┐     ┌──────────┐
//! │ Runtime │────▶│ DispatchPool │────▶│ Dispatcher │────▶│ Handler │────▶│ Delivery │
//! │ submit  │     │ (bounded)    │     │ route+scope│     │         │     │ (async)  │
//! └─────────┘     └──────────────┘     └────────────┘     └─────────┘     └──────────┘
//!                                            │
//!                                            ▼
//!                                     ┌──────────────┐
//!                                     │ SessionStore │◀── sweeper
//!                                     └──────────────┘
//! ```
//!
//! - **Core**: update model, classification, patterns and the route registry
//! - **Framework**: handlers, argument resolvers, return-value handlers,
//!   sessions and the dispatcher
//! - **Runtime**: configuration, logging, the worker pool and lifecycle
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use switchboard::prelude::*;
//!
//! async fn pick(vars: PathVars) -> String {
//!     format!("you picked {}", vars.get("var").unwrap_or("?"))
//! }
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let runtime = SwitchboardRuntime::new();
//!     runtime.register(
//!         "pick",
//!         pick,
//!         [Mapping::new(token).pattern("test {var:[0-9]}").kind(EventKind::CallbackQuery)],
//!     )?;
//!     runtime.set_delivery(delivery_fn(send_to_platform))?;
//!     runtime.run().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - `toml-config`: TOML configuration files (default)
//! - `yaml-config`: YAML configuration files
//! - `json-log`: JSON log output

pub use switchboard_core as core;
pub use switchboard_framework as framework;
pub use switchboard_runtime as runtime;

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use switchboard::prelude::*;
/// ```
pub mod prelude {
    // Runtime - main entry point
    pub use switchboard_runtime::{RuntimeError, SwitchboardConfig, SwitchboardRuntime};

    // Routing
    pub use switchboard_core::{EventKind, Mapping, PathVariables};

    // Event model
    pub use switchboard_core::{BotToken, ConversationKey, Event, Update};

    // Handler parameters
    pub use switchboard_framework::{
        BotHandle, ChatId, MatchedPattern, Param, PathVars, Session, SessionState, Text, UserId,
    };

    // Extension points
    pub use switchboard_framework::{ArgumentResolver, DispatchContext, ReturnValueHandler};

    // Delivery
    pub use switchboard_core::{
        ApiResponse, Delivery, DeliveryReport, OutboundRequest, ResultObserver, delivery_fn,
    };
}
