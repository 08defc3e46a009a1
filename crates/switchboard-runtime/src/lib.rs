//! Switchboard Runtime - lifecycle and operations around the dispatcher.
//!
//! This crate provides:
//! - Runtime orchestration ([`SwitchboardRuntime`])
//! - Layered configuration ([`config`])
//! - Logging setup ([`logging`])
//! - A bounded worker pool in front of the dispatcher ([`DispatchPool`])
//! - Periodic session eviction ([`sweeper`])
//!
//! ```ignore
//! use switchboard_runtime::SwitchboardRuntime;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let runtime = SwitchboardRuntime::new();
//!
//!     runtime.register("echo", echo, [Mapping::new(token).pattern("echo *")])?;
//!     runtime.set_delivery(delivery_fn(send_to_platform))?;
//!
//!     // Feed updates from a webhook or poller with `runtime.submit(...)`.
//!     runtime.run().await?;
//!     Ok(())
//! }
//! ```
//!
//! # Shutdown
//!
//! `stop()` first waits for every running dispatch, then for every pending
//! delivery, and only then tears the sessions down. Nothing submitted before
//! `stop()` is lost.

pub mod config;
pub mod error;
pub mod logging;
pub mod pool;
pub mod runtime;
pub mod sweeper;

// Re-exports
pub use config::{
    ConfigError, ConfigLoader, ConfigResult, DispatchConfig, LoggingConfig, Profile,
    RoutingConfig, SessionConfig, SwitchboardConfig,
};
pub use error::{RuntimeError, RuntimeResult};
pub use logging::{LoggingBuilder, LoggingError, SpanEvents};
pub use pool::{DispatchPool, DispatchService};
pub use runtime::{RuntimeBuilder, RuntimeStats, SwitchboardRuntime};

// Re-export tracing for use by other crates
pub use tracing;
pub use tracing_subscriber;

/// Prelude module for convenient imports.
///
/// Provides the logging macros and `Level`.
pub mod prelude {
    pub use tracing::{Level, debug, error, info, instrument, span, trace, warn};
}
