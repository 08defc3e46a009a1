//! Configuration module for the Switchboard runtime.
//!
//! Layered loading through figment (defaults, files, `SWITCHBOARD_*`
//! environment variables, programmatic overrides) and validation of the
//! result.

pub mod error;
pub mod loader;
pub mod schema;
pub mod validation;

pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigLoader, Profile, load_config, load_config_from_file};
pub use schema::{
    DispatchConfig, LogFormat, LogLevel, LogOutput, LogRotation, LoggingConfig, RoutingConfig,
    SessionConfig, SpanEventConfig, SwitchboardConfig,
};
pub use validation::validate_config;
