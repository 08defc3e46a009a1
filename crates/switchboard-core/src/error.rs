//! Unified error types for the Switchboard core.
//!
//! Dispatch-level errors (resolution, invocation) are defined in
//! `switchboard-framework`.

use thiserror::Error;

// =============================================================================
// Pattern Errors
// =============================================================================

/// Errors raised while compiling an Ant-style pattern.
#[derive(Debug, Clone, Error)]
pub enum PatternError {
    /// A `{name:regex}` capture holds a regex that does not compile.
    #[error("invalid regex in pattern segment '{segment}': {reason}")]
    InvalidRegex {
        /// The offending pattern segment.
        segment: String,
        /// Compiler message.
        reason: String,
    },

    /// A `{` without a matching `}`.
    #[error("unbalanced braces in pattern segment '{0}'")]
    UnbalancedBraces(String),

    /// A capture without a variable name, e.g. `{:[0-9]}`.
    #[error("empty variable name in pattern segment '{0}'")]
    EmptyVariable(String),
}

// =============================================================================
// Registry Errors
// =============================================================================

/// Errors raised while registering mappings.
#[derive(Debug, Clone, Error)]
pub enum RegistryError {
    /// A pattern failed to compile.
    #[error("handler '{handler}' declares an invalid pattern '{pattern}': {source}")]
    InvalidPattern {
        handler: String,
        pattern: String,
        #[source]
        source: PatternError,
    },

    /// A mapping explicitly declared no event kinds.
    #[error("handler '{handler}' declares a mapping with an empty kind set")]
    EmptyKindSet { handler: String },

    /// A mapping has an empty bot token.
    #[error("handler '{handler}' declares a mapping without a bot token")]
    EmptyToken { handler: String },
}

// =============================================================================
// Delivery Errors
// =============================================================================

/// Errors reported by the outbound delivery collaborator.
#[derive(Debug, Clone, Error)]
pub enum DeliveryError {
    /// The request never reached the platform.
    #[error("transport error: {0}")]
    Transport(String),

    /// The platform response could not be decoded.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The delivery collaborator gave up waiting.
    #[error("delivery timed out")]
    Timeout,

    /// The platform answered with `ok: false`.
    #[error("platform rejected the request ({code}): {description}")]
    Rejected { code: i32, description: String },

    /// No delivery channel is known for the event's bot token.
    #[error("no delivery channel for bot token '{0}'")]
    UnknownBot(String),
}

impl From<serde_json::Error> for DeliveryError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

// =============================================================================
// Result Type Aliases
// =============================================================================

pub type PatternResult<T> = Result<T, PatternError>;

/// Result type for registration.
pub type RegistryResult<T> = Result<T, RegistryError>;

/// Result type for outbound delivery.
pub type DeliveryResult<T> = Result<T, DeliveryError>;
