//! Error types for the Switchboard framework.

use thiserror::Error;
use tower::BoxError;

use switchboard_core::ConversationKey;

/// Errors raised while resolving one handler argument.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// No resolver in the chain supports the parameter type.
    #[error("no argument resolver supports parameter type '{param}'")]
    Unsupported { param: &'static str },

    /// A resolver supports the type but the event does not carry the value,
    /// e.g. a `ChatId` for an inline query.
    #[error("parameter '{param}' is unavailable: {reason}")]
    Unavailable {
        param: &'static str,
        reason: &'static str,
    },

    /// A resolver failed.
    #[error("resolver for '{param}' failed: {source}")]
    Failed {
        param: &'static str,
        #[source]
        source: BoxError,
    },
}

impl ResolveError {
    /// Creates a failure from any error.
    pub fn failed(param: &'static str, source: impl Into<BoxError>) -> Self {
        Self::Failed {
            param,
            source: source.into(),
        }
    }

    /// Whether an optional parameter should resolve to `None` on this error.
    pub fn is_absence(&self) -> bool {
        matches!(self, Self::Unsupported { .. } | Self::Unavailable { .. })
    }
}

/// Errors raised while invoking a handler.
///
/// [`Handler`](Self::Handler) and [`Panicked`](Self::Panicked) mean the
/// handler body itself failed; the other variants mean the invocation
/// machinery did.
#[derive(Debug, Error)]
pub enum InvocationError {
    /// The handler returned `Err`.
    #[error("handler returned an error: {0}")]
    Handler(#[source] BoxError),

    /// The handler panicked.
    #[error("handler panicked: {0}")]
    Panicked(String),

    /// An argument was missing from the resolved list.
    #[error("missing argument #{index} of type '{expected}'")]
    MissingArgument {
        index: usize,
        expected: &'static str,
    },

    /// A resolver produced a value of the wrong type.
    #[error("argument #{index}: expected '{expected}', got '{found}'")]
    ArgumentType {
        index: usize,
        expected: &'static str,
        found: &'static str,
    },

    /// The resolved list has more entries than the handler takes.
    #[error("expected {expected} arguments, got {found}")]
    Arity { expected: usize, found: usize },
}

impl InvocationError {
    /// True when the handler body failed rather than the invocation machinery.
    pub fn is_target_failure(&self) -> bool {
        matches!(self, Self::Handler(_) | Self::Panicked(_))
    }
}

/// Errors raised by return-value handlers.
#[derive(Debug, Error)]
pub enum ReturnError {
    /// No handler in the chain supports the value type.
    #[error("no return value handler supports type '{0}'")]
    Unsupported(&'static str),

    /// A reply was produced for an event with neither chat nor user.
    #[error("event has no chat or user to reply to")]
    NoReplyTarget,

    /// A return-value handler failed.
    #[error("return value handler failed: {0}")]
    Failed(#[source] BoxError),
}

/// Errors that end the dispatch of one event.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("failed to resolve arguments for handler '{handler}' ({pattern}): {source}")]
    Resolution {
        handler: String,
        pattern: String,
        #[source]
        source: ResolveError,
    },

    #[error("handler '{handler}' ({pattern}) failed with arguments {arguments}: {source}")]
    Invocation {
        handler: String,
        pattern: String,
        /// Debug dump of the resolved arguments.
        arguments: String,
        #[source]
        source: InvocationError,
    },

    #[error("failed to handle return value of '{handler}': {source}")]
    ReturnHandling {
        handler: String,
        #[source]
        source: ReturnError,
    },

    /// No session could be bound for the conversation.
    #[error("no session available for conversation '{0}'")]
    SessionUnavailable(ConversationKey),

    /// A resolver or return-value handler panicked outside the handler body.
    #[error("dispatch panicked: {0}")]
    Panicked(String),
}

/// Result type for argument resolution.
pub type ResolveResult<T> = Result<T, ResolveError>;

/// Result type for return-value handling.
pub type ReturnResult<T> = Result<T, ReturnError>;

/// Result type for dispatching one event.
pub type DispatchResult<T> = Result<T, DispatchError>;
