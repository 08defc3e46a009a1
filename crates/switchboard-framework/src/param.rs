//! Handler parameters.
//!
//! Every handler parameter type implements [`Param`], which describes the
//! parameter to the [`ArgumentResolverChain`](crate::resolver::ArgumentResolverChain).
//! The chain, not the type, decides where the value comes from, so custom
//! parameter types only need an empty `impl Param` plus a resolver:
//!
//! ```rust,ignore
//! #[derive(Debug)]
//! struct Locale(String);
//!
//! impl Param for Locale {}
//!
//! async fn greet(locale: Locale, text: Text) -> String { /* ... */ }
//! ```
//!
//! Built-in parameter types:
//!
//! | Type                     | Value                                          |
//! |--------------------------|------------------------------------------------|
//! | [`Event`]                | the classified event                           |
//! | `Arc<Update>`            | the raw update payload                         |
//! | [`Text`]                 | routable text                                  |
//! | [`ChatId`] / [`UserId`]  | chat and sender ids                            |
//! | [`BotHandle`]            | the owning bot's handle                        |
//! | [`ConversationKey`]      | the session scope                              |
//! | [`Session`]              | the conversation's session                     |
//! | [`PathVars`]             | all variables captured by the matched pattern  |
//! | [`MatchedPattern`]       | the pattern that routed the event              |
//! | [`SessionState<T>`]      | one `T: Default` per session                   |
//! | `Option<P>`              | `P`, or `None` when it is unavailable          |

use std::any::{Any, type_name};
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

use switchboard_core::{ConversationKey, Event, PathVariables, Update};

use crate::session::{Session, SessionValue};
use crate::value::{Argument, ValueType};

// ============================================================================
// Param / ParamDescriptor
// ============================================================================

/// A type usable as a handler parameter.
pub trait Param: Any + Send + fmt::Debug + Sized {
    fn descriptor() -> ParamDescriptor {
        ParamDescriptor::of::<Self>()
    }
}

/// How a [`SessionState`] parameter is created and wrapped.
#[derive(Clone, Copy)]
pub struct SessionSlot {
    /// Session key the state is stored under.
    pub key: &'static str,
    pub(crate) init: fn() -> SessionValue,
    pub(crate) wrap: fn(SessionValue) -> Option<Argument>,
}

/// Static description of one handler parameter.
#[derive(Clone, Copy)]
pub struct ParamDescriptor {
    ty: ValueType,
    optional: Option<fn(Option<Argument>) -> Argument>,
    session_slot: Option<SessionSlot>,
}

impl ParamDescriptor {
    /// Describes a required parameter of type `T`.
    pub fn of<T: Any>() -> Self {
        Self {
            ty: ValueType::of::<T>(),
            optional: None,
            session_slot: None,
        }
    }

    /// The type resolvers must produce. For `Option<P>` this is `P`.
    pub fn value_type(&self) -> ValueType {
        self.ty
    }

    pub fn type_name(&self) -> &'static str {
        self.ty.name()
    }

    pub fn is<T: Any>(&self) -> bool {
        self.ty.is::<T>()
    }

    pub fn is_optional(&self) -> bool {
        self.optional.is_some()
    }

    pub fn session_slot(&self) -> Option<&SessionSlot> {
        self.session_slot.as_ref()
    }

    pub(crate) fn wrap_optional(&self) -> Option<fn(Option<Argument>) -> Argument> {
        self.optional
    }

    fn optional(mut self, wrap: fn(Option<Argument>) -> Argument) -> Self {
        self.optional = Some(wrap);
        self
    }

    fn with_session_slot(mut self, slot: SessionSlot) -> Self {
        self.session_slot = Some(slot);
        self
    }
}

impl fmt::Debug for ParamDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParamDescriptor")
            .field("type", &self.ty)
            .field("optional", &self.is_optional())
            .finish()
    }
}

fn wrap_option<P: Param>(arg: Option<Argument>) -> Argument {
    Argument::new(arg.and_then(|a| a.downcast::<P>().ok()))
}

impl<P: Param> Param for Option<P> {
    fn descriptor() -> ParamDescriptor {
        P::descriptor().optional(wrap_option::<P>)
    }
}

// ============================================================================
// Built-in parameter types
// ============================================================================

impl Param for Event {}

impl Param for Arc<Update> {}

impl Param for ConversationKey {}

impl Param for Session {}

/// The event's routable text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Text(pub String);

impl Param for Text {}

impl Deref for Text {
    type Target = str;

    fn deref(&self) -> &str {
        &self.0
    }
}

/// The id of the chat the event happened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChatId(pub i64);

impl Param for ChatId {}

/// The id of the user who caused the event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UserId(pub i64);

impl Param for UserId {}

/// The handle of the bot that received the event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BotHandle(pub Arc<str>);

impl Param for BotHandle {}

impl Deref for BotHandle {
    type Target = str;

    fn deref(&self) -> &str {
        &self.0
    }
}

/// Every variable captured by the matched pattern.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathVars(pub PathVariables);

impl PathVars {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    /// Parses a variable, `None` when absent or unparsable.
    pub fn parse<T: std::str::FromStr>(&self, name: &str) -> Option<T> {
        self.get(name)?.parse().ok()
    }
}

impl Param for PathVars {}

/// The pattern that routed the event, e.g. `test {var:[0-9]}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchedPattern(pub String);

impl Param for MatchedPattern {}

/// Per-session state of type `T`, created with `T::default()` on first use.
///
/// One instance exists per session, keyed by the type name. Use interior
/// mutability for state that changes:
///
/// ```rust,ignore
/// #[derive(Debug, Default)]
/// struct Counter(AtomicU32);
///
/// async fn count(counter: SessionState<Counter>) -> String {
///     let n = counter.0.fetch_add(1, Ordering::SeqCst) + 1;
///     format!("seen {n} messages")
/// }
/// ```
pub struct SessionState<T>(pub Arc<T>);

impl<T> Deref for SessionState<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.0
    }
}

impl<T> Clone for SessionState<T> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<T: fmt::Debug> fmt::Debug for SessionState<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SessionState").field(&self.0).finish()
    }
}

fn init_state<T: Default + Send + Sync + 'static>() -> SessionValue {
    Arc::new(T::default())
}

fn wrap_state<T: fmt::Debug + Send + Sync + 'static>(value: SessionValue) -> Option<Argument> {
    value
        .downcast::<T>()
        .ok()
        .map(|state| Argument::new(SessionState(state)))
}

impl<T> Param for SessionState<T>
where
    T: Default + fmt::Debug + Send + Sync + 'static,
{
    fn descriptor() -> ParamDescriptor {
        ParamDescriptor::of::<Self>().with_session_slot(SessionSlot {
            key: type_name::<T>(),
            init: init_state::<T>,
            wrap: wrap_state::<T>,
        })
    }
}
