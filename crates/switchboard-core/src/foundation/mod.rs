//! Foundation layer - the inbound data model.
//!
//! - Serde model of the platform update payload
//! - Normalized events, kinds and conversation keys
//! - The classifier that turns one into the other

pub mod classifier;
pub mod event;
pub mod update;

pub use classifier::{DEFAULT_COMMAND_PREFIX, EventClassifier};
pub use event::{BotToken, ConversationKey, Event, EventKind};
pub use update::{
    CallbackQuery, Chat, ChosenInlineResult, InlineQuery, Message, Poll, PreCheckoutQuery,
    ShippingQuery, Update, User,
};
