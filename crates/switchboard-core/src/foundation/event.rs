//! Event system for Switchboard.
//!
//! This module provides the normalized view of one inbound update:
//!
//! - [`EventKind`] - closed classification of update shapes
//! - [`ConversationKey`] - the identifier session state is scoped by
//! - [`Event`] - immutable snapshot produced by the classifier
//!
//! Events are cheap to clone; the raw update is shared behind an `Arc`.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::update::{Chat, Update, User};

// ============================================================================
// Event Kind Classification
// ============================================================================

/// Classification of an inbound update.
///
/// Routing mappings declare the kinds they accept; see
/// [`KindSet`](crate::routing::KindSet).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// A new message (not a command).
    Message,
    EditedMessage,
    ChannelPost,
    EditedChannelPost,
    InlineQuery,
    ChosenInlineResult,
    CallbackQuery,
    ShippingQuery,
    PreCheckoutQuery,
    Poll,
    /// A message whose text starts with the command prefix.
    Command,
    /// An update shape the classifier does not recognize.
    Unsupported,
}

impl EventKind {
    /// Every kind, in classification priority order.
    pub const ALL: [EventKind; 12] = [
        EventKind::Message,
        EventKind::EditedMessage,
        EventKind::ChannelPost,
        EventKind::EditedChannelPost,
        EventKind::InlineQuery,
        EventKind::ChosenInlineResult,
        EventKind::CallbackQuery,
        EventKind::ShippingQuery,
        EventKind::PreCheckoutQuery,
        EventKind::Poll,
        EventKind::Command,
        EventKind::Unsupported,
    ];

    /// Returns the snake_case name of this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Message => "message",
            EventKind::EditedMessage => "edited_message",
            EventKind::ChannelPost => "channel_post",
            EventKind::EditedChannelPost => "edited_channel_post",
            EventKind::InlineQuery => "inline_query",
            EventKind::ChosenInlineResult => "chosen_inline_result",
            EventKind::CallbackQuery => "callback_query",
            EventKind::ShippingQuery => "shipping_query",
            EventKind::PreCheckoutQuery => "pre_checkout_query",
            EventKind::Poll => "poll",
            EventKind::Command => "command",
            EventKind::Unsupported => "unsupported",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.to_lowercase().replace('-', "_");
        EventKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == normalized)
            .ok_or(())
    }
}

// ============================================================================
// Conversation Key
// ============================================================================

/// The identifier that scopes session state.
///
/// Derived from the chat when present, else the user, else the update itself,
/// so every event has one. Variants keep the id spaces apart: a synthetic
/// update key never collides with a chat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ConversationKey {
    Chat(i64),
    User(i64),
    Update(i64),
}

impl ConversationKey {
    /// Returns the numeric id regardless of origin.
    pub fn id(&self) -> i64 {
        match self {
            Self::Chat(id) | Self::User(id) | Self::Update(id) => *id,
        }
    }
}

impl fmt::Display for ConversationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Chat(id) => write!(f, "chat:{id}"),
            Self::User(id) => write!(f, "user:{id}"),
            Self::Update(id) => write!(f, "update:{id}"),
        }
    }
}

// ============================================================================
// Bot identity
// ============================================================================

/// Registration token identifying which bot instance an event belongs to.
///
/// Mappings are bucketed by token; an event only ever routes to handlers
/// registered under its own token.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BotToken(Arc<str>);

impl BotToken {
    pub fn new(token: impl AsRef<str>) -> Self {
        Self(Arc::from(token.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BotToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for BotToken {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for BotToken {
    fn from(value: String) -> Self {
        Self(Arc::from(value))
    }
}

// ============================================================================
// Event
// ============================================================================

/// Immutable, classified snapshot of one inbound update.
///
/// Created by [`classify`](super::classifier::EventClassifier::classify) and
/// owned by the dispatch that created it.
#[derive(Debug, Clone)]
pub struct Event {
    pub(crate) token: BotToken,
    pub(crate) bot: Arc<str>,
    pub(crate) kind: EventKind,
    pub(crate) conversation: ConversationKey,
    pub(crate) text: Option<String>,
    pub(crate) chat: Option<Chat>,
    pub(crate) user: Option<User>,
    pub(crate) update: Arc<Update>,
}

impl Event {
    /// The registration token of the bot this event belongs to.
    pub fn token(&self) -> &BotToken {
        &self.token
    }

    /// The owning bot's handle (username).
    pub fn bot(&self) -> &str {
        &self.bot
    }

    pub fn kind(&self) -> EventKind {
        self.kind
    }

    pub fn conversation(&self) -> ConversationKey {
        self.conversation
    }

    /// The routable text, if the update shape carries one.
    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }

    pub fn chat(&self) -> Option<&Chat> {
        self.chat.as_ref()
    }

    pub fn user(&self) -> Option<&User> {
        self.user.as_ref()
    }

    pub fn chat_id(&self) -> Option<i64> {
        self.chat.as_ref().map(|c| c.id)
    }

    pub fn user_id(&self) -> Option<i64> {
        self.user.as_ref().map(|u| u.id)
    }

    /// The raw update this event was classified from.
    pub fn update(&self) -> &Arc<Update> {
        &self.update
    }

    pub fn update_id(&self) -> i64 {
        self.update.update_id
    }

    /// The id replies should be addressed to: the chat, else the user.
    pub fn reply_target(&self) -> Option<i64> {
        self.chat_id().or_else(|| self.user_id())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_kind_from_str() {
        assert_eq!("callback_query".parse(), Ok(EventKind::CallbackQuery));
        assert_eq!("CALLBACK-QUERY".parse(), Ok(EventKind::CallbackQuery));
        assert_eq!("message".parse(), Ok(EventKind::Message));
        assert!("any".parse::<EventKind>().is_err());
    }

    #[test]
    fn test_conversation_key_display() {
        assert_eq!(ConversationKey::Chat(-5).to_string(), "chat:-5");
        assert_eq!(ConversationKey::User(9).to_string(), "user:9");
        assert_eq!(ConversationKey::Update(1).id(), 1);
        assert_ne!(ConversationKey::Chat(1), ConversationKey::Update(1));
    }
}
