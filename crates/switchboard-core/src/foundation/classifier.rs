//! Derives a normalized [`Event`] from a raw [`Update`].
//!
//! Sub-payloads are inspected in a fixed priority order; the first present one
//! decides the [`EventKind`] and where text, chat and user come from:
//!
//! | Sub-payload            | Text                 | Chat              | User     |
//! |------------------------|----------------------|-------------------|----------|
//! | message (+ edits, posts)| `text` / `caption`  | `chat`            | `from`   |
//! | inline query           | `query`              | -                 | `from`   |
//! | chosen inline result   | `query`              | -                 | `from`   |
//! | callback query         | `data`               | `message.chat`    | `from`   |
//! | shipping query         | `invoice_payload`    | -                 | `from`   |
//! | pre-checkout query     | `invoice_payload`    | -                 | `from`   |
//! | poll                   | `question`           | -                 | -        |
//!
//! Classification never fails: an update with none of these is
//! [`EventKind::Unsupported`] with no text, chat or user.

use std::sync::Arc;

use super::event::{BotToken, ConversationKey, Event, EventKind};
use super::update::{Chat, Message, Update, User};

/// Default prefix that marks a message as a command.
pub const DEFAULT_COMMAND_PREFIX: char = '/';

/// Classifies raw updates into [`Event`]s.
#[derive(Debug, Clone, Copy)]
pub struct EventClassifier {
    command_prefix: Option<char>,
}

impl Default for EventClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl EventClassifier {
    /// Creates a classifier that recognizes `/`-prefixed commands.
    pub fn new() -> Self {
        Self {
            command_prefix: Some(DEFAULT_COMMAND_PREFIX),
        }
    }

    /// Sets the command prefix; `None` folds commands into plain messages.
    pub fn command_prefix(mut self, prefix: Option<char>) -> Self {
        self.command_prefix = prefix;
        self
    }

    /// Classifies one update for the bot identified by `token` and `bot`.
    pub fn classify(&self, token: BotToken, update: Arc<Update>, bot: &str) -> Event {
        let (kind, text, chat, user) = self.inspect(&update, bot);

        let conversation = match (&chat, &user) {
            (Some(chat), _) => ConversationKey::Chat(chat.id),
            (None, Some(user)) => ConversationKey::User(user.id),
            (None, None) => ConversationKey::Update(update.update_id),
        };

        Event {
            token,
            bot: Arc::from(bot),
            kind,
            conversation,
            text,
            chat,
            user,
            update,
        }
    }

    fn inspect(
        &self,
        update: &Update,
        bot: &str,
    ) -> (EventKind, Option<String>, Option<Chat>, Option<User>) {
        if let Some(msg) = &update.message {
            let (kind, text) = self.refine_command(msg, bot);
            return (kind, text, Some(msg.chat.clone()), msg.from.clone());
        }
        if let Some(msg) = &update.edited_message {
            return message_parts(EventKind::EditedMessage, msg);
        }
        if let Some(msg) = &update.channel_post {
            return message_parts(EventKind::ChannelPost, msg);
        }
        if let Some(msg) = &update.edited_channel_post {
            return message_parts(EventKind::EditedChannelPost, msg);
        }
        if let Some(q) = &update.inline_query {
            return (
                EventKind::InlineQuery,
                Some(q.query.clone()),
                None,
                Some(q.from.clone()),
            );
        }
        if let Some(r) = &update.chosen_inline_result {
            return (
                EventKind::ChosenInlineResult,
                Some(r.query.clone()),
                None,
                Some(r.from.clone()),
            );
        }
        if let Some(cb) = &update.callback_query {
            return (
                EventKind::CallbackQuery,
                cb.data.clone(),
                cb.message.as_ref().map(|m| m.chat.clone()),
                Some(cb.from.clone()),
            );
        }
        if let Some(q) = &update.shipping_query {
            return (
                EventKind::ShippingQuery,
                Some(q.invoice_payload.clone()),
                None,
                Some(q.from.clone()),
            );
        }
        if let Some(q) = &update.pre_checkout_query {
            return (
                EventKind::PreCheckoutQuery,
                Some(q.invoice_payload.clone()),
                None,
                Some(q.from.clone()),
            );
        }
        if let Some(poll) = &update.poll {
            return (EventKind::Poll, Some(poll.question.clone()), None, None);
        }

        (EventKind::Unsupported, None, None, None)
    }

    /// Detects commands and strips a `@bot` suffix addressed to this bot.
    ///
    /// A command addressed to another bot (`/start@other_bot`) stays a plain
    /// message with its text untouched.
    fn refine_command(&self, msg: &Message, bot: &str) -> (EventKind, Option<String>) {
        let text = msg.content().map(str::to_owned);
        let (Some(prefix), Some(body)) = (self.command_prefix, text.as_deref()) else {
            return (EventKind::Message, text);
        };
        if !body.starts_with(prefix) {
            return (EventKind::Message, text);
        }

        let head_end = body.find(char::is_whitespace).unwrap_or(body.len());
        let (head, rest) = body.split_at(head_end);

        match head.split_once('@') {
            None => (EventKind::Command, text),
            Some((command, target)) if target.eq_ignore_ascii_case(bot.trim_start_matches('@')) => {
                (EventKind::Command, Some(format!("{command}{rest}")))
            }
            Some(_) => (EventKind::Message, text),
        }
    }
}

fn message_parts(
    kind: EventKind,
    msg: &Message,
) -> (EventKind, Option<String>, Option<Chat>, Option<User>) {
    (
        kind,
        msg.content().map(str::to_owned),
        Some(msg.chat.clone()),
        msg.from.clone(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::update::{CallbackQuery, InlineQuery, Poll};

    fn classify(update: Update) -> Event {
        EventClassifier::new().classify(BotToken::new("t"), Arc::new(update), "my_bot")
    }

    #[test]
    fn test_plain_message() {
        let mut update = Update::new(1);
        update.message = Some(Message::text(1, Chat::private(10), "hello").from_user(User::new(7, "a")));

        let event = classify(update);
        assert_eq!(event.kind(), EventKind::Message);
        assert_eq!(event.text(), Some("hello"));
        assert_eq!(event.conversation(), ConversationKey::Chat(10));
        assert_eq!(event.user_id(), Some(7));
        assert_eq!(event.token().as_str(), "t");
        assert_eq!(event.bot(), "my_bot");
    }

    #[test]
    fn test_command_detection() {
        let mut update = Update::new(1);
        update.message = Some(Message::text(1, Chat::private(10), "/start now"));
        assert_eq!(classify(update).kind(), EventKind::Command);
    }

    #[test]
    fn test_command_suffix_for_this_bot_is_stripped() {
        let mut update = Update::new(1);
        update.message = Some(Message::text(1, Chat::private(10), "/start@My_Bot now"));

        let event = classify(update);
        assert_eq!(event.kind(), EventKind::Command);
        assert_eq!(event.text(), Some("/start now"));
    }

    #[test]
    fn test_command_for_other_bot_is_plain_message() {
        let mut update = Update::new(1);
        update.message = Some(Message::text(1, Chat::private(10), "/start@other_bot"));

        let event = classify(update);
        assert_eq!(event.kind(), EventKind::Message);
        assert_eq!(event.text(), Some("/start@other_bot"));
    }

    #[test]
    fn test_command_prefix_disabled() {
        let mut update = Update::new(1);
        update.message = Some(Message::text(1, Chat::private(10), "/start"));

        let event = EventClassifier::new().command_prefix(None).classify(
            BotToken::new("t"),
            Arc::new(update),
            "my_bot",
        );
        assert_eq!(event.kind(), EventKind::Message);
    }

    #[test]
    fn test_callback_query_takes_chat_from_message() {
        let mut update = Update::new(1);
        update.callback_query = Some(CallbackQuery {
            id: "cb".into(),
            from: User::new(7, "a"),
            message: Some(Message::text(2, Chat::private(-300), "menu")),
            data: Some("test 1".into()),
        });

        let event = classify(update);
        assert_eq!(event.kind(), EventKind::CallbackQuery);
        assert_eq!(event.text(), Some("test 1"));
        assert_eq!(event.conversation(), ConversationKey::Chat(-300));
    }

    #[test]
    fn test_inline_query_falls_back_to_user_key() {
        let mut update = Update::new(1);
        update.inline_query = Some(InlineQuery {
            id: "q".into(),
            from: User::new(8, "b"),
            query: "cats".into(),
        });

        let event = classify(update);
        assert_eq!(event.kind(), EventKind::InlineQuery);
        assert!(event.chat().is_none());
        assert_eq!(event.conversation(), ConversationKey::User(8));
    }

    #[test]
    fn test_poll_uses_synthetic_key() {
        let mut update = Update::new(99);
        update.poll = Some(Poll {
            id: "p".into(),
            question: "why?".into(),
        });

        let event = classify(update);
        assert_eq!(event.kind(), EventKind::Poll);
        assert_eq!(event.conversation(), ConversationKey::Update(99));
    }

    #[test]
    fn test_unsupported_update() {
        let event = classify(Update::new(5));
        assert_eq!(event.kind(), EventKind::Unsupported);
        assert!(event.text().is_none());
        assert!(event.chat().is_none());
        assert!(event.user().is_none());
        assert_eq!(event.conversation(), ConversationKey::Update(5));
    }

    #[test]
    fn test_message_has_priority_over_later_payloads() {
        let mut update = Update::new(1);
        update.message = Some(Message::text(1, Chat::private(10), "first"));
        update.poll = Some(Poll {
            id: "p".into(),
            question: "second".into(),
        });

        assert_eq!(classify(update).text(), Some("first"));
    }
}
