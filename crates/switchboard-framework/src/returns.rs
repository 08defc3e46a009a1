//! Return-value handling.
//!
//! After a handler completes, its [`ReturnValue`] runs through a
//! [`ReturnValueChain`]: the first [`ReturnValueHandler`] supporting the
//! value's type turns it into an [`OutboundRequest`] or into nothing.
//!
//! Built-ins, in chain order:
//!
//! 1. [`OutboundPassthrough`] - an `OutboundRequest` is sent as is
//! 2. [`TextReply`] - `String` / `&'static str` become `sendMessage` to the
//!    event's chat, or its user when there is no chat
//! 3. [`UnitReturn`] - `()` and `None` send nothing
//! 4. [`FallbackReturn`] - anything else sends nothing, logged at debug
//!
//! User handlers are placed before the built-ins.

use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;

use switchboard_core::OutboundRequest;

use crate::context::DispatchContext;
use crate::error::{ReturnError, ReturnResult};
use crate::value::{ReturnValue, ValueType};

/// Converts one kind of handler output into an outbound action.
pub trait ReturnValueHandler: Send + Sync + 'static {
    /// Whether this handler serves values of type `ty`.
    fn supports(&self, ty: &ValueType) -> bool;

    /// Returns the request to deliver, or `None` for no outbound action.
    fn handle(&self, value: ReturnValue, ctx: &DispatchContext) -> ReturnResult<Option<OutboundRequest>>;
}

pub type BoxedReturnHandler = Arc<dyn ReturnValueHandler>;

/// Ordered return-value handlers with a per-type memo.
pub struct ReturnValueChain {
    handlers: Vec<BoxedReturnHandler>,
    memo: DashMap<ValueType, Option<usize>>,
}

impl Default for ReturnValueChain {
    fn default() -> Self {
        Self::with_builtins(Vec::new())
    }
}

impl ReturnValueChain {
    pub fn new(handlers: Vec<BoxedReturnHandler>) -> Self {
        Self {
            handlers,
            memo: DashMap::new(),
        }
    }

    /// `custom` handlers followed by the built-ins.
    pub fn with_builtins(custom: Vec<BoxedReturnHandler>) -> Self {
        let mut handlers = custom;
        handlers.push(Arc::new(OutboundPassthrough));
        handlers.push(Arc::new(TextReply));
        handlers.push(Arc::new(UnitReturn));
        handlers.push(Arc::new(FallbackReturn));
        Self::new(handlers)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    pub fn handle(&self, value: ReturnValue, ctx: &DispatchContext) -> ReturnResult<Option<OutboundRequest>> {
        let ty = value.value_type();
        let index = *self
            .memo
            .entry(ty)
            .or_insert_with(|| self.handlers.iter().position(|h| h.supports(&ty)));

        match index {
            Some(i) => self.handlers[i].handle(value, ctx),
            None => Err(ReturnError::Unsupported(ty.name())),
        }
    }
}

impl fmt::Debug for ReturnValueChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReturnValueChain")
            .field("handlers", &self.handlers.len())
            .finish()
    }
}

// ============================================================================
// Built-in handlers
// ============================================================================

#[derive(Debug, Clone, Copy, Default)]
pub struct OutboundPassthrough;

impl ReturnValueHandler for OutboundPassthrough {
    fn supports(&self, ty: &ValueType) -> bool {
        ty.is::<OutboundRequest>()
    }

    fn handle(&self, value: ReturnValue, _ctx: &DispatchContext) -> ReturnResult<Option<OutboundRequest>> {
        value
            .downcast::<OutboundRequest>()
            .map(Some)
            .map_err(|v| ReturnError::Unsupported(v.value_type().name()))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TextReply;

impl ReturnValueHandler for TextReply {
    fn supports(&self, ty: &ValueType) -> bool {
        ty.is::<String>() || ty.is::<&'static str>()
    }

    fn handle(&self, value: ReturnValue, ctx: &DispatchContext) -> ReturnResult<Option<OutboundRequest>> {
        let text = match value.downcast::<String>() {
            Ok(text) => text,
            Err(value) => value
                .downcast::<&'static str>()
                .map(str::to_string)
                .map_err(|v| ReturnError::Unsupported(v.value_type().name()))?,
        };

        let Some(target) = ctx.event().reply_target() else {
            debug!(
                handler = ctx.handler_id(),
                kind = %ctx.event().kind(),
                "Text reply for event without chat or user, nothing to send"
            );
            return Ok(None);
        };
        Ok(Some(OutboundRequest::send_message(target, text)))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct UnitReturn;

impl ReturnValueHandler for UnitReturn {
    fn supports(&self, ty: &ValueType) -> bool {
        ty.is::<()>()
    }

    fn handle(&self, _value: ReturnValue, _ctx: &DispatchContext) -> ReturnResult<Option<OutboundRequest>> {
        Ok(None)
    }
}

/// Accepts every type and sends nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct FallbackReturn;

impl ReturnValueHandler for FallbackReturn {
    fn supports(&self, _ty: &ValueType) -> bool {
        true
    }

    fn handle(&self, value: ReturnValue, ctx: &DispatchContext) -> ReturnResult<Option<OutboundRequest>> {
        debug!(
            handler = ctx.handler_id(),
            value_type = %value.value_type(),
            "No return value handler for type, nothing to send"
        );
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionStore;
    use switchboard_core::{
        BotToken, Chat, EventClassifier, InlineQuery, Message, PathVariables, Poll, Update, User,
    };

    #[derive(Debug)]
    struct Sticker(&'static str);

    struct StickerReply;

    impl ReturnValueHandler for StickerReply {
        fn supports(&self, ty: &ValueType) -> bool {
            ty.is::<Sticker>()
        }

        fn handle(&self, value: ReturnValue, ctx: &DispatchContext) -> ReturnResult<Option<OutboundRequest>> {
            let sticker = value
                .downcast::<Sticker>()
                .map_err(|v| ReturnError::Unsupported(v.value_type().name()))?;
            let chat = ctx.event().reply_target().ok_or(ReturnError::NoReplyTarget)?;
            Ok(Some(OutboundRequest::new(
                "sendSticker",
                serde_json::json!({ "chat_id": chat, "sticker": sticker.0 }),
            )))
        }
    }

    fn context(update: Update) -> DispatchContext {
        let store = SessionStore::default();
        let event = EventClassifier::new().classify(BotToken::new("t"), std::sync::Arc::new(update), "b");
        let session = store.acquire(event.conversation()).unwrap();
        DispatchContext::new(event, session, Arc::from("h"), "**".into(), PathVariables::new())
    }

    fn message_context() -> DispatchContext {
        let mut update = Update::new(1);
        update.message = Some(Message::text(1, Chat::private(99), "hi"));
        context(update)
    }

    #[test]
    fn test_text_becomes_send_message() {
        let chain = ReturnValueChain::default();
        let ctx = message_context();

        let req = chain.handle(ReturnValue::new(String::from("pong")), &ctx).unwrap().unwrap();
        assert_eq!(req.method(), "sendMessage");
        assert_eq!(req.payload()["chat_id"], 99);
        assert_eq!(req.payload()["text"], "pong");

        let req = chain.handle(ReturnValue::new("static"), &ctx).unwrap().unwrap();
        assert_eq!(req.payload()["text"], "static");
    }

    #[test]
    fn test_text_reply_without_target_sends_nothing() {
        let mut update = Update::new(3);
        update.poll = Some(Poll {
            id: "p".into(),
            question: "lunch?".into(),
        });
        let ctx = context(update);
        assert!(ctx.event().reply_target().is_none());

        let outbound = ReturnValueChain::default()
            .handle(ReturnValue::new("noted"), &ctx)
            .unwrap();
        assert!(outbound.is_none());
    }

    #[test]
    fn test_text_reply_falls_back_to_user() {
        let mut update = Update::new(2);
        update.inline_query = Some(InlineQuery {
            id: "q".into(),
            from: User::new(5, "u"),
            query: String::new(),
        });
        let ctx = context(update);

        let req = ReturnValueChain::default()
            .handle(ReturnValue::new(String::from("x")), &ctx)
            .unwrap()
            .unwrap();
        assert_eq!(req.payload()["chat_id"], 5);
    }

    #[test]
    fn test_passthrough_unit_and_fallback() {
        let chain = ReturnValueChain::default();
        let ctx = message_context();

        let outbound = OutboundRequest::answer_callback_query("cb", None);
        let req = chain.handle(ReturnValue::new(outbound.clone()), &ctx).unwrap();
        assert_eq!(req, Some(outbound));

        assert_eq!(chain.handle(ReturnValue::unit(), &ctx).unwrap(), None);
        assert_eq!(chain.handle(ReturnValue::new(42u64), &ctx).unwrap(), None);
    }

    #[test]
    fn test_custom_handler_precedes_fallback() {
        let chain = ReturnValueChain::with_builtins(vec![Arc::new(StickerReply)]);
        let ctx = message_context();

        let req = chain.handle(ReturnValue::new(Sticker("cat")), &ctx).unwrap().unwrap();
        assert_eq!(req.method(), "sendSticker");
        assert_eq!(req.payload()["sticker"], "cat");
    }

    #[test]
    fn test_chain_without_fallback_rejects_unknown_types() {
        let chain = ReturnValueChain::new(vec![Arc::new(UnitReturn)]);
        let ctx = message_context();
        let err = chain.handle(ReturnValue::new(1u8), &ctx).unwrap_err();
        assert!(matches!(err, ReturnError::Unsupported(_)));
    }
}
