//! Argument resolution.
//!
//! An [`ArgumentResolverChain`] holds an ordered list of [`ArgumentResolver`]s.
//! For each handler parameter the first resolver whose `supports` accepts the
//! parameter's [`ParamDescriptor`] produces the value. Which resolver serves a
//! given parameter type is decided once and memoized.
//!
//! User resolvers come before the built-ins, so they can serve custom types
//! and override built-in ones.

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use dashmap::DashMap;

use crate::context::DispatchContext;
use crate::error::{ResolveError, ResolveResult};
use crate::param::{BotHandle, ChatId, MatchedPattern, Param, ParamDescriptor, PathVars, Text, UserId};
use crate::session::Session;
use crate::value::{Argument, ValueType};

use switchboard_core::{ConversationKey, Event, Update};

/// Produces handler arguments from the dispatch context.
pub trait ArgumentResolver: Send + Sync + 'static {
    /// Whether this resolver serves `param`. Must depend on the type only.
    fn supports(&self, param: &ParamDescriptor) -> bool;

    fn resolve(&self, param: &ParamDescriptor, ctx: &DispatchContext) -> ResolveResult<Argument>;
}

pub type BoxedResolver = Arc<dyn ArgumentResolver>;

// ============================================================================
// ArgumentResolverChain
// ============================================================================

/// Ordered resolvers with a per-type memo of which one applies.
pub struct ArgumentResolverChain {
    resolvers: Vec<BoxedResolver>,
    memo: DashMap<ValueType, Option<usize>>,
}

impl Default for ArgumentResolverChain {
    fn default() -> Self {
        Self::with_builtins(Vec::new())
    }
}

impl ArgumentResolverChain {
    /// A chain holding only `resolvers`.
    pub fn new(resolvers: Vec<BoxedResolver>) -> Self {
        Self {
            resolvers,
            memo: DashMap::new(),
        }
    }

    /// `custom` resolvers followed by the built-ins.
    pub fn with_builtins(custom: Vec<BoxedResolver>) -> Self {
        let mut resolvers = custom;
        resolvers.extend(builtin_resolvers());
        Self::new(resolvers)
    }

    pub fn len(&self) -> usize {
        self.resolvers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resolvers.is_empty()
    }

    fn find(&self, param: &ParamDescriptor) -> Option<&BoxedResolver> {
        let index = *self
            .memo
            .entry(param.value_type())
            .or_insert_with(|| self.resolvers.iter().position(|r| r.supports(param)));
        index.map(|i| &self.resolvers[i])
    }

    pub fn supports(&self, param: &ParamDescriptor) -> bool {
        self.find(param).is_some()
    }

    /// Resolves one parameter.
    ///
    /// An optional parameter resolves to `None` when its value is unsupported
    /// or unavailable; a resolver failure still propagates.
    pub fn resolve(&self, param: &ParamDescriptor, ctx: &DispatchContext) -> ResolveResult<Argument> {
        let result = match self.find(param) {
            Some(resolver) => resolver.resolve(param, ctx),
            None => Err(ResolveError::Unsupported {
                param: param.type_name(),
            }),
        };

        match param.wrap_optional() {
            None => result,
            Some(wrap) => match result {
                Ok(arg) => Ok(wrap(Some(arg))),
                Err(err) if err.is_absence() => Ok(wrap(None)),
                Err(err) => Err(err),
            },
        }
    }

    /// Resolves every parameter in order, stopping at the first failure.
    pub fn resolve_all(
        &self,
        params: &[ParamDescriptor],
        ctx: &DispatchContext,
    ) -> ResolveResult<Vec<Argument>> {
        params.iter().map(|p| self.resolve(p, ctx)).collect()
    }
}

impl fmt::Debug for ArgumentResolverChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArgumentResolverChain")
            .field("resolvers", &self.resolvers.len())
            .field("memoized", &self.memo.len())
            .finish()
    }
}

// ============================================================================
// Closure resolvers
// ============================================================================

/// A resolver serving exactly one type `T` from a closure.
pub struct FnResolver<T, F> {
    f: F,
    _marker: PhantomData<fn() -> T>,
}

/// Wraps `f` as a resolver for `T`.
///
/// ```rust,ignore
/// let locale = resolver_fn(|ctx: &DispatchContext| {
///     Ok(Locale(lookup_locale(ctx.event().user_id())))
/// });
/// ```
pub fn resolver_fn<T, F>(f: F) -> FnResolver<T, F>
where
    T: Param,
    F: Fn(&DispatchContext) -> ResolveResult<T> + Send + Sync + 'static,
{
    FnResolver {
        f,
        _marker: PhantomData,
    }
}

impl<T, F> ArgumentResolver for FnResolver<T, F>
where
    T: Param,
    F: Fn(&DispatchContext) -> ResolveResult<T> + Send + Sync + 'static,
{
    fn supports(&self, param: &ParamDescriptor) -> bool {
        param.is::<T>()
    }

    fn resolve(&self, _param: &ParamDescriptor, ctx: &DispatchContext) -> ResolveResult<Argument> {
        (self.f)(ctx).map(Argument::new)
    }
}

// ============================================================================
// Built-in resolvers
// ============================================================================

fn builtin_resolvers() -> Vec<BoxedResolver> {
    vec![
        Arc::new(EventResolver),
        Arc::new(SessionResolver),
        Arc::new(RouteResolver),
    ]
}

/// Serves values read from the event itself.
#[derive(Debug, Clone, Copy, Default)]
pub struct EventResolver;

impl ArgumentResolver for EventResolver {
    fn supports(&self, param: &ParamDescriptor) -> bool {
        param.is::<Event>()
            || param.is::<Arc<Update>>()
            || param.is::<ConversationKey>()
            || param.is::<Text>()
            || param.is::<ChatId>()
            || param.is::<UserId>()
            || param.is::<BotHandle>()
    }

    fn resolve(&self, param: &ParamDescriptor, ctx: &DispatchContext) -> ResolveResult<Argument> {
        let event = ctx.event();
        let name = param.type_name();
        let unavailable = |reason| ResolveError::Unavailable {
            param: name,
            reason,
        };

        if param.is::<Event>() {
            Ok(Argument::new(event.clone()))
        } else if param.is::<Arc<Update>>() {
            Ok(Argument::new(Arc::clone(event.update())))
        } else if param.is::<ConversationKey>() {
            Ok(Argument::new(event.conversation()))
        } else if param.is::<Text>() {
            let text = event.text().ok_or_else(|| unavailable("event has no text"))?;
            Ok(Argument::new(Text(text.to_string())))
        } else if param.is::<ChatId>() {
            let id = event.chat_id().ok_or_else(|| unavailable("event has no chat"))?;
            Ok(Argument::new(ChatId(id)))
        } else if param.is::<UserId>() {
            let id = event.user_id().ok_or_else(|| unavailable("event has no user"))?;
            Ok(Argument::new(UserId(id)))
        } else if param.is::<BotHandle>() {
            Ok(Argument::new(BotHandle(Arc::from(event.bot()))))
        } else {
            Err(ResolveError::Unsupported { param: name })
        }
    }
}

/// Serves the session and per-session state.
#[derive(Debug, Clone, Copy, Default)]
pub struct SessionResolver;

impl ArgumentResolver for SessionResolver {
    fn supports(&self, param: &ParamDescriptor) -> bool {
        param.is::<Session>() || param.session_slot().is_some()
    }

    fn resolve(&self, param: &ParamDescriptor, ctx: &DispatchContext) -> ResolveResult<Argument> {
        if let Some(slot) = param.session_slot() {
            let value = ctx.session().compute_if_absent(slot.key, slot.init);
            return (slot.wrap)(value).ok_or_else(|| {
                ResolveError::failed(
                    param.type_name(),
                    format!("session key '{}' holds a value of another type", slot.key),
                )
            });
        }
        Ok(Argument::new(ctx.session().clone()))
    }
}

/// Serves routing results: captured variables and the matched pattern.
#[derive(Debug, Clone, Copy, Default)]
pub struct RouteResolver;

impl ArgumentResolver for RouteResolver {
    fn supports(&self, param: &ParamDescriptor) -> bool {
        param.is::<PathVars>() || param.is::<MatchedPattern>()
    }

    fn resolve(&self, param: &ParamDescriptor, ctx: &DispatchContext) -> ResolveResult<Argument> {
        if param.is::<PathVars>() {
            Ok(Argument::new(PathVars(ctx.variables().clone())))
        } else {
            Ok(Argument::new(MatchedPattern(ctx.matched_pattern().to_string())))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::param::SessionState;
    use crate::session::SessionStore;
    use std::sync::atomic::{AtomicU32, Ordering};
    use switchboard_core::{
        BotToken, CallbackQuery, Chat, EventClassifier, InlineQuery, Message, PathVariables, User,
    };

    #[derive(Debug, PartialEq)]
    struct Locale(String);

    impl Param for Locale {}

    #[derive(Debug, Default)]
    struct Hits(AtomicU32);

    fn context_for(update: Update, store: &SessionStore) -> DispatchContext {
        let event = EventClassifier::new().classify(BotToken::new("t"), Arc::new(update), "my_bot");
        let session = store.acquire(event.conversation()).unwrap();
        let mut vars = PathVariables::new();
        vars.insert("var".into(), "1".into());
        DispatchContext::new(event, session, Arc::from("h"), "test {var:[0-9]}".into(), vars)
    }

    fn callback_update() -> Update {
        let mut update = Update::new(1);
        update.callback_query = Some(CallbackQuery {
            id: "cb".into(),
            from: User::new(7, "u"),
            message: Some(Message::text(1, Chat::private(10), "menu")),
            data: Some("test 1".into()),
        });
        update
    }

    fn inline_update() -> Update {
        let mut update = Update::new(2);
        update.inline_query = Some(InlineQuery {
            id: "iq".into(),
            from: User::new(7, "u"),
            query: "cats".into(),
        });
        update
    }

    #[test]
    fn test_builtin_resolution() {
        let store = SessionStore::default();
        let ctx = context_for(callback_update(), &store);
        let chain = ArgumentResolverChain::default();

        let text = chain.resolve(&Text::descriptor(), &ctx).unwrap();
        assert_eq!(text.downcast::<Text>().unwrap(), Text("test 1".into()));

        let chat = chain.resolve(&ChatId::descriptor(), &ctx).unwrap();
        assert_eq!(chat.downcast::<ChatId>().unwrap(), ChatId(10));

        let vars = chain.resolve(&PathVars::descriptor(), &ctx).unwrap();
        assert_eq!(vars.downcast::<PathVars>().unwrap().get("var"), Some("1"));

        let pattern = chain.resolve(&MatchedPattern::descriptor(), &ctx).unwrap();
        assert_eq!(pattern.downcast::<MatchedPattern>().unwrap().0, "test {var:[0-9]}");

        let bot = chain.resolve(&BotHandle::descriptor(), &ctx).unwrap();
        assert_eq!(&*bot.downcast::<BotHandle>().unwrap(), "my_bot");
    }

    #[test]
    fn test_unavailable_required_and_optional() {
        let store = SessionStore::default();
        let ctx = context_for(inline_update(), &store);
        let chain = ArgumentResolverChain::default();

        let err = chain.resolve(&ChatId::descriptor(), &ctx).unwrap_err();
        assert!(matches!(err, ResolveError::Unavailable { .. }));

        let opt = chain.resolve(&<Option<ChatId>>::descriptor(), &ctx).unwrap();
        assert_eq!(opt.downcast::<Option<ChatId>>().unwrap(), None);

        let user = chain.resolve(&<Option<UserId>>::descriptor(), &ctx).unwrap();
        assert_eq!(user.downcast::<Option<UserId>>().unwrap(), Some(UserId(7)));
    }

    #[test]
    fn test_unsupported_type() {
        let store = SessionStore::default();
        let ctx = context_for(callback_update(), &store);
        let chain = ArgumentResolverChain::default();

        assert!(!chain.supports(&Locale::descriptor()));
        let err = chain.resolve(&Locale::descriptor(), &ctx).unwrap_err();
        assert!(matches!(err, ResolveError::Unsupported { .. }));

        let opt = chain.resolve(&<Option<Locale>>::descriptor(), &ctx).unwrap();
        assert_eq!(opt.downcast::<Option<Locale>>().unwrap(), None);
    }

    #[test]
    fn test_custom_resolver_precedes_builtins() {
        let store = SessionStore::default();
        let ctx = context_for(callback_update(), &store);
        let chain = ArgumentResolverChain::with_builtins(vec![
            Arc::new(resolver_fn(|_: &DispatchContext| Ok(Locale("en".into())))),
            Arc::new(resolver_fn(|_: &DispatchContext| Ok(Text("overridden".into())))),
        ]);

        let locale = chain.resolve(&Locale::descriptor(), &ctx).unwrap();
        assert_eq!(locale.downcast::<Locale>().unwrap(), Locale("en".into()));

        let text = chain.resolve(&Text::descriptor(), &ctx).unwrap();
        assert_eq!(text.downcast::<Text>().unwrap(), Text("overridden".into()));
    }

    #[test]
    fn test_session_state_is_shared_per_session() {
        let store = SessionStore::default();
        let chain = ArgumentResolverChain::default();
        let desc = <SessionState<Hits>>::descriptor();

        for _ in 0..3 {
            let ctx = context_for(callback_update(), &store);
            let hits = chain.resolve(&desc, &ctx).unwrap();
            let hits = hits.downcast::<SessionState<Hits>>().unwrap();
            hits.0.0.fetch_add(1, Ordering::SeqCst);
        }

        let ctx = context_for(callback_update(), &store);
        let hits = chain.resolve(&desc, &ctx).unwrap();
        let hits = hits.downcast::<SessionState<Hits>>().unwrap();
        assert_eq!(hits.0.0.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_resolve_all_stops_at_first_failure() {
        let store = SessionStore::default();
        let ctx = context_for(inline_update(), &store);
        let chain = ArgumentResolverChain::default();

        let params = [Text::descriptor(), ChatId::descriptor(), UserId::descriptor()];
        assert!(chain.resolve_all(&params, &ctx).is_err());

        let params = [Text::descriptor(), UserId::descriptor()];
        assert_eq!(chain.resolve_all(&params, &ctx).unwrap().len(), 2);
    }
}
