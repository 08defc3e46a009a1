//! The mapping registry.
//!
//! Registration and lookup are split across two types:
//!
//! - [`RegistryBuilder`] accumulates `(handler, mapping)` pairs at startup.
//! - [`MappingRegistry`] is produced by [`RegistryBuilder::seal`]; it is
//!   immutable and answers lookups without locking.
//!
//! Registering after sealing or looking up before it cannot be expressed.
//!
//! ```rust,ignore
//! let mut builder = RegistryBuilder::new();
//! builder.register("echo", handler, [Mapping::new("token").pattern("/echo *")])?;
//! let registry = builder.seal();
//!
//! let found = registry.lookup(&event);
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::{debug, info, trace};

use crate::error::{RegistryError, RegistryResult};
use crate::foundation::event::{BotToken, Event};

use super::mapping::{Mapping, Route};
use super::matcher::PatternMatcher;
use super::pattern::PathVariables;

// ============================================================================
// LookupResult
// ============================================================================

/// The outcome of one lookup.
///
/// Empty (no handler) when the token is unknown or nothing matched.
#[derive(Clone)]
pub struct LookupResult<H> {
    pub handler: Option<H>,
    pub handler_id: Option<Arc<str>>,
    pub matched_pattern: Option<String>,
    pub variables: PathVariables,
}

impl<H> LookupResult<H> {
    pub fn empty() -> Self {
        Self {
            handler: None,
            handler_id: None,
            matched_pattern: None,
            variables: PathVariables::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.handler.is_none()
    }
}

impl<H> fmt::Debug for LookupResult<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LookupResult")
            .field("handler_id", &self.handler_id)
            .field("matched_pattern", &self.matched_pattern)
            .field("variables", &self.variables)
            .finish()
    }
}

// ============================================================================
// RegistryBuilder
// ============================================================================

/// Collects routes before the registry is sealed.
pub struct RegistryBuilder<H> {
    matcher: PatternMatcher,
    buckets: HashMap<BotToken, Vec<Route<H>>>,
}

impl<H> Default for RegistryBuilder<H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H> RegistryBuilder<H> {
    /// Creates a builder using the default `/`-separated matcher.
    pub fn new() -> Self {
        Self::with_matcher(PatternMatcher::new())
    }

    pub fn with_matcher(matcher: PatternMatcher) -> Self {
        Self {
            matcher,
            buckets: HashMap::new(),
        }
    }

    /// Returns the number of routes registered so far.
    pub fn route_count(&self) -> usize {
        self.buckets.values().map(Vec::len).sum()
    }

    /// Registers `handler` under every mapping in `mappings`.
    ///
    /// Appends one route per declared pattern (one match-all route for a
    /// mapping without patterns) to the mapping's token bucket. Either every
    /// mapping is registered or, on error, none is. An empty `mappings` is a
    /// no-op.
    pub fn register<I>(&mut self, handler_id: &str, handler: H, mappings: I) -> RegistryResult<()>
    where
        H: Clone,
        I: IntoIterator<Item = Mapping>,
    {
        let handler_id: Arc<str> = Arc::from(handler_id);
        let mut staged: Vec<(BotToken, Route<H>)> = Vec::new();

        for mapping in mappings {
            if mapping.token().as_str().is_empty() {
                return Err(RegistryError::EmptyToken {
                    handler: handler_id.to_string(),
                });
            }

            let kinds = mapping.kind_set();
            if kinds.is_empty() {
                return Err(RegistryError::EmptyKindSet {
                    handler: handler_id.to_string(),
                });
            }

            let declared: Vec<Option<&str>> = if mapping.declared_patterns().is_empty() {
                vec![None]
            } else {
                mapping.declared_patterns().iter().map(|p| Some(p.as_str())).collect()
            };
            let pattern_count = declared.len();

            for source in declared {
                let pattern = self.matcher.compile(source).map_err(|source_err| {
                    RegistryError::InvalidPattern {
                        handler: handler_id.to_string(),
                        pattern: source.unwrap_or_default().to_string(),
                        source: source_err,
                    }
                })?;

                staged.push((
                    mapping.token().clone(),
                    Route {
                        pattern,
                        kinds: kinds.clone(),
                        pattern_count,
                        handler_id: Arc::clone(&handler_id),
                        handler: handler.clone(),
                    },
                ));
            }
        }

        for (token, route) in staged {
            debug!(
                token = %token,
                handler = %route.handler_id,
                pattern = %route.pattern,
                kinds = %route.kinds,
                "Registered route"
            );
            self.buckets.entry(token).or_default().push(route);
        }

        Ok(())
    }

    /// Orders every token bucket and freezes the registry.
    pub fn seal(mut self) -> MappingRegistry<H> {
        for routes in self.buckets.values_mut() {
            self.matcher.registration_order(routes);
        }

        info!(
            tokens = self.buckets.len(),
            routes = self.route_count(),
            "Mapping registry sealed"
        );

        MappingRegistry {
            matcher: self.matcher,
            buckets: self.buckets,
        }
    }
}

impl<H> fmt::Debug for RegistryBuilder<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryBuilder")
            .field("tokens", &self.buckets.len())
            .field("routes", &self.route_count())
            .finish()
    }
}

// ============================================================================
// MappingRegistry
// ============================================================================

/// The sealed, immutable route index.
pub struct MappingRegistry<H> {
    matcher: PatternMatcher,
    buckets: HashMap<BotToken, Vec<Route<H>>>,
}

impl<H: Clone> MappingRegistry<H> {
    /// Finds the handler for `event`.
    ///
    /// Scans the event's token bucket in sealed order and returns the first
    /// route whose kinds and pattern accept the event, with its captures.
    pub fn lookup(&self, event: &Event) -> LookupResult<H> {
        let Some(routes) = self.buckets.get(event.token()) else {
            trace!(token = %event.token(), "No routes registered for token");
            return LookupResult::empty();
        };

        let Some(route) = routes.iter().find(|r| self.matcher.is_matched(event, r)) else {
            return LookupResult::empty();
        };

        LookupResult {
            handler: Some(route.handler.clone()),
            handler_id: Some(Arc::clone(&route.handler_id)),
            matched_pattern: Some(route.pattern.as_str().to_string()),
            variables: self.matcher.extract_pattern_variables(event.text(), route),
        }
    }
}

impl<H> MappingRegistry<H> {
    /// The routes of `token` in lookup order.
    pub fn routes(&self, token: &BotToken) -> &[Route<H>] {
        self.buckets.get(token).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn tokens(&self) -> impl Iterator<Item = &BotToken> {
        self.buckets.keys()
    }

    pub fn route_count(&self) -> usize {
        self.buckets.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    pub fn matcher(&self) -> &PatternMatcher {
        &self.matcher
    }
}

impl<H> fmt::Debug for MappingRegistry<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MappingRegistry")
            .field("tokens", &self.buckets.len())
            .field("routes", &self.route_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::classifier::EventClassifier;
    use crate::foundation::event::EventKind;
    use crate::foundation::update::{CallbackQuery, Chat, Message, Update, User};

    fn message_event(token: &str, text: &str) -> Event {
        let mut update = Update::new(1);
        update.message = Some(Message::text(1, Chat::private(10), text));
        EventClassifier::new()
            .command_prefix(None)
            .classify(BotToken::new(token), Arc::new(update), "bot")
    }

    /// Classified with the default `/` command prefix.
    fn command_event(token: &str, text: &str) -> Event {
        let mut update = Update::new(3);
        update.message = Some(Message::text(1, Chat::private(10), text));
        EventClassifier::new().classify(BotToken::new(token), Arc::new(update), "bot")
    }

    fn callback_event(token: &str, data: &str) -> Event {
        let mut update = Update::new(2);
        update.callback_query = Some(CallbackQuery {
            id: "cb".into(),
            from: User::new(7, "u"),
            message: Some(Message::text(1, Chat::private(10), "menu")),
            data: Some(data.into()),
        });
        EventClassifier::new().classify(BotToken::new(token), Arc::new(update), "bot")
    }

    fn pattern_order<H>(registry: &MappingRegistry<H>, token: &str) -> Vec<String> {
        registry
            .routes(&BotToken::new(token))
            .iter()
            .map(|r| r.pattern().as_str().to_string())
            .collect()
    }

    #[test]
    fn test_priority_determinism() {
        let mut builder = RegistryBuilder::new();
        builder
            .register("h2", "2", [Mapping::new("t").pattern("2").kind(EventKind::Message)])
            .unwrap();
        builder
            .register("h4", "4", [Mapping::new("t").pattern("4").kind(EventKind::Message)])
            .unwrap();
        builder
            .register(
                "h5",
                "5",
                [Mapping::new("t")
                    .pattern("5")
                    .kinds([EventKind::Message, EventKind::EditedMessage])],
            )
            .unwrap();
        builder
            .register("h3", "3", [Mapping::new("t").pattern("3").any_kind()])
            .unwrap();
        builder
            .register("hv", "{var}", [Mapping::new("t").pattern("{var}").kind(EventKind::Message)])
            .unwrap();

        let registry = builder.seal();
        assert_eq!(pattern_order(&registry, "t"), ["2", "4", "5", "3", "{var}"]);

        assert_eq!(registry.lookup(&message_event("t", "3")).handler, Some("3"));
        assert_eq!(registry.lookup(&message_event("t", "7")).handler, Some("{var}"));
    }

    #[test]
    fn test_default_kinds_route_slash_commands() {
        let mut builder = RegistryBuilder::new();
        builder
            .register("start", "start", [Mapping::new("t").pattern("/start")])
            .unwrap();
        builder
            .register("plain", "plain", [Mapping::new("t").pattern("hello")])
            .unwrap();
        let registry = builder.seal();

        let command = command_event("t", "/start");
        assert_eq!(command.kind(), EventKind::Command);
        assert_eq!(registry.lookup(&command).handler, Some("start"));
        assert_eq!(registry.lookup(&command_event("t", "hello")).handler, Some("plain"));
        assert_eq!(registry.lookup(&callback_event("t", "/start")).handler, None);
    }

    #[test]
    fn test_fewer_declared_patterns_rank_higher() {
        let mut builder = RegistryBuilder::new();
        builder
            .register("multi", "multi", [Mapping::new("t").patterns(["a", "b"])])
            .unwrap();
        builder
            .register("single", "single", [Mapping::new("t").pattern("a")])
            .unwrap();

        let registry = builder.seal();
        assert_eq!(registry.lookup(&message_event("t", "a")).handler, Some("single"));
        assert_eq!(registry.lookup(&message_event("t", "b")).handler, Some("multi"));
    }

    #[test]
    fn test_null_pattern_matches_anything() {
        let mut builder = RegistryBuilder::new();
        builder
            .register("fallback", "fallback", [Mapping::new("t").any_kind()])
            .unwrap();
        builder
            .register("exact", "exact", [Mapping::new("t").pattern("hello")])
            .unwrap();
        let registry = builder.seal();

        assert_eq!(pattern_order(&registry, "t"), ["hello", "**"]);
        assert_eq!(registry.lookup(&message_event("t", "hello")).handler, Some("exact"));

        let found = registry.lookup(&message_event("t", "anything/else"));
        assert_eq!(found.handler, Some("fallback"));
        assert_eq!(found.matched_pattern.as_deref(), Some("**"));
        assert!(found.variables.is_empty());

        for text in ["/start", "/a/b", "/"] {
            assert_eq!(registry.lookup(&message_event("t", text)).handler, Some("fallback"), "{text}");
        }
        let command = command_event("t", "/start");
        assert_eq!(command.kind(), EventKind::Command);
        assert_eq!(registry.lookup(&command).handler, Some("fallback"));
    }

    #[test]
    fn test_token_isolation() {
        let mut builder = RegistryBuilder::new();
        builder
            .register("a", "a", [Mapping::new("A").pattern("hi")])
            .unwrap();
        let registry = builder.seal();

        assert!(registry.lookup(&message_event("A", "hi")).handler.is_some());
        assert!(registry.lookup(&message_event("B", "hi")).is_empty());
    }

    #[test]
    fn test_kind_mismatch_is_a_miss() {
        let mut builder = RegistryBuilder::new();
        builder
            .register("cb", "cb", [Mapping::new("t").pattern("x").kind(EventKind::CallbackQuery)])
            .unwrap();
        let registry = builder.seal();

        assert!(registry.lookup(&message_event("t", "x")).is_empty());
        assert!(!registry.lookup(&callback_event("t", "x")).is_empty());
    }

    #[test]
    fn test_lookup_extracts_variables() {
        let mut builder = RegistryBuilder::new();
        builder
            .register(
                "H",
                "H",
                [Mapping::new("t")
                    .pattern("test {var:[0-9]}")
                    .kind(EventKind::CallbackQuery)],
            )
            .unwrap();
        let registry = builder.seal();

        let found = registry.lookup(&callback_event("t", "test 1"));
        assert_eq!(found.handler, Some("H"));
        assert_eq!(found.handler_id.as_deref(), Some("H"));
        assert_eq!(found.matched_pattern.as_deref(), Some("test {var:[0-9]}"));
        assert_eq!(found.variables.get("var").map(String::as_str), Some("1"));
    }

    #[test]
    fn test_register_rejects_invalid_mappings_atomically() {
        let mut builder: RegistryBuilder<&str> = RegistryBuilder::new();

        let err = builder
            .register(
                "bad",
                "bad",
                [
                    Mapping::new("t").pattern("fine"),
                    Mapping::new("t").pattern("{broken"),
                ],
            )
            .unwrap_err();
        assert!(matches!(err, RegistryError::InvalidPattern { .. }));
        assert_eq!(builder.route_count(), 0);

        let err = builder
            .register("empty", "empty", [Mapping::new("t").kinds([])])
            .unwrap_err();
        assert!(matches!(err, RegistryError::EmptyKindSet { .. }));

        let err = builder
            .register("no-token", "no-token", [Mapping::new("")])
            .unwrap_err();
        assert!(matches!(err, RegistryError::EmptyToken { .. }));
    }

    #[test]
    fn test_register_empty_mapping_list_is_noop() {
        let mut builder: RegistryBuilder<&str> = RegistryBuilder::new();
        builder.register("h", "h", Vec::new()).unwrap();
        assert_eq!(builder.route_count(), 0);
        assert!(builder.seal().is_empty());
    }

    #[test]
    fn test_one_route_per_pattern() {
        let mut builder = RegistryBuilder::new();
        builder
            .register(
                "h",
                "h",
                [
                    Mapping::new("t").patterns(["a", "b", "c"]),
                    Mapping::new("u").pattern("d"),
                ],
            )
            .unwrap();
        let registry = builder.seal();
        assert_eq!(registry.route_count(), 4);
        assert_eq!(registry.routes(&BotToken::new("t")).len(), 3);
        assert!(registry.routes(&BotToken::new("x")).is_empty());
    }
}
