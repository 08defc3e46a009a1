//! Routing rules.
//!
//! A [`Mapping`] is what a handler declares: a bot token, zero or more
//! patterns and the event kinds it accepts. Registration expands each mapping
//! into one [`Route`] per pattern.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use crate::foundation::event::{BotToken, EventKind};

use super::pattern::AntPattern;

// ============================================================================
// KindSet
// ============================================================================

/// The event kinds a mapping accepts, possibly the `ANY` wildcard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KindSet {
    kinds: BTreeSet<EventKind>,
    any: bool,
}

impl KindSet {
    /// A set accepting every kind.
    pub fn any() -> Self {
        Self {
            kinds: BTreeSet::new(),
            any: true,
        }
    }

    /// A set accepting exactly `kinds`.
    pub fn of(kinds: impl IntoIterator<Item = EventKind>) -> Self {
        Self {
            kinds: kinds.into_iter().collect(),
            any: false,
        }
    }

    /// Adds the `ANY` wildcard while keeping the declared kinds.
    pub fn with_any(mut self) -> Self {
        self.any = true;
        self
    }

    pub fn contains(&self, kind: EventKind) -> bool {
        self.any || self.kinds.contains(&kind)
    }

    pub fn is_any(&self) -> bool {
        self.any
    }

    /// True when neither a kind nor the wildcard is declared.
    pub fn is_empty(&self) -> bool {
        !self.any && self.kinds.is_empty()
    }

    /// Number of distinct declared kinds, not counting the wildcard.
    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = EventKind> + '_ {
        self.kinds.iter().copied()
    }

    /// Priority key: sets with the wildcard rank last, then fewer kinds first.
    pub(crate) fn rank(&self) -> (bool, usize) {
        (self.any, self.kinds.len())
    }
}

impl fmt::Display for KindSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&str> = self.kinds.iter().map(EventKind::as_str).collect();
        if self.any {
            names.push("any");
        }
        write!(f, "[{}]", names.join(", "))
    }
}

impl FromIterator<EventKind> for KindSet {
    fn from_iter<I: IntoIterator<Item = EventKind>>(iter: I) -> Self {
        Self::of(iter)
    }
}

// ============================================================================
// Mapping
// ============================================================================

/// Kinds a mapping accepts when it declares none.
pub const DEFAULT_KINDS: [EventKind; 2] = [EventKind::Message, EventKind::Command];

/// A routing declaration binding a bot token, patterns and event kinds.
///
/// ```rust,ignore
/// let mapping = Mapping::new("bot-token")
///     .pattern("test {var:[0-9]}")
///     .kind(EventKind::CallbackQuery);
/// ```
///
/// A mapping without patterns matches any text. A mapping that never names a
/// kind accepts [`EventKind::Message`].
#[derive(Debug, Clone)]
pub struct Mapping {
    token: BotToken,
    patterns: Vec<String>,
    kinds: Option<KindSet>,
}

impl Mapping {
    pub fn new(token: impl Into<BotToken>) -> Self {
        Self {
            token: token.into(),
            patterns: Vec::new(),
            kinds: None,
        }
    }

    /// Adds one pattern.
    pub fn pattern(mut self, pattern: impl Into<String>) -> Self {
        self.patterns.push(pattern.into());
        self
    }

    /// Adds several patterns.
    pub fn patterns<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.patterns.extend(patterns.into_iter().map(Into::into));
        self
    }

    /// Accepts one more event kind.
    pub fn kind(mut self, kind: EventKind) -> Self {
        let set = self.kinds.get_or_insert_with(|| KindSet::of([]));
        set.kinds.insert(kind);
        self
    }

    /// Replaces the accepted kinds. An empty set fails registration.
    pub fn kinds(mut self, kinds: impl IntoIterator<Item = EventKind>) -> Self {
        self.kinds = Some(KindSet::of(kinds));
        self
    }

    /// Accepts every event kind.
    pub fn any_kind(mut self) -> Self {
        let set = self.kinds.take().unwrap_or_else(|| KindSet::of([]));
        self.kinds = Some(set.with_any());
        self
    }

    pub fn token(&self) -> &BotToken {
        &self.token
    }

    pub fn declared_patterns(&self) -> &[String] {
        &self.patterns
    }

    /// The effective kind set.
    ///
    /// Without declared kinds a mapping accepts plain messages and commands,
    /// since the default classifier turns `/`-prefixed messages into commands.
    pub fn kind_set(&self) -> KindSet {
        self.kinds
            .clone()
            .unwrap_or_else(|| KindSet::of(DEFAULT_KINDS))
    }
}

// ============================================================================
// Route
// ============================================================================

/// One (pattern, handler) routing entry inside a token bucket.
#[derive(Clone)]
pub struct Route<H> {
    pub(crate) pattern: AntPattern,
    pub(crate) kinds: KindSet,
    /// How many patterns the owning mapping declared.
    pub(crate) pattern_count: usize,
    pub(crate) handler_id: Arc<str>,
    pub(crate) handler: H,
}

impl<H> Route<H> {
    pub fn pattern(&self) -> &AntPattern {
        &self.pattern
    }

    pub fn kinds(&self) -> &KindSet {
        &self.kinds
    }

    pub fn pattern_count(&self) -> usize {
        self.pattern_count
    }

    pub fn handler_id(&self) -> &str {
        &self.handler_id
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }
}

impl<H> fmt::Debug for Route<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("pattern", &self.pattern.as_str())
            .field("kinds", &self.kinds.to_string())
            .field("pattern_count", &self.pattern_count)
            .field("handler", &self.handler_id)
            .finish()
    }
}
