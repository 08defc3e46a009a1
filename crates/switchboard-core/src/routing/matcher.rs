//! Route matching and priority ordering.
//!
//! [`PatternMatcher`] is the pure strategy the registry delegates to: it
//! compiles patterns, tests routes against events, extracts captures and
//! sorts a token bucket into lookup order.

use crate::error::PatternResult;
use crate::foundation::event::Event;

use super::mapping::Route;
use super::pattern::{AntPattern, DEFAULT_SEPARATOR, PathVariables};

/// Ant-style matcher configured with a segment separator.
#[derive(Debug, Clone)]
pub struct PatternMatcher {
    separator: String,
}

impl Default for PatternMatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl PatternMatcher {
    /// Creates a matcher using the `/` separator.
    pub fn new() -> Self {
        Self::with_separator(DEFAULT_SEPARATOR)
    }

    pub fn with_separator(separator: impl Into<String>) -> Self {
        Self {
            separator: separator.into(),
        }
    }

    pub fn separator(&self) -> &str {
        &self.separator
    }

    /// Compiles a declared pattern; an absent one becomes the match-all `**`.
    pub fn compile(&self, pattern: Option<&str>) -> PatternResult<AntPattern> {
        match pattern {
            Some(p) => AntPattern::with_separator(p, &self.separator),
            None => Ok(AntPattern::match_all(&self.separator)),
        }
    }

    /// Tests `route` against `event`.
    ///
    /// The route's kind set must accept the event kind; then its pattern must
    /// accept the event text, with absent text treated as empty.
    pub fn is_matched<H>(&self, event: &Event, route: &Route<H>) -> bool {
        route.kinds.contains(event.kind()) && route.pattern.matches(event.text().unwrap_or(""))
    }

    /// Extracts the captures of `route`'s pattern from `text`.
    ///
    /// Only meaningful after a positive [`is_matched`](Self::is_matched);
    /// yields an empty map otherwise.
    pub fn extract_pattern_variables<H>(&self, text: Option<&str>, route: &Route<H>) -> PathVariables {
        if !route.pattern.has_variables() {
            return PathVariables::new();
        }
        route
            .pattern
            .extract_variables(text.unwrap_or(""))
            .unwrap_or_default()
    }

    /// Sorts routes most specific first.
    ///
    /// Keys, in order: pattern specificity, number of patterns declared by
    /// the owning mapping (fewer first), kind set (wildcard last, then fewer
    /// kinds first). The sort is stable, so registration order breaks ties.
    pub fn registration_order<H>(&self, routes: &mut [Route<H>]) {
        routes.sort_by(|a, b| {
            a.pattern
                .compare_specificity(&b.pattern)
                .then(a.pattern_count.cmp(&b.pattern_count))
                .then(a.kinds.rank().cmp(&b.kinds.rank()))
        });
    }
}
