//! Ant-style pattern matching.
//!
//! Patterns are split into segments on a separator (`/` by default):
//!
//! - `?` matches one character
//! - `*` matches zero or more characters within one segment
//! - `**` as a whole segment matches zero or more segments
//! - `{name}` captures a run of characters within one segment as `name`
//! - `{name:regex}` captures text matching `regex` as `name`
//!
//! ```rust,ignore
//! let pattern = AntPattern::new("test {var:[0-9]}")?;
//! assert!(pattern.matches("test 1"));
//! assert_eq!(pattern.extract_variables("test 1").unwrap()["var"], "1");
//! ```
//!
//! Patterns are compiled once; matching never allocates regexes.

use std::cmp::{Ordering, Reverse};
use std::collections::HashMap;
use std::fmt;

use regex::Regex;

use crate::error::{PatternError, PatternResult};

/// Separator used when none is configured.
pub const DEFAULT_SEPARATOR: &str = "/";

/// The pattern that matches every text, including the empty one.
pub const MATCH_ALL: &str = "**";

/// Captured path variables, keyed by variable name.
pub type PathVariables = HashMap<String, String>;

// ============================================================================
// Segments
// ============================================================================

#[derive(Debug, Clone)]
enum Segment {
    /// `**`: any number of segments.
    AnySegments,
    /// No wildcard characters; compared verbatim.
    Literal(String),
    /// Wildcards and/or captures, compiled to an anchored regex.
    Glob(GlobSegment),
}

#[derive(Debug, Clone)]
struct GlobSegment {
    source: String,
    regex: Regex,
    /// Variable names in capture order; group `v{i}` holds `variables[i]`.
    variables: Vec<String>,
}

impl Segment {
    fn compile(source: &str) -> PatternResult<Self> {
        if source == MATCH_ALL {
            return Ok(Segment::AnySegments);
        }
        if !source.contains(['*', '?', '{']) {
            return Ok(Segment::Literal(source.to_string()));
        }

        let mut expr = String::from("^(?s:");
        let mut variables = Vec::new();
        let mut literal = String::new();
        let mut chars = source.char_indices().peekable();

        while let Some((start, c)) = chars.next() {
            match c {
                '?' | '*' | '{' => {
                    expr.push_str(&regex::escape(&literal));
                    literal.clear();
                }
                _ => {
                    literal.push(c);
                    continue;
                }
            }

            match c {
                '?' => expr.push('.'),
                '*' => expr.push_str(".*"),
                _ => {
                    let end = closing_brace(source, start)
                        .ok_or_else(|| PatternError::UnbalancedBraces(source.to_string()))?;
                    let body = &source[start + 1..end];
                    let (name, capture) = match body.split_once(':') {
                        Some((name, capture)) => (name, capture),
                        None => (body, ".*"),
                    };
                    if name.is_empty() {
                        return Err(PatternError::EmptyVariable(source.to_string()));
                    }
                    expr.push_str(&format!("(?P<v{}>{capture})", variables.len()));
                    variables.push(name.to_string());

                    while chars.peek().is_some_and(|(i, _)| *i <= end) {
                        chars.next();
                    }
                }
            }
        }
        expr.push_str(&regex::escape(&literal));
        expr.push_str(")$");

        let regex = Regex::new(&expr).map_err(|e| PatternError::InvalidRegex {
            segment: source.to_string(),
            reason: e.to_string(),
        })?;

        Ok(Segment::Glob(GlobSegment {
            source: source.to_string(),
            regex,
            variables,
        }))
    }

    fn is_any_segments(&self) -> bool {
        matches!(self, Segment::AnySegments)
    }

    /// Matches one path segment, recording captures into `vars` when given.
    fn matches(&self, text: &str, vars: Option<&mut PathVariables>) -> bool {
        match self {
            Segment::AnySegments => true,
            Segment::Literal(literal) => literal == text,
            Segment::Glob(glob) => {
                let Some(caps) = glob.regex.captures(text) else {
                    return false;
                };
                if let Some(vars) = vars {
                    for (i, name) in glob.variables.iter().enumerate() {
                        if let Some(m) = caps.name(&format!("v{i}")) {
                            vars.insert(name.clone(), m.as_str().to_string());
                        }
                    }
                }
                true
            }
        }
    }
}

/// Finds the `}` closing the `{` at `open`, honoring nesting and `\` escapes.
fn closing_brace(source: &str, open: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut escaped = false;
    for (i, c) in source[open..].char_indices() {
        match c {
            _ if escaped => escaped = false,
            '\\' => escaped = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(open + i);
                }
            }
            _ => {}
        }
    }
    None
}

// ============================================================================
// Specificity
// ============================================================================

/// Sort key ranking patterns from most to least specific.
///
/// Compared field by field, smaller first:
///
/// 1. the match-all pattern ranks last
/// 2. prefix patterns (`foo/**`) rank after all others, longer prefixes first
/// 3. fewer wildcards (captures count 1, `*` 1, `**` 2) rank first
/// 4. longer patterns (each capture counting as one character) rank first
/// 5. fewer `*` rank first
/// 6. fewer captures rank first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Specificity {
    least_specific: bool,
    prefix: bool,
    prefix_length: Reverse<usize>,
    total_wildcards: usize,
    length: Reverse<usize>,
    single_wildcards: usize,
    variables: usize,
}

impl Specificity {
    fn of(source: &str, separator: &str) -> Self {
        let mut single_wildcards = 0;
        let mut double_wildcards = 0;
        let mut variables = 0;
        let mut length = 0;

        let mut chars = source.char_indices().peekable();
        while let Some((i, c)) = chars.next() {
            length += 1;
            match c {
                '{' => {
                    variables += 1;
                    if let Some(end) = closing_brace(source, i) {
                        while chars.peek().is_some_and(|(j, _)| *j <= end) {
                            chars.next();
                        }
                    }
                }
                '*' if chars.peek().is_some_and(|(_, n)| *n == '*') => {
                    chars.next();
                    double_wildcards += 1;
                }
                '*' => single_wildcards += 1,
                _ => {}
            }
        }

        let least_specific = source == MATCH_ALL || source == format!("{separator}{MATCH_ALL}");
        let prefix = !least_specific && source.ends_with(&format!("{separator}{MATCH_ALL}"));

        Self {
            least_specific,
            prefix,
            prefix_length: Reverse(if prefix { length } else { 0 }),
            total_wildcards: variables + single_wildcards + 2 * double_wildcards,
            length: Reverse(length),
            single_wildcards,
            variables,
        }
    }
}

// ============================================================================
// AntPattern
// ============================================================================

/// A compiled Ant-style pattern.
#[derive(Clone)]
pub struct AntPattern {
    source: String,
    separator: String,
    segments: Vec<Segment>,
    specificity: Specificity,
}

impl AntPattern {
    /// Compiles `pattern` with the default `/` separator.
    pub fn new(pattern: &str) -> PatternResult<Self> {
        Self::with_separator(pattern, DEFAULT_SEPARATOR)
    }

    /// Compiles `pattern`, splitting segments on `separator`.
    pub fn with_separator(pattern: &str, separator: &str) -> PatternResult<Self> {
        let segments = tokenize(pattern, separator)
            .map(Segment::compile)
            .collect::<PatternResult<Vec<_>>>()?;

        Ok(Self {
            source: pattern.to_string(),
            separator: separator.to_string(),
            segments,
            specificity: Specificity::of(pattern, separator),
        })
    }

    /// The pattern that accepts any text.
    pub fn match_all(separator: &str) -> Self {
        Self {
            source: MATCH_ALL.to_string(),
            separator: separator.to_string(),
            segments: vec![Segment::AnySegments],
            specificity: Specificity::of(MATCH_ALL, separator),
        }
    }

    /// The pattern as written.
    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn separator(&self) -> &str {
        &self.separator
    }

    pub fn specificity(&self) -> Specificity {
        self.specificity
    }

    /// Orders `self` against `other`, most specific first.
    pub fn compare_specificity(&self, other: &AntPattern) -> Ordering {
        self.specificity.cmp(&other.specificity)
    }

    /// Whether the pattern declares any `{name}` captures.
    pub fn has_variables(&self) -> bool {
        self.specificity.variables > 0
    }

    /// Tests whether `text` matches this pattern.
    pub fn matches(&self, text: &str) -> bool {
        self.do_match(text, None)
    }

    /// Matches `text` and returns its captured variables.
    ///
    /// Returns `None` when `text` does not match; an empty map when it
    /// matches a pattern without captures.
    pub fn extract_variables(&self, text: &str) -> Option<PathVariables> {
        let mut vars = PathVariables::new();
        self.do_match(text, Some(&mut vars)).then_some(vars)
    }

    fn do_match(&self, text: &str, mut vars: Option<&mut PathVariables>) -> bool {
        let sep = self.separator.as_str();
        // A leading `**` also absorbs a leading separator.
        let leading_any = self.segments.first().is_some_and(Segment::is_any_segments);
        if !leading_any && text.starts_with(sep) != self.source.starts_with(sep) {
            return false;
        }

        let patt = &self.segments;
        let path: Vec<&str> = tokenize(text, sep).collect();

        // Signed cursors: `end` drops below `start` once a side is exhausted.
        let mut patt_start: isize = 0;
        let mut patt_end: isize = patt.len() as isize - 1;
        let mut path_start: isize = 0;
        let mut path_end: isize = path.len() as isize - 1;

        // Everything up to the first `**`.
        while patt_start <= patt_end && path_start <= path_end {
            let segment = &patt[patt_start as usize];
            if segment.is_any_segments() {
                break;
            }
            if !segment.matches(path[path_start as usize], vars.as_deref_mut()) {
                return false;
            }
            patt_start += 1;
            path_start += 1;
        }

        if path_start > path_end {
            if patt_start > patt_end {
                return self.source.ends_with(sep) == text.ends_with(sep);
            }
            if patt_start == patt_end
                && matches!(&patt[patt_start as usize], Segment::Glob(g) if g.source == "*")
                && text.ends_with(sep)
            {
                return true;
            }
            return self.only_any_segments(patt_start, patt_end);
        } else if patt_start > patt_end {
            return false;
        }

        // Everything after the last `**`.
        while patt_start <= patt_end && path_start <= path_end {
            let segment = &patt[patt_end as usize];
            if segment.is_any_segments() {
                break;
            }
            if !segment.matches(path[path_end as usize], vars.as_deref_mut()) {
                return false;
            }
            patt_end -= 1;
            path_end -= 1;
        }
        if path_start > path_end {
            return self.only_any_segments(patt_start, patt_end);
        }

        // Fixed runs between inner `**` pairs, matched left-most first.
        while patt_start != patt_end && path_start <= path_end {
            let next_any = ((patt_start + 1)..=patt_end)
                .find(|&i| patt[i as usize].is_any_segments())
                .unwrap_or(patt_end);
            if next_any == patt_start + 1 {
                patt_start += 1;
                continue;
            }

            let run_len = next_any - patt_start - 1;
            let path_len = path_end - path_start + 1;
            let mut found = None;

            'offsets: for offset in 0..=(path_len - run_len) {
                for j in 0..run_len {
                    let segment = &patt[(patt_start + j + 1) as usize];
                    let part = path[(path_start + offset + j) as usize];
                    if !segment.matches(part, vars.as_deref_mut()) {
                        continue 'offsets;
                    }
                }
                found = Some(path_start + offset);
                break;
            }

            let Some(found) = found else {
                return false;
            };
            patt_start = next_any;
            path_start = found + run_len;
        }

        self.only_any_segments(patt_start, patt_end)
    }

    fn only_any_segments(&self, from: isize, to: isize) -> bool {
        (from..=to).all(|i| self.segments[i as usize].is_any_segments())
    }
}

/// Splits on `separator`, dropping empty tokens.
fn tokenize<'a>(text: &'a str, separator: &'a str) -> impl Iterator<Item = &'a str> + 'a {
    text.split(separator).filter(|s| !s.is_empty())
}

impl fmt::Debug for AntPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AntPattern")
            .field("source", &self.source)
            .field("separator", &self.separator)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for AntPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

impl PartialEq for AntPattern {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source && self.separator == other.separator
    }
}

impl Eq for AntPattern {}
