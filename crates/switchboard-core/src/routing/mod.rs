//! Routing layer - pattern matching and the mapping registry.
//!
//! - Ant-style patterns with `{name:regex}` captures
//! - Mapping declarations and routes
//! - The registry builder and the sealed registry

pub mod mapping;
pub mod matcher;
pub mod pattern;
pub mod registry;

pub use mapping::{KindSet, Mapping, Route};
pub use matcher::PatternMatcher;
pub use pattern::{AntPattern, DEFAULT_SEPARATOR, MATCH_ALL, PathVariables, Specificity};
pub use registry::{LookupResult, MappingRegistry, RegistryBuilder};
