//! Per-dispatch context.
//!
//! A [`DispatchContext`] is created once a route has matched and lives for
//! the rest of that event's dispatch. Argument resolvers read from it and
//! return-value handlers use it to address replies.

use std::sync::Arc;

use switchboard_core::{ConversationKey, Event, PathVariables};

use crate::session::Session;

/// Everything known about one routed event.
#[derive(Debug)]
pub struct DispatchContext {
    event: Event,
    session: Session,
    handler_id: Arc<str>,
    matched_pattern: String,
    variables: PathVariables,
}

impl DispatchContext {
    pub fn new(
        event: Event,
        session: Session,
        handler_id: Arc<str>,
        matched_pattern: String,
        variables: PathVariables,
    ) -> Self {
        Self {
            event,
            session,
            handler_id,
            matched_pattern,
            variables,
        }
    }

    pub fn event(&self) -> &Event {
        &self.event
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn conversation(&self) -> ConversationKey {
        self.event.conversation()
    }

    /// Identifier of the routed handler.
    pub fn handler_id(&self) -> &str {
        &self.handler_id
    }

    pub(crate) fn handler_id_arc(&self) -> Arc<str> {
        Arc::clone(&self.handler_id)
    }

    pub fn matched_pattern(&self) -> &str {
        &self.matched_pattern
    }

    pub fn variables(&self) -> &PathVariables {
        &self.variables
    }

    /// A single captured variable.
    pub fn variable(&self, name: &str) -> Option<&str> {
        self.variables.get(name).map(String::as_str)
    }
}
