//! Session-scoped logging.
//!
//! A [`Logger`] tags every event with the id of the session that emitted
//! it. Debug events are only emitted when the session was created with
//! `debug` enabled; warnings and errors are always emitted.

use std::fmt;

use uuid::Uuid;

#[derive(Debug, Clone, Copy)]
pub struct Logger {
    session: Uuid,
    debug: bool,
}

impl Logger {
    pub fn new(session: Uuid, debug: bool) -> Self {
        Self { session, debug }
    }

    pub fn debug(&self, message: fmt::Arguments<'_>) {
        if self.debug {
            tracing::debug!(session = %self.session, "{message}");
        }
    }

    pub fn warn(&self, message: fmt::Arguments<'_>) {
        tracing::warn!(session = %self.session, "{message}");
    }

    pub fn error(&self, message: fmt::Arguments<'_>) {
        tracing::error!(session = %self.session, "{message}");
    }
}
