//! Error type returned by event handlers.
//!
//! A failing handler never affects the publisher or sibling handlers; the
//! bus logs the error and moves on.

/// Result type returned by every event handler.
pub type HandlerResult = Result<(), HandlerError>;

/// Errors an event handler can report back to the bus.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HandlerError {
    /// The handler could not process the event.
    #[error("handler failed: {0}")]
    Failed(String),

    /// The handler was invoked with an event of another type.
    #[error("handler for {expected} received an event of a different type")]
    TypeMismatch {
        /// Name of the event type the handler was registered for.
        expected: &'static str,
    },
}

impl HandlerError {
    /// Build a [`HandlerError::Failed`] from any message.
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}
