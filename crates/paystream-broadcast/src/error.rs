use thiserror::Error;

/// Errors surfaced by the broadcast hub.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum HubError {
    /// The input queue is full; the message was dropped.
    #[error("hub input queue saturated, message dropped")]
    QueueSaturated,

    /// The hub has been closed and no longer accepts subscriptions.
    #[error("hub closed")]
    Closed,
}

pub type Result<T> = std::result::Result<T, HubError>;
