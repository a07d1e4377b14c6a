//! Error types for the hub layer.

/// Errors returned by [`HubHandle`](crate::HubHandle) operations.
///
/// The hub itself never fails a command; the only error a caller can see
/// is that the hub task is gone.
#[derive(Debug, thiserror::Error)]
pub enum HubError {
    /// The hub task has stopped and no longer accepts commands.
    #[error("hub is unavailable")]
    Unavailable,
}
