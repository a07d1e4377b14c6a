/// Errors that can occur in the transport layer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The connection was closed.
    #[error("connection closed: {0}")]
    ConnectionClosed(String),

    /// Sending data failed.
    #[error("send failed: {0}")]
    SendFailed(#[source] std::io::Error),

    /// Receiving data failed.
    #[error("receive failed: {0}")]
    ReceiveFailed(#[source] std::io::Error),

    /// Binding or accepting connections failed.
    #[error("accept failed: {0}")]
    AcceptFailed(#[source] std::io::Error),

    /// The peer sent a message larger than the configured limit.
    #[error("message of {size} bytes exceeds limit of {limit} bytes")]
    MessageTooLarge { size: usize, limit: usize },

    /// An operation did not finish within its deadline.
    #[error("{0} timed out")]
    Timeout(&'static str),
}

impl TransportError {
    /// Returns `true` for errors caused by the peer violating the
    /// framing rules rather than by the network.
    pub fn is_protocol_violation(&self) -> bool {
        matches!(self, Self::MessageTooLarge { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_too_large_display() {
        let err = TransportError::MessageTooLarge {
            size: 600,
            limit: 512,
        };
        assert_eq!(
            err.to_string(),
            "message of 600 bytes exceeds limit of 512 bytes"
        );
        assert!(err.is_protocol_violation());
    }

    #[test]
    fn test_timeout_is_not_protocol_violation() {
        let err = TransportError::Timeout("idle read");
        assert_eq!(err.to_string(), "idle read timed out");
        assert!(!err.is_protocol_violation());
    }
}
