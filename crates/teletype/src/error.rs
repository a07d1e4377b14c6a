//! Unified error type for the Teletype server.

use teletype_hub::HubError;
use teletype_protocol::ProtocolError;
use teletype_transport::TransportError;

use crate::config::ConfigError;

/// Top-level error that wraps all crate-specific errors.
///
/// The `#[from]` attributes let `?` convert sub-crate errors
/// automatically.
#[derive(Debug, thiserror::Error)]
pub enum TeletypeError {
    /// A transport-level error (accept, send, recv, oversize frame).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A malformed or undecodable frame.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The hub task is gone.
    #[error(transparent)]
    Hub(#[from] HubError),

    /// Invalid server configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A send, ping or close missed the write deadline.
    #[error("{0} did not complete before the write deadline")]
    WriteTimeout(&'static str),

    /// The writer task panicked or was aborted.
    #[error("writer task failed: {0}")]
    WriterFailed(#[from] tokio::task::JoinError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_transport_error() {
        let err = TransportError::ConnectionClosed("gone".into());
        let teletype_err: TeletypeError = err.into();
        assert!(matches!(teletype_err, TeletypeError::Transport(_)));
        assert!(teletype_err.to_string().contains("gone"));
    }

    #[test]
    fn test_from_protocol_error() {
        let err = serde_json::from_str::<u8>("bad").unwrap_err();
        let err = ProtocolError::Decode(err);
        let teletype_err: TeletypeError = err.into();
        assert!(matches!(teletype_err, TeletypeError::Protocol(_)));
    }

    #[test]
    fn test_from_hub_error() {
        let teletype_err: TeletypeError = HubError::Unavailable.into();
        assert!(matches!(teletype_err, TeletypeError::Hub(_)));
    }

    #[tokio::test]
    async fn test_from_join_error() {
        async fn explode() {
            panic!("writer blew up");
        }

        let join_err = tokio::spawn(explode()).await.unwrap_err();
        let teletype_err: TeletypeError = join_err.into();
        assert!(matches!(teletype_err, TeletypeError::WriterFailed(_)));
        assert!(teletype_err.to_string().starts_with("writer task failed"));
    }

    #[test]
    fn test_write_timeout_display() {
        let err = TeletypeError::WriteTimeout("ping");
        assert_eq!(err.to_string(), "ping did not complete before the write deadline");
    }
}
