//! Error taxonomy for the hub.
//!
//! Data-quality problems (stale sequences, malformed levels) are absorbed
//! locally and only visible via counters and logs; the variants here cover
//! structural problems that are returned to the immediate caller. Nothing in
//! the core panics on malformed input.

use thiserror::Error;

/// All errors surfaced by `mdhub`.
#[derive(Debug, Error)]
pub enum HubError {
    #[error("symbol not found: {0}")]
    SymbolNotFound(String),

    #[error("transport failure: {0}")]
    Transport(#[from] std::io::Error),

    #[error("authentication rejected by cache server")]
    Unauthorized,

    #[error("protocol violation: {0}")]
    Protocol(String),

    #[error("warm start fetch failed for {symbol}: {reason}")]
    WarmStart { symbol: String, reason: String },
}

impl HubError {
    /// Transport and authentication failures are the conditions a
    /// cross-process caller is expected to handle with its own
    /// retry/backoff loop; the core never retries on its behalf.
    pub fn is_transport(&self) -> bool {
        matches!(self, HubError::Transport(_) | HubError::Unauthorized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_classification() {
        let io = HubError::Transport(std::io::Error::new(
            std::io::ErrorKind::ConnectionRefused,
            "refused",
        ));
        assert!(io.is_transport());
        assert!(HubError::Unauthorized.is_transport());
        assert!(!HubError::SymbolNotFound("EURUSD".into()).is_transport());
    }
}
