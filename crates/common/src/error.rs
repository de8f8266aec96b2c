use thiserror::Error;

/// Failure taxonomy shared by every crate in the workspace.
///
/// The first five variants classify exchange interaction; `Config` and
/// `InvalidState` cover startup configuration and bot lifecycle conflicts.
#[derive(Debug, Error)]
pub enum Error {
    /// Network failure, timeout, or exchange-side outage.
    #[error("Connectivity error: {0}")]
    Connectivity(String),

    /// Invalid key/secret, rejected signature, or timestamp outside recvWindow.
    #[error("Authentication error: {0}")]
    Authentication(String),

    /// Trading disabled, balance too low, or a request rejected by exchange rules.
    #[error("Policy error: {0}")]
    Policy(String),

    /// An order reached the exchange and was rejected.
    #[error("Order rejected: {0}")]
    Order(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    InvalidState(String),
}

impl Error {
    /// True when the same call may succeed on a later cycle without
    /// any change on the operator's side.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Connectivity(_))
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Internal(format!("JSON: {e}"))
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Internal(format!("IO: {e}"))
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_connectivity_is_retryable() {
        assert!(Error::Connectivity("timeout".into()).is_retryable());
        assert!(!Error::Authentication("bad key".into()).is_retryable());
        assert!(!Error::Order("rejected".into()).is_retryable());
    }

    #[test]
    fn message_is_surfaced_verbatim() {
        let e = Error::Authentication("HTTP 401 | code=-2015 | msg=Invalid API-key".into());
        assert!(e.to_string().ends_with("code=-2015 | msg=Invalid API-key"));
    }
}
