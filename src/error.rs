//! Error types for the request cache.

use thiserror::Error;

/// A failure produced while performing or post-processing a transport call.
///
/// Transport errors are fanned out to every subscriber of an entry's listener
/// and of the engine broadcast, so they are cheap to clone and carry owned
/// messages rather than source errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("HTTP {status}: {message}")]
    Status { status: u16, message: String },

    #[error("network error: {0}")]
    Network(String),

    #[error("failed to decode response: {0}")]
    Decode(String),

    #[error("transport finished without producing a response")]
    EmptyResponse,

    #[error("call ended before completion")]
    Aborted,
}

impl TransportError {
    /// Returns the HTTP status code, if the remote answered with one.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for TransportError {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(err.to_string())
    }
}

/// Errors returned synchronously to callers of the engine.
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("unable to refresh entry {key}: it has never made a request")]
    NeverRequested { key: String },

    #[error("failed to derive cache key: {0}")]
    Key(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_only_for_http_failures() {
        let err = TransportError::Status {
            status: 404,
            message: "not found".into(),
        };
        assert_eq!(err.status(), Some(404));
        assert_eq!(err.to_string(), "HTTP 404: not found");
        assert_eq!(TransportError::Network("reset".into()).status(), None);
        assert_eq!(TransportError::Aborted.status(), None);
    }

    #[test]
    fn json_errors_become_decode_failures() {
        let err = serde_json::from_str::<u32>("\"x\"").unwrap_err();
        assert!(matches!(TransportError::from(err), TransportError::Decode(_)));
    }
}
