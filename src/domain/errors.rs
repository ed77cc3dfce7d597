use thiserror::Error;

/// Network-level failure that is worth retrying
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransientCause {
    /// Request or read timed out
    Timeout,
    /// Connection could not be established or was reset
    Connect,
    /// Peer dropped the connection mid-request or mid-body
    Disconnect,
    /// Server answered with a gateway/unavailable/throttling status
    Unavailable(u16),
}

impl std::fmt::Display for TransientCause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransientCause::Timeout => write!(f, "timeout"),
            TransientCause::Connect => write!(f, "connection failure"),
            TransientCause::Disconnect => write!(f, "server disconnected"),
            TransientCause::Unavailable(code) => write!(f, "temporarily unavailable ({})", code),
        }
    }
}

/// Structured classification of a backend call failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendErrorKind {
    Transient(TransientCause),
    /// Non-success status that is not retried
    Status { code: u16, body: String },
    /// Response body could not be decoded
    Decode(String),
    /// Request could not be built (bad URL, unserializable body, ...)
    Request(String),
}

#[derive(Debug, Clone, Error)]
#[error("{operation} failed: {kind}")]
pub struct BackendError {
    pub operation: String,
    pub kind: BackendErrorKind,
}

impl std::fmt::Display for BackendErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendErrorKind::Transient(cause) => write!(f, "transient {}", cause),
            BackendErrorKind::Status { code, body } => {
                write!(f, "HTTP {} - {}", code, truncate(body, 200))
            }
            BackendErrorKind::Decode(msg) => write!(f, "malformed response: {}", msg),
            BackendErrorKind::Request(msg) => write!(f, "invalid request: {}", msg),
        }
    }
}

impl BackendError {
    pub fn new(operation: impl Into<String>, kind: BackendErrorKind) -> Self {
        Self {
            operation: operation.into(),
            kind,
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self.kind, BackendErrorKind::Transient(_))
    }

    /// Classify a reqwest failure without looking at its rendered message
    pub fn from_reqwest(operation: impl Into<String>, err: &reqwest::Error) -> Self {
        let kind = if err.is_timeout() {
            BackendErrorKind::Transient(TransientCause::Timeout)
        } else if err.is_connect() {
            BackendErrorKind::Transient(TransientCause::Connect)
        } else if err.is_decode() {
            BackendErrorKind::Decode(err.to_string())
        } else if err.is_body() || err.is_request() {
            BackendErrorKind::Transient(TransientCause::Disconnect)
        } else if err.is_builder() {
            BackendErrorKind::Request(err.to_string())
        } else if let Some(status) = err.status() {
            BackendErrorKind::Status {
                code: status.as_u16(),
                body: String::new(),
            }
        } else {
            BackendErrorKind::Transient(TransientCause::Disconnect)
        };
        Self::new(operation, kind)
    }

    /// Classify a non-success HTTP status
    pub fn from_status(operation: impl Into<String>, code: u16, body: String) -> Self {
        let kind = match code {
            429 | 502 | 503 | 504 => BackendErrorKind::Transient(TransientCause::Unavailable(code)),
            _ => BackendErrorKind::Status { code, body },
        };
        Self::new(operation, kind)
    }
}

/// Failure to build the worker configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Required configuration {0} is not set")]
    Missing(String),

    #[error("Invalid value for {name}: {reason}")]
    Invalid { name: String, reason: String },

    #[error(transparent)]
    Secret(#[from] crate::secrets::SecretError),
}

/// Failure of a whole reconciliation cycle
#[derive(Debug, Error)]
pub enum CycleError {
    #[error("Ledger could not be loaded: {0}")]
    LedgerUnavailable(#[source] BackendError),
}

pub(crate) fn truncate(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gateway_statuses_are_transient() {
        for code in [429, 502, 503, 504] {
            assert!(BackendError::from_status("select", code, String::new()).is_transient());
        }
    }

    #[test]
    fn test_client_errors_are_not_transient() {
        for code in [400, 401, 403, 404, 409, 500] {
            let err = BackendError::from_status("upsert", code, "boom".to_string());
            assert!(!err.is_transient(), "status {} should fail fast", code);
        }
    }

    #[test]
    fn test_backend_error_display() {
        let err = BackendError::from_status("select lv_tpaccount", 400, "bad filter".to_string());
        assert_eq!(
            err.to_string(),
            "select lv_tpaccount failed: HTTP 400 - bad filter"
        );

        let err = BackendError::new(
            "delete",
            BackendErrorKind::Transient(TransientCause::Timeout),
        );
        assert_eq!(err.to_string(), "delete failed: transient timeout");
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate("héllo", 2), "hé");
        assert_eq!(truncate("abc", 10), "abc");
    }
}
