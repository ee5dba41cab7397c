use std::fmt;
use std::time::Duration;

use reqwest::StatusCode;

/// Which part of the transport failed before any response arrived.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    Connect,
    Request,
    Body,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportKind::Connect => write!(f, "connect"),
            TransportKind::Request => write!(f, "request"),
            TransportKind::Body => write!(f, "body"),
        }
    }
}

/// A failure at the transport layer: no HTTP response was received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportFailure {
    pub kind: TransportKind,
    pub message: String,
}

impl TransportFailure {
    pub fn new(kind: TransportKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for TransportFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failure: {}", self.kind, self.message)
    }
}

#[derive(Debug)]
pub enum Error {
    Io(std::io::Error),
    Json(serde_json::Error),
    Config(String),
    InvalidRequest(String),
    Timeout(Duration),
    Transport(TransportFailure),
    MaxRetriesExceeded {
        attempts: u8,
        source: Box<Error>,
    },
    Http {
        status: StatusCode,
        status_text: String,
        body: String,
    },
    SessionExpired(String),
    PlanLimitExceeded {
        detail: String,
        upgrade_url: Option<String>,
    },
}

impl Error {
    /// Maps a reqwest failure onto the taxonomy, keeping the configured timeout for reporting.
    pub(crate) fn from_reqwest(err: reqwest::Error, timeout: Duration) -> Self {
        if err.is_timeout() {
            return Error::Timeout(timeout);
        }
        if err.is_builder() {
            return Error::InvalidRequest(err.to_string());
        }
        let kind = if err.is_connect() {
            TransportKind::Connect
        } else if err.is_body() || err.is_decode() {
            TransportKind::Body
        } else {
            TransportKind::Request
        };
        Error::Transport(TransportFailure::new(kind, err.to_string()))
    }

    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Error::Http { status, .. } => Some(*status),
            Error::PlanLimitExceeded { .. } => Some(StatusCode::PAYMENT_REQUIRED),
            _ => None,
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Transport(_))
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(err) => write!(f, "io error: {}", err),
            Error::Json(err) => write!(f, "json error: {}", err),
            Error::Config(msg) => write!(f, "configuration error: {}", msg),
            Error::InvalidRequest(msg) => write!(f, "invalid request: {}", msg),
            Error::Timeout(after) => write!(f, "request timed out after {:?}", after),
            Error::Transport(failure) => write!(f, "transport error: {}", failure),
            Error::MaxRetriesExceeded { attempts, source } => {
                write!(f, "gave up after {} attempts: {}", attempts, source)
            }
            Error::Http {
                status,
                status_text,
                body,
            } => write!(f, "http {} {}: {}", status.as_u16(), status_text, body),
            Error::SessionExpired(reason) => write!(f, "session expired: {}", reason),
            Error::PlanLimitExceeded {
                detail,
                upgrade_url,
            } => match upgrade_url {
                Some(url) => write!(f, "plan limit exceeded: {} (upgrade at {})", detail, url),
                None => write!(f, "plan limit exceeded: {}", detail),
            },
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(err) => Some(err),
            Error::Json(err) => Some(err),
            Error::MaxRetriesExceeded { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Json(err)
    }
}

impl From<reqwest::header::InvalidHeaderValue> for Error {
    fn from(err: reqwest::header::InvalidHeaderValue) -> Self {
        Error::InvalidRequest(format!("invalid header value: {}", err))
    }
}

impl From<reqwest::header::InvalidHeaderName> for Error {
    fn from(err: reqwest::header::InvalidHeaderName) -> Self {
        Error::InvalidRequest(format!("invalid header name: {}", err))
    }
}
