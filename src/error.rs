use std::fmt;
use std::sync::Arc;

use crate::platform::Characteristic;

#[derive(Debug)]
pub enum Error {
    Http(reqwest::Error),
    Json(serde_json::Error),
    NotConnected,
    LoginFailed(String),
    Protocol(String),
    Timeout,
    Io(std::io::Error),
    /// A status fetch failed; every caller waiting on that fetch gets the same error.
    Fetch(Arc<Error>),
    InvalidValue {
        characteristic: Characteristic,
        reason: String,
    },
    ReadOnly(Characteristic),
    Closed,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Http(e) => write!(f, "HTTP error: {e}"),
            Error::Json(e) => write!(f, "JSON error: {e}"),
            Error::NotConnected => write!(f, "not logged in"),
            Error::LoginFailed(msg) => write!(f, "login failed: {msg}"),
            Error::Protocol(msg) => write!(f, "protocol error: {msg}"),
            Error::Timeout => write!(f, "device call timed out"),
            Error::Io(e) => write!(f, "IO error: {e}"),
            Error::Fetch(e) => write!(f, "status fetch failed: {e}"),
            Error::InvalidValue {
                characteristic,
                reason,
            } => write!(f, "invalid value for {characteristic}: {reason}"),
            Error::ReadOnly(c) => write!(f, "{c} is read-only"),
            Error::Closed => write!(f, "accessory closed"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Http(e) => Some(e),
            Error::Json(e) => Some(e),
            Error::Io(e) => Some(e),
            Error::Fetch(e) => Some(e.as_ref()),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Http(e)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Json(e)
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
