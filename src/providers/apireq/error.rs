//! Wrapper around Reqwest's error type to facilitate exclusive matching

use std::error::Error as StdError;
use std::fmt;

#[derive(Debug, Clone, Copy)]
enum ErrorKind {
    /// DNS, routing, or connectivity failure before a response arrived
    ConnectFailed,
    /// The response body could not be read or decoded
    DecodingFailed,
    /// The request or a response body read timed out
    TimedOut,
    /// Anything reqwest reports that does not fit the categories above
    UnknownReqwestError,
}

/// A [`reqwest::Error`] classified into an [`ErrorKind`]. The vendor API
/// error types embed this so their callers can match on the category
/// rather than probing reqwest's boolean predicates.
#[derive(Debug)]
pub(crate) struct Error {
    kind: ErrorKind,
    source: reqwest::Error,
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        let kind = if err.is_timeout() {
            ErrorKind::TimedOut
        } else if err.is_connect() {
            ErrorKind::ConnectFailed
        } else if err.is_decode() || err.is_body() {
            ErrorKind::DecodingFailed
        } else {
            ErrorKind::UnknownReqwestError
        };

        Error { kind, source: err }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ErrorKind::ConnectFailed => write!(f, "connection failed"),
            ErrorKind::DecodingFailed => write!(f, "response decoding failed"),
            ErrorKind::TimedOut => write!(f, "timed out"),
            ErrorKind::UnknownReqwestError => write!(f, "unknown reqwest error"),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        Some(&self.source)
    }
}
