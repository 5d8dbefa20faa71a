//! Error types for the `sse` crate.
//!
//! Follows the layered error pattern used across the workspace: a root
//! `Error` struct holding an `error_kind` and the original `source`.
//! Per-subscriber failures never reach the coordinator; they surface here
//! only for the caller driving a connection.

use std::error::Error as StdError;
use std::fmt;

#[derive(Debug)]
pub struct Error {
    pub source: Option<Box<dyn StdError + Send + Sync>>,
    pub error_kind: ErrorKind,
}

#[derive(Debug, PartialEq)]
pub enum ErrorKind {
    /// Writing an encoded event to the sink failed (usually a disconnected client).
    Encode,
    /// The one-shot initial event producer of a stream failed.
    InitialEvent,
    /// The coordinator has shut down and accepts no further commands.
    BrokerClosed,
}

impl Error {
    pub fn initial_event(source: Box<dyn StdError + Send + Sync>) -> Self {
        Error {
            source: Some(source),
            error_kind: ErrorKind::InitialEvent,
        }
    }

    pub fn broker_closed() -> Self {
        Error {
            source: None,
            error_kind: ErrorKind::BrokerClosed,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match (&self.error_kind, &self.source) {
            (ErrorKind::Encode, Some(source)) => write!(f, "failed to write event: {source}"),
            (ErrorKind::InitialEvent, Some(source)) => {
                write!(f, "failed to produce initial event: {source}")
            }
            (ErrorKind::BrokerClosed, _) => write!(f, "broker is shut down"),
            (kind, None) => write!(f, "SSE Error: {kind:?}"),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn StdError + 'static))
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error {
            source: Some(Box::new(err)),
            error_kind: ErrorKind::Encode,
        }
    }
}
