use std::error::Error as StdError;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use log::*;

pub type Result<T> = core::result::Result<T, Error>;

/// Errors surfaced by the HTTP layer. The `error_kind` decides the status
/// code returned to the client; `source` keeps the original cause for logs.
#[derive(Debug)]
pub struct Error {
    pub source: Option<Box<dyn StdError + Send + Sync>>,
    pub error_kind: WebErrorKind,
}

#[derive(Debug, PartialEq)]
pub enum WebErrorKind {
    Upstream(UpstreamErrorKind),
    Invalid(String),
    Unavailable,
    Internal,
}

/// Failures talking to the reverse proxy target.
#[derive(Debug, PartialEq)]
pub enum UpstreamErrorKind {
    Network,
    Timeout,
}

impl Error {
    pub fn invalid(reason: impl Into<String>) -> Self {
        Error {
            source: None,
            error_kind: WebErrorKind::Invalid(reason.into()),
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

impl std::fmt::Display for Error {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> core::result::Result<(), std::fmt::Error> {
        match &self.source {
            Some(source) => write!(fmt, "Web Error: {:?}: {source}", self.error_kind),
            None => write!(fmt, "Web Error: {:?}", self.error_kind),
        }
    }
}

// List of possible StatusCode variants https://docs.rs/http/latest/http/status/struct.StatusCode.html#associatedconstant.UNPROCESSABLE_ENTITY
impl IntoResponse for Error {
    fn into_response(self) -> Response {
        match self.error_kind {
            WebErrorKind::Upstream(upstream_error_kind) => {
                warn!("Proxy upstream request failed: {:?}", self.source);
                match upstream_error_kind {
                    UpstreamErrorKind::Network => {
                        (StatusCode::BAD_GATEWAY, "BAD GATEWAY").into_response()
                    }
                    UpstreamErrorKind::Timeout => {
                        (StatusCode::GATEWAY_TIMEOUT, "GATEWAY TIMEOUT").into_response()
                    }
                }
            }
            WebErrorKind::Invalid(reason) => {
                (StatusCode::UNPROCESSABLE_ENTITY, reason).into_response()
            }
            WebErrorKind::Unavailable => {
                (StatusCode::SERVICE_UNAVAILABLE, "SERVICE UNAVAILABLE").into_response()
            }
            WebErrorKind::Internal => {
                error!("Internal error: {:?}", self.source);
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL SERVER ERROR").into_response()
            }
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        // Errors building the request happen before any network call is made.
        let error_kind = if err.is_builder() {
            WebErrorKind::Internal
        } else if err.is_timeout() {
            WebErrorKind::Upstream(UpstreamErrorKind::Timeout)
        } else {
            WebErrorKind::Upstream(UpstreamErrorKind::Network)
        };
        Error {
            source: Some(Box::new(err)),
            error_kind,
        }
    }
}

impl From<::sse::Error> for Error {
    fn from(err: ::sse::Error) -> Self {
        let error_kind = match err.error_kind {
            ::sse::error::ErrorKind::BrokerClosed => WebErrorKind::Unavailable,
            _ => WebErrorKind::Internal,
        };
        Error {
            source: Some(Box::new(err)),
            error_kind,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error {
            source: Some(Box::new(err)),
            error_kind: WebErrorKind::Internal,
        }
    }
}
