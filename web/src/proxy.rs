//! Reverse proxy with "hold" support.
//!
//! Requests are forwarded to an upstream backend. When the backend answers
//! with a `Grip-Channel` header, the edge keeps the client connection open
//! and turns it into an event stream on that channel instead of returning the
//! proxied body. Any other response passes through unchanged.

use crate::error::{Error, Result};
use crate::sse::handler::stream_response;
use crate::AppState;
use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::header::{HeaderName, CONTENT_ENCODING, CONTENT_LENGTH, HOST};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use log::*;
use std::sync::Arc;

/// Response header by which the upstream asks the edge to hold the connection.
pub const GRIP_CHANNEL: HeaderName = HeaderName::from_static("grip-channel");

// Connection-scoped headers that must not be forwarded by a proxy (RFC 9110 §7.6.1).
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "proxy-connection",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// The backend requests are forwarded to.
#[derive(Clone)]
pub struct Upstream {
    client: reqwest::Client,
    base_url: String,
}

impl Upstream {
    pub fn new(base_url: &str) -> Result<Self> {
        // Validate eagerly so a bad target fails at startup, not on first request.
        reqwest::Url::parse(base_url)
            .map_err(|e| Error::invalid(format!("Invalid proxy target {base_url}: {e}")))?;

        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url_for(&self, path_and_query: &str) -> String {
        format!("{}{}", self.base_url, path_and_query)
    }
}

fn strip_hop_by_hop(headers: &mut HeaderMap) {
    for name in HOP_BY_HOP {
        headers.remove(*name);
    }
}

/// Fallback handler forwarding everything the router does not serve itself.
pub(crate) async fn forward(
    State((app_state, upstream)): State<(AppState, Arc<Upstream>)>,
    request: Request,
) -> Result<Response> {
    let (parts, body) = request.into_parts();
    let path_and_query = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    let url = upstream.url_for(path_and_query);

    let mut request_headers = parts.headers.clone();
    strip_hop_by_hop(&mut request_headers);
    request_headers.remove(HOST);

    debug!("Proxying {} {url}", parts.method);

    let response = upstream
        .client
        .request(parts.method.clone(), &url)
        .headers(request_headers)
        .body(reqwest::Body::wrap_stream(body.into_data_stream()))
        .send()
        .await?;

    let status = response.status();
    let mut headers = response.headers().clone();
    strip_hop_by_hop(&mut headers);

    let channel = headers
        .remove(&GRIP_CHANNEL)
        .and_then(|value| value.to_str().ok().map(str::to_string))
        .filter(|channel| !channel.is_empty());

    match channel {
        Some(channel) => {
            info!("Holding {path_and_query} open on channel {channel}");
            // The upstream body is replaced by the stream.
            headers.remove(CONTENT_LENGTH);
            headers.remove(CONTENT_ENCODING);
            drop(response);
            Ok(stream_response(&app_state, channel, &parts.headers, headers, None).await)
        }
        None => {
            // Chunks are relayed as they arrive; nothing is buffered.
            let body = Body::from_stream(response.bytes_stream());
            Ok((status, headers, body).into_response())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn target_must_be_a_url() {
        assert!(Upstream::new("not a url").is_err());
        assert!(Upstream::new("http://127.0.0.1:9000").is_ok());
    }

    #[test]
    fn paths_are_appended_to_the_base_url() {
        let upstream = Upstream::new("http://backend:9000/api/").unwrap();
        assert_eq!(
            upstream.url_for("/stream?x=1"),
            "http://backend:9000/api/stream?x=1"
        );
    }

    #[test]
    fn hop_by_hop_headers_are_removed() {
        let mut headers = HeaderMap::new();
        headers.insert("connection", HeaderValue::from_static("close"));
        headers.insert("transfer-encoding", HeaderValue::from_static("chunked"));
        headers.insert("x-request-id", HeaderValue::from_static("abc"));

        strip_hop_by_hop(&mut headers);

        assert_eq!(headers.len(), 1);
        assert_eq!(headers["x-request-id"], "abc");
    }
}
