use crate::AppState;
use ::sse::{Broker, Encoder, Subscription};
use async_stream::stream;
use axum::body::{Body, Bytes};
use axum::extract::{Path, State};
use axum::http::header::{
    HeaderName, HeaderValue, ACCEPT_ENCODING, ACCESS_CONTROL_ALLOW_ORIGIN, CACHE_CONTROL,
    CONNECTION, CONTENT_ENCODING, CONTENT_TYPE,
};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, MethodRouter};
use events::Event;
use futures::Stream;
use log::*;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval_at, Instant, Interval};

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// One-shot producer of an event sent to every new subscriber before live traffic.
pub type InitialEvent = Arc<dyn Fn() -> Result<Event, BoxError> + Send + Sync>;

static LAST_EVENT_ID: HeaderName = HeaderName::from_static("last-event-id");

/// GET /channels/:channel holds the connection open and streams the channel's events.
pub(crate) async fn subscribe(
    State(app_state): State<AppState>,
    Path(channel): Path<String>,
    headers: HeaderMap,
) -> Response {
    stream_response(&app_state, channel, &headers, HeaderMap::new(), None).await
}

/// Handler streaming a fixed channel, for mounting at any route.
pub fn channel_handler(channel: impl Into<String>) -> MethodRouter<AppState> {
    channel_handler_with_initial_event(channel, None)
}

/// Like [`channel_handler`], sending the event produced by `initial_event`
/// to each subscriber first. A failing producer is logged and skipped.
pub fn channel_handler_with_initial_event(
    channel: impl Into<String>,
    initial_event: Option<InitialEvent>,
) -> MethodRouter<AppState> {
    let channel = channel.into();
    get(
        move |State(app_state): State<AppState>, headers: HeaderMap| {
            let channel = channel.clone();
            let initial_event = initial_event.clone();
            async move {
                stream_response(&app_state, channel, &headers, HeaderMap::new(), initial_event)
                    .await
            }
        },
    )
}

/// Whether the stream for this request should be gzip compressed.
pub(crate) fn accepts_gzip(gzip_enabled: bool, request_headers: &HeaderMap) -> bool {
    gzip_enabled
        && request_headers
            .get_all(ACCEPT_ENCODING)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .any(|value| value.contains("gzip"))
}

/// Sets the `text/event-stream` response headers.
pub(crate) fn apply_stream_headers(headers: &mut HeaderMap, allow_cors: bool, gzip: bool) {
    headers.insert(
        CONTENT_TYPE,
        HeaderValue::from_static("text/event-stream; charset=utf-8"),
    );
    headers.insert(
        CACHE_CONTROL,
        HeaderValue::from_static("no-cache, no-store, must-revalidate"),
    );
    headers.insert(CONNECTION, HeaderValue::from_static("keep-alive"));
    if allow_cors {
        headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    }
    if gzip {
        headers.insert(CONTENT_ENCODING, HeaderValue::from_static("gzip"));
    }
}

/// Registers a subscription for `channel` and returns the streaming response.
///
/// `base_headers` are kept unless a stream header overrides them (the proxy
/// adapter passes the upstream headers here). The subscription is registered
/// before this returns, so nothing published after the client receives the
/// response headers is missed.
pub(crate) async fn stream_response(
    app_state: &AppState,
    channel: String,
    request_headers: &HeaderMap,
    base_headers: HeaderMap,
    initial_event: Option<InitialEvent>,
) -> Response {
    let config = app_state.broker.config();
    let gzip = accepts_gzip(config.gzip, request_headers);

    let mut headers = base_headers;
    apply_stream_headers(&mut headers, config.allow_cors, gzip);

    let last_event_id = request_headers
        .get(&LAST_EVENT_ID)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_string();

    debug!("Establishing SSE stream on channel {channel} (last event id {last_event_id:?})");
    let subscription = app_state.broker.subscribe(channel, last_event_id).await;

    let body = Body::from_stream(event_stream(
        app_state.broker.clone(),
        subscription,
        gzip,
        app_state.config.heartbeat_interval(),
        initial_event,
    ));

    (StatusCode::OK, headers, body).into_response()
}

/// Drains a subscription into encoded chunks until it is closed or a write fails.
///
/// Encoding into memory does not touch the network. A failed socket write
/// surfaces as hyper dropping this body stream, which drops the subscription:
/// its drop logs the lost client and removes it from its channel.
fn event_stream(
    broker: Broker,
    mut subscription: Subscription,
    gzip: bool,
    heartbeat: Option<Duration>,
    initial_event: Option<InitialEvent>,
) -> impl Stream<Item = Result<Bytes, Infallible>> {
    stream! {
        let mut encoder = Encoder::new(Vec::new(), gzip);

        if let Some(produce) = initial_event {
            match produce() {
                Ok(event) => match encode(&mut encoder, &event) {
                    Ok(chunk) => yield Ok(chunk),
                    Err(e) => warn!("{e}"),
                },
                Err(e) => warn!("{}", ::sse::Error::initial_event(e)),
            }
        }

        let mut heartbeat = heartbeat.map(|period| interval_at(Instant::now() + period, period));

        loop {
            let event = tokio::select! {
                event = subscription.recv() => match event {
                    Some(event) => event,
                    None => break,
                },
                _ = tick(&mut heartbeat) => Event::comment(""),
            };

            match encode(&mut encoder, &event) {
                Ok(chunk) => yield Ok(chunk),
                Err(e) => {
                    warn!("Dropping subscription {}: {e}", subscription.id());
                    broker.unsubscribe(subscription).await;
                    return;
                }
            }
        }

        debug!(
            "Subscription {} on channel {} closed by the broker",
            subscription.id(),
            subscription.channel()
        );
        // Complete the gzip member so the client sees a well-formed stream.
        if gzip {
            match encoder.finish() {
                Ok(trailer) if !trailer.is_empty() => yield Ok(Bytes::from(trailer)),
                Ok(_) => {}
                Err(e) => warn!("Failed to finish compressed stream: {e}"),
            }
        }
    }
}

fn encode(encoder: &mut Encoder<Vec<u8>>, event: &Event) -> Result<Bytes, ::sse::Error> {
    encoder.encode(event)?;
    Ok(Bytes::from(std::mem::take(encoder.get_mut())))
}

async fn tick(heartbeat: &mut Option<Interval>) {
    match heartbeat {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}
