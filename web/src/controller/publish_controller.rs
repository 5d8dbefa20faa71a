use crate::controller::ApiResponse;
use crate::params::publish::PublishParams;
use crate::{AppState, Error};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use events::Publication;
use log::*;
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Serialize)]
struct Published {
    id: String,
    channels: Vec<String>,
}

#[derive(Debug, Serialize)]
struct Subscribers {
    channel: String,
    subscribers: usize,
}

/// POST /publish fans one event out to every listed channel.
pub async fn publish(
    State(app_state): State<AppState>,
    Json(params): Json<PublishParams>,
) -> Result<impl IntoResponse, Error> {
    debug!("POST Publish to {:?}", params.channels);

    let published = publish_to(&app_state, params.channels, params.publication).await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(ApiResponse::new(StatusCode::ACCEPTED.into(), published)),
    ))
}

/// POST /channels/:channel/events publishes to a single channel.
pub async fn publish_to_channel(
    State(app_state): State<AppState>,
    Path(channel): Path<String>,
    Json(publication): Json<Publication>,
) -> Result<impl IntoResponse, Error> {
    debug!("POST Publish to channel {channel}");

    let published = publish_to(&app_state, vec![channel], publication).await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(ApiResponse::new(StatusCode::ACCEPTED.into(), published)),
    ))
}

/// GET /channels/:channel/subscribers reports how many clients are attached.
pub async fn subscribers(
    State(app_state): State<AppState>,
    Path(channel): Path<String>,
) -> Result<impl IntoResponse, Error> {
    let subscribers = app_state.broker.subscriber_count(channel.as_str()).await?;

    Ok(Json(ApiResponse::new(
        StatusCode::OK.into(),
        Subscribers {
            channel,
            subscribers,
        },
    )))
}

async fn publish_to(
    app_state: &AppState,
    channels: Vec<String>,
    mut publication: Publication,
) -> Result<Published, Error> {
    if channels.is_empty() || channels.iter().any(|channel| channel.is_empty()) {
        return Err(Error::invalid("At least one non-empty channel is required"));
    }

    // Without an id the event could never be used as a replay cursor.
    if publication.id.is_empty() {
        publication.id = Uuid::new_v4().to_string();
    }

    for channel in &channels {
        app_state.history.record(channel, publication.clone());
    }
    let id = publication.id.clone();
    app_state.broker.publish(&channels, publication).await;

    info!("Published event {id} to {} channel(s)", channels.len());

    Ok(Published { id, channels })
}
