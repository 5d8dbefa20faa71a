use crate::controller::{health_check_controller, publish_controller};
use crate::error::Result;
use crate::proxy::{self, Upstream};
use crate::sse::handler;
use crate::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use log::*;
use std::sync::Arc;

/// Builds the application router. When a proxy target is configured every
/// request no route matches is forwarded upstream and may be held open.
pub fn define_routes(app_state: AppState) -> Result<Router> {
    let router = Router::new()
        .merge(health_routes())
        .merge(publish_routes(app_state.clone()))
        .merge(stream_routes(app_state.clone()));

    match app_state.config.proxy_target() {
        Some(target) => {
            info!("Forwarding unmatched requests to {target}");
            let upstream = Upstream::new(target)?;
            Ok(router.fallback_service(proxy_routes(app_state, upstream)))
        }
        None => Ok(router),
    }
}

fn health_routes() -> Router {
    Router::new().route("/health", get(health_check_controller::health_check))
}

fn publish_routes(app_state: AppState) -> Router {
    Router::new()
        .route("/publish", post(publish_controller::publish))
        .route(
            "/channels/:channel/events",
            post(publish_controller::publish_to_channel),
        )
        .route(
            "/channels/:channel/subscribers",
            get(publish_controller::subscribers),
        )
        .with_state(app_state)
}

fn stream_routes(app_state: AppState) -> Router {
    Router::new()
        .route("/channels/:channel", get(handler::subscribe))
        .with_state(app_state)
}

fn proxy_routes(app_state: AppState, upstream: Upstream) -> Router {
    Router::new()
        .fallback(proxy::forward)
        .with_state((app_state, Arc::new(upstream)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use clap::Parser;
    use service::config::Config;
    use tower::ServiceExt;

    async fn app_state(args: &[&str]) -> AppState {
        let config = Config::parse_from(std::iter::once("sse_broker").chain(args.iter().copied()));
        AppState::new(config).await
    }

    fn publish_request(uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_check_responds() {
        let router = define_routes(app_state(&[]).await).unwrap();

        let response = router
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn publish_records_history_and_assigns_an_id() {
        let app_state = app_state(&[]).await;
        let router = define_routes(app_state.clone()).unwrap();

        let response = router
            .oneshot(publish_request(
                "/publish",
                r#"{"channels":["news","sports"],"event":"update","data":"hi"}"#,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let body = body_json(response).await;
        assert_eq!(body["status_code"], 202);
        assert_eq!(body["data"]["channels"], serde_json::json!(["news", "sports"]));
        let id = body["data"]["id"].as_str().unwrap();
        assert!(uuid::Uuid::parse_str(id).is_ok());

        assert_eq!(app_state.history.len("news"), 1);
        assert_eq!(app_state.history.len("sports"), 1);
    }

    #[tokio::test]
    async fn publish_keeps_a_given_id() {
        let router = define_routes(app_state(&[]).await).unwrap();

        let response = router
            .oneshot(publish_request(
                "/channels/news/events",
                r#"{"id":"42","data":"hi"}"#,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let body = body_json(response).await;
        assert_eq!(body["data"]["id"], "42");
        assert_eq!(body["data"]["channels"], serde_json::json!(["news"]));
    }

    #[tokio::test]
    async fn publish_without_channels_is_rejected() {
        let app_state = app_state(&[]).await;
        let router = define_routes(app_state.clone()).unwrap();

        let response = router
            .oneshot(publish_request("/publish", r#"{"channels":[],"data":"hi"}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn publish_without_data_is_rejected() {
        let app_state = app_state(&[]).await;
        let router = define_routes(app_state.clone()).unwrap();

        let response = router
            .oneshot(publish_request("/publish", r#"{"channels":["news"],"id":"1"}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert!(app_state.history.is_empty("news"));
    }

    #[tokio::test]
    async fn subscriber_count_is_reported() {
        let app_state = app_state(&[]).await;
        let _subscription = app_state.broker.subscribe("news", "").await;
        let router = define_routes(app_state.clone()).unwrap();

        let response = router
            .oneshot(
                Request::get("/channels/news/subscribers")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["data"]["channel"], "news");
        assert_eq!(body["data"]["subscribers"], 1);
    }

    #[tokio::test]
    async fn subscriber_count_after_shutdown_is_unavailable() {
        let app_state = app_state(&[]).await;
        app_state.broker.shutdown().await;
        let router = define_routes(app_state).unwrap();

        let response = router
            .oneshot(
                Request::get("/channels/news/subscribers")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn unknown_routes_are_not_found_without_a_proxy() {
        let router = define_routes(app_state(&[]).await).unwrap();

        let response = router
            .oneshot(Request::get("/elsewhere").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn invalid_proxy_target_fails_route_definition() {
        let app_state = app_state(&["--proxy-target", "not a url"]).await;

        assert!(define_routes(app_state).is_err());
    }
}
