use axum::http::StatusCode;
use axum::response::IntoResponse;

/// GET /health answers as long as the router is serving requests.
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "healthy")
}
