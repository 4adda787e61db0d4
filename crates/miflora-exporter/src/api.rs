//! HTTP endpoints for the exporter.
//!
//! - `GET /metrics` - current metric values in the Prometheus text format
//! - `GET /` - same as `/metrics`
//! - `GET /health` - liveness check as JSON
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use miflora_exporter::{Metrics, api};
//!
//! let metrics = Arc::new(Metrics::new()?);
//! let app = api::router().with_state(metrics);
//! ```

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    http::{StatusCode, header},
    response::IntoResponse,
    routing::get,
};
use serde::Serialize;
use time::OffsetDateTime;
use tracing::error;

use crate::metrics::{Metrics, MetricsError};

/// Create the exporter router.
pub fn router() -> Router<Arc<Metrics>> {
    Router::new()
        .route("/", get(metrics))
        .route("/metrics", get(metrics))
        .route("/health", get(health))
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        timestamp: OffsetDateTime::now_utc(),
    })
}

/// Render the metric registry for a scrape.
async fn metrics(State(metrics): State<Arc<Metrics>>) -> Result<impl IntoResponse, AppError> {
    let body = metrics.render()?;
    Ok(([(header::CONTENT_TYPE, metrics.content_type())], body))
}

/// Application error type.
#[derive(Debug)]
pub enum AppError {
    Metrics(MetricsError),
}

impl From<MetricsError> for AppError {
    fn from(e: MetricsError) -> Self {
        AppError::Metrics(e)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match self {
            AppError::Metrics(e) => {
                error!("Failed to render metrics: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
            }
        };

        let body = serde_json::json!({
            "error": message,
        });

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::Request};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    fn create_test_metrics() -> Arc<Metrics> {
        let metrics = Metrics::new().unwrap();
        metrics.battery.with_label_values(&["basil"]).set(42.0);
        metrics.moisture.with_label_values(&["basil"]).set(30.0);
        Arc::new(metrics)
    }

    async fn response_body(response: axum::response::Response) -> String {
        let body = response.into_body();
        let bytes = body.collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    async fn send_get(app: Router, uri: &str) -> axum::response::Response {
        app.oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_metrics_endpoint() {
        let app = router().with_state(create_test_metrics());
        let response = send_get(app, "/metrics").await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "text/plain; version=0.0.4"
        );

        let body = response_body(response).await;
        assert!(body.contains("# HELP miflora_battery_level_pct"));
        assert!(body.contains("miflora_battery_level_pct{plant=\"basil\"} 42"));
        assert!(body.contains("miflora_moisture{plant=\"basil\"} 30"));
    }

    #[tokio::test]
    async fn test_root_serves_metrics() {
        let app = router().with_state(create_test_metrics());
        let response = send_get(app, "/").await;

        assert_eq!(response.status(), StatusCode::OK);
        let body = response_body(response).await;
        assert!(body.contains("miflora_battery_level_pct{plant=\"basil\"} 42"));
    }

    #[tokio::test]
    async fn test_scrape_sees_later_updates() {
        let metrics = create_test_metrics();
        let app = router().with_state(Arc::clone(&metrics));

        metrics.battery.with_label_values(&["basil"]).set(41.0);

        let body = response_body(send_get(app, "/metrics").await).await;
        assert!(body.contains("miflora_battery_level_pct{plant=\"basil\"} 41"));
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let app = router().with_state(create_test_metrics());
        let response = send_get(app, "/health").await;

        assert_eq!(response.status(), StatusCode::OK);

        let body = response_body(response).await;
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();

        assert_eq!(json["status"], "ok");
        assert!(json["version"].is_string());
        assert!(json["timestamp"].is_string());
    }

    #[tokio::test]
    async fn test_unknown_route() {
        let app = router().with_state(create_test_metrics());
        let response = send_get(app, "/api/devices").await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_app_error_response() {
        let err = AppError::from(MetricsError::Prometheus(prometheus::Error::Msg(
            "broken".to_string(),
        )));
        let response = err.into_response();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = response_body(response).await;
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert!(json["error"].as_str().unwrap().contains("broken"));
    }
}
