//! Health check endpoints.

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{Value, json};
use tracing::warn;

use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/health/ready", get(ready))
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn ready(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    if let Some(pool) = &state.pool {
        if let Err(e) = sqlx::query("SELECT 1").execute(pool).await {
            warn!(error = %e, "Database not reachable");
            return (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "status": "unavailable" })),
            );
        }
    }
    (StatusCode::OK, Json(json!({ "status": "ready" })))
}

#[cfg(test)]
mod tests {
    use crate::routes::test_support::TestApp;
    use distbot_config::ServiceConfig;

    #[tokio::test]
    async fn test_health_and_ready() {
        let app = TestApp::new(ServiceConfig::default());
        let (status, body) = app.get_json("/health").await;
        assert_eq!(status, 200);
        assert_eq!(body["status"], "ok");

        let (status, body) = app.get_json("/health/ready").await;
        assert_eq!(status, 200);
        assert_eq!(body["status"], "ready");
    }
}
