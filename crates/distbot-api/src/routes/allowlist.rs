//! Allowlist listing.

use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};
use distbot_core::status::AllowlistStatus;
use distbot_db::optional_time;
use serde::{Deserialize, Serialize};

use crate::AppState;
use crate::error::ApiError;

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(list_allowlist))
}

#[derive(Debug, Deserialize)]
struct AllowlistQuery {
    status: Option<String>,
}

#[derive(Debug, Serialize)]
struct AllowlistResponse {
    namespace: String,
    status: String,
    fas_account: Option<String>,
    updated: Option<String>,
}

async fn list_allowlist(
    State(state): State<AppState>,
    Query(query): Query<AllowlistQuery>,
) -> Result<Json<Vec<AllowlistResponse>>, ApiError> {
    let status = query
        .status
        .as_deref()
        .map(|s| s.parse::<AllowlistStatus>())
        .transpose()
        .map_err(ApiError::BadRequest)?;
    let entries = state.store.allowlist.list(status).await?;
    Ok(Json(
        entries
            .into_iter()
            .map(|e| AllowlistResponse {
                namespace: e.namespace,
                status: e.status.to_string(),
                fas_account: e.fas_account,
                updated: optional_time(Some(e.updated_at)),
            })
            .collect(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::test_support::TestApp;
    use distbot_config::ServiceConfig;

    #[tokio::test]
    async fn test_list_by_status() {
        let app = TestApp::new(ServiceConfig::default());
        let allowlist = &app.state.store.allowlist;
        allowlist
            .upsert("github.com/packit", AllowlistStatus::ApprovedManually, None)
            .await
            .unwrap();
        allowlist
            .upsert("gitlab.com/someone", AllowlistStatus::Waiting, Some("someone"))
            .await
            .unwrap();

        let (status, body) = app.get_json("/api/v1/allowlist?status=waiting").await;
        assert_eq!(status, 200);
        assert_eq!(body.as_array().unwrap().len(), 1);
        assert_eq!(body[0]["namespace"], "gitlab.com/someone");
        assert_eq!(body[0]["fas_account"], "someone");

        let (_, body) = app.get_json("/api/v1/allowlist").await;
        assert_eq!(body.as_array().unwrap().len(), 2);
    }
}
