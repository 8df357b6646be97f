//! Pipeline listing.

use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::{Json, Router};
use distbot_db::{Pipeline, optional_time};
use serde::Serialize;
use uuid::Uuid;

use crate::AppState;
use crate::error::ApiError;
use crate::routes::Pagination;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_pipelines))
        .route("/{id}", get(get_pipeline))
}

#[derive(Debug, Serialize)]
struct TriggerResponse {
    trigger_type: String,
    identifier: String,
    project_url: String,
}

#[derive(Debug, Serialize)]
struct PipelineResponse {
    id: Uuid,
    time_created: Option<String>,
    trigger: Option<TriggerResponse>,
    srpm_build_id: Option<Uuid>,
    copr_build_group_id: Option<Uuid>,
    koji_build_group_id: Option<Uuid>,
    test_run_group_id: Option<Uuid>,
    sync_release_run_id: Option<Uuid>,
    vm_image_build_id: Option<Uuid>,
}

async fn to_response(state: &AppState, pipeline: Pipeline) -> Result<PipelineResponse, ApiError> {
    let trigger = match pipeline.job_trigger_id {
        Some(id) => {
            let trigger = state.store.projects.get_trigger(id).await?;
            let project = state.store.projects.get_project(trigger.project_id).await?;
            Some(TriggerResponse {
                trigger_type: trigger.trigger_type.to_string(),
                identifier: trigger.identifier,
                project_url: project.project_url,
            })
        }
        None => None,
    };
    Ok(PipelineResponse {
        id: pipeline.id,
        time_created: optional_time(Some(pipeline.created_at)),
        trigger,
        srpm_build_id: pipeline.srpm_build_id,
        copr_build_group_id: pipeline.copr_build_group_id,
        koji_build_group_id: pipeline.koji_build_group_id,
        test_run_group_id: pipeline.test_run_group_id,
        sync_release_run_id: pipeline.sync_release_run_id,
        vm_image_build_id: pipeline.vm_image_build_id,
    })
}

async fn list_pipelines(
    State(state): State<AppState>,
    Query(page): Query<Pagination>,
) -> Result<Json<Vec<PipelineResponse>>, ApiError> {
    let pipelines = state
        .store
        .pipelines
        .list(page.limit(), page.offset())
        .await?;
    let mut response = Vec::with_capacity(pipelines.len());
    for pipeline in pipelines {
        response.push(to_response(&state, pipeline).await?);
    }
    Ok(Json(response))
}

async fn get_pipeline(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<PipelineResponse>, ApiError> {
    let pipeline = state.store.pipelines.get(id).await?;
    Ok(Json(to_response(&state, pipeline).await?))
}
