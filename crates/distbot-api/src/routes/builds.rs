//! Read-only views of builds, test runs, release syncs and VM images.

use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::{Json, Router};
use distbot_core::status::SyncReleaseJobType;
use distbot_db::{
    CoprBuildTarget, KojiBuildTarget, SrpmBuild, SyncReleaseTarget, TestRunTarget, VmImageBuild,
    optional_time,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::AppState;
use crate::error::ApiError;
use crate::routes::Pagination;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/srpm-builds", get(list_srpm_builds))
        .route("/srpm-builds/{id}", get(get_srpm_build))
        .route("/copr-builds", get(list_copr_builds))
        .route("/copr-builds/{id}", get(get_copr_build))
        .route("/koji-builds", get(list_koji_builds))
        .route("/koji-builds/{id}", get(get_koji_build))
        .route("/testing-farm/results", get(list_test_runs))
        .route("/sync-releases", get(list_sync_releases))
        .route("/vm-image-builds", get(list_vm_image_builds))
        .route("/vm-image-builds/{id}", get(get_vm_image_build))
}

#[derive(Debug, Serialize)]
struct SrpmBuildResponse {
    id: Uuid,
    status: String,
    commit_sha: Option<String>,
    url: Option<String>,
    logs_url: Option<String>,
    copr_build_id: Option<String>,
    copr_web_url: Option<String>,
    build_submitted_time: Option<String>,
    build_start_time: Option<String>,
    build_finished_time: Option<String>,
}

impl From<SrpmBuild> for SrpmBuildResponse {
    fn from(build: SrpmBuild) -> Self {
        Self {
            id: build.id,
            status: build.status.to_string(),
            commit_sha: build.commit_sha,
            url: build.url,
            logs_url: build.logs_url,
            copr_build_id: build.copr_build_id,
            copr_web_url: build.copr_web_url,
            build_submitted_time: optional_time(Some(build.submitted_time)),
            build_start_time: optional_time(build.start_time),
            build_finished_time: optional_time(build.finished_time),
        }
    }
}

#[derive(Debug, Serialize)]
struct CoprBuildResponse {
    id: Uuid,
    build_id: String,
    status: String,
    chroot: String,
    commit_sha: String,
    copr_owner: String,
    copr_project: String,
    web_url: Option<String>,
    build_logs_url: Option<String>,
    built_packages: Option<Value>,
    build_submitted_time: Option<String>,
    build_start_time: Option<String>,
    build_finished_time: Option<String>,
}

impl From<CoprBuildTarget> for CoprBuildResponse {
    fn from(build: CoprBuildTarget) -> Self {
        Self {
            id: build.id,
            build_id: build.build_id,
            status: build.status.to_string(),
            chroot: build.target,
            commit_sha: build.commit_sha,
            copr_owner: build.owner,
            copr_project: build.project_name,
            web_url: build.web_url,
            build_logs_url: build.build_logs_url,
            built_packages: build.built_packages,
            build_submitted_time: optional_time(Some(build.submitted_time)),
            build_start_time: optional_time(build.start_time),
            build_finished_time: optional_time(build.finished_time),
        }
    }
}

#[derive(Debug, Serialize)]
struct KojiBuildResponse {
    id: Uuid,
    task_id: String,
    status: String,
    koji_state: Option<String>,
    target: String,
    scratch: bool,
    commit_sha: String,
    web_url: Option<String>,
    build_logs_url: Option<String>,
    build_submitted_time: Option<String>,
    build_start_time: Option<String>,
    build_finished_time: Option<String>,
}

impl From<KojiBuildTarget> for KojiBuildResponse {
    fn from(build: KojiBuildTarget) -> Self {
        Self {
            koji_state: build
                .data
                .get("koji_state")
                .and_then(Value::as_str)
                .map(String::from),
            id: build.id,
            task_id: build.build_id,
            status: build.status.to_string(),
            target: build.target,
            scratch: build.scratch,
            commit_sha: build.commit_sha,
            web_url: build.web_url,
            build_logs_url: build.build_logs_url,
            build_submitted_time: optional_time(Some(build.submitted_time)),
            build_start_time: optional_time(build.start_time),
            build_finished_time: optional_time(build.finished_time),
        }
    }
}

#[derive(Debug, Serialize)]
struct TestRunResponse {
    id: Uuid,
    pipeline_id: Option<String>,
    status: String,
    target: String,
    commit_sha: String,
    web_url: Option<String>,
    submitted_time: Option<String>,
}

impl From<TestRunTarget> for TestRunResponse {
    fn from(run: TestRunTarget) -> Self {
        Self {
            id: run.id,
            pipeline_id: run.pipeline_id,
            status: run.status.to_string(),
            target: run.target,
            commit_sha: run.commit_sha,
            web_url: run.web_url,
            submitted_time: optional_time(Some(run.submitted_time)),
        }
    }
}

#[derive(Debug, Serialize)]
struct SyncTargetResponse {
    branch: String,
    status: String,
    downstream_pr_url: Option<String>,
    start_time: Option<String>,
    finished_time: Option<String>,
}

impl From<SyncReleaseTarget> for SyncTargetResponse {
    fn from(target: SyncReleaseTarget) -> Self {
        Self {
            branch: target.branch,
            status: target.status.to_string(),
            downstream_pr_url: target.downstream_pr_url,
            start_time: optional_time(target.start_time),
            finished_time: optional_time(target.finished_time),
        }
    }
}

#[derive(Debug, Serialize)]
struct SyncReleaseResponse {
    id: Uuid,
    job_type: String,
    status: String,
    submitted_time: Option<String>,
    targets: Vec<SyncTargetResponse>,
}

#[derive(Debug, Serialize)]
struct VmImageBuildResponse {
    id: Uuid,
    build_id: String,
    status: String,
    target: String,
    commit_sha: String,
    copr_owner: String,
    copr_project: String,
    project_url: String,
    build_submitted_time: Option<String>,
    build_start_time: Option<String>,
    build_finished_time: Option<String>,
}

impl From<VmImageBuild> for VmImageBuildResponse {
    fn from(build: VmImageBuild) -> Self {
        Self {
            id: build.id,
            build_id: build.build_id,
            status: build.status.to_string(),
            target: build.target,
            commit_sha: build.commit_sha,
            copr_owner: build.owner,
            copr_project: build.project_name,
            project_url: build.project_url,
            build_submitted_time: optional_time(Some(build.submitted_time)),
            build_start_time: optional_time(build.start_time),
            build_finished_time: optional_time(build.finished_time),
        }
    }
}

async fn list_srpm_builds(
    State(state): State<AppState>,
    Query(page): Query<Pagination>,
) -> Result<Json<Vec<SrpmBuildResponse>>, ApiError> {
    let builds = state.store.srpm_builds.list(page.limit(), page.offset()).await?;
    Ok(Json(builds.into_iter().map(Into::into).collect()))
}

async fn get_srpm_build(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SrpmBuildResponse>, ApiError> {
    Ok(Json(state.store.srpm_builds.get(id).await?.into()))
}

async fn list_copr_builds(
    State(state): State<AppState>,
    Query(page): Query<Pagination>,
) -> Result<Json<Vec<CoprBuildResponse>>, ApiError> {
    let builds = state.store.copr_builds.list(page.limit(), page.offset()).await?;
    Ok(Json(builds.into_iter().map(Into::into).collect()))
}

async fn get_copr_build(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<CoprBuildResponse>, ApiError> {
    Ok(Json(state.store.copr_builds.get_target(id).await?.into()))
}

#[derive(Debug, Deserialize)]
struct KojiBuildsQuery {
    scratch: Option<bool>,
    page: Option<i64>,
    per_page: Option<i64>,
}

async fn list_koji_builds(
    State(state): State<AppState>,
    Query(query): Query<KojiBuildsQuery>,
) -> Result<Json<Vec<KojiBuildResponse>>, ApiError> {
    let page = Pagination {
        page: query.page,
        per_page: query.per_page,
    };
    let builds = state
        .store
        .koji_builds
        .list(query.scratch, page.limit(), page.offset())
        .await?;
    Ok(Json(builds.into_iter().map(Into::into).collect()))
}

async fn get_koji_build(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<KojiBuildResponse>, ApiError> {
    Ok(Json(state.store.koji_builds.get_target(id).await?.into()))
}

async fn list_test_runs(
    State(state): State<AppState>,
    Query(page): Query<Pagination>,
) -> Result<Json<Vec<TestRunResponse>>, ApiError> {
    let runs = state.store.test_runs.list(page.limit(), page.offset()).await?;
    Ok(Json(runs.into_iter().map(Into::into).collect()))
}

#[derive(Debug, Deserialize)]
struct SyncReleasesQuery {
    job_type: Option<String>,
    page: Option<i64>,
    per_page: Option<i64>,
}

async fn list_sync_releases(
    State(state): State<AppState>,
    Query(query): Query<SyncReleasesQuery>,
) -> Result<Json<Vec<SyncReleaseResponse>>, ApiError> {
    let job_type = query
        .job_type
        .as_deref()
        .map(|t| t.parse::<SyncReleaseJobType>())
        .transpose()
        .map_err(ApiError::BadRequest)?;
    let page = Pagination {
        page: query.page,
        per_page: query.per_page,
    };
    let runs = state
        .store
        .sync_releases
        .list_runs(job_type, page.limit(), page.offset())
        .await?;

    let mut response = Vec::with_capacity(runs.len());
    for run in runs {
        let targets = state.store.sync_releases.targets_of_run(run.id).await?;
        response.push(SyncReleaseResponse {
            id: run.id,
            job_type: run.job_type.to_string(),
            status: run.status.to_string(),
            submitted_time: optional_time(Some(run.submitted_time)),
            targets: targets.into_iter().map(Into::into).collect(),
        });
    }
    Ok(Json(response))
}

async fn list_vm_image_builds(
    State(state): State<AppState>,
    Query(page): Query<Pagination>,
) -> Result<Json<Vec<VmImageBuildResponse>>, ApiError> {
    let builds = state
        .store
        .vm_image_builds
        .list(page.limit(), page.offset())
        .await?;
    Ok(Json(builds.into_iter().map(Into::into).collect()))
}

async fn get_vm_image_build(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<VmImageBuildResponse>, ApiError> {
    Ok(Json(state.store.vm_image_builds.get(id).await?.into()))
}

#[cfg(test)]
mod tests {
    use crate::routes::test_support::TestApp;
    use distbot_config::ServiceConfig;
    use distbot_core::BuildStatus;
    use distbot_core::status::{SyncReleaseJobType, SyncReleaseStatus, SyncReleaseTargetStatus};
    use distbot_db::{BuildUpdate, NewKojiBuild};
    use serde_json::json;

    #[tokio::test]
    async fn test_koji_builds_filter_scratch() {
        let app = TestApp::new(ServiceConfig::default());
        let koji = &app.state.store.koji_builds;
        let group = koji.create_group().await.unwrap();
        for (build_id, scratch) in [("94225123", true), ("2058711", false)] {
            let build = koji
                .create_target(NewKojiBuild {
                    group_id: group.id,
                    build_id: build_id.into(),
                    commit_sha: "ad0c308af91da45cf40b253cd82f07f63ea9cbbf".into(),
                    target: "f37".into(),
                    scratch,
                    status: BuildStatus::Running,
                    web_url: None,
                    build_logs_url: None,
                    data: json!({"koji_state": "OPEN"}),
                })
                .await
                .unwrap();
            koji.update(build.id, BuildUpdate::status(BuildStatus::Success))
                .await
                .unwrap();
        }

        let (status, body) = app.get_json("/api/v1/koji-builds?scratch=true").await;
        assert_eq!(status, 200);
        let builds = body.as_array().unwrap();
        assert_eq!(builds.len(), 1);
        assert_eq!(builds[0]["task_id"], "94225123");
        assert_eq!(builds[0]["status"], "success");
        assert_eq!(builds[0]["koji_state"], "OPEN");
        assert!(builds[0]["build_finished_time"].is_null());

        let (_, body) = app.get_json("/api/v1/koji-builds").await;
        assert_eq!(body.as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_sync_releases_with_targets() {
        let app = TestApp::new(ServiceConfig::default());
        let sync = &app.state.store.sync_releases;
        let run = sync
            .create_run(SyncReleaseJobType::ProposeDownstream, SyncReleaseStatus::Finished)
            .await
            .unwrap();
        sync.create_target(run.id, "f37", SyncReleaseTargetStatus::Submitted)
            .await
            .unwrap();

        let (status, body) = app
            .get_json("/api/v1/sync-releases?job_type=propose_downstream")
            .await;
        assert_eq!(status, 200);
        assert_eq!(body[0]["status"], "finished");
        assert_eq!(body[0]["targets"][0]["branch"], "f37");

        let (status, _) = app.get_json("/api/v1/sync-releases?job_type=bogus").await;
        assert_eq!(status, 400);
    }
}
