//! Syncing upstream releases into dist-git branches.
//!
//! `propose_downstream` runs from the upstream repository on a release
//! (or on request in a comment); `pull_from_upstream` runs from dist-git
//! when a new upstream version is announced.

use async_trait::async_trait;
use chrono::Utc;
use distbot_core::backends::SyncReleaseRequest;
use distbot_core::status::{SyncReleaseJobType, SyncReleaseStatus, SyncReleaseTargetStatus};
use distbot_core::{CommitState, Error, Event, ProjectRef, TaskResults};
use distbot_db::{NewPipeline, PipelineArtifact, SyncTargetUpdate};
use serde_json::json;
use tracing::{info, warn};

use super::{HandlerInvocation, JobHandler, branch_error_table, resolve_branches, unexpected_event};
use crate::context::WorkerContext;
use crate::error::WorkerResult;
use crate::reporter::report_in_issue_repository;

/// What to sync, common to both directions.
struct SyncPlan {
    job_type: SyncReleaseJobType,
    dist_git: ProjectRef,
    package_name: String,
    version: String,
    upstream_tag: String,
    specfile_path: String,
    upstream_project_url: Option<String>,
    branches: Vec<String>,
}

#[derive(Default)]
struct SyncOutcome {
    pull_requests: Vec<(String, String)>,
    errors: Vec<(String, String)>,
}

/// Record a run, sync every branch and record how each went.
async fn sync_branches(
    ctx: &WorkerContext,
    inv: &HandlerInvocation,
    plan: &SyncPlan,
) -> WorkerResult<SyncOutcome> {
    let trigger = inv.data.trigger_record(ctx).await?;
    let run = ctx
        .store
        .sync_releases
        .create_run(plan.job_type, SyncReleaseStatus::Running)
        .await?;
    ctx.store
        .pipelines
        .create(NewPipeline::new(trigger.id, PipelineArtifact::SyncReleaseRun(run.id)))
        .await?;

    let mut targets = Vec::new();
    for branch in &plan.branches {
        let target = ctx
            .store
            .sync_releases
            .create_target(run.id, branch, SyncReleaseTargetStatus::Queued)
            .await?;
        targets.push(target);
    }

    let mut outcome = SyncOutcome::default();
    for target in targets {
        ctx.store
            .sync_releases
            .update_target(
                target.id,
                SyncTargetUpdate {
                    status: Some(SyncReleaseTargetStatus::Running),
                    start_time: Some(Utc::now()),
                    ..Default::default()
                },
            )
            .await?;

        let request = SyncReleaseRequest {
            dist_git: plan.dist_git.clone(),
            branch: target.branch.clone(),
            package_name: plan.package_name.clone(),
            version: plan.version.clone(),
            upstream_tag: plan.upstream_tag.clone(),
            specfile_path: plan.specfile_path.clone(),
            upstream_project_url: plan.upstream_project_url.clone(),
        };
        let update = match ctx.syncer.sync_release(&request).await {
            Ok(pr_url) => {
                info!(
                    package = %plan.package_name,
                    branch = %target.branch,
                    pr_url = %pr_url,
                    "Opened dist-git pull request"
                );
                outcome.pull_requests.push((target.branch.clone(), pr_url.clone()));
                SyncTargetUpdate {
                    status: Some(SyncReleaseTargetStatus::Submitted),
                    downstream_pr_url: Some(pr_url),
                    finished_time: Some(Utc::now()),
                    ..Default::default()
                }
            }
            Err(e) => {
                warn!(
                    package = %plan.package_name,
                    branch = %target.branch,
                    error = %e,
                    "Sync of release failed"
                );
                outcome.errors.push((target.branch.clone(), e.to_string()));
                SyncTargetUpdate {
                    status: Some(SyncReleaseTargetStatus::Error),
                    logs: Some(e.to_string()),
                    finished_time: Some(Utc::now()),
                    ..Default::default()
                }
            }
        };
        ctx.store.sync_releases.update_target(target.id, update).await?;
    }

    let status = if outcome.errors.is_empty() {
        SyncReleaseStatus::Finished
    } else {
        SyncReleaseStatus::Error
    };
    ctx.store.sync_releases.set_run_status(run.id, status).await?;
    Ok(outcome)
}

fn results(outcome: &SyncOutcome) -> TaskResults {
    let pull_requests: serde_json::Map<String, serde_json::Value> = outcome
        .pull_requests
        .iter()
        .map(|(branch, url)| (branch.clone(), json!(url)))
        .collect();
    let results = if outcome.errors.is_empty() {
        TaskResults::success()
    } else {
        let branches: Vec<&str> = outcome.errors.iter().map(|(b, _)| b.as_str()).collect();
        TaskResults::failure(format!("Sync failed for branches: {}", branches.join(", ")))
    };
    results.with("pull_requests", serde_json::Value::Object(pull_requests))
}

fn status_name(branch: &str) -> String {
    format!("propose-downstream-{}", branch)
}

pub struct ProposeDownstreamHandler;

impl ProposeDownstreamHandler {
    async fn release_tag(ctx: &WorkerContext, inv: &HandlerInvocation) -> WorkerResult<String> {
        if let Event::Release(release) = &inv.data.event {
            return Ok(release.tag_name.clone());
        }
        let project = inv.data.project()?;
        let tag = ctx.forge(project)?.latest_release(project).await?;
        tag.ok_or_else(|| Error::NotFound(format!("no release in {}", project)).into())
    }
}

#[async_trait]
impl JobHandler for ProposeDownstreamHandler {
    async fn run(&self, ctx: &WorkerContext, inv: &HandlerInvocation) -> WorkerResult<TaskResults> {
        let data = &inv.data;
        let project = data.project()?;
        let package = inv.package()?;
        let job = inv.job()?;

        let tag = Self::release_tag(ctx, inv).await?;
        let version = package.version_from_tag(&tag).unwrap_or_else(|| tag.clone());
        let package_name = package
            .downstream_package_name
            .clone()
            .unwrap_or_else(|| project.repo.clone());
        let plan = SyncPlan {
            job_type: SyncReleaseJobType::ProposeDownstream,
            dist_git: ctx.dist_git_project(&package_name)?,
            specfile_path: package
                .specfile_path
                .clone()
                .unwrap_or_else(|| format!("{}.spec", package_name)),
            package_name,
            version,
            upstream_tag: tag.clone(),
            upstream_project_url: Some(project.project_url()),
            branches: resolve_branches(ctx, &job.dist_git_branches).await?,
        };

        let reporter = match data.commit_sha.as_deref() {
            Some(sha) => Some(ctx.reporter(project, sha, data.pr_id)?),
            None => None,
        };
        if let Some(reporter) = &reporter {
            let names: Vec<String> = plan.branches.iter().map(|b| status_name(b)).collect();
            reporter
                .set_status_all(CommitState::Running, "Proposing downstream...", &names, None)
                .await;
        }

        let outcome = sync_branches(ctx, inv, &plan).await?;

        if let Some(reporter) = &reporter {
            for (branch, url) in &outcome.pull_requests {
                reporter
                    .set_status(
                        CommitState::Success,
                        "Pull request was opened in dist-git.",
                        &status_name(branch),
                        Some(url),
                    )
                    .await;
            }
            for (branch, _) in &outcome.errors {
                reporter
                    .set_status(
                        CommitState::Failure,
                        "Propose downstream failed.",
                        &status_name(branch),
                        None,
                    )
                    .await;
            }
        }

        if !outcome.errors.is_empty() {
            let body = format!(
                "distbot failed on updating dist-git to release {}:\n\n{}\n\
                 You can retrigger the update by adding a comment (`{} propose-downstream`) into this issue.\n",
                tag,
                branch_error_table(&outcome.errors),
                ctx.config.comment_prefix
            );
            report_in_issue_repository(
                ctx,
                package,
                &format!("Propose downstream failed for release {}", tag),
                &body,
            )
            .await?;
        }
        Ok(results(&outcome))
    }
}

pub struct PullFromUpstreamHandler;

#[async_trait]
impl JobHandler for PullFromUpstreamHandler {
    async fn run(&self, ctx: &WorkerContext, inv: &HandlerInvocation) -> WorkerResult<TaskResults> {
        let Event::UpstreamRelease(release) = &inv.data.event else {
            return Err(unexpected_event(inv));
        };
        let package = inv.package()?;
        let job = inv.job()?;

        let branches = if job.dist_git_branches.is_empty() {
            vec![inv.data.commit_or_ref()?.to_string()]
        } else {
            resolve_branches(ctx, &job.dist_git_branches).await?
        };
        let plan = SyncPlan {
            job_type: SyncReleaseJobType::PullFromUpstream,
            dist_git: inv.data.project()?.clone(),
            package_name: release.package_name.clone(),
            version: release.version.clone(),
            upstream_tag: package.upstream_tag(&release.version),
            specfile_path: package
                .specfile_path
                .clone()
                .unwrap_or_else(|| format!("{}.spec", release.package_name)),
            upstream_project_url: release.upstream_project_url.clone(),
            branches,
        };
        let outcome = sync_branches(ctx, inv, &plan).await?;
        Ok(results(&outcome))
    }
}
