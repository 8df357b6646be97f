//! Testing Farm runs and their results.

use async_trait::async_trait;
use distbot_core::backends::{CoprArtifact, TestingFarmRequest};
use distbot_core::status::TestingFarmResult;
use distbot_core::{BuildStatus, CommitState, Error, Event, TaskResults};
use distbot_db::{CoprBuildTarget, NewPipeline, NewTestRun, PipelineArtifact};
use serde_json::json;
use tracing::{info, warn};

use super::{
    HandlerInvocation, JobHandler, origin_of, resolve_targets, retry_delay, unexpected_event,
};
use crate::context::WorkerContext;
use crate::error::{WorkerError, WorkerResult};
use crate::tasks::Task;

fn status_name(target: &str) -> String {
    format!("testing-farm-{}", target)
}

/// Testing Farm compose of a build target, e.g. `fedora-37-x86_64` →
/// `Fedora-37`, `epel-9-x86_64` → `CentOS-Stream-9`.
pub(crate) fn compose_for(target: &str) -> (String, String) {
    let (distro, arch) = target.rsplit_once('-').unwrap_or((target, "x86_64"));
    let compose = match distro.split_once('-') {
        Some(("fedora", "rawhide")) => "Fedora-Rawhide".to_string(),
        Some(("fedora", version)) => format!("Fedora-{}", version),
        Some(("epel", version)) => format!("CentOS-Stream-{}", version),
        Some(("centos", rest)) => format!("CentOS-{}", rest.replace("stream", "Stream")),
        _ => distro.to_string(),
    };
    (compose, arch.to_string())
}

pub struct TestingFarmHandler;

impl TestingFarmHandler {
    fn notification_url(ctx: &WorkerContext) -> String {
        format!(
            "https://{}/api/webhooks/testing-farm/results",
            ctx.config.server_name
        )
    }

    /// The newest Copr build of `target` for the commit. `Err` carries the
    /// reason tests cannot run yet.
    async fn copr_build_for(
        ctx: &WorkerContext,
        commit_sha: &str,
        target: &str,
    ) -> WorkerResult<Result<CoprBuildTarget, (CommitState, &'static str)>> {
        let builds = ctx.store.copr_builds.list_by_commit(commit_sha).await?;
        let Some(build) = builds.into_iter().find(|b| b.target == target) else {
            return Ok(Err((CommitState::Pending, "Waiting for a successful RPM build...")));
        };
        Ok(match build.status {
            BuildStatus::Success => Ok(build),
            status if status.is_final() => Err((CommitState::Failure, "Missing successful RPM build.")),
            _ => Err((CommitState::Pending, "Waiting for the RPM build to finish...")),
        })
    }
}

#[async_trait]
impl JobHandler for TestingFarmHandler {
    async fn run(&self, ctx: &WorkerContext, inv: &HandlerInvocation) -> WorkerResult<TaskResults> {
        let job = inv.job()?;
        let data = &inv.data;
        let project = data.project()?;
        let commit_sha = data.commit_or_ref()?.to_string();
        let targets = resolve_targets(ctx, &inv.targets()?).await?;
        let reporter = ctx.reporter(project, &commit_sha, data.pr_id)?;
        let trigger = data.trigger_record(ctx).await?;

        let mut group = None;
        let mut submitted = Vec::new();
        let mut errors = Vec::new();
        for target in &targets {
            let name = status_name(target);
            let copr_builds = if job.skip_build {
                Vec::new()
            } else {
                match Self::copr_build_for(ctx, &commit_sha, target).await? {
                    Ok(build) => vec![build],
                    Err((state, description)) => {
                        info!(target = %target, reason = description, "Not submitting tests");
                        reporter.set_status(state, description, &name, None).await;
                        continue;
                    }
                }
            };

            let artifacts = copr_builds
                .iter()
                .map(|b| {
                    let build_id = b.build_id.parse::<u64>().map_err(|_| {
                        WorkerError::InvalidTask(format!("invalid Copr build id {}", b.build_id))
                    })?;
                    Ok(CoprArtifact {
                        build_id,
                        chroot: b.target.clone(),
                    })
                })
                .collect::<WorkerResult<Vec<_>>>()?;
            let (compose, arch) = compose_for(target);
            let request = TestingFarmRequest {
                git_url: job.fmf_url.clone().unwrap_or_else(|| project.clone_url()),
                git_ref: job.fmf_ref.clone().unwrap_or_else(|| commit_sha.clone()),
                tmt_plan: job.tmt_plan.clone(),
                compose: compose.clone(),
                arch,
                artifacts,
                env: job.env.clone(),
                notification_url: Some(Self::notification_url(ctx)),
            };

            let request_id = match ctx.testing_farm.submit(&request).await {
                Ok(request_id) => request_id,
                Err(e) => {
                    warn!(project = %project, target = %target, error = %e, "Testing Farm submit failed");
                    errors.push((target.clone(), e));
                    continue;
                }
            };
            let web_url = ctx.testing_farm.web_url(&request_id);

            let group_id = match group {
                Some(id) => id,
                None => {
                    let id = ctx.store.test_runs.create_group().await?.id;
                    group = Some(id);
                    id
                }
            };
            let run = ctx
                .store
                .test_runs
                .create_target(NewTestRun {
                    group_id,
                    identifier: job.tmt_plan.clone(),
                    commit_sha: commit_sha.clone(),
                    target: target.clone(),
                    status: TestingFarmResult::New,
                    data: json!({"compose": compose}),
                    copr_build_ids: copr_builds.iter().map(|b| b.id).collect(),
                })
                .await?;
            ctx.store
                .test_runs
                .set_submitted(run.id, &request_id, &web_url)
                .await?;
            ctx.store
                .pipelines
                .create(NewPipeline::new(trigger.id, PipelineArtifact::TestRunGroup(group_id)))
                .await?;
            info!(project = %project, target = %target, request_id = %request_id, "Submitted tests");

            reporter
                .set_status(
                    CommitState::Pending,
                    "Tests have been submitted ...",
                    &name,
                    Some(&web_url),
                )
                .await;
            submitted.push(request_id);
        }

        if errors.is_empty() {
            return Ok(TaskResults::success().with("pipeline_ids", json!(submitted)));
        }
        if submitted.is_empty() {
            let (_, e) = errors.swap_remove(0);
            return Err(e.into());
        }

        let failed: Vec<String> = errors.iter().map(|(target, _)| target.clone()).collect();
        let message = format!("Tests failed to be submitted for: {}", failed.join(", "));
        let retriable = errors.iter().any(|(_, e)| e.is_retriable());
        if retriable && !inv.is_last_try(ctx.config.retry_limit) {
            ctx.tasks
                .schedule(
                    Task::RunHandler(inv.next_attempt().with_targets(failed)),
                    retry_delay(inv.attempt),
                )
                .await?;
            return Ok(TaskResults::failure(message)
                .with("retry", json!(inv.attempt + 1))
                .with("pipeline_ids", json!(submitted)));
        }
        for (target, e) in &errors {
            reporter
                .set_status(
                    CommitState::Error,
                    &format!("Failed to submit tests: {}", e),
                    &status_name(target),
                    None,
                )
                .await;
        }
        Ok(TaskResults::failure(message).with("pipeline_ids", json!(submitted)))
    }

    async fn report_failure(
        &self,
        ctx: &WorkerContext,
        inv: &HandlerInvocation,
        error: &WorkerError,
    ) -> WorkerResult<()> {
        let data = &inv.data;
        let Some(commit_sha) = data.commit_sha.as_deref() else {
            return Ok(());
        };
        let names: Vec<String> = inv.targets()?.iter().map(|t| status_name(t)).collect();
        ctx.reporter(data.project()?, commit_sha, data.pr_id)?
            .set_status_all(
                CommitState::Error,
                &format!("Failed to submit tests: {}", error),
                &names,
                None,
            )
            .await;
        Ok(())
    }
}

pub struct TestingFarmResultsHandler;

fn describe(result: TestingFarmResult) -> &'static str {
    match result {
        TestingFarmResult::Passed => "Tests passed",
        TestingFarmResult::Failed => "Tests failed",
        TestingFarmResult::Skipped => "Tests were skipped",
        TestingFarmResult::Running => "Tests are running",
        TestingFarmResult::New | TestingFarmResult::Queued => "Tests are queued",
        TestingFarmResult::NeedsInspection => "Tests need inspection",
        TestingFarmResult::Error | TestingFarmResult::Unknown => "Error running tests",
    }
}

#[async_trait]
impl JobHandler for TestingFarmResultsHandler {
    async fn run(&self, ctx: &WorkerContext, inv: &HandlerInvocation) -> WorkerResult<TaskResults> {
        let Event::TestingFarmResults(event) = &inv.data.event else {
            return Err(unexpected_event(inv));
        };
        let Some(run) = ctx
            .store
            .test_runs
            .get_by_pipeline_id(&event.pipeline_id)
            .await?
        else {
            return Ok(TaskResults::skipped(format!(
                "Unknown Testing Farm request {}",
                event.pipeline_id
            )));
        };

        let details = ctx.testing_farm.request_details(&event.pipeline_id).await?;
        let result = TestingFarmResult::from_api(&details.state, details.overall_result.as_deref());
        if run.status == result {
            return Ok(TaskResults::skipped("State change already processed"));
        }

        let web_url = details.run_url.clone().or(run.web_url.clone());
        ctx.store
            .test_runs
            .set_status(run.id, result, web_url.as_deref())
            .await?;
        info!(request_id = %event.pipeline_id, result = %result, "Testing Farm result");

        let group_id = run.tft_test_run_group_id.ok_or_else(|| {
            Error::Internal(format!("test run {} without a group", run.id))
        })?;
        let origin = origin_of(ctx, PipelineArtifact::TestRunGroup(group_id)).await?;
        let description = details
            .summary
            .clone()
            .unwrap_or_else(|| describe(result).to_string());
        ctx.reporter(&origin.project, &run.commit_sha, origin.pr_id)?
            .set_status(
                result.into(),
                &description,
                &status_name(&run.target),
                web_url.as_deref(),
            )
            .await;

        Ok(TaskResults::success().with("result", json!(result.as_str())))
    }
}
