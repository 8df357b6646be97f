//! Koji builds: upstream scratch builds, downstream builds from dist-git,
//! and the task and build state messages that follow.

use async_trait::async_trait;
use chrono::Utc;
use distbot_config::aliases::{koji_target_for_branch, koji_target_for_chroot};
use distbot_core::event::KojiBuildEvent;
use distbot_core::status::ProjectEventType;
use distbot_core::{BuildStatus, CommitState, Event, ForgeKind, ProjectRef, TaskResults};
use distbot_db::{BuildUpdate, NewKojiBuild, NewPipeline, PipelineArtifact};
use serde_json::json;
use tracing::{info, warn};

use super::{
    HandlerInvocation, JobHandler, branch_error_table, datetime_from_timestamp, origin_of,
    resolve_branches, resolve_targets, retry_delay, unexpected_event,
};
use crate::context::WorkerContext;
use crate::error::{WorkerError, WorkerResult};
use crate::reporter::report_in_issue_repository;
use crate::tasks::Task;

const SCRATCH_TARGET_DATA: &str = "koji_target";
pub(crate) const DOWNSTREAM_ISSUE_TITLE: &str = "Fedora Koji build failed to be triggered";

fn status_name(target: &str) -> String {
    format!("koji-build-{}", target)
}

fn scm_url(project: &ProjectRef, committish: &str) -> String {
    format!("git+{}#{}", project.clone_url(), committish)
}

pub struct UpstreamKojiBuildHandler;

#[async_trait]
impl JobHandler for UpstreamKojiBuildHandler {
    async fn run(&self, ctx: &WorkerContext, inv: &HandlerInvocation) -> WorkerResult<TaskResults> {
        let data = &inv.data;
        let project = data.project()?;
        let commit_sha = data.commit_or_ref()?.to_string();
        let chroots = resolve_targets(ctx, &inv.targets()?).await?;
        let scm_url = scm_url(project, &commit_sha);

        let mut tasks = Vec::new();
        let mut errors = Vec::new();
        for chroot in &chroots {
            let koji_target = koji_target_for_chroot(chroot);
            match ctx.koji.scratch_build(&scm_url, &koji_target).await {
                Ok(task_id) => {
                    info!(project = %project, target = %koji_target, task_id, "Submitted Koji scratch build");
                    tasks.push((chroot.clone(), koji_target, task_id));
                }
                Err(e) => {
                    warn!(project = %project, target = %koji_target, error = %e, "Koji scratch build failed");
                    errors.push((chroot.clone(), e));
                }
            }
        }
        if tasks.is_empty() {
            if let Some((_, e)) = errors.into_iter().next() {
                return Err(e.into());
            }
            return Ok(TaskResults::skipped("No targets to build"));
        }

        let trigger = data.trigger_record(ctx).await?;
        let group = ctx.store.koji_builds.create_group().await?;
        let reporter = ctx.reporter(project, &commit_sha, data.pr_id)?;
        for (chroot, koji_target, task_id) in &tasks {
            let web_url = ctx.koji.task_web_url(*task_id);
            ctx.store
                .koji_builds
                .create_target(NewKojiBuild {
                    group_id: group.id,
                    build_id: task_id.to_string(),
                    commit_sha: commit_sha.clone(),
                    target: chroot.clone(),
                    scratch: true,
                    status: BuildStatus::Pending,
                    web_url: Some(web_url.clone()),
                    build_logs_url: None,
                    data: json!({ SCRATCH_TARGET_DATA: koji_target }),
                })
                .await?;
            reporter
                .set_status(
                    CommitState::Pending,
                    "Koji scratch build has been submitted...",
                    &status_name(chroot),
                    Some(&web_url),
                )
                .await;
        }
        ctx.store
            .pipelines
            .create(NewPipeline::new(trigger.id, PipelineArtifact::KojiBuildGroup(group.id)))
            .await?;

        let task_ids: Vec<u64> = tasks.iter().map(|(_, _, id)| *id).collect();
        if errors.is_empty() {
            return Ok(TaskResults::success().with("task_ids", json!(task_ids)));
        }

        let failed: Vec<String> = errors.iter().map(|(chroot, _)| chroot.clone()).collect();
        let message = format!("Koji scratch build failed for targets: {}", failed.join(", "));
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
                .with("task_ids", json!(task_ids)));
        }

        for (chroot, e) in &errors {
            reporter
                .set_status(
                    CommitState::Error,
                    &format!("Submit of the build failed: {}", e),
                    &status_name(chroot),
                    None,
                )
                .await;
        }
        Ok(TaskResults::failure(message).with("task_ids", json!(task_ids)))
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
                &format!("Submit of the build failed: {}", error),
                &names,
                None,
            )
            .await;
        Ok(())
    }
}

pub struct KojiTaskReportHandler;

#[async_trait]
impl JobHandler for KojiTaskReportHandler {
    async fn run(&self, ctx: &WorkerContext, inv: &HandlerInvocation) -> WorkerResult<TaskResults> {
        let Event::KojiTask(event) = &inv.data.event else {
            return Err(unexpected_event(inv));
        };
        let task_id = event.task_id.to_string();
        let Some(build) = ctx.store.koji_builds.get_by_build_id(&task_id).await? else {
            return Ok(TaskResults::skipped(format!("Koji task {} not found", task_id)));
        };

        let status = event.state.build_status();
        if build.status == status {
            return Ok(TaskResults::skipped("State change already processed"));
        }

        let web_url = ctx.koji.task_web_url(event.task_id);
        let logs_url = ctx
            .koji
            .task_logs_url(event.rpm_build_task_id.unwrap_or(event.task_id));
        let finished_time = if status.is_final() {
            Some(
                event
                    .completion_time
                    .and_then(datetime_from_timestamp)
                    .unwrap_or_else(Utc::now),
            )
        } else {
            None
        };
        ctx.store
            .koji_builds
            .update(
                build.id,
                BuildUpdate {
                    status: Some(status),
                    start_time: event.start_time.and_then(datetime_from_timestamp),
                    finished_time,
                    web_url: Some(web_url.clone()),
                    logs_url: Some(logs_url),
                    data: Some(json!({ "koji_state": event.state.as_str() })),
                    built_packages: None,
                },
            )
            .await?;
        info!(task_id = %task_id, state = %event.state, "Koji task changed state");

        if let Some(group_id) = build.koji_build_group_id {
            let origin = origin_of(ctx, PipelineArtifact::KojiBuildGroup(group_id)).await?;
            let description = match status {
                BuildStatus::Success => "RPMs were built successfully.",
                BuildStatus::Running => "RPM build is in progress...",
                BuildStatus::Pending | BuildStatus::WaitingForSrpm => "RPM build has been submitted...",
                BuildStatus::Failure | BuildStatus::Error => "RPMs failed to be built.",
            };
            ctx.reporter(&origin.project, &build.commit_sha, origin.pr_id)?
                .set_status(status.into(), description, &status_name(&build.target), Some(&web_url))
                .await;
        }
        Ok(TaskResults::success())
    }
}

pub struct DownstreamKojiBuildHandler;

impl DownstreamKojiBuildHandler {
    /// Dist-git repository builds are made from.
    fn dist_git(ctx: &WorkerContext, inv: &HandlerInvocation) -> WorkerResult<ProjectRef> {
        let project = inv.data.project()?;
        if project.forge == ForgeKind::Pagure {
            return Ok(project.clone());
        }
        let package = inv.package()?;
        let name = package
            .downstream_package_name
            .clone()
            .unwrap_or_else(|| project.repo.clone());
        ctx.dist_git_project(&name)
    }
}

#[async_trait]
impl JobHandler for DownstreamKojiBuildHandler {
    async fn pre_check(
        &self,
        ctx: &WorkerContext,
        inv: &HandlerInvocation,
    ) -> WorkerResult<Option<String>> {
        let Event::DistGitPush(push) = &inv.data.event else {
            return Ok(None);
        };
        let branches = resolve_branches(ctx, &inv.job()?.dist_git_branches).await?;
        if !branches.contains(&push.branch) {
            return Ok(Some(format!(
                "Koji builds are not configured for branch {}",
                push.branch
            )));
        }
        Ok(None)
    }

    async fn run(&self, ctx: &WorkerContext, inv: &HandlerInvocation) -> WorkerResult<TaskResults> {
        let job = inv.job()?;
        let data = &inv.data;
        let dist_git = Self::dist_git(ctx, inv)?;

        let branches = match (&inv.targets_override, &data.event) {
            (Some(branches), _) => branches.clone(),
            (None, Event::DistGitPush(push)) => vec![push.branch.clone()],
            (None, Event::IssueComment(_)) => resolve_branches(ctx, &job.dist_git_branches).await?,
            _ => return Err(unexpected_event(inv)),
        };

        let mut built = Vec::new();
        let mut errors = Vec::new();
        let mut retriable = false;
        for branch in &branches {
            let committish = match &data.event {
                Event::DistGitPush(push) => push.commit_sha.as_str(),
                _ => branch.as_str(),
            };
            let target = koji_target_for_branch(branch);
            match ctx.koji.build(&scm_url(&dist_git, committish), &target).await {
                Ok(task_id) => {
                    info!(project = %dist_git, branch = %branch, task_id, "Submitted Koji build");
                    built.push((branch.clone(), target, committish.to_string(), task_id));
                }
                Err(e) => {
                    warn!(project = %dist_git, branch = %branch, error = %e, "Koji build failed");
                    retriable |= e.is_retriable();
                    errors.push((branch.clone(), e.to_string()));
                }
            }
        }

        if !built.is_empty() {
            let trigger = data.trigger_record(ctx).await?;
            let group = ctx.store.koji_builds.create_group().await?;
            for (branch, target, committish, task_id) in &built {
                ctx.store
                    .koji_builds
                    .create_target(NewKojiBuild {
                        group_id: group.id,
                        build_id: task_id.to_string(),
                        commit_sha: committish.clone(),
                        target: target.clone(),
                        scratch: false,
                        status: BuildStatus::Pending,
                        web_url: Some(ctx.koji.task_web_url(*task_id)),
                        build_logs_url: None,
                        data: json!({ "branch": branch }),
                    })
                    .await?;
            }
            ctx.store
                .pipelines
                .create(NewPipeline::new(trigger.id, PipelineArtifact::KojiBuildGroup(group.id)))
                .await?;
        }

        let task_ids: Vec<u64> = built.iter().map(|(_, _, _, id)| *id).collect();
        if errors.is_empty() {
            return Ok(TaskResults::success().with("task_ids", json!(task_ids)));
        }

        let failed: Vec<String> = errors.iter().map(|(b, _)| b.clone()).collect();
        if retriable && !inv.is_last_try(ctx.config.retry_limit) {
            let delay = retry_delay(inv.attempt);
            ctx.tasks
                .schedule(
                    Task::RunHandler(inv.next_attempt().with_targets(failed.clone())),
                    delay,
                )
                .await?;
            return Ok(TaskResults::failure(format!(
                "Koji build failed for branches: {}",
                failed.join(", ")
            ))
            .with("retry", json!(inv.attempt + 1))
            .with("task_ids", json!(task_ids)));
        }

        let body = format!(
            "distbot failed on creating Koji build in dist-git ({}):\n\n{}\n\
             You can retrigger the build by adding a comment (`{} koji-build`) into this issue.\n",
            dist_git.project_url(),
            branch_error_table(&errors),
            ctx.config.comment_prefix
        );
        if let Some(package) = inv.package_config.as_ref() {
            report_in_issue_repository(ctx, package, DOWNSTREAM_ISSUE_TITLE, &body).await?;
        }
        Ok(TaskResults::failure(format!(
            "Koji build failed for branches: {}",
            failed.join(", ")
        ))
        .with("task_ids", json!(task_ids)))
    }
}

pub struct KojiBuildReportHandler;

impl KojiBuildReportHandler {
    /// Record a build nobody asked distbot for (e.g. one made by a packager).
    async fn record_unknown(
        ctx: &WorkerContext,
        event: &KojiBuildEvent,
        task_id: &str,
        status: BuildStatus,
    ) -> WorkerResult<()> {
        let git_project = ctx.store.projects.get_or_create_project(&event.project).await?;
        let trigger = ctx
            .store
            .projects
            .get_or_create_trigger(git_project.id, ProjectEventType::BranchPush, &event.branch_name)
            .await?;
        let group = ctx.store.koji_builds.create_group().await?;
        ctx.store
            .koji_builds
            .create_target(NewKojiBuild {
                group_id: group.id,
                build_id: task_id.to_string(),
                commit_sha: event.commit_sha.clone(),
                target: "noarch".to_string(),
                scratch: false,
                status,
                web_url: event.task_id.map(|id| ctx.koji.task_web_url(id)),
                build_logs_url: event.task_id.map(|id| ctx.koji.task_logs_url(id)),
                data: json!({ "koji_state": event.state.as_str(), "nvr": event.nvr() }),
            })
            .await?;
        ctx.store
            .pipelines
            .create(NewPipeline::new(trigger.id, PipelineArtifact::KojiBuildGroup(group.id)))
            .await?;
        info!(build = %event.nvr(), task_id = %task_id, "Recorded Koji build");
        Ok(())
    }
}

#[async_trait]
impl JobHandler for KojiBuildReportHandler {
    async fn run(&self, ctx: &WorkerContext, inv: &HandlerInvocation) -> WorkerResult<TaskResults> {
        let Event::KojiBuild(event) = &inv.data.event else {
            return Err(unexpected_event(inv));
        };
        let task_id = event.task_id.unwrap_or(event.build_id).to_string();
        let status = event.state.build_status();

        let Some(build) = ctx.store.koji_builds.get_by_build_id(&task_id).await? else {
            Self::record_unknown(ctx, event, &task_id, status).await?;
            return Ok(TaskResults::success().with("build", json!(event.nvr())));
        };
        if build.status == status
            && build.data.get("koji_state").and_then(|s| s.as_str()) == Some(event.state.as_str())
        {
            return Ok(TaskResults::skipped("State change already processed"));
        }

        let finished_time = status.is_final().then(Utc::now);
        ctx.store
            .koji_builds
            .update(
                build.id,
                BuildUpdate {
                    status: Some(status),
                    finished_time,
                    web_url: event.task_id.map(|id| ctx.koji.task_web_url(id)),
                    logs_url: event.task_id.map(|id| ctx.koji.task_logs_url(id)),
                    data: Some(json!({ "koji_state": event.state.as_str(), "nvr": event.nvr() })),
                    ..Default::default()
                },
            )
            .await?;
        info!(build = %event.nvr(), state = %event.state, "Koji build changed state");
        Ok(TaskResults::success().with("build", json!(event.nvr())))
    }
}
