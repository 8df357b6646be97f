//! Copr builds: submission and the start/end messages that follow.

use async_trait::async_trait;
use chrono::Utc;
use distbot_core::backends::CoprScmBuild;
use distbot_core::event::{CoprBuildEvent, CoprBuildTopic};
use distbot_core::status::ProjectEventType;
use distbot_core::{BuildStatus, CommitState, Event, JobType, ProjectRef, TaskResults};
use distbot_db::{BuildUpdate, NewCoprBuild, NewPipeline, PipelineArtifact};
use serde_json::json;
use std::time::Duration;
use tracing::{info, warn};

use super::{
    EventData, HandlerInvocation, HandlerKind, JobHandler, datetime_from_timestamp,
    job_trigger_of, origin_of, resolve_targets, unexpected_event,
};
use crate::context::WorkerContext;
use crate::error::{WorkerError, WorkerResult};
use crate::tasks::Task;

pub(super) fn status_name(chroot: &str) -> String {
    format!("rpm-build-{}", chroot)
}

/// Copr project builds of `project` go to when the job names none:
/// `{namespace}-{repo}-{identifier}` with the PR number, branch or
/// `releases` as identifier.
pub(super) fn copr_project_name(
    project: &ProjectRef,
    project_event: Option<&(ProjectEventType, String)>,
) -> String {
    let identifier = match project_event {
        Some((ProjectEventType::Release, _)) => "releases".to_string(),
        Some((_, identifier)) => identifier.clone(),
        None => "main".to_string(),
    };
    format!("{}-{}-{}", project.namespace, project.repo, identifier).replace('/', "-")
}

fn copr_event(inv: &HandlerInvocation) -> WorkerResult<&CoprBuildEvent> {
    match &inv.data.event {
        Event::CoprBuild(event) => Ok(event),
        _ => Err(unexpected_event(inv)),
    }
}

pub struct CoprBuildHandler;

#[async_trait]
impl JobHandler for CoprBuildHandler {
    async fn run(&self, ctx: &WorkerContext, inv: &HandlerInvocation) -> WorkerResult<TaskResults> {
        let job = inv.job()?;
        let data = &inv.data;
        let project = data.project()?;
        let commit_sha = data.commit_or_ref()?.to_string();
        let chroots = resolve_targets(ctx, &inv.targets()?).await?;

        let owner = job.owner.clone().unwrap_or_else(|| ctx.config.copr.owner.clone());
        let project_name = job
            .project
            .clone()
            .unwrap_or_else(|| copr_project_name(project, data.project_event.as_ref()));

        ctx.copr
            .ensure_project(
                &owner,
                &project_name,
                &chroots,
                &format!("Builds of {}", project.project_url()),
            )
            .await?;
        let submitted = ctx
            .copr
            .submit_scm_build(&CoprScmBuild {
                owner: owner.clone(),
                project: project_name.clone(),
                clone_url: project.clone_url(),
                committish: commit_sha.clone(),
                spec: inv.package_config.as_ref().and_then(|p| p.specfile_path.clone()),
                chroots: chroots.clone(),
            })
            .await?;
        let build_id = submitted.build_id.to_string();
        info!(
            project = %project,
            copr_project = %project_name,
            build_id = %build_id,
            "Submitted Copr build"
        );

        let trigger = data.trigger_record(ctx).await?;
        let srpm = ctx
            .store
            .srpm_builds
            .create(&commit_sha, BuildStatus::Pending)
            .await?;
        ctx.store
            .srpm_builds
            .set_copr_build(srpm.id, &build_id, &submitted.web_url)
            .await?;

        let group = ctx.store.copr_builds.create_group().await?;
        for chroot in &chroots {
            ctx.store
                .copr_builds
                .create_target(NewCoprBuild {
                    group_id: group.id,
                    build_id: build_id.clone(),
                    commit_sha: commit_sha.clone(),
                    target: chroot.clone(),
                    owner: owner.clone(),
                    project_name: project_name.clone(),
                    web_url: Some(submitted.web_url.clone()),
                    status: BuildStatus::WaitingForSrpm,
                })
                .await?;
            ctx.store
                .pipelines
                .create(
                    NewPipeline::new(trigger.id, PipelineArtifact::CoprBuildGroup(group.id))
                        .with_srpm(srpm.id),
                )
                .await?;
        }

        let names: Vec<String> = chroots.iter().map(|c| status_name(c)).collect();
        ctx.reporter(project, &commit_sha, data.pr_id)?
            .set_status_all(
                CommitState::Pending,
                "Starting RPM build...",
                &names,
                Some(&submitted.web_url),
            )
            .await;

        Ok(TaskResults::success()
            .with("build_id", json!(build_id))
            .with("chroots", json!(chroots)))
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
        let names: Vec<String> = inv.targets()?.iter().map(|c| status_name(c)).collect();
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

pub struct CoprBuildStartHandler;

#[async_trait]
impl JobHandler for CoprBuildStartHandler {
    async fn run(&self, ctx: &WorkerContext, inv: &HandlerInvocation) -> WorkerResult<TaskResults> {
        let event = copr_event(inv)?;
        let build_id = event.build_id.to_string();
        let start_time = event
            .timestamp
            .and_then(datetime_from_timestamp)
            .unwrap_or_else(Utc::now);
        let logs_url = ctx.copr.build_logs_url(
            &event.owner,
            &event.project_name,
            event.build_id,
            &event.chroot,
        );

        if event.is_srpm() {
            let Some(srpm) = ctx.store.srpm_builds.get_by_copr_build_id(&build_id).await? else {
                return Ok(TaskResults::skipped(format!("SRPM build of Copr build {} not found", build_id)));
            };
            ctx.store
                .srpm_builds
                .update(
                    srpm.id,
                    BuildUpdate {
                        status: Some(BuildStatus::Running),
                        start_time: Some(start_time),
                        logs_url: Some(logs_url),
                        ..Default::default()
                    },
                )
                .await?;
            info!(build_id = %build_id, "SRPM build started");
            return Ok(TaskResults::success());
        }

        let Some(build) = ctx
            .store
            .copr_builds
            .get_by_build(&build_id, &event.chroot)
            .await?
        else {
            return Ok(TaskResults::skipped(format!(
                "Copr build {} for {} not found",
                build_id, event.chroot
            )));
        };
        ctx.store
            .copr_builds
            .update(
                build.id,
                BuildUpdate {
                    status: Some(BuildStatus::Running),
                    start_time: Some(start_time),
                    logs_url: Some(logs_url),
                    ..Default::default()
                },
            )
            .await?;

        if let Some(group_id) = build.copr_build_group_id {
            let origin = origin_of(ctx, PipelineArtifact::CoprBuildGroup(group_id)).await?;
            ctx.reporter(&origin.project, &build.commit_sha, origin.pr_id)?
                .set_status(
                    CommitState::Running,
                    "RPM build is in progress...",
                    &status_name(&build.target),
                    build.web_url.as_deref(),
                )
                .await;
        }
        Ok(TaskResults::success())
    }
}

pub struct CoprBuildEndHandler;

impl CoprBuildEndHandler {
    async fn srpm_finished(
        &self,
        ctx: &WorkerContext,
        event: &CoprBuildEvent,
        status: BuildStatus,
    ) -> WorkerResult<TaskResults> {
        let build_id = event.build_id.to_string();
        let Some(srpm) = ctx.store.srpm_builds.get_by_copr_build_id(&build_id).await? else {
            return Ok(TaskResults::skipped(format!("SRPM build of Copr build {} not found", build_id)));
        };
        if srpm.status == status {
            return Ok(TaskResults::skipped("State change already processed"));
        }
        ctx.store
            .srpm_builds
            .update(
                srpm.id,
                BuildUpdate {
                    status: Some(status),
                    finished_time: Some(Utc::now()),
                    ..Default::default()
                },
            )
            .await?;

        let builds = ctx.store.copr_builds.list_by_build(&build_id).await?;
        let Some(group_id) = builds.iter().find_map(|b| b.copr_build_group_id) else {
            return Ok(TaskResults::success());
        };
        let origin = origin_of(ctx, PipelineArtifact::CoprBuildGroup(group_id)).await?;

        for build in builds.iter().filter(|b| b.status == BuildStatus::WaitingForSrpm) {
            let (target_status, description) = if status == BuildStatus::Success {
                (BuildStatus::Pending, "SRPM build succeeded, waiting for RPM build...")
            } else {
                (BuildStatus::Failure, "SRPM build failed.")
            };
            ctx.store
                .copr_builds
                .update(build.id, BuildUpdate::status(target_status))
                .await?;
            ctx.reporter(&origin.project, &build.commit_sha, origin.pr_id)?
                .set_status(
                    target_status.into(),
                    description,
                    &status_name(&build.target),
                    srpm.logs_url.as_deref().or(build.web_url.as_deref()),
                )
                .await;
        }
        Ok(TaskResults::success())
    }

    /// Queue the `tests` jobs waiting for this chroot.
    async fn schedule_tests(
        &self,
        ctx: &WorkerContext,
        event: &CoprBuildEvent,
        origin: &super::Origin,
        commit_sha: &str,
    ) -> WorkerResult<usize> {
        let Some(package_config) = ctx.package_config(&origin.project, commit_sha).await? else {
            return Ok(0);
        };
        let trigger = job_trigger_of(origin.trigger.trigger_type);

        let mut scheduled = 0;
        for job in package_config
            .jobs
            .iter()
            .filter(|j| j.job == JobType::Tests && j.trigger == trigger && !j.skip_build)
        {
            let targets = resolve_targets(ctx, &job.effective_targets()).await?;
            if !targets.contains(&event.chroot) {
                continue;
            }
            let data = EventData {
                event: Event::CoprBuild(event.clone()),
                project: Some(origin.project.clone()),
                commit_sha: Some(commit_sha.to_string()),
                git_ref: Some(commit_sha.to_string()),
                pr_id: origin.pr_id,
                actor: None,
                project_event: Some((
                    origin.trigger.trigger_type,
                    origin.trigger.identifier.clone(),
                )),
            };
            let inv = HandlerInvocation::new(HandlerKind::TestingFarm, data)
                .with_config(package_config.clone(), job.clone())
                .with_targets(vec![event.chroot.clone()]);
            ctx.tasks.schedule(Task::RunHandler(inv), Duration::ZERO).await?;
            scheduled += 1;
        }
        Ok(scheduled)
    }
}

#[async_trait]
impl JobHandler for CoprBuildEndHandler {
    async fn run(&self, ctx: &WorkerContext, inv: &HandlerInvocation) -> WorkerResult<TaskResults> {
        let event = copr_event(inv)?;
        if event.topic != CoprBuildTopic::Finished {
            return Err(unexpected_event(inv));
        }
        let status = event.build_status();
        if event.is_srpm() {
            return self.srpm_finished(ctx, event, status).await;
        }

        let build_id = event.build_id.to_string();
        let Some(build) = ctx
            .store
            .copr_builds
            .get_by_build(&build_id, &event.chroot)
            .await?
        else {
            return Ok(TaskResults::skipped(format!(
                "Copr build {} for {} not found",
                build_id, event.chroot
            )));
        };
        if build.status == status {
            return Ok(TaskResults::skipped("State change already processed"));
        }

        let built_packages = if status == BuildStatus::Success {
            match ctx.copr.built_packages(event.build_id, &event.chroot).await {
                Ok(packages) => Some(packages),
                Err(e) => {
                    warn!(build_id = %build_id, error = %e, "Failed to fetch built packages");
                    None
                }
            }
        } else {
            None
        };
        ctx.store
            .copr_builds
            .update(
                build.id,
                BuildUpdate {
                    status: Some(status),
                    finished_time: Some(
                        event
                            .timestamp
                            .and_then(datetime_from_timestamp)
                            .unwrap_or_else(Utc::now),
                    ),
                    built_packages,
                    ..Default::default()
                },
            )
            .await?;
        info!(build_id = %build_id, chroot = %event.chroot, status = %status, "Copr build finished");

        let Some(group_id) = build.copr_build_group_id else {
            return Ok(TaskResults::success());
        };
        let origin = origin_of(ctx, PipelineArtifact::CoprBuildGroup(group_id)).await?;
        let description = if status == BuildStatus::Success {
            "RPMs were built successfully."
        } else {
            "RPMs failed to be built."
        };
        ctx.reporter(&origin.project, &build.commit_sha, origin.pr_id)?
            .set_status(
                status.into(),
                description,
                &status_name(&build.target),
                build.web_url.as_deref(),
            )
            .await;

        let mut results = TaskResults::success();
        if status == BuildStatus::Success {
            let scheduled = self
                .schedule_tests(ctx, event, &origin, &build.commit_sha)
                .await?;
            results = results.with("tests_scheduled", json!(scheduled));
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::run_handler;
    use crate::testing::{TestEnv, pull_request, upstream};
    use distbot_core::{JobConfig, JobTrigger, PackageConfig};

    const CONFIG: &str = r#"
        job "copr_build" trigger="pull_request" {
            targets "fedora-37-x86_64" "fedora-rawhide-x86_64"
        }
        job "tests" trigger="pull_request" {
            targets "fedora-37-x86_64"
        }
    "#;

    fn build_invocation() -> HandlerInvocation {
        let mut job = JobConfig::new(JobType::CoprBuild, JobTrigger::PullRequest);
        job.targets = vec!["fedora-37-x86_64".into(), "fedora-rawhide-x86_64".into()];
        HandlerInvocation::new(HandlerKind::CoprBuild, EventData::from_event(pull_request()))
            .with_config(PackageConfig::default(), job)
    }

    fn copr_message(topic: CoprBuildTopic, chroot: &str, status: i64) -> HandlerInvocation {
        let handler = match topic {
            CoprBuildTopic::Started => HandlerKind::CoprBuildStart,
            CoprBuildTopic::Finished => HandlerKind::CoprBuildEnd,
        };
        let event = Event::CoprBuild(CoprBuildEvent {
            topic,
            build_id: 1001,
            chroot: chroot.into(),
            status,
            owner: "distbot".into(),
            project_name: "packit-ogr-342".into(),
            pkg: Some("python-ogr".into()),
            version: Some("0.40.0".into()),
            timestamp: Some(1664892000.5),
        });
        HandlerInvocation::new(handler, EventData::from_event(event))
    }

    #[test]
    fn test_copr_project_name() {
        let project = upstream();
        assert_eq!(
            copr_project_name(&project, Some(&(ProjectEventType::PullRequest, "342".into()))),
            "packit-ogr-342"
        );
        assert_eq!(
            copr_project_name(&project, Some(&(ProjectEventType::Release, "0.40.0".into()))),
            "packit-ogr-releases"
        );
        assert_eq!(
            copr_project_name(&project, Some(&(ProjectEventType::BranchPush, "feature/x".into()))),
            "packit-ogr-feature-x"
        );
    }

    #[tokio::test]
    async fn test_build_creates_records_and_reports() {
        let env = TestEnv::new();
        let result = run_handler(&env.ctx, &build_invocation()).await;
        assert!(result.success, "{:?}", result);

        let submitted = env.copr.submitted();
        assert_eq!(submitted.len(), 1);
        assert_eq!(submitted[0].project, "packit-ogr-342");
        assert_eq!(submitted[0].owner, "distbot");
        assert_eq!(submitted[0].clone_url, "https://github.com/packit/ogr.git");

        let builds = env.ctx.store.copr_builds.list_by_build("1001").await.unwrap();
        assert_eq!(builds.len(), 2);
        assert!(builds.iter().all(|b| b.status == BuildStatus::WaitingForSrpm));
        let srpm = env.ctx.store.srpm_builds.get_by_copr_build_id("1001").await.unwrap().unwrap();
        let pipelines = env
            .ctx
            .store
            .pipelines
            .find_by_artifact(PipelineArtifact::CoprBuildGroup(builds[0].copr_build_group_id.unwrap()))
            .await
            .unwrap();
        assert_eq!(pipelines.len(), 2);
        assert!(pipelines.iter().all(|p| p.srpm_build_id == Some(srpm.id)));

        let statuses = env.forge.statuses();
        assert_eq!(statuses.len(), 2);
        assert!(statuses.iter().all(|(_, s)| s.state == CommitState::Pending));
        assert_eq!(statuses[0].1.context, "distbot/rpm-build-fedora-37-x86_64");
    }

    #[tokio::test]
    async fn test_submit_failure_reports_error() {
        let env = TestEnv::new();
        *env.copr.fail.lock().unwrap() = Some(("chroot not enabled".into(), false));

        let result = run_handler(&env.ctx, &build_invocation()).await;
        assert!(!result.success);
        let statuses = env.forge.statuses();
        assert_eq!(statuses.len(), 2);
        assert!(statuses.iter().all(|(_, s)| s.state == CommitState::Error));
        assert!(statuses[0].1.description.contains("chroot not enabled"));
    }

    #[tokio::test]
    async fn test_build_lifecycle() {
        let env = TestEnv::new().with_package_config(CONFIG);
        assert!(run_handler(&env.ctx, &build_invocation()).await.success);

        let started = run_handler(&env.ctx, &copr_message(CoprBuildTopic::Started, "srpm-builds", 3)).await;
        assert!(started.success);
        let srpm = env.ctx.store.srpm_builds.get_by_copr_build_id("1001").await.unwrap().unwrap();
        assert_eq!(srpm.status, BuildStatus::Running);
        assert!(srpm.start_time.is_some());

        let srpm_done = run_handler(&env.ctx, &copr_message(CoprBuildTopic::Finished, "srpm-builds", 1)).await;
        assert!(srpm_done.success);
        let builds = env.ctx.store.copr_builds.list_by_build("1001").await.unwrap();
        assert!(builds.iter().all(|b| b.status == BuildStatus::Pending));

        let chroot_started =
            run_handler(&env.ctx, &copr_message(CoprBuildTopic::Started, "fedora-37-x86_64", 3)).await;
        assert!(chroot_started.success);
        let (_, last) = env.forge.statuses().pop().unwrap();
        assert_eq!(last.state, CommitState::Running);

        let finished =
            run_handler(&env.ctx, &copr_message(CoprBuildTopic::Finished, "fedora-37-x86_64", 1)).await;
        assert!(finished.success, "{:?}", finished);
        assert_eq!(finished.details["tests_scheduled"], json!(1));

        let build = env
            .ctx
            .store
            .copr_builds
            .get_by_build("1001", "fedora-37-x86_64")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(build.status, BuildStatus::Success);
        assert!(build.built_packages.is_some());

        let scheduled = env.tasks.take();
        assert_eq!(scheduled.len(), 1);
        match &scheduled[0].0 {
            Task::RunHandler(inv) => {
                assert_eq!(inv.handler, HandlerKind::TestingFarm);
                assert_eq!(inv.targets_override, Some(vec!["fedora-37-x86_64".to_string()]));
                assert_eq!(inv.data.pr_id, Some(342));
            }
            other => panic!("unexpected task {other:?}"),
        }

        let repeated =
            run_handler(&env.ctx, &copr_message(CoprBuildTopic::Finished, "fedora-37-x86_64", 1)).await;
        assert_eq!(repeated.msg(), Some("State change already processed"));
    }

    #[tokio::test]
    async fn test_failed_srpm_fails_targets() {
        let env = TestEnv::new();
        assert!(run_handler(&env.ctx, &build_invocation()).await.success);

        let result = run_handler(&env.ctx, &copr_message(CoprBuildTopic::Finished, "srpm-builds", 0)).await;
        assert!(result.success);

        let builds = env.ctx.store.copr_builds.list_by_build("1001").await.unwrap();
        assert!(builds.iter().all(|b| b.status == BuildStatus::Failure));
        let statuses = env.forge.statuses();
        assert_eq!(
            statuses.iter().filter(|(_, s)| s.state == CommitState::Failure).count(),
            2
        );
    }

    #[tokio::test]
    async fn test_unknown_build_is_skipped() {
        let env = TestEnv::new();
        let result =
            run_handler(&env.ctx, &copr_message(CoprBuildTopic::Finished, "fedora-37-x86_64", 1)).await;
        assert!(result.success);
        assert_eq!(result.msg(), Some("Copr build 1001 for fedora-37-x86_64 not found"));
    }
}
