//! VM images built from a successful Copr build, on request in a pull
//! request comment.

use async_trait::async_trait;
use distbot_core::backends::ImageCompose;
use distbot_core::event::VmImageBuildResultEvent;
use distbot_core::status::VmImageBuildStatus;
use distbot_core::{BuildStatus, CommitState, Event, TaskResults};
use distbot_db::{CoprBuildTarget, NewPipeline, NewVmImageBuild, PipelineArtifact};
use serde_json::json;
use std::time::Duration;
use tracing::{info, warn};

use super::{HandlerInvocation, JobHandler, origin_of, unexpected_event};
use crate::context::WorkerContext;
use crate::error::WorkerResult;
use crate::tasks::Task;

const FIRST_POLL_DELAY: Duration = Duration::from_secs(10);
const POLL_INTERVAL: Duration = Duration::from_secs(30);
/// Two hours of polling.
const MAX_POLL_ATTEMPTS: u32 = 240;

fn status_name(chroot: &str) -> String {
    format!("vm-image-build-{}", chroot)
}

/// Newest successful Copr build of `chroot` at `commit_sha`.
async fn successful_copr_build(
    ctx: &WorkerContext,
    commit_sha: &str,
    chroot: &str,
) -> WorkerResult<Option<CoprBuildTarget>> {
    let builds = ctx.store.copr_builds.list_by_commit(commit_sha).await?;
    Ok(builds
        .into_iter()
        .find(|b| b.target == chroot && b.status == BuildStatus::Success))
}

pub struct VmImageBuildHandler;

#[async_trait]
impl JobHandler for VmImageBuildHandler {
    async fn pre_check(
        &self,
        ctx: &WorkerContext,
        inv: &HandlerInvocation,
    ) -> WorkerResult<Option<String>> {
        let data = &inv.data;
        let project = data.project()?;
        let actor = data.actor.as_deref().unwrap_or_default();
        let forge = ctx.forge(project)?;
        if !forge.has_write_access(project, actor).await? {
            let message = format!(
                "User {} not allowed to build VM images: only users with write access to the repository can.",
                actor
            );
            if let Some(sha) = data.commit_sha.as_deref() {
                ctx.reporter(project, sha, data.pr_id)?.comment(&message).await;
            }
            return Ok(Some(message));
        }

        let Some(job) = inv.job_config.as_ref() else {
            return Ok(None);
        };
        let chroot = job.copr_chroot.as_deref().unwrap_or_default();
        let sha = data.commit_or_ref()?;
        if successful_copr_build(ctx, sha, chroot).await?.is_none() {
            let message = format!(
                "No successful Copr build found for commit {} and chroot {}",
                sha, chroot
            );
            if let Some(pr_id) = data.pr_id {
                ctx.reporter(project, sha, Some(pr_id))?.comment(&message).await;
            }
            return Ok(Some(message));
        }
        Ok(None)
    }

    async fn run(&self, ctx: &WorkerContext, inv: &HandlerInvocation) -> WorkerResult<TaskResults> {
        let data = &inv.data;
        let project = data.project()?;
        let Some(job) = inv.job_config.as_ref() else {
            return Ok(TaskResults::failure(format!(
                "Job configuration not found for project {}",
                project.repo
            )));
        };
        let Some(request) = job.image_request.clone() else {
            return Ok(TaskResults::failure("Missing image-request in job configuration"));
        };
        let chroot = job.copr_chroot.clone().unwrap_or_default();
        let sha = data.commit_or_ref()?.to_string();
        let Some(copr_build) = successful_copr_build(ctx, &sha, &chroot).await? else {
            return Ok(TaskResults::failure(format!(
                "No successful Copr build found for commit {} and chroot {}",
                sha, chroot
            )));
        };

        let repo_url = ctx
            .copr
            .repo_download_url(&copr_build.owner, &copr_build.project_name, &chroot);
        let compose = ImageCompose {
            distribution: job.image_distribution.clone().unwrap_or_default(),
            image_name: job.image_name.clone().unwrap_or_default(),
            request,
            packages: job.image_packages.clone(),
            repo_url,
        };
        let compose_id = ctx.image_builder.create_image(&compose).await?;
        info!(project = %project, compose_id = %compose_id, "Requested VM image build");

        let trigger = data.trigger_record(ctx).await?;
        let build = ctx
            .store
            .vm_image_builds
            .create(NewVmImageBuild {
                build_id: compose_id.clone(),
                commit_sha: sha.clone(),
                target: chroot.clone(),
                owner: copr_build.owner.clone(),
                project_name: copr_build.project_name.clone(),
                project_url: project.project_url(),
                status: VmImageBuildStatus::Pending,
                data: json!({ "image_name": compose.image_name }),
            })
            .await?;
        ctx.store
            .pipelines
            .create(NewPipeline::new(trigger.id, PipelineArtifact::VmImageBuild(build.id)))
            .await?;
        ctx.tasks
            .schedule(
                Task::BabysitVmImageBuild {
                    build_id: compose_id.clone(),
                    attempt: 0,
                },
                FIRST_POLL_DELAY,
            )
            .await?;

        ctx.reporter(project, &sha, data.pr_id)?
            .set_status(
                CommitState::Pending,
                "",
                &status_name(&chroot),
                Some(&ctx.image_builder.compose_url(&compose_id)),
            )
            .await;
        Ok(TaskResults::success().with("build_id", json!(compose_id)))
    }
}

/// Poll the image builder once; turn a finished compose into a
/// `VmImageBuildResult` event, reschedule otherwise.
pub async fn babysit_vm_image_build(
    ctx: &WorkerContext,
    build_id: &str,
    attempt: u32,
) -> WorkerResult<TaskResults> {
    let result = |status: VmImageBuildStatus, message: String| Task::ProcessEvent {
        event: Event::VmImageBuildResult(VmImageBuildResultEvent {
            build_id: build_id.to_string(),
            status,
            message,
        }),
    };

    match ctx.image_builder.compose_status(build_id).await {
        Ok(compose) => {
            let status = VmImageBuildStatus::from_compose_status(&compose.status);
            if status.is_final() {
                info!(build_id, status = %status, "VM image build finished");
                ctx.tasks
                    .schedule(result(status, compose.error.unwrap_or_default()), Duration::ZERO)
                    .await?;
                return Ok(TaskResults::success().with("status", json!(status)));
            }
        }
        Err(e) => warn!(build_id, attempt, error = %e, "Failed to get compose status"),
    }

    if attempt + 1 >= MAX_POLL_ATTEMPTS {
        warn!(build_id, attempt, "Giving up on VM image build");
        ctx.tasks
            .schedule(
                result(
                    VmImageBuildStatus::Error,
                    "VM image build did not finish in time".to_string(),
                ),
                Duration::ZERO,
            )
            .await?;
        return Ok(TaskResults::failure("VM image build did not finish in time"));
    }

    ctx.tasks
        .schedule(
            Task::BabysitVmImageBuild {
                build_id: build_id.to_string(),
                attempt: attempt + 1,
            },
            POLL_INTERVAL,
        )
        .await?;
    Ok(TaskResults::skipped("VM image build is still in progress"))
}

pub struct VmImageBuildResultHandler;

#[async_trait]
impl JobHandler for VmImageBuildResultHandler {
    async fn run(&self, ctx: &WorkerContext, inv: &HandlerInvocation) -> WorkerResult<TaskResults> {
        let Event::VmImageBuildResult(event) = &inv.data.event else {
            return Err(unexpected_event(inv));
        };
        let Some(build) = ctx.store.vm_image_builds.get_by_build_id(&event.build_id).await? else {
            return Ok(TaskResults::failure(format!(
                "VM image build model {} not updated. DB model not found",
                event.build_id
            )));
        };
        if build.status == event.status {
            return Ok(TaskResults::skipped("State change already processed"));
        }

        let origin = origin_of(ctx, PipelineArtifact::VmImageBuild(build.id)).await?;
        let description = match event.status {
            VmImageBuildStatus::Success => "VM image build succeeded.".to_string(),
            _ if !event.message.is_empty() => event.message.clone(),
            status => format!("VM image build ended with status {}.", status),
        };
        ctx.reporter(&origin.project, &build.commit_sha, origin.pr_id)?
            .set_status(
                event.status.into(),
                &description,
                &status_name(&build.target),
                Some(&ctx.image_builder.compose_url(&build.build_id)),
            )
            .await;
        ctx.store
            .vm_image_builds
            .set_status(build.id, event.status, Some(json!({ "message": event.message })))
            .await?;
        Ok(TaskResults::success().with("status", json!(event.status)))
    }
}
