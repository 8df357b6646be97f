//! Job handlers.
//!
//! A handler is a stateless unit bound to one job type (or to one kind of
//! result message). The dispatcher builds a `HandlerInvocation` and passes
//! it to [`run_handler`], which also takes care of retries.

mod bodhi;
mod copr;
mod installation;
mod koji;
mod sync_release;
mod testing_farm;
mod vm_image;

pub use vm_image::babysit_vm_image_build;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use distbot_config::aliases;
use distbot_core::status::ProjectEventType;
use distbot_core::{
    Event, EventKind, JobConfig, JobTrigger, JobType, PackageConfig, ProjectRef, TaskResults,
};
use distbot_db::{JobTriggerRecord, PipelineArtifact};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::context::WorkerContext;
use crate::error::{WorkerError, WorkerResult};
use crate::tasks::Task;

/// Base delay of handler retries; doubled with every attempt.
const RETRY_BASE: Duration = Duration::from_secs(60);

/// An event together with what had to be looked up to act on it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventData {
    pub event: Event,
    pub project: Option<ProjectRef>,
    pub commit_sha: Option<String>,
    /// Ref the package configuration is read from.
    pub git_ref: Option<String>,
    pub pr_id: Option<u64>,
    pub actor: Option<String>,
    pub project_event: Option<(ProjectEventType, String)>,
}

impl EventData {
    /// Everything the event itself carries, without asking any forge.
    pub fn from_event(event: Event) -> Self {
        Self {
            project: event.project().cloned(),
            commit_sha: event.commit_sha().map(String::from),
            git_ref: event.git_ref(),
            pr_id: event.pr_id(),
            actor: event.actor().map(String::from),
            project_event: event.project_event(),
            event,
        }
    }

    /// Like `from_event`, filling in the commit and ref from the forge
    /// where the payload lacks them.
    pub async fn resolve(ctx: &WorkerContext, event: Event) -> WorkerResult<Self> {
        let mut data = Self::from_event(event);
        match &data.event {
            Event::PullRequestComment(comment) if comment.commit_sha.is_none() => {
                let forge = ctx.forge(&comment.project)?;
                let sha = forge.pr_head_sha(&comment.project, comment.number).await?;
                data.commit_sha = Some(sha.clone());
                data.git_ref = Some(sha);
            }
            Event::IssueComment(comment) => {
                let forge = ctx.forge(&comment.project)?;
                data.git_ref = Some(forge.default_branch(&comment.project).await?);
            }
            Event::Release(release) if data.git_ref.is_none() => {
                data.git_ref = Some(release.tag_name.clone());
            }
            Event::UpstreamRelease(release) => {
                let project = ProjectRef::from_url(&release.distgit_project_url)?;
                let forge = ctx.forge(&project)?;
                data.git_ref = Some(forge.default_branch(&project).await?);
                data.project = Some(project);
            }
            _ => {}
        }
        Ok(data)
    }

    pub fn project(&self) -> WorkerResult<&ProjectRef> {
        self.project.as_ref().ok_or_else(|| {
            WorkerError::InvalidTask(format!("{} event without a project", self.event.kind()))
        })
    }

    /// Commit to build or test: the SHA when known, the ref otherwise.
    pub fn commit_or_ref(&self) -> WorkerResult<&str> {
        self.commit_sha
            .as_deref()
            .or(self.git_ref.as_deref())
            .ok_or_else(|| {
                WorkerError::InvalidTask(format!("{} event without a commit", self.event.kind()))
            })
    }

    /// The job trigger row pipelines of this event hang off.
    pub async fn trigger_record(&self, ctx: &WorkerContext) -> WorkerResult<JobTriggerRecord> {
        let project = self.project()?;
        let (trigger_type, identifier) = self.project_event.clone().ok_or_else(|| {
            WorkerError::InvalidTask(format!("{} event without a trigger", self.event.kind()))
        })?;
        let git_project = ctx.store.projects.get_or_create_project(project).await?;
        Ok(ctx
            .store
            .projects
            .get_or_create_trigger(git_project.id, trigger_type, &identifier)
            .await?)
    }
}

/// One run of one handler; the payload of `Task::RunHandler`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandlerInvocation {
    pub handler: HandlerKind,
    pub data: EventData,
    pub package_config: Option<PackageConfig>,
    pub job_config: Option<JobConfig>,
    /// Restrict the run to these targets (tests after one finished chroot).
    pub targets_override: Option<Vec<String>>,
    pub attempt: u32,
}

impl HandlerInvocation {
    pub fn new(handler: HandlerKind, data: EventData) -> Self {
        Self {
            handler,
            data,
            package_config: None,
            job_config: None,
            targets_override: None,
            attempt: 0,
        }
    }

    pub fn with_config(mut self, package_config: PackageConfig, job_config: JobConfig) -> Self {
        self.package_config = Some(package_config);
        self.job_config = Some(job_config);
        self
    }

    pub fn with_targets(mut self, targets: Vec<String>) -> Self {
        self.targets_override = Some(targets);
        self
    }

    pub fn is_last_try(&self, retry_limit: u32) -> bool {
        self.attempt >= retry_limit
    }

    pub fn next_attempt(&self) -> Self {
        Self {
            attempt: self.attempt + 1,
            ..self.clone()
        }
    }

    pub fn job(&self) -> WorkerResult<&JobConfig> {
        self.job_config.as_ref().ok_or_else(|| {
            WorkerError::InvalidTask(format!("{} without job configuration", self.handler.name()))
        })
    }

    pub fn package(&self) -> WorkerResult<&PackageConfig> {
        self.package_config.as_ref().ok_or_else(|| {
            WorkerError::InvalidTask(format!("{} without package configuration", self.handler.name()))
        })
    }

    /// Configured targets, or the override.
    pub fn targets(&self) -> WorkerResult<Vec<String>> {
        match &self.targets_override {
            Some(targets) => Ok(targets.clone()),
            None => Ok(self.job()?.effective_targets()),
        }
    }
}

#[async_trait]
pub trait JobHandler: Send + Sync {
    /// Reason to skip this run, checked before `run`.
    async fn pre_check(
        &self,
        _ctx: &WorkerContext,
        _inv: &HandlerInvocation,
    ) -> WorkerResult<Option<String>> {
        Ok(None)
    }

    async fn run(&self, ctx: &WorkerContext, inv: &HandlerInvocation) -> WorkerResult<TaskResults>;

    /// Called once the run failed for good.
    async fn report_failure(
        &self,
        _ctx: &WorkerContext,
        _inv: &HandlerInvocation,
        _error: &WorkerError,
    ) -> WorkerResult<()> {
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandlerKind {
    CoprBuild,
    CoprBuildStart,
    CoprBuildEnd,
    TestingFarm,
    TestingFarmResults,
    UpstreamKojiBuild,
    KojiTaskReport,
    DownstreamKojiBuild,
    KojiBuildReport,
    BodhiUpdate,
    ProposeDownstream,
    PullFromUpstream,
    VmImageBuild,
    VmImageBuildResult,
    Installation,
}

impl HandlerKind {
    /// Handlers of configured jobs.
    pub const JOBS: &'static [HandlerKind] = &[
        HandlerKind::CoprBuild,
        HandlerKind::TestingFarm,
        HandlerKind::UpstreamKojiBuild,
        HandlerKind::DownstreamKojiBuild,
        HandlerKind::BodhiUpdate,
        HandlerKind::ProposeDownstream,
        HandlerKind::PullFromUpstream,
        HandlerKind::VmImageBuild,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            HandlerKind::CoprBuild => "copr_build",
            HandlerKind::CoprBuildStart => "copr_build_start",
            HandlerKind::CoprBuildEnd => "copr_build_end",
            HandlerKind::TestingFarm => "testing_farm",
            HandlerKind::TestingFarmResults => "testing_farm_results",
            HandlerKind::UpstreamKojiBuild => "upstream_koji_build",
            HandlerKind::KojiTaskReport => "koji_task_report",
            HandlerKind::DownstreamKojiBuild => "downstream_koji_build",
            HandlerKind::KojiBuildReport => "koji_build_report",
            HandlerKind::BodhiUpdate => "bodhi_update",
            HandlerKind::ProposeDownstream => "propose_downstream",
            HandlerKind::PullFromUpstream => "pull_from_upstream",
            HandlerKind::VmImageBuild => "vm_image_build",
            HandlerKind::VmImageBuildResult => "vm_image_build_result",
            HandlerKind::Installation => "installation",
        }
    }

    /// Job type this handler is configured by; `None` for result handlers.
    pub fn job_type(&self) -> Option<JobType> {
        match self {
            HandlerKind::CoprBuild => Some(JobType::CoprBuild),
            HandlerKind::TestingFarm => Some(JobType::Tests),
            HandlerKind::UpstreamKojiBuild => Some(JobType::UpstreamKojiBuild),
            HandlerKind::DownstreamKojiBuild => Some(JobType::KojiBuild),
            HandlerKind::BodhiUpdate => Some(JobType::BodhiUpdate),
            HandlerKind::ProposeDownstream => Some(JobType::ProposeDownstream),
            HandlerKind::PullFromUpstream => Some(JobType::PullFromUpstream),
            HandlerKind::VmImageBuild => Some(JobType::VmImageBuild),
            _ => None,
        }
    }

    pub fn for_job(job: JobType) -> Option<HandlerKind> {
        Self::JOBS.iter().copied().find(|h| h.job_type() == Some(job))
    }

    /// Key of this handler's result in `ProcessingResults::jobs`.
    pub fn result_key(&self) -> &'static str {
        match self {
            HandlerKind::CoprBuildStart => "copr_build_started",
            HandlerKind::CoprBuildEnd => "copr_build_finished",
            HandlerKind::TestingFarmResults => "report_test_results",
            HandlerKind::KojiTaskReport => "koji_task_report",
            HandlerKind::KojiBuildReport => "koji_build_report",
            HandlerKind::VmImageBuildResult => "vm_image_build_result",
            HandlerKind::Installation => "add_to_allowlist",
            other => other.job_type().map(|j| j.as_str()).unwrap_or("unknown"),
        }
    }

    pub fn reacts_to(&self, kind: EventKind) -> bool {
        use EventKind::*;
        match self {
            HandlerKind::CoprBuild | HandlerKind::UpstreamKojiBuild => {
                matches!(kind, PullRequest | Push | Release | PullRequestComment)
            }
            HandlerKind::TestingFarm => matches!(kind, PullRequest | Push | PullRequestComment),
            HandlerKind::DownstreamKojiBuild => matches!(kind, DistGitPush | IssueComment),
            HandlerKind::BodhiUpdate | HandlerKind::KojiBuildReport => kind == KojiBuild,
            HandlerKind::ProposeDownstream => {
                matches!(kind, Release | IssueComment | PullRequestComment)
            }
            HandlerKind::PullFromUpstream => kind == UpstreamRelease,
            HandlerKind::VmImageBuild => kind == PullRequestComment,
            HandlerKind::CoprBuildStart | HandlerKind::CoprBuildEnd => kind == CoprBuild,
            HandlerKind::TestingFarmResults => kind == TestingFarmResults,
            HandlerKind::KojiTaskReport => kind == KojiTask,
            HandlerKind::VmImageBuildResult => kind == VmImageBuildResult,
            HandlerKind::Installation => kind == Installation,
        }
    }

    /// Comment commands (after the prefix) that run this handler.
    pub fn comment_commands(&self) -> &'static [&'static str] {
        match self {
            HandlerKind::CoprBuild => &["copr-build", "build"],
            HandlerKind::TestingFarm => &["test"],
            HandlerKind::UpstreamKojiBuild => &["upstream-koji-build"],
            HandlerKind::DownstreamKojiBuild => &["koji-build"],
            HandlerKind::ProposeDownstream => &["propose-downstream"],
            HandlerKind::VmImageBuild => &["vm-image-build"],
            _ => &[],
        }
    }

    pub fn for_command(command: &str) -> Option<HandlerKind> {
        Self::JOBS
            .iter()
            .copied()
            .find(|h| h.comment_commands().contains(&command))
    }

    pub fn handler(&self) -> &'static dyn JobHandler {
        match self {
            HandlerKind::CoprBuild => &copr::CoprBuildHandler,
            HandlerKind::CoprBuildStart => &copr::CoprBuildStartHandler,
            HandlerKind::CoprBuildEnd => &copr::CoprBuildEndHandler,
            HandlerKind::TestingFarm => &testing_farm::TestingFarmHandler,
            HandlerKind::TestingFarmResults => &testing_farm::TestingFarmResultsHandler,
            HandlerKind::UpstreamKojiBuild => &koji::UpstreamKojiBuildHandler,
            HandlerKind::KojiTaskReport => &koji::KojiTaskReportHandler,
            HandlerKind::DownstreamKojiBuild => &koji::DownstreamKojiBuildHandler,
            HandlerKind::KojiBuildReport => &koji::KojiBuildReportHandler,
            HandlerKind::BodhiUpdate => &bodhi::BodhiUpdateHandler,
            HandlerKind::ProposeDownstream => &sync_release::ProposeDownstreamHandler,
            HandlerKind::PullFromUpstream => &sync_release::PullFromUpstreamHandler,
            HandlerKind::VmImageBuild => &vm_image::VmImageBuildHandler,
            HandlerKind::VmImageBuildResult => &vm_image::VmImageBuildResultHandler,
            HandlerKind::Installation => &installation::InstallationHandler,
        }
    }
}

pub(crate) fn retry_delay(attempt: u32) -> Duration {
    RETRY_BASE * 2u32.saturating_pow(attempt)
}

pub(crate) fn unexpected_event(inv: &HandlerInvocation) -> WorkerError {
    WorkerError::InvalidTask(format!(
        "{} cannot handle {} events",
        inv.handler.name(),
        inv.data.event.kind()
    ))
}

pub(crate) fn datetime_from_timestamp(timestamp: f64) -> Option<DateTime<Utc>> {
    let secs = timestamp.trunc() as i64;
    let nanos = (timestamp.fract() * 1e9) as u32;
    DateTime::from_timestamp(secs, nanos)
}

/// Job trigger of pipelines created for a project event.
pub(crate) fn job_trigger_of(event_type: ProjectEventType) -> JobTrigger {
    match event_type {
        ProjectEventType::PullRequest => JobTrigger::PullRequest,
        ProjectEventType::BranchPush => JobTrigger::Commit,
        ProjectEventType::Release | ProjectEventType::Issue => JobTrigger::Release,
    }
}

fn mentions_alias(names: &[String]) -> bool {
    names
        .iter()
        .any(|n| aliases::ALIASES.iter().any(|a| n.starts_with(a)))
}

/// Build chroots for configured targets, with aliases expanded.
pub(crate) async fn resolve_targets(ctx: &WorkerContext, names: &[String]) -> WorkerResult<Vec<String>> {
    let releases = if mentions_alias(names) {
        ctx.bodhi.active_releases().await?
    } else {
        Vec::new()
    };
    Ok(aliases::resolve_targets(names, &releases).into_iter().collect())
}

/// Dist-git branches for configured branches, with aliases expanded.
pub(crate) async fn resolve_branches(ctx: &WorkerContext, names: &[String]) -> WorkerResult<Vec<String>> {
    let releases = if names.is_empty() || mentions_alias(names) {
        ctx.bodhi.active_releases().await?
    } else {
        Vec::new()
    };
    Ok(aliases::resolve_branches(names, &releases).into_iter().collect())
}

/// Where a stored artifact came from.
pub(crate) struct Origin {
    pub project: ProjectRef,
    pub trigger: JobTriggerRecord,
    pub pr_id: Option<u64>,
}

/// Follow the first pipeline of `artifact` back to its project.
pub(crate) async fn origin_of(ctx: &WorkerContext, artifact: PipelineArtifact) -> WorkerResult<Origin> {
    let pipelines = ctx.store.pipelines.find_by_artifact(artifact).await?;
    let trigger_id = pipelines
        .iter()
        .find_map(|p| p.job_trigger_id)
        .ok_or_else(|| WorkerError::InvalidTask(format!("no pipeline for {:?}", artifact)))?;
    let trigger = ctx.store.projects.get_trigger(trigger_id).await?;
    let git_project = ctx.store.projects.get_project(trigger.project_id).await?;
    let project = ProjectRef::from_url(&git_project.project_url)?;
    let pr_id = match trigger.trigger_type {
        ProjectEventType::PullRequest => trigger.identifier.parse().ok(),
        _ => None,
    };
    Ok(Origin {
        project,
        trigger,
        pr_id,
    })
}

/// Markdown table of per-branch errors, used in issues.
pub(crate) fn branch_error_table(errors: &[(String, String)]) -> String {
    let mut table = String::from("| dist-git branch | error |\n| --------------- | ----- |\n");
    for (branch, error) in errors {
        table.push_str(&format!("| `{}` | ```{}``` |\n", branch, error));
    }
    table
}

/// Run one handler: checks, then `run`. Retriable errors are re-queued
/// with back-off until the retry limit; other errors are reported.
pub async fn run_handler(ctx: &WorkerContext, inv: &HandlerInvocation) -> TaskResults {
    let handler = inv.handler.handler();
    info!(handler = inv.handler.name(), attempt = inv.attempt, "Running handler");

    let outcome = match handler.pre_check(ctx, inv).await {
        Ok(Some(reason)) => {
            info!(handler = inv.handler.name(), reason = %reason, "Skipping handler");
            return TaskResults::skipped(reason);
        }
        Ok(None) => handler.run(ctx, inv).await,
        Err(e) => Err(e),
    };

    let error = match outcome {
        Ok(results) => return results,
        Err(e) => e,
    };

    if error.is_retriable() && !inv.is_last_try(ctx.config.retry_limit) {
        let delay = retry_delay(inv.attempt);
        warn!(
            handler = inv.handler.name(),
            attempt = inv.attempt,
            delay_secs = delay.as_secs(),
            error = %error,
            "Handler failed, retrying"
        );
        match ctx.tasks.schedule(Task::RunHandler(inv.next_attempt()), delay).await {
            Ok(()) => {
                return TaskResults::failure(error.to_string())
                    .with("retry", json!(inv.attempt + 1));
            }
            Err(e) => error!(handler = inv.handler.name(), error = %e, "Failed to schedule retry"),
        }
    }

    error!(handler = inv.handler.name(), error = %error, "Handler failed");
    if let Err(e) = handler.report_failure(ctx, inv, &error).await {
        warn!(handler = inv.handler.name(), error = %e, "Failed to report failure");
    }
    TaskResults::failure(error.to_string())
}
