//! Routing of parsed events to handlers.

use distbot_core::event::CoprBuildTopic;
use distbot_core::{Event, EventKind, ForgeKind, JobConfig, JobTrigger, JobType, PackageConfig, TaskResults};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, error, info, warn};

use crate::allowlist::Allowlist;
use crate::context::WorkerContext;
use crate::error::WorkerResult;
use crate::handlers::{EventData, HandlerInvocation, HandlerKind, run_handler};

/// Key of the comment command result.
pub const COMMENT_RESULT_KEY: &str = "pull_request_action";
const NOT_ALLOWLISTED: &str = "Account is not allowlisted!";
const NO_CONFIG: &str = "No config file in repo";

/// Everything that ran for one event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingResults {
    pub event: serde_json::Value,
    pub jobs: BTreeMap<String, TaskResults>,
}

impl ProcessingResults {
    pub fn is_success(&self) -> bool {
        self.jobs.values().all(|r| r.success)
    }
}

/// Events coming from dist-git or the build system act on behalf of the
/// packager and skip the allowlist.
fn bypasses_allowlist(kind: EventKind) -> bool {
    matches!(
        kind,
        EventKind::DistGitPush | EventKind::KojiBuild | EventKind::UpstreamRelease
    )
}

pub struct JobDispatcher {
    ctx: WorkerContext,
}

impl JobDispatcher {
    pub fn new(ctx: WorkerContext) -> Self {
        Self { ctx }
    }

    pub fn context(&self) -> &WorkerContext {
        &self.ctx
    }

    /// Run every handler interested in `event`. `None` when the event is
    /// ignored altogether (private repositories).
    pub async fn process_message(&self, event: Event) -> WorkerResult<Option<ProcessingResults>> {
        let kind = event.kind();
        info!(kind = %kind, "Processing event");

        if self.is_ignored_private(&event).await? {
            info!(kind = %kind, "Not interacting with private repositories");
            return Ok(None);
        }

        let mut jobs = BTreeMap::new();
        match &event {
            Event::Installation(_) => {
                self.run_single(HandlerKind::Installation, &event, &mut jobs).await;
            }
            Event::PullRequestComment(_) | Event::IssueComment(_) => {
                let result = self.process_comment_jobs(&event).await?;
                jobs.insert(COMMENT_RESULT_KEY.to_string(), result);
            }
            Event::CoprBuild(build) => {
                let handler = match build.topic {
                    CoprBuildTopic::Started => HandlerKind::CoprBuildStart,
                    CoprBuildTopic::Finished => HandlerKind::CoprBuildEnd,
                };
                self.run_single(handler, &event, &mut jobs).await;
            }
            Event::KojiTask(_) => {
                self.run_single(HandlerKind::KojiTaskReport, &event, &mut jobs).await;
            }
            Event::TestingFarmResults(_) => {
                self.run_single(HandlerKind::TestingFarmResults, &event, &mut jobs).await;
            }
            Event::VmImageBuildResult(_) => {
                self.run_single(HandlerKind::VmImageBuildResult, &event, &mut jobs).await;
            }
            Event::KojiBuild(_) => {
                self.run_single(HandlerKind::KojiBuildReport, &event, &mut jobs).await;
                jobs.extend(self.process_jobs(&event).await?);
            }
            _ => jobs = self.process_jobs(&event).await?,
        }

        for (key, result) in &jobs {
            if !result.success {
                error!(
                    kind = %kind,
                    job = %key,
                    msg = result.msg().unwrap_or_default(),
                    "Job failed"
                );
            }
        }
        debug!(kind = %kind, "All jobs finished");
        Ok(Some(ProcessingResults {
            event: event.to_value(),
            jobs,
        }))
    }

    async fn is_ignored_private(&self, event: &Event) -> WorkerResult<bool> {
        if self.ctx.config.allow_private_repositories {
            return Ok(false);
        }
        let Some(project) = event.project() else {
            return Ok(false);
        };
        if project.forge != ForgeKind::Github {
            return Ok(false);
        }
        let forge = self.ctx.forge(project)?;
        Ok(forge.is_private(project).await?)
    }

    /// Run a handler that needs no package configuration.
    async fn run_single(
        &self,
        handler: HandlerKind,
        event: &Event,
        jobs: &mut BTreeMap<String, TaskResults>,
    ) {
        let inv = HandlerInvocation::new(handler, EventData::from_event(event.clone()));
        let result = run_handler(&self.ctx, &inv).await;
        jobs.insert(handler.result_key().to_string(), result);
    }

    /// Admins always pass; otherwise the project must be allowlisted.
    async fn passes_gate(&self, data: &EventData) -> WorkerResult<bool> {
        if let Some(actor) = data.actor.as_deref() {
            if self.ctx.config.is_admin(actor) {
                info!(actor, "Admin, you shall pass");
                return Ok(true);
            }
        }
        Allowlist::new(self.ctx.store.allowlist.clone())
            .check_and_report(&self.ctx, data)
            .await
    }

    async fn fetch_package_config(&self, data: &EventData) -> WorkerResult<Option<PackageConfig>> {
        let project = data.project()?;
        let git_ref = data.git_ref.clone().unwrap_or_default();
        self.ctx.package_config(project, &git_ref).await
    }

    /// Run a handler for every configured job matching the event's trigger.
    pub async fn process_jobs(&self, event: &Event) -> WorkerResult<BTreeMap<String, TaskResults>> {
        let mut results = BTreeMap::new();
        let Some(trigger) = event.trigger() else {
            warn!(kind = %event.kind(), "Event has no job trigger");
            return Ok(results);
        };
        let data = EventData::resolve(&self.ctx, event.clone()).await?;

        let Some(package) = self.fetch_package_config(&data).await? else {
            results.insert(trigger.as_str().to_string(), TaskResults::skipped(NO_CONFIG));
            return Ok(results);
        };

        for job in package.jobs_for(trigger) {
            let Some(handler) = HandlerKind::for_job(job.job) else {
                warn!(job = job.job.as_str(), "No handler for job");
                continue;
            };
            if !handler.reacts_to(event.kind()) {
                continue;
            }
            if !self.branch_matches(&data, job).await? {
                debug!(job = job.job.as_str(), "Push to a branch the job does not watch");
                continue;
            }

            if !bypasses_allowlist(event.kind()) && !self.passes_gate(&data).await? {
                results.insert(handler.result_key().to_string(), TaskResults::failure(NOT_ALLOWLISTED));
                return Ok(results);
            }

            if let Some(build_job) = implicit_copr_build(&package, job, trigger) {
                let inv = HandlerInvocation::new(HandlerKind::CoprBuild, data.clone())
                    .with_config(package.clone(), build_job);
                let result = run_handler(&self.ctx, &inv).await;
                results.insert(HandlerKind::CoprBuild.result_key().to_string(), result);
            }

            let inv = HandlerInvocation::new(handler, data.clone()).with_config(package.clone(), job.clone());
            let result = run_handler(&self.ctx, &inv).await;
            results.insert(handler.result_key().to_string(), result);
        }
        Ok(results)
    }

    /// Jobs on commits only react to pushes into their branch (the
    /// project's default branch unless configured).
    async fn branch_matches(&self, data: &EventData, job: &JobConfig) -> WorkerResult<bool> {
        let Event::Push(push) = &data.event else {
            return Ok(true);
        };
        let branch = match (&job.branch, &push.default_branch) {
            (Some(branch), _) => branch.clone(),
            (None, Some(default)) => default.clone(),
            (None, None) => {
                let forge = self.ctx.forge(&push.project)?;
                forge.default_branch(&push.project).await?
            }
        };
        Ok(push.branch == branch)
    }

    /// Handle a `/distbot <command>` comment.
    pub async fn process_comment_jobs(&self, event: &Event) -> WorkerResult<TaskResults> {
        let Some(comment) = event.comment() else {
            return Ok(TaskResults::skipped("Not a comment"));
        };
        let shown: String = comment.comment.chars().take(35).collect();
        let msg = format!("comment '{}'", shown);

        let parts: Vec<&str> = comment.comment.split_whitespace().take(4).collect();
        let Some(mark) = parts.first() else {
            return Ok(TaskResults::skipped(format!("{} is empty.", msg)));
        };
        if *mark != self.ctx.config.comment_prefix {
            return Ok(TaskResults::skipped(format!("{} is not handled by distbot.", msg)));
        }
        let Some(command) = parts.get(1) else {
            return Ok(TaskResults::skipped(format!(
                "{} does not contain a distbot command.",
                msg
            )));
        };
        let Some(handler) = HandlerKind::for_command(command) else {
            return Ok(TaskResults::skipped(format!(
                "{} does not contain a valid distbot command.",
                msg
            )));
        };
        if !handler.reacts_to(event.kind()) {
            return Ok(TaskResults::skipped(format!("{} is not a distbot command.", msg)));
        }

        let data = EventData::resolve(&self.ctx, event.clone()).await?;
        if !self.passes_gate(&data).await? {
            return Ok(TaskResults::skipped(NOT_ALLOWLISTED));
        }

        let Some(package) = self.fetch_package_config(&data).await? else {
            return Ok(TaskResults::skipped(NO_CONFIG));
        };
        let mut inv = HandlerInvocation::new(handler, data);
        match comment_job(&package, handler, event.trigger()) {
            Some(job) => inv = inv.with_config(package, job),
            None if handler == HandlerKind::VmImageBuild => inv.package_config = Some(package),
            None => {
                return Ok(TaskResults::skipped(format!(
                    "No {} job configured",
                    handler.name()
                )));
            }
        }
        info!(handler = handler.name(), command = %command, "Running comment command");
        Ok(run_handler(&self.ctx, &inv).await)
    }
}

/// Tests need RPMs: without a Copr build job for the same trigger, one is
/// run with the test job's targets.
fn implicit_copr_build(package: &PackageConfig, job: &JobConfig, trigger: JobTrigger) -> Option<JobConfig> {
    if job.job != JobType::Tests || job.skip_build {
        return None;
    }
    if package.find_job_for(JobType::CoprBuild, trigger).is_some() {
        return None;
    }
    let mut build = job.clone();
    build.job = JobType::CoprBuild;
    Some(build)
}

/// Job configuration a comment command runs with. `/distbot build` on a
/// project that only configures tests builds the tests' targets.
fn comment_job(package: &PackageConfig, handler: HandlerKind, trigger: Option<JobTrigger>) -> Option<JobConfig> {
    let job_type = handler.job_type()?;
    let find = |job_type: JobType| {
        trigger
            .and_then(|t| package.find_job_for(job_type, t))
            .or_else(|| package.find_job(job_type))
    };
    if let Some(job) = find(job_type) {
        return Some(job.clone());
    }
    if job_type == JobType::CoprBuild {
        let mut build = find(JobType::Tests)?.clone();
        build.job = JobType::CoprBuild;
        return Some(build);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{TestEnv, dist_git, pr_comment, pull_request};
    use distbot_core::event::{DistGitPushEvent, PushEvent};
    use distbot_core::CommitState;
    use serde_json::json;

    const BUILD_CONFIG: &str = r#"
        specfile-path "fedora/python-ogr.spec"
        job "copr_build" trigger="pull_request" {
            targets "fedora-37-x86_64"
        }
    "#;

    fn dispatcher(env: &TestEnv) -> JobDispatcher {
        JobDispatcher::new(env.ctx.clone())
    }

    async fn comment_result(env: &TestEnv, text: &str) -> TaskResults {
        let results = dispatcher(env)
            .process_message(pr_comment(text))
            .await
            .unwrap()
            .unwrap();
        results.jobs[COMMENT_RESULT_KEY].clone()
    }

    #[tokio::test]
    async fn test_comment_parsing_messages() {
        let env = TestEnv::new().with_package_config(BUILD_CONFIG);
        env.allow_packit().await;

        let cases = [
            ("", "comment '' is empty."),
            ("LGTM", "comment 'LGTM' is not handled by distbot."),
            ("/distbot", "comment '/distbot' does not contain a distbot command."),
            ("/distbot retest-all", "comment '/distbot retest-all' does not contain a valid distbot command."),
            ("/distbot koji-build", "comment '/distbot koji-build' is not a distbot command."),
        ];
        for (text, expected) in cases {
            let result = comment_result(&env, text).await;
            assert!(result.success);
            assert_eq!(result.msg(), Some(expected));
        }

        let long = "This is a really long comment that goes on and on";
        let result = comment_result(&env, long).await;
        assert_eq!(
            result.msg(),
            Some("comment 'This is a really long comment that ' is not handled by distbot.")
        );
    }

    #[tokio::test]
    async fn test_comment_command_runs_handler() {
        let env = TestEnv::new().with_package_config(BUILD_CONFIG);
        env.allow_packit().await;

        let result = comment_result(&env, "/distbot build").await;
        assert!(result.success, "{:?}", result);
        assert_eq!(env.copr.submitted().len(), 1);
        assert_eq!(env.copr.submitted()[0].chroots, vec!["fedora-37-x86_64"]);
    }

    #[tokio::test]
    async fn test_comment_gate_is_not_a_failure() {
        let env = TestEnv::new().with_package_config(BUILD_CONFIG);

        let result = comment_result(&env, "/distbot build").await;
        assert!(result.success);
        assert_eq!(result.msg(), Some(NOT_ALLOWLISTED));
        assert!(env.copr.submitted().is_empty());
    }

    #[tokio::test]
    async fn test_admin_passes_gate() {
        let env = TestEnv::with_config(|c| c.admins = vec!["lbarcziova".into()])
            .with_package_config(BUILD_CONFIG);

        let result = comment_result(&env, "/distbot copr-build").await;
        assert!(result.success, "{:?}", result);
        assert_eq!(env.copr.submitted().len(), 1);
    }

    #[tokio::test]
    async fn test_pull_request_without_config() {
        let env = TestEnv::new();
        let results = dispatcher(&env).process_message(pull_request()).await.unwrap().unwrap();
        assert_eq!(results.jobs["pull_request"].msg(), Some(NO_CONFIG));
        assert!(results.is_success());
    }

    #[tokio::test]
    async fn test_pull_request_not_allowlisted() {
        let env = TestEnv::new().with_package_config(BUILD_CONFIG);
        let results = dispatcher(&env).process_message(pull_request()).await.unwrap().unwrap();

        let result = &results.jobs["copr_build"];
        assert!(!result.success);
        assert_eq!(result.msg(), Some(NOT_ALLOWLISTED));
        assert!(env.copr.submitted().is_empty());
        let (_, status) = env.forge.statuses().pop().unwrap();
        assert_eq!(status.state, CommitState::Error);
    }

    #[tokio::test]
    async fn test_pull_request_runs_build_and_tests() {
        let env = TestEnv::new().with_package_config(
            r#"
            specfile-path "python-ogr.spec"
            job "copr_build" trigger="pull_request" {
                targets "fedora-37-x86_64"
            }
            job "tests" trigger="pull_request" {
                targets "fedora-37-x86_64"
            }
            job "propose_downstream" trigger="release"
            "#,
        );
        env.allow_packit().await;

        let results = dispatcher(&env).process_message(pull_request()).await.unwrap().unwrap();
        let keys: Vec<&str> = results.jobs.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["copr_build", "tests"]);
        assert!(results.jobs["copr_build"].success);
        // tests wait for the build to finish
        assert!(results.jobs["tests"].success);
        assert_eq!(results.jobs["tests"].details["pipeline_ids"], json!([]));
        assert_eq!(results.event["type"], json!("pull_request"));
    }

    #[tokio::test]
    async fn test_tests_alone_build_implicitly() {
        let env = TestEnv::new().with_package_config(
            r#"
            job "tests" trigger="pull_request" {
                targets "fedora-37-x86_64"
            }
            "#,
        );
        env.allow_packit().await;

        let results = dispatcher(&env).process_message(pull_request()).await.unwrap().unwrap();
        assert!(results.jobs.contains_key("copr_build"));
        assert_eq!(env.copr.submitted().len(), 1);
    }

    #[tokio::test]
    async fn test_push_to_other_branch_is_ignored() {
        let env = TestEnv::new().with_package_config(
            r#"
            job "copr_build" trigger="commit" {
                branch "release"
            }
            "#,
        );
        env.allow_packit().await;
        let push = |branch: &str| {
            Event::Push(PushEvent {
                project: crate::testing::upstream(),
                branch: branch.into(),
                commit_sha: "d6b1a6e9f6a9e1a36e7b1f0d07e1a13b0f7d4c21".into(),
                actor: "lbarcziova".into(),
                default_branch: Some("main".into()),
            })
        };

        let results = dispatcher(&env).process_message(push("main")).await.unwrap().unwrap();
        assert!(results.jobs.is_empty());

        let results = dispatcher(&env).process_message(push("release")).await.unwrap().unwrap();
        assert!(results.jobs["copr_build"].success);
    }

    #[tokio::test]
    async fn test_private_repository_is_ignored() {
        let env = TestEnv::new().with_package_config(BUILD_CONFIG);
        env.forge.set_private(true);
        assert!(dispatcher(&env).process_message(pull_request()).await.unwrap().is_none());

        let env = TestEnv::with_config(|c| c.allow_private_repositories = true);
        env.forge.set_private(true);
        assert!(dispatcher(&env).process_message(pull_request()).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_dist_git_push_skips_allowlist() {
        let env = TestEnv::new().with_package_config(
            r#"
            job "koji_build" trigger="commit" {
                dist-git-branches "f37"
            }
            "#,
        );
        let event = Event::DistGitPush(DistGitPushEvent {
            project: dist_git(),
            branch: "f37".into(),
            commit_sha: "ad0c308af91da45cf40b253cd82f07f63ea9cbbf".into(),
            actor: "ttomecek".into(),
        });

        let results = dispatcher(&env).process_message(event).await.unwrap().unwrap();
        assert!(results.jobs["koji_build"].success, "{:?}", results);
        assert_eq!(env.koji.builds().len(), 1);
    }
}
