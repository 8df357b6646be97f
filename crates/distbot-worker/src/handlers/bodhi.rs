//! Bodhi updates for finished Koji builds.

use async_trait::async_trait;
use distbot_core::status::KojiBuildState;
use distbot_core::{Event, TaskResults};
use serde_json::json;
use tracing::info;

use super::{HandlerInvocation, JobHandler, branch_error_table, resolve_branches, unexpected_event};
use crate::context::WorkerContext;
use crate::error::{WorkerError, WorkerResult};
use crate::reporter::report_in_issue_repository;

const DEFAULT_UPDATE_TYPE: &str = "enhancement";
pub(crate) const ISSUE_TITLE: &str = "Fedora Bodhi update failed to be created";

pub struct BodhiUpdateHandler;

#[async_trait]
impl JobHandler for BodhiUpdateHandler {
    async fn pre_check(
        &self,
        ctx: &WorkerContext,
        inv: &HandlerInvocation,
    ) -> WorkerResult<Option<String>> {
        let Event::KojiBuild(build) = &inv.data.event else {
            return Err(unexpected_event(inv));
        };
        if build.state != KojiBuildState::Complete {
            return Ok(Some(format!(
                "Koji build {} is not complete ({})",
                build.nvr(),
                build.state
            )));
        }
        let branches = resolve_branches(ctx, &inv.job()?.dist_git_branches).await?;
        if !branches.contains(&build.branch_name) {
            return Ok(Some(format!(
                "Bodhi updates are not configured for branch {}",
                build.branch_name
            )));
        }
        Ok(None)
    }

    async fn run(&self, ctx: &WorkerContext, inv: &HandlerInvocation) -> WorkerResult<TaskResults> {
        let Event::KojiBuild(build) = &inv.data.event else {
            return Err(unexpected_event(inv));
        };
        let update_type = inv
            .job()?
            .update_type
            .as_deref()
            .unwrap_or(DEFAULT_UPDATE_TYPE);
        let nvr = build.nvr();
        let update = ctx
            .bodhi
            .create_update(&build.branch_name, update_type, std::slice::from_ref(&nvr))
            .await?;
        info!(build = %nvr, alias = %update.alias, "Created Bodhi update");
        Ok(TaskResults::success()
            .with("alias", json!(update.alias))
            .with("url", json!(update.url)))
    }

    async fn report_failure(
        &self,
        ctx: &WorkerContext,
        inv: &HandlerInvocation,
        error: &WorkerError,
    ) -> WorkerResult<()> {
        let Event::KojiBuild(build) = &inv.data.event else {
            return Ok(());
        };
        let Some(package) = inv.package_config.as_ref() else {
            return Ok(());
        };
        let body = format!(
            "distbot failed on creating Bodhi update in dist-git ({}):\n\n{}\n",
            build.project.project_url(),
            branch_error_table(&[(build.branch_name.clone(), error.to_string())])
        );
        report_in_issue_repository(ctx, package, ISSUE_TITLE, &body).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::{EventData, HandlerKind, run_handler};
    use crate::testing::{TestEnv, dist_git};
    use distbot_core::event::KojiBuildEvent;
    use distbot_core::{JobConfig, JobTrigger, JobType, PackageConfig};

    fn invocation(state: KojiBuildState, branch: &str, update_type: Option<&str>) -> HandlerInvocation {
        let event = Event::KojiBuild(KojiBuildEvent {
            build_id: 2058711,
            task_id: Some(94225123),
            state,
            old_state: Some(KojiBuildState::Building),
            package_name: "python-ogr".into(),
            version: "0.40.0".into(),
            release: "1.fc37".into(),
            epoch: None,
            branch_name: branch.into(),
            commit_sha: "ad0c308af91da45cf40b253cd82f07f63ea9cbbf".into(),
            project: dist_git(),
            owner: "packit".into(),
        });
        let mut job = JobConfig::new(JobType::BodhiUpdate, JobTrigger::Commit);
        job.dist_git_branches = vec!["fedora-stable".into()];
        job.update_type = update_type.map(String::from);
        let package = PackageConfig {
            issue_repository: Some("https://github.com/packit/notifications".into()),
            ..Default::default()
        };
        HandlerInvocation::new(HandlerKind::BodhiUpdate, EventData::from_event(event))
            .with_config(package, job)
    }

    #[tokio::test]
    async fn test_update_created_for_complete_build() {
        let env = TestEnv::new();
        let result = run_handler(&env.ctx, &invocation(KojiBuildState::Complete, "f37", Some("bugfix"))).await;

        assert!(result.success, "{:?}", result);
        assert_eq!(result.details["alias"], "FEDORA-2022-0001");
        assert_eq!(
            env.bodhi.updates(),
            vec![(
                "f37".to_string(),
                "bugfix".to_string(),
                vec!["python-ogr-0.40.0-1.fc37".to_string()]
            )]
        );
    }

    #[tokio::test]
    async fn test_incomplete_build_is_skipped() {
        let env = TestEnv::new();
        let result = run_handler(&env.ctx, &invocation(KojiBuildState::Building, "f37", None)).await;
        assert!(result.success);
        assert!(result.msg().unwrap().contains("is not complete"));
        assert!(env.bodhi.updates().is_empty());
    }

    #[tokio::test]
    async fn test_unconfigured_branch_is_skipped() {
        let env = TestEnv::new();
        let result = run_handler(&env.ctx, &invocation(KojiBuildState::Complete, "epel9", None)).await;
        assert_eq!(result.msg(), Some("Bodhi updates are not configured for branch epel9"));
    }

    #[tokio::test]
    async fn test_failure_opens_issue() {
        let env = TestEnv::new();
        *env.bodhi.fail.lock().unwrap() = Some(("Update already exists".into(), false));
        let result = run_handler(&env.ctx, &invocation(KojiBuildState::Complete, "f36", None)).await;

        assert!(!result.success);
        let issues = env.forge.issues();
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].title, format!("[distbot] {}", ISSUE_TITLE));
    }
}
