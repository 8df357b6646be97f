//! Reporting results back to forges.

use distbot_core::{CommentTarget, CommitState, CommitStatus, GitForge, PackageConfig, ProjectRef};
use std::sync::Arc;
use tracing::{info, warn};

use crate::context::WorkerContext;
use crate::error::WorkerResult;

/// Prefix of every issue title distbot opens.
pub const ISSUE_TITLE_PREFIX: &str = "[distbot] ";

/// Status context prefix: `distbot/` in production, `distbot-stg/` etc.
/// elsewhere, so that deployments do not overwrite each other.
pub fn context_prefix(deployment: &str) -> String {
    if deployment == "prod" {
        "distbot/".to_string()
    } else {
        format!("distbot-{}/", deployment)
    }
}

/// Reports statuses and comments for one commit of a project.
///
/// Reporting never fails a handler: errors from the forge are logged.
pub struct StatusReporter {
    forge: Arc<dyn GitForge>,
    project: ProjectRef,
    commit_sha: String,
    pr_id: Option<u64>,
    prefix: String,
}

impl StatusReporter {
    pub fn new(
        forge: Arc<dyn GitForge>,
        project: ProjectRef,
        commit_sha: &str,
        pr_id: Option<u64>,
        deployment: &str,
    ) -> Self {
        Self {
            forge,
            project,
            commit_sha: commit_sha.to_string(),
            pr_id,
            prefix: context_prefix(deployment),
        }
    }

    pub fn context(&self, name: &str) -> String {
        format!("{}{}", self.prefix, name)
    }

    pub async fn set_status(
        &self,
        state: CommitState,
        description: &str,
        name: &str,
        url: Option<&str>,
    ) {
        let status = CommitStatus {
            state,
            context: self.context(name),
            description: description.to_string(),
            target_url: url.map(String::from),
        };
        info!(
            project = %self.project,
            commit = %self.commit_sha,
            context = %status.context,
            state = %state,
            "Reporting status"
        );
        if let Err(e) = self
            .forge
            .set_commit_status(&self.project, &self.commit_sha, &status)
            .await
        {
            warn!(
                project = %self.project,
                context = %status.context,
                error = %e,
                "Failed to set commit status"
            );
        }
    }

    /// Same status for several contexts at once.
    pub async fn set_status_all(
        &self,
        state: CommitState,
        description: &str,
        names: &[String],
        url: Option<&str>,
    ) {
        futures::future::join_all(
            names
                .iter()
                .map(|name| self.set_status(state, description, name, url)),
        )
        .await;
    }

    /// Comment on the pull request; a no-op for commits without one.
    pub async fn comment(&self, body: &str) {
        let Some(pr_id) = self.pr_id else {
            return;
        };
        if let Err(e) = self
            .forge
            .comment(&self.project, CommentTarget::PullRequest(pr_id), body)
            .await
        {
            warn!(project = %self.project, pr_id, error = %e, "Failed to comment");
        }
    }
}

/// Open an issue in the package's `issue_repository`, or comment on it
/// when an open issue with the same title exists. Returns the issue URL,
/// `None` when no issue repository is configured.
pub async fn report_in_issue_repository(
    ctx: &WorkerContext,
    package_config: &PackageConfig,
    title: &str,
    body: &str,
) -> WorkerResult<Option<String>> {
    let Some(repository) = package_config.issue_repository.as_deref() else {
        info!(title, "No issue repository configured, not reporting");
        return Ok(None);
    };
    let project = ProjectRef::from_url(repository)?;
    let forge = ctx.forge(&project)?;
    let title = format!("{}{}", ISSUE_TITLE_PREFIX, title);

    let issue = match forge.find_issue(&project, &title).await? {
        Some(issue) => {
            forge
                .comment(&project, CommentTarget::Issue(issue.id), body)
                .await?;
            issue
        }
        None => forge.create_issue(&project, &title, body).await?,
    };
    info!(issue = %issue.url, "Reported in issue repository");
    Ok(Some(issue.url))
}
