//! Namespace approval.
//!
//! Paths have the form `domain[/namespace[/repo.git]]`. A project is
//! allowed when its repository, its namespace or its whole domain is
//! approved; a denied entry on a more specific path wins.

use distbot_core::status::AllowlistStatus;
use distbot_core::{CommentTarget, CommitState, Event, ProjectRef};
use distbot_db::{AllowlistEntry, AllowlistRepo};
use std::sync::Arc;
use tracing::{info, warn};

use crate::context::WorkerContext;
use crate::error::WorkerResult;
use crate::handlers::EventData;

const STATUS_NAME: &str = "allowlist";

/// Which part of a forge an allowlist path covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathKind {
    Domain,
    Namespace,
    Repository,
}

impl PathKind {
    pub fn from_path(path: &str) -> Self {
        if path.ends_with(".git") {
            PathKind::Repository
        } else if path.contains('/') {
            PathKind::Namespace
        } else {
            PathKind::Domain
        }
    }
}

impl std::fmt::Display for PathKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PathKind::Domain => write!(f, "a whole domain"),
            PathKind::Namespace => write!(f, "a namespace"),
            PathKind::Repository => write!(f, "a specific repository"),
        }
    }
}

/// Drop `https://` and friends; the flag tells whether anything was removed.
pub fn strip_scheme(path: &str) -> (String, bool) {
    match path.split_once("://") {
        Some((_, rest)) => (rest.trim_end_matches('/').to_string(), true),
        None => (path.trim_end_matches('/').to_string(), false),
    }
}

/// Every path covering `path`, from the whole domain down to `path` itself.
///
/// `github.com/packit/ogr.git` gives `github.com`, `github.com/packit`
/// and `github.com/packit/ogr.git`.
pub fn path_variants(path: &str) -> Vec<String> {
    let parts: Vec<&str> = path.split('/').filter(|p| !p.is_empty()).collect();
    (1..=parts.len()).map(|n| parts[..n].join("/")).collect()
}

/// Allowlist checks and manipulation over an `AllowlistRepo`.
pub struct Allowlist {
    repo: Arc<dyn AllowlistRepo>,
}

impl Allowlist {
    pub fn new(repo: Arc<dyn AllowlistRepo>) -> Self {
        Self { repo }
    }

    pub async fn is_approved(&self, project: &ProjectRef) -> WorkerResult<bool> {
        let paths = [
            project.repo_path(),
            project.namespace_path(),
            project.host().to_string(),
        ];
        for path in &paths {
            match self.repo.get(path).await? {
                Some(entry) if entry.status.is_approved() => return Ok(true),
                Some(entry) if entry.status == AllowlistStatus::Denied => {
                    info!(path = %path, "Denied on the allowlist");
                    return Ok(false);
                }
                _ => {}
            }
        }
        Ok(false)
    }

    pub async fn approve(&self, path: &str) -> WorkerResult<AllowlistEntry> {
        let entry = self
            .repo
            .upsert(path, AllowlistStatus::ApprovedManually, None)
            .await?;
        info!(path = %path, "Approved");
        Ok(entry)
    }

    pub async fn deny(&self, path: &str) -> WorkerResult<AllowlistEntry> {
        let entry = self.repo.upsert(path, AllowlistStatus::Denied, None).await?;
        info!(path = %path, "Denied");
        Ok(entry)
    }

    /// Returns `false` when there was no such entry.
    pub async fn remove(&self, path: &str) -> WorkerResult<bool> {
        Ok(self.repo.remove(path).await?)
    }

    pub async fn waiting(&self) -> WorkerResult<Vec<AllowlistEntry>> {
        Ok(self.repo.list(Some(AllowlistStatus::Waiting)).await?)
    }

    /// Record `path` as waiting unless it already has an entry.
    pub async fn add_waiting(&self, path: &str, fas_account: Option<&str>) -> WorkerResult<()> {
        if self.repo.get(path).await?.is_none() {
            self.repo
                .upsert(path, AllowlistStatus::Waiting, fas_account)
                .await?;
            info!(path = %path, "Waiting for approval");
        }
        Ok(())
    }

    /// Check the event's project. When it is not allowed, put its
    /// namespace on the waiting list and tell the user on the forge.
    pub async fn check_and_report(&self, ctx: &WorkerContext, data: &EventData) -> WorkerResult<bool> {
        let project = data.project()?;
        if self.is_approved(project).await? {
            return Ok(true);
        }

        let namespace = project.namespace_path();
        warn!(project = %project, namespace = %namespace, "Project is not on the allowlist");
        self.add_waiting(&namespace, None).await?;

        let message = format!(
            "Project {} is not on the allowlist! Namespace {} is waiting for approval.",
            project.full_name(),
            namespace
        );
        if let Some(sha) = data.commit_sha.as_deref() {
            ctx.reporter(project, sha, data.pr_id)?
                .set_status(CommitState::Error, "Namespace is not allowed!", STATUS_NAME, None)
                .await;
        }
        let target = match &data.event {
            Event::PullRequestComment(c) => Some(CommentTarget::PullRequest(c.number)),
            Event::IssueComment(c) => Some(CommentTarget::Issue(c.number)),
            _ => None,
        };
        if let Some(target) = target {
            if let Err(e) = ctx.forge(project)?.comment(project, target, &message).await {
                warn!(project = %project, error = %e, "Failed to comment");
            }
        }
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{TestEnv, pr_comment, pull_request, upstream};

    #[test]
    fn test_path_helpers() {
        assert_eq!(
            strip_scheme("https://github.com/packit/"),
            ("github.com/packit".to_string(), true)
        );
        assert_eq!(strip_scheme("gitlab.com"), ("gitlab.com".to_string(), false));

        assert_eq!(PathKind::from_path("github.com"), PathKind::Domain);
        assert_eq!(PathKind::from_path("gitlab.com/redhat/centos-stream"), PathKind::Namespace);
        assert_eq!(PathKind::from_path("github.com/packit/ogr.git"), PathKind::Repository);
        assert_eq!(PathKind::Domain.to_string(), "a whole domain");

        assert_eq!(
            path_variants("github.com/packit/ogr.git"),
            vec!["github.com", "github.com/packit", "github.com/packit/ogr.git"]
        );
    }

    #[tokio::test]
    async fn test_approval_levels() {
        let env = TestEnv::new();
        let allowlist = Allowlist::new(env.ctx.store.allowlist.clone());
        let project = upstream();

        assert!(!allowlist.is_approved(&project).await.unwrap());

        allowlist.approve("github.com").await.unwrap();
        assert!(allowlist.is_approved(&project).await.unwrap());

        allowlist.deny("github.com/packit/ogr.git").await.unwrap();
        assert!(!allowlist.is_approved(&project).await.unwrap());

        assert!(allowlist.remove("github.com/packit/ogr.git").await.unwrap());
        assert!(!allowlist.remove("github.com/packit/ogr.git").await.unwrap());
        assert!(allowlist.is_approved(&project).await.unwrap());
    }

    #[tokio::test]
    async fn test_waiting_entry_is_not_overwritten() {
        let env = TestEnv::new();
        let allowlist = Allowlist::new(env.ctx.store.allowlist.clone());

        allowlist.add_waiting("github.com/packit", Some("lbarcziova")).await.unwrap();
        allowlist.add_waiting("github.com/packit", None).await.unwrap();

        let waiting = allowlist.waiting().await.unwrap();
        assert_eq!(waiting.len(), 1);
        assert_eq!(waiting[0].fas_account.as_deref(), Some("lbarcziova"));
    }

    #[tokio::test]
    async fn test_check_and_report_pull_request() {
        let env = TestEnv::new();
        let allowlist = Allowlist::new(env.ctx.store.allowlist.clone());
        let data = EventData::from_event(pull_request());

        assert!(!allowlist.check_and_report(&env.ctx, &data).await.unwrap());

        let waiting = allowlist.waiting().await.unwrap();
        assert_eq!(waiting[0].namespace, "github.com/packit");
        let statuses = env.forge.statuses();
        assert_eq!(statuses.len(), 1);
        assert_eq!(statuses[0].1.context, "distbot/allowlist");
        assert_eq!(statuses[0].1.state, CommitState::Error);
        assert!(env.forge.comments().is_empty());
    }

    #[tokio::test]
    async fn test_check_and_report_comment() {
        let env = TestEnv::new();
        let allowlist = Allowlist::new(env.ctx.store.allowlist.clone());
        let data = EventData::from_event(pr_comment("/distbot build"));

        assert!(!allowlist.check_and_report(&env.ctx, &data).await.unwrap());
        let comments = env.forge.comments();
        assert_eq!(comments.len(), 1);
        assert_eq!(comments[0].0, CommentTarget::PullRequest(342));
        assert!(comments[0].1.contains("github.com/packit is waiting for approval"));
    }

    #[tokio::test]
    async fn test_check_and_report_approved() {
        let env = TestEnv::new();
        env.allow_packit().await;
        let allowlist = Allowlist::new(env.ctx.store.allowlist.clone());
        let data = EventData::from_event(pull_request());

        assert!(allowlist.check_and_report(&env.ctx, &data).await.unwrap());
        assert!(env.forge.statuses().is_empty());
    }
}
