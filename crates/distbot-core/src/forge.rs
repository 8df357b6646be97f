//! Git forge abstraction.
//!
//! Handlers talk to GitHub, GitLab and Pagure through `GitForge`; the
//! `ForgeResolver` picks the right client for a project.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::Result;
use crate::project::ProjectRef;
use crate::status::CommitState;

/// A commit status (GitHub status, GitLab pipeline status, Pagure flag).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitStatus {
    pub state: CommitState,
    /// Status name, e.g. `distbot/rpm-build-fedora-rawhide-x86_64`.
    pub context: String,
    pub description: String,
    pub target_url: Option<String>,
}

/// Where a comment goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommentTarget {
    PullRequest(u64),
    Issue(u64),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub id: u64,
    pub title: String,
    pub url: String,
}

/// A pull request to open on a forge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewPullRequest {
    pub title: String,
    pub body: String,
    /// Branch carrying the changes (in `fork_namespace` when set).
    pub source_branch: String,
    pub target_branch: String,
    pub fork_namespace: Option<String>,
}

#[async_trait]
pub trait GitForge: Send + Sync {
    /// Contents of `path` at `git_ref`, `None` when the file does not exist.
    async fn get_file_content(
        &self,
        project: &ProjectRef,
        path: &str,
        git_ref: &str,
    ) -> Result<Option<String>>;

    async fn is_private(&self, project: &ProjectRef) -> Result<bool>;

    async fn default_branch(&self, project: &ProjectRef) -> Result<String>;

    /// Head commit of a pull request.
    async fn pr_head_sha(&self, project: &ProjectRef, pr_id: u64) -> Result<String>;

    async fn set_commit_status(
        &self,
        project: &ProjectRef,
        commit_sha: &str,
        status: &CommitStatus,
    ) -> Result<()>;

    async fn comment(&self, project: &ProjectRef, target: CommentTarget, body: &str)
    -> Result<()>;

    /// Whether `login` can push to the project.
    async fn has_write_access(&self, project: &ProjectRef, login: &str) -> Result<bool>;

    /// Open issue with exactly this title, if any.
    async fn find_issue(&self, project: &ProjectRef, title: &str) -> Result<Option<Issue>>;

    async fn create_issue(&self, project: &ProjectRef, title: &str, body: &str) -> Result<Issue>;

    /// Tag name of the newest release, `None` when there is none.
    async fn latest_release(&self, project: &ProjectRef) -> Result<Option<String>>;

    /// Open a pull request and return its URL.
    async fn create_pull_request(&self, project: &ProjectRef, pr: &NewPullRequest)
    -> Result<String>;
}

/// Resolves the forge client for a project.
pub trait ForgeResolver: Send + Sync {
    fn forge_for(&self, project: &ProjectRef) -> Result<Arc<dyn GitForge>>;
}
