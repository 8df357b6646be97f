//! Syncing upstream releases into dist-git.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::Result;
use crate::project::ProjectRef;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncReleaseRequest {
    pub dist_git: ProjectRef,
    pub branch: String,
    pub package_name: String,
    pub version: String,
    pub upstream_tag: String,
    pub specfile_path: String,
    /// Upstream repository, when the release comes from a forge.
    pub upstream_project_url: Option<String>,
}

#[async_trait]
pub trait ReleaseSyncer: Send + Sync {
    /// Update the dist-git branch to `version` and open a pull request;
    /// returns the pull request URL.
    async fn sync_release(&self, request: &SyncReleaseRequest) -> Result<String>;
}
