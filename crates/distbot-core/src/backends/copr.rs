//! Copr build service.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::Result;

/// Build from a git repository; Copr produces the SRPM itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoprScmBuild {
    pub owner: String,
    pub project: String,
    pub clone_url: String,
    pub committish: String,
    pub spec: Option<String>,
    pub chroots: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoprSubmittedBuild {
    pub build_id: u64,
    pub web_url: String,
}

#[async_trait]
pub trait CoprApi: Send + Sync {
    /// Create the project if missing and make sure `chroots` are enabled.
    async fn ensure_project(
        &self,
        owner: &str,
        project: &str,
        chroots: &[String],
        description: &str,
    ) -> Result<()>;

    async fn submit_scm_build(&self, build: &CoprScmBuild) -> Result<CoprSubmittedBuild>;

    /// Packages built in one chroot, as reported by Copr.
    async fn built_packages(&self, build_id: u64, chroot: &str) -> Result<serde_json::Value>;

    fn build_web_url(&self, owner: &str, project: &str, build_id: u64) -> String;

    fn build_logs_url(&self, owner: &str, project: &str, build_id: u64, chroot: &str) -> String;

    /// `.repo` file URL used to install the build, e.g. into a VM image.
    fn repo_download_url(&self, owner: &str, project: &str, chroot: &str) -> String;
}
