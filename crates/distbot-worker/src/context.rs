//! Everything a handler needs to talk to the outside world.

use distbot_config::{PACKAGE_CONFIG_FILE, ServiceConfig, parse_package_config};
use distbot_core::backends::{
    BodhiApi, CoprApi, ImageBuilderApi, KojiApi, ReleaseSyncer, TestingFarmApi,
};
use distbot_core::{ForgeResolver, GitForge, PackageConfig, ProjectRef};
use distbot_db::Store;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::WorkerResult;
use crate::queue::TaskSink;
use crate::reporter::StatusReporter;

/// Shared by the dispatcher and all handlers; cheap to clone.
#[derive(Clone)]
pub struct WorkerContext {
    pub config: Arc<ServiceConfig>,
    pub store: Store,
    pub forges: Arc<dyn ForgeResolver>,
    pub copr: Arc<dyn CoprApi>,
    pub koji: Arc<dyn KojiApi>,
    pub bodhi: Arc<dyn BodhiApi>,
    pub testing_farm: Arc<dyn TestingFarmApi>,
    pub image_builder: Arc<dyn ImageBuilderApi>,
    pub syncer: Arc<dyn ReleaseSyncer>,
    pub tasks: Arc<dyn TaskSink>,
}

impl WorkerContext {
    pub fn forge(&self, project: &ProjectRef) -> WorkerResult<Arc<dyn GitForge>> {
        Ok(self.forges.forge_for(project)?)
    }

    /// Package configuration of `project` at `git_ref`; `None` when the
    /// repository has no `.distbot.kdl`.
    pub async fn package_config(
        &self,
        project: &ProjectRef,
        git_ref: &str,
    ) -> WorkerResult<Option<PackageConfig>> {
        let forge = self.forge(project)?;
        let Some(content) = forge
            .get_file_content(project, PACKAGE_CONFIG_FILE, git_ref)
            .await?
        else {
            debug!(project = %project, git_ref = %git_ref, "No package config");
            return Ok(None);
        };

        match parse_package_config(&content) {
            Ok(config) => Ok(Some(config)),
            Err(e) => {
                warn!(project = %project, git_ref = %git_ref, error = %e, "Invalid package config");
                Err(e.into())
            }
        }
    }

    pub fn reporter(
        &self,
        project: &ProjectRef,
        commit_sha: &str,
        pr_id: Option<u64>,
    ) -> WorkerResult<StatusReporter> {
        Ok(StatusReporter::new(
            self.forge(project)?,
            project.clone(),
            commit_sha,
            pr_id,
            &self.config.deployment,
        ))
    }

    /// Instance URL of the dist-git forge.
    pub fn dist_git_url(&self) -> String {
        self.config
            .forge_of_kind(distbot_core::ForgeKind::Pagure)
            .map(|f| f.instance_url.trim_end_matches('/').to_string())
            .unwrap_or_else(|| "https://src.fedoraproject.org".to_string())
    }

    /// Dist-git repository of a package.
    pub fn dist_git_project(&self, package_name: &str) -> WorkerResult<ProjectRef> {
        Ok(ProjectRef::from_url(&format!(
            "{}/rpms/{}",
            self.dist_git_url(),
            package_name
        ))?)
    }
}
