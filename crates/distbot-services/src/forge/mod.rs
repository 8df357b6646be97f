//! Forge clients and the registry that picks one per project.

mod github;
mod gitlab;
mod pagure;

pub use github::GitHubForge;
pub use gitlab::GitLabForge;
pub use pagure::PagureForge;

use distbot_config::ServiceConfig;
use distbot_core::{Error, ForgeKind, ForgeResolver, GitForge, ProjectRef, Result};
use std::collections::HashMap;
use std::sync::Arc;

/// Forge clients keyed by host.
#[derive(Default, Clone)]
pub struct Forges {
    by_host: HashMap<String, Arc<dyn GitForge>>,
}

impl Forges {
    pub fn new() -> Self {
        Self::default()
    }

    /// One client per configured forge instance.
    pub fn from_config(config: &ServiceConfig) -> Self {
        let mut forges = Self::new();
        for instance in &config.forges {
            let client: Arc<dyn GitForge> = match instance.kind {
                ForgeKind::Github => Arc::new(GitHubForge::new(
                    &instance.instance_url,
                    instance.token.clone(),
                )),
                ForgeKind::Gitlab => Arc::new(GitLabForge::new(
                    &instance.instance_url,
                    instance.token.clone(),
                )),
                ForgeKind::Pagure => Arc::new(PagureForge::new(
                    &instance.instance_url,
                    instance.token.clone(),
                )),
            };
            forges.insert(instance.host(), client);
        }
        forges
    }

    pub fn insert(&mut self, host: &str, forge: Arc<dyn GitForge>) {
        self.by_host.insert(host.to_string(), forge);
    }
}

impl ForgeResolver for Forges {
    fn forge_for(&self, project: &ProjectRef) -> Result<Arc<dyn GitForge>> {
        self.by_host
            .get(project.host())
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("no forge configured for {}", project.host())))
    }
}
