//! Bodhi update system.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::Result;

/// An active Fedora/EPEL release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BodhiRelease {
    /// e.g. `F37`, `EPEL-9`
    pub name: String,
    /// Dist-git branch, e.g. `f37`, `epel9`, `rawhide`
    pub branch: String,
    /// `FEDORA`, `FEDORA-EPEL`, ...
    pub id_prefix: String,
    /// `current`, `pending`, `frozen`, `archived`
    pub state: String,
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BodhiUpdate {
    pub alias: String,
    pub url: String,
}

#[async_trait]
pub trait BodhiApi: Send + Sync {
    async fn active_releases(&self) -> Result<Vec<BodhiRelease>>;

    /// Create an update for `builds` (NVRs). Builds not tagged as update
    /// candidates yet fail with a retriable error.
    async fn create_update(
        &self,
        dist_git_branch: &str,
        update_type: &str,
        builds: &[String],
    ) -> Result<BodhiUpdate>;
}
