//! Testing Farm.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::Result;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoprArtifact {
    pub build_id: u64,
    pub chroot: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestingFarmRequest {
    /// Repository with the tmt metadata.
    pub git_url: String,
    pub git_ref: String,
    pub tmt_plan: Option<String>,
    /// Compose name, e.g. `Fedora-Rawhide`.
    pub compose: String,
    pub arch: String,
    pub artifacts: Vec<CoprArtifact>,
    pub env: BTreeMap<String, String>,
    /// Where Testing Farm posts the results notification.
    pub notification_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestingFarmDetails {
    pub state: String,
    pub overall_result: Option<String>,
    pub run_url: Option<String>,
    pub summary: Option<String>,
}

#[async_trait]
pub trait TestingFarmApi: Send + Sync {
    /// Submit a request; returns the request id.
    async fn submit(&self, request: &TestingFarmRequest) -> Result<String>;

    async fn request_details(&self, request_id: &str) -> Result<TestingFarmDetails>;

    /// Artifacts page of a request.
    fn web_url(&self, request_id: &str) -> String;
}
