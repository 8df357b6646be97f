//! Koji build system.

use async_trait::async_trait;

use crate::Result;

#[async_trait]
pub trait KojiApi: Send + Sync {
    /// Submit a scratch build of `scm_url` into `target`; returns the task id.
    async fn scratch_build(&self, scm_url: &str, target: &str) -> Result<u64>;

    /// Submit a production build of `scm_url` into `target`; returns the task id.
    async fn build(&self, scm_url: &str, target: &str) -> Result<u64>;

    fn task_web_url(&self, task_id: u64) -> String;

    fn task_logs_url(&self, task_id: u64) -> String;
}
