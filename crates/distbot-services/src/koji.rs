//! Koji client built on the `koji` CLI.

use async_trait::async_trait;
use distbot_config::service::KojiConfig;
use distbot_core::Result;
use distbot_core::backends::KojiApi;
use regex::Regex;
use std::sync::LazyLock;
use tokio::process::Command;
use tracing::{info, warn};

use crate::{ServiceError, ServiceResult};

const SERVICE: &str = "koji";

static CREATED_TASK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Created task:\s*(\d+)").expect("valid regex"));

pub struct KojiCli {
    command: String,
    web_url: String,
    logs_url: String,
}

impl KojiCli {
    pub fn new(config: &KojiConfig) -> Self {
        Self {
            command: config.command.clone(),
            web_url: config.web_url.trim_end_matches('/').to_string(),
            logs_url: config.logs_url.trim_end_matches('/').to_string(),
        }
    }

    async fn submit(&self, scm_url: &str, target: &str, scratch: bool) -> ServiceResult<u64> {
        let mut cmd = Command::new(&self.command);
        cmd.arg("build").arg("--nowait");
        if scratch {
            cmd.arg("--scratch");
        }
        cmd.arg(target).arg(scm_url);

        info!(target = %target, scm_url = %scm_url, scratch, "Submitting Koji build");
        let output = cmd.output().await?;
        let stdout = String::from_utf8_lossy(&output.stdout);

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!(target = %target, error = %stderr, "Koji build submission failed");
            return Err(ServiceError::Command(format!("koji build failed: {stderr}")));
        }

        parse_task_id(&stdout)
            .ok_or_else(|| ServiceError::Parse(format!("no task id in koji output: {stdout}")))
    }
}

/// Task id from `koji build --nowait` output.
fn parse_task_id(output: &str) -> Option<u64> {
    CREATED_TASK
        .captures(output)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

#[async_trait]
impl KojiApi for KojiCli {
    async fn scratch_build(&self, scm_url: &str, target: &str) -> Result<u64> {
        self.submit(scm_url, target, true)
            .await
            .map_err(|e| e.into_core(SERVICE))
    }

    async fn build(&self, scm_url: &str, target: &str) -> Result<u64> {
        self.submit(scm_url, target, false)
            .await
            .map_err(|e| e.into_core(SERVICE))
    }

    fn task_web_url(&self, task_id: u64) -> String {
        format!("{}/koji/taskinfo?taskID={}", self.web_url, task_id)
    }

    fn task_logs_url(&self, task_id: u64) -> String {
        format!(
            "{}//work/tasks/{}/{}/build.log",
            self.logs_url,
            task_id % 10000,
            task_id
        )
    }
}
