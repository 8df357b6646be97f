//! App installations put the installing namespace on the allowlist.

use async_trait::async_trait;
use distbot_core::status::AllowlistStatus;
use distbot_core::{Event, TaskResults};
use serde_json::json;
use tracing::info;

use super::{HandlerInvocation, JobHandler, unexpected_event};
use crate::context::WorkerContext;
use crate::error::WorkerResult;

pub struct InstallationHandler;

#[async_trait]
impl JobHandler for InstallationHandler {
    async fn run(&self, ctx: &WorkerContext, inv: &HandlerInvocation) -> WorkerResult<TaskResults> {
        let Event::Installation(event) = &inv.data.event else {
            return Err(unexpected_event(inv));
        };
        let namespace = event.namespace_path();
        let allowlist = &ctx.store.allowlist;

        if let Some(entry) = allowlist.get(&namespace).await? {
            if entry.status.is_approved() {
                return Ok(TaskResults::skipped(format!("Namespace {} already approved", namespace)));
            }
        }

        let trusted = ctx
            .config
            .trusted_accounts
            .iter()
            .any(|a| a == &event.sender_login);
        let status = if trusted {
            AllowlistStatus::ApprovedAutomatically
        } else {
            AllowlistStatus::Waiting
        };
        allowlist
            .upsert(&namespace, status, Some(&event.sender_login))
            .await?;
        info!(
            namespace = %namespace,
            installation_id = event.installation_id,
            sender = %event.sender_login,
            status = %status,
            "Recorded installation"
        );
        Ok(TaskResults::success()
            .with("namespace", json!(namespace))
            .with("status", json!(status)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::{EventData, HandlerKind, run_handler};
    use crate::testing::TestEnv;
    use distbot_core::event::InstallationEvent;

    fn installation(sender: &str) -> HandlerInvocation {
        let event = Event::Installation(InstallationEvent {
            installation_id: 1173510,
            host: "github.com".into(),
            account_login: "packit".into(),
            account_type: "Organization".into(),
            sender_login: sender.into(),
        });
        HandlerInvocation::new(HandlerKind::Installation, EventData::from_event(event))
    }

    #[tokio::test]
    async fn test_untrusted_sender_waits_for_approval() {
        let env = TestEnv::new();
        let result = run_handler(&env.ctx, &installation("someone")).await;
        assert!(result.success);
        assert_eq!(result.details["status"], "waiting");

        let entry = env.ctx.store.allowlist.get("github.com/packit").await.unwrap().unwrap();
        assert_eq!(entry.status, AllowlistStatus::Waiting);
        assert_eq!(entry.fas_account.as_deref(), Some("someone"));
    }

    #[tokio::test]
    async fn test_trusted_sender_is_approved_automatically() {
        let env = TestEnv::with_config(|c| c.trusted_accounts = vec!["lbarcziova".into()]);
        run_handler(&env.ctx, &installation("lbarcziova")).await;

        let entry = env.ctx.store.allowlist.get("github.com/packit").await.unwrap().unwrap();
        assert_eq!(entry.status, AllowlistStatus::ApprovedAutomatically);
    }

    #[tokio::test]
    async fn test_approved_namespace_is_kept() {
        let env = TestEnv::new();
        env.allow_packit().await;
        let result = run_handler(&env.ctx, &installation("someone")).await;
        assert_eq!(result.msg(), Some("Namespace github.com/packit already approved"));

        let entry = env.ctx.store.allowlist.get("github.com/packit").await.unwrap().unwrap();
        assert_eq!(entry.status, AllowlistStatus::ApprovedManually);
    }
}
