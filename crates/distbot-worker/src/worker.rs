//! Worker that processes tasks from the queue.

use distbot_core::TaskResults;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::context::WorkerContext;
use crate::dispatcher::JobDispatcher;
use crate::error::WorkerResult;
use crate::handlers::{babysit_vm_image_build, run_handler};
use crate::queue::TaskQueue;
use crate::tasks::Task;

/// Runs a single task against the dispatcher and handlers.
pub struct TaskExecutor {
    dispatcher: JobDispatcher,
}

impl TaskExecutor {
    pub fn new(ctx: WorkerContext) -> Self {
        Self {
            dispatcher: JobDispatcher::new(ctx),
        }
    }

    pub fn context(&self) -> &WorkerContext {
        self.dispatcher.context()
    }

    pub async fn execute(&self, task: Task) -> WorkerResult<TaskResults> {
        match task {
            Task::ProcessEvent { event } => {
                let Some(results) = self.dispatcher.process_message(event).await? else {
                    return Ok(TaskResults::skipped("Event ignored"));
                };
                let mut summary = if results.is_success() {
                    TaskResults::success()
                } else {
                    TaskResults::failure("Some jobs failed")
                };
                for (key, result) in results.jobs {
                    summary = summary.with(&key, json!(result));
                }
                Ok(summary)
            }
            Task::RunHandler(inv) => Ok(run_handler(self.context(), &inv).await),
            Task::BabysitVmImageBuild { build_id, attempt } => {
                babysit_vm_image_build(self.context(), &build_id, attempt).await
            }
        }
    }
}

/// A worker that claims and executes tasks.
pub struct Worker {
    id: String,
    queue: Arc<TaskQueue>,
    executor: Arc<TaskExecutor>,
}

impl Worker {
    pub fn new(id: impl Into<String>, queue: Arc<TaskQueue>, executor: Arc<TaskExecutor>) -> Self {
        Self {
            id: id.into(),
            queue,
            executor,
        }
    }

    /// Run the worker loop.
    pub async fn run(&self) {
        info!(worker_id = %self.id, "Starting worker");

        loop {
            match self.queue.claim(&self.id).await {
                Ok(Some(queued)) => {
                    info!(
                        worker_id = %self.id,
                        task_id = %queued.id,
                        task = %queued.task_name,
                        attempts = queued.attempts,
                        "Claimed task"
                    );

                    let outcome = match queued.task() {
                        Ok(task) => self.executor.execute(task).await,
                        Err(e) => Err(e),
                    };
                    let finished = match outcome {
                        Ok(results) => {
                            info!(
                                task_id = %queued.id,
                                success = results.success,
                                "Task finished"
                            );
                            self.queue.complete(queued.id).await
                        }
                        Err(e) => {
                            error!(task_id = %queued.id, error = %e, "Task failed");
                            self.queue.fail(queued.id, &e.to_string()).await
                        }
                    };
                    if let Err(e) = finished {
                        warn!(task_id = %queued.id, error = %e, "Failed to record task outcome");
                    }
                }
                Ok(None) => {
                    sleep(Duration::from_secs(1)).await;
                }
                Err(e) => {
                    warn!(worker_id = %self.id, error = %e, "Failed to claim task");
                    sleep(Duration::from_secs(5)).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::{EventData, HandlerInvocation, HandlerKind};
    use crate::testing::TestEnv;
    use distbot_core::Event;
    use distbot_core::event::InstallationEvent;
    use distbot_core::status::VmImageBuildStatus;

    fn installation() -> Event {
        Event::Installation(InstallationEvent {
            installation_id: 1173510,
            host: "github.com".into(),
            account_login: "packit".into(),
            account_type: "Organization".into(),
            sender_login: "lbarcziova".into(),
        })
    }

    #[tokio::test]
    async fn test_process_event_summarises_jobs() {
        let env = TestEnv::new();
        let executor = TaskExecutor::new(env.ctx.clone());
        let results = executor
            .execute(Task::ProcessEvent { event: installation() })
            .await
            .unwrap();

        assert!(results.success);
        assert_eq!(results.details["add_to_allowlist"]["success"], true);
        assert!(env.ctx.store.allowlist.get("github.com/packit").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_run_handler_task() {
        let env = TestEnv::new();
        let executor = TaskExecutor::new(env.ctx.clone());
        let inv = HandlerInvocation::new(
            HandlerKind::Installation,
            EventData::from_event(installation()),
        );
        let results = executor.execute(Task::RunHandler(inv)).await.unwrap();
        assert_eq!(results.details["namespace"], "github.com/packit");
    }

    #[tokio::test]
    async fn test_babysit_task_emits_result_event() {
        let env = TestEnv::new();
        env.image_builder.set_status("success", None);
        let executor = TaskExecutor::new(env.ctx.clone());
        executor
            .execute(Task::BabysitVmImageBuild {
                build_id: "compose-1".into(),
                attempt: 0,
            })
            .await
            .unwrap();

        let scheduled = env.tasks.take();
        assert_eq!(scheduled.len(), 1);
        let Task::ProcessEvent {
            event: Event::VmImageBuildResult(result),
        } = &scheduled[0].0
        else {
            panic!("expected a VM image result event");
        };
        assert_eq!(result.build_id, "compose-1");
        assert_eq!(result.status, VmImageBuildStatus::Success);
    }
}
