//! Task queue implementation using PostgreSQL.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::sync::Mutex;
use std::time::Duration;

use crate::error::{WorkerError, WorkerResult};
use crate::tasks::Task;

/// A queued task.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct QueuedTask {
    pub id: uuid::Uuid,
    pub task_name: String,
    pub payload: serde_json::Value,
    pub status: String,
    pub attempts: i32,
    pub run_after: DateTime<Utc>,
    pub claimed_by: Option<String>,
    pub claimed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl QueuedTask {
    pub fn task(&self) -> WorkerResult<Task> {
        serde_json::from_value(self.payload.clone())
            .map_err(|e| WorkerError::InvalidTask(format!("{}: {}", self.task_name, e)))
    }
}

/// Where handlers put follow-up work.
#[async_trait]
pub trait TaskSink: Send + Sync {
    /// Queue `task` to run no earlier than `delay` from now.
    async fn schedule(&self, task: Task, delay: Duration) -> WorkerResult<()>;
}

/// Task queue backed by PostgreSQL.
pub struct TaskQueue {
    pool: PgPool,
}

impl TaskQueue {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Enqueue a new task.
    pub async fn enqueue(&self, task: &Task, delay: Duration) -> WorkerResult<QueuedTask> {
        let payload = serde_json::to_value(task)
            .map_err(|e| WorkerError::InvalidTask(format!("{}: {}", task.name(), e)))?;
        let delay = chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::zero());

        let queued = sqlx::query_as::<_, QueuedTask>(
            r#"
            INSERT INTO task_queue (id, task_name, payload, status, attempts, run_after, created_at)
            VALUES ($1, $2, $3, 'pending', 0, $4, NOW())
            RETURNING *
            "#,
        )
        .bind(uuid::Uuid::now_v7())
        .bind(task.name())
        .bind(payload)
        .bind(Utc::now() + delay)
        .fetch_one(&self.pool)
        .await?;
        Ok(queued)
    }

    /// Claim the next task that is due.
    /// Uses SKIP LOCKED so that several workers can poll the same table.
    pub async fn claim(&self, worker_id: &str) -> Result<Option<QueuedTask>, sqlx::Error> {
        let task = sqlx::query_as::<_, QueuedTask>(
            r#"
            UPDATE task_queue
            SET status = 'claimed', claimed_by = $1, claimed_at = NOW(), attempts = attempts + 1
            WHERE id = (
                SELECT id FROM task_queue
                WHERE status = 'pending' AND run_after <= NOW()
                ORDER BY run_after ASC, created_at ASC
                FOR UPDATE SKIP LOCKED
                LIMIT 1
            )
            RETURNING *
            "#,
        )
        .bind(worker_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(task)
    }

    /// Mark a task as completed.
    pub async fn complete(&self, task_id: uuid::Uuid) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE task_queue SET status = 'completed', finished_at = NOW() WHERE id = $1")
            .bind(task_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Mark a task as failed.
    pub async fn fail(&self, task_id: uuid::Uuid, error: &str) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE task_queue SET status = 'failed', error = $2, finished_at = NOW() WHERE id = $1",
        )
        .bind(task_id)
        .bind(error)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Put tasks claimed longer than `timeout` ago back to pending
    /// (workers that died mid-task). Returns how many were released.
    pub async fn release_stale(&self, timeout: Duration) -> Result<u64, sqlx::Error> {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(timeout).unwrap_or_else(|_| chrono::Duration::zero());
        let result = sqlx::query(
            r#"
            UPDATE task_queue
            SET status = 'pending', claimed_by = NULL, claimed_at = NULL
            WHERE status = 'claimed' AND claimed_at < $1
            "#,
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl TaskSink for TaskQueue {
    async fn schedule(&self, task: Task, delay: Duration) -> WorkerResult<()> {
        self.enqueue(&task, delay).await?;
        Ok(())
    }
}

/// Keeps scheduled tasks in memory; used by tests and tools that only
/// need to see what would have been queued.
#[derive(Default)]
pub struct MemoryTaskSink {
    tasks: Mutex<Vec<(Task, Duration)>>,
}

impl MemoryTaskSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drain everything scheduled so far.
    pub fn take(&self) -> Vec<(Task, Duration)> {
        let mut tasks = self.tasks.lock().unwrap_or_else(|e| e.into_inner());
        std::mem::take(&mut *tasks)
    }

    pub fn len(&self) -> usize {
        self.tasks.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl TaskSink for MemoryTaskSink {
    async fn schedule(&self, task: Task, delay: Duration) -> WorkerResult<()> {
        self.tasks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((task, delay));
        Ok(())
    }
}
