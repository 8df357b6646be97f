//! Release-sync runs (propose-downstream, pull-from-upstream) and their
//! per-branch targets.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use distbot_core::status::{SyncReleaseJobType, SyncReleaseStatus, SyncReleaseTargetStatus};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;

use crate::error::parse_column;
use crate::{DbError, DbResult};

#[derive(Debug, Clone, sqlx::FromRow)]
struct SyncReleaseRunRow {
    id: uuid::Uuid,
    status: String,
    job_type: String,
    submitted_time: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncReleaseRun {
    pub id: uuid::Uuid,
    pub status: SyncReleaseStatus,
    pub job_type: SyncReleaseJobType,
    pub submitted_time: DateTime<Utc>,
}

impl TryFrom<SyncReleaseRunRow> for SyncReleaseRun {
    type Error = DbError;

    fn try_from(row: SyncReleaseRunRow) -> Result<Self, Self::Error> {
        Ok(SyncReleaseRun {
            id: row.id,
            status: parse_column(&row.status)?,
            job_type: parse_column(&row.job_type)?,
            submitted_time: row.submitted_time,
        })
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct SyncReleaseTargetRow {
    id: uuid::Uuid,
    branch: String,
    downstream_pr_url: Option<String>,
    status: String,
    logs: Option<String>,
    submitted_time: DateTime<Utc>,
    start_time: Option<DateTime<Utc>>,
    finished_time: Option<DateTime<Utc>>,
    sync_release_id: uuid::Uuid,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncReleaseTarget {
    pub id: uuid::Uuid,
    /// Dist-git branch.
    pub branch: String,
    pub downstream_pr_url: Option<String>,
    pub status: SyncReleaseTargetStatus,
    pub logs: Option<String>,
    pub submitted_time: DateTime<Utc>,
    pub start_time: Option<DateTime<Utc>>,
    pub finished_time: Option<DateTime<Utc>>,
    pub sync_release_id: uuid::Uuid,
}

impl TryFrom<SyncReleaseTargetRow> for SyncReleaseTarget {
    type Error = DbError;

    fn try_from(row: SyncReleaseTargetRow) -> Result<Self, Self::Error> {
        Ok(SyncReleaseTarget {
            id: row.id,
            branch: row.branch,
            downstream_pr_url: row.downstream_pr_url,
            status: parse_column(&row.status)?,
            logs: row.logs,
            submitted_time: row.submitted_time,
            start_time: row.start_time,
            finished_time: row.finished_time,
            sync_release_id: row.sync_release_id,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncTargetUpdate {
    pub status: Option<SyncReleaseTargetStatus>,
    pub downstream_pr_url: Option<String>,
    pub logs: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub finished_time: Option<DateTime<Utc>>,
}

#[async_trait]
pub trait SyncReleaseRepo: Send + Sync {
    async fn create_run(
        &self,
        job_type: SyncReleaseJobType,
        status: SyncReleaseStatus,
    ) -> DbResult<SyncReleaseRun>;
    async fn get_run(&self, id: uuid::Uuid) -> DbResult<SyncReleaseRun>;
    async fn set_run_status(&self, id: uuid::Uuid, status: SyncReleaseStatus) -> DbResult<()>;
    async fn create_target(
        &self,
        run_id: uuid::Uuid,
        branch: &str,
        status: SyncReleaseTargetStatus,
    ) -> DbResult<SyncReleaseTarget>;
    async fn update_target(
        &self,
        id: uuid::Uuid,
        update: SyncTargetUpdate,
    ) -> DbResult<SyncReleaseTarget>;
    async fn targets_of_run(&self, run_id: uuid::Uuid) -> DbResult<Vec<SyncReleaseTarget>>;
    async fn list_runs(
        &self,
        job_type: Option<SyncReleaseJobType>,
        limit: i64,
        offset: i64,
    ) -> DbResult<Vec<SyncReleaseRun>>;
}

/// PostgreSQL implementation of SyncReleaseRepo.
pub struct PgSyncReleaseRepo {
    pool: PgPool,
}

impl PgSyncReleaseRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SyncReleaseRepo for PgSyncReleaseRepo {
    async fn create_run(
        &self,
        job_type: SyncReleaseJobType,
        status: SyncReleaseStatus,
    ) -> DbResult<SyncReleaseRun> {
        let row = sqlx::query_as::<_, SyncReleaseRunRow>(
            r#"
            INSERT INTO sync_release_runs (id, status, job_type, submitted_time)
            VALUES ($1, $2, $3, NOW())
            RETURNING *
            "#,
        )
        .bind(uuid::Uuid::now_v7())
        .bind(status.as_str())
        .bind(job_type.as_str())
        .fetch_one(&self.pool)
        .await?;
        row.try_into()
    }

    async fn get_run(&self, id: uuid::Uuid) -> DbResult<SyncReleaseRun> {
        let row =
            sqlx::query_as::<_, SyncReleaseRunRow>("SELECT * FROM sync_release_runs WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?
                .ok_or_else(|| DbError::NotFound(format!("sync release run {}", id)))?;
        row.try_into()
    }

    async fn set_run_status(&self, id: uuid::Uuid, status: SyncReleaseStatus) -> DbResult<()> {
        sqlx::query("UPDATE sync_release_runs SET status = $2 WHERE id = $1")
            .bind(id)
            .bind(status.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn create_target(
        &self,
        run_id: uuid::Uuid,
        branch: &str,
        status: SyncReleaseTargetStatus,
    ) -> DbResult<SyncReleaseTarget> {
        let row = sqlx::query_as::<_, SyncReleaseTargetRow>(
            r#"
            INSERT INTO sync_release_run_targets (id, branch, status, submitted_time, sync_release_id)
            VALUES ($1, $2, $3, NOW(), $4)
            RETURNING *
            "#,
        )
        .bind(uuid::Uuid::now_v7())
        .bind(branch)
        .bind(status.as_str())
        .bind(run_id)
        .fetch_one(&self.pool)
        .await?;
        row.try_into()
    }

    async fn update_target(
        &self,
        id: uuid::Uuid,
        update: SyncTargetUpdate,
    ) -> DbResult<SyncReleaseTarget> {
        let row = sqlx::query_as::<_, SyncReleaseTargetRow>(
            r#"
            UPDATE sync_release_run_targets SET
                status = COALESCE($2, status),
                downstream_pr_url = COALESCE($3, downstream_pr_url),
                logs = COALESCE($4, logs),
                start_time = COALESCE($5, start_time),
                finished_time = COALESCE($6, finished_time)
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(update.status.map(|s| s.as_str()))
        .bind(update.downstream_pr_url)
        .bind(update.logs)
        .bind(update.start_time)
        .bind(update.finished_time)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| DbError::NotFound(format!("sync release target {}", id)))?;
        row.try_into()
    }

    async fn targets_of_run(&self, run_id: uuid::Uuid) -> DbResult<Vec<SyncReleaseTarget>> {
        let rows = sqlx::query_as::<_, SyncReleaseTargetRow>(
            "SELECT * FROM sync_release_run_targets WHERE sync_release_id = $1 ORDER BY branch",
        )
        .bind(run_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn list_runs(
        &self,
        job_type: Option<SyncReleaseJobType>,
        limit: i64,
        offset: i64,
    ) -> DbResult<Vec<SyncReleaseRun>> {
        let rows = sqlx::query_as::<_, SyncReleaseRunRow>(
            r#"
            SELECT * FROM sync_release_runs
            WHERE $1::text IS NULL OR job_type = $1
            ORDER BY submitted_time DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(job_type.map(|t| t.as_str()))
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }
}
