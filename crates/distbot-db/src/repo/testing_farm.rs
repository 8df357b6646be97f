//! Testing Farm run groups and per-target test runs.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use distbot_core::status::TestingFarmResult;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;

use crate::error::parse_column;
use crate::{DbError, DbResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct TestRunGroup {
    pub id: uuid::Uuid,
    pub submitted_time: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct TestRunRow {
    id: uuid::Uuid,
    pipeline_id: Option<String>,
    identifier: Option<String>,
    commit_sha: String,
    status: String,
    target: String,
    web_url: Option<String>,
    data: serde_json::Value,
    submitted_time: DateTime<Utc>,
    tft_test_run_group_id: Option<uuid::Uuid>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestRunTarget {
    pub id: uuid::Uuid,
    /// Testing Farm request id, set once the request is submitted.
    pub pipeline_id: Option<String>,
    pub identifier: Option<String>,
    pub commit_sha: String,
    pub status: TestingFarmResult,
    pub target: String,
    pub web_url: Option<String>,
    pub data: serde_json::Value,
    pub submitted_time: DateTime<Utc>,
    pub tft_test_run_group_id: Option<uuid::Uuid>,
}

impl TryFrom<TestRunRow> for TestRunTarget {
    type Error = DbError;

    fn try_from(row: TestRunRow) -> Result<Self, Self::Error> {
        Ok(TestRunTarget {
            id: row.id,
            pipeline_id: row.pipeline_id,
            identifier: row.identifier,
            commit_sha: row.commit_sha,
            status: parse_column(&row.status)?,
            target: row.target,
            web_url: row.web_url,
            data: row.data,
            submitted_time: row.submitted_time,
            tft_test_run_group_id: row.tft_test_run_group_id,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewTestRun {
    pub group_id: uuid::Uuid,
    pub identifier: Option<String>,
    pub commit_sha: String,
    pub target: String,
    pub status: TestingFarmResult,
    pub data: serde_json::Value,
    /// Copr build targets whose artifacts are tested.
    pub copr_build_ids: Vec<uuid::Uuid>,
}

#[async_trait]
pub trait TestRunRepo: Send + Sync {
    async fn create_group(&self) -> DbResult<TestRunGroup>;
    async fn create_target(&self, run: NewTestRun) -> DbResult<TestRunTarget>;
    async fn get_target(&self, id: uuid::Uuid) -> DbResult<TestRunTarget>;
    async fn get_by_pipeline_id(&self, pipeline_id: &str) -> DbResult<Option<TestRunTarget>>;
    async fn set_submitted(&self, id: uuid::Uuid, pipeline_id: &str, web_url: &str)
    -> DbResult<()>;
    async fn set_status(
        &self,
        id: uuid::Uuid,
        status: TestingFarmResult,
        web_url: Option<&str>,
    ) -> DbResult<()>;
    async fn targets_of_group(&self, group_id: uuid::Uuid) -> DbResult<Vec<TestRunTarget>>;
    /// Copr build target ids tested by a run.
    async fn copr_builds_of(&self, id: uuid::Uuid) -> DbResult<Vec<uuid::Uuid>>;
    async fn list(&self, limit: i64, offset: i64) -> DbResult<Vec<TestRunTarget>>;
}

/// PostgreSQL implementation of TestRunRepo.
pub struct PgTestRunRepo {
    pool: PgPool,
}

impl PgTestRunRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TestRunRepo for PgTestRunRepo {
    async fn create_group(&self) -> DbResult<TestRunGroup> {
        let group = sqlx::query_as::<_, TestRunGroup>(
            "INSERT INTO tft_test_run_groups (id, submitted_time) VALUES ($1, NOW()) RETURNING *",
        )
        .bind(uuid::Uuid::now_v7())
        .fetch_one(&self.pool)
        .await?;
        Ok(group)
    }

    async fn create_target(&self, run: NewTestRun) -> DbResult<TestRunTarget> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, TestRunRow>(
            r#"
            INSERT INTO tft_test_run_targets (
                id, identifier, commit_sha, status, target, data, submitted_time,
                tft_test_run_group_id
            )
            VALUES ($1, $2, $3, $4, $5, $6, NOW(), $7)
            RETURNING *
            "#,
        )
        .bind(uuid::Uuid::now_v7())
        .bind(&run.identifier)
        .bind(&run.commit_sha)
        .bind(run.status.as_str())
        .bind(&run.target)
        .bind(&run.data)
        .bind(run.group_id)
        .fetch_one(&mut *tx)
        .await?;

        for copr_id in &run.copr_build_ids {
            sqlx::query("INSERT INTO tf_copr_build_association (copr_id, tft_id) VALUES ($1, $2)")
                .bind(copr_id)
                .bind(row.id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        row.try_into()
    }

    async fn get_target(&self, id: uuid::Uuid) -> DbResult<TestRunTarget> {
        let row =
            sqlx::query_as::<_, TestRunRow>("SELECT * FROM tft_test_run_targets WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?
                .ok_or_else(|| DbError::NotFound(format!("test run {}", id)))?;
        row.try_into()
    }

    async fn get_by_pipeline_id(&self, pipeline_id: &str) -> DbResult<Option<TestRunTarget>> {
        let row = sqlx::query_as::<_, TestRunRow>(
            "SELECT * FROM tft_test_run_targets WHERE pipeline_id = $1",
        )
        .bind(pipeline_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(TryInto::try_into).transpose()
    }

    async fn set_submitted(
        &self,
        id: uuid::Uuid,
        pipeline_id: &str,
        web_url: &str,
    ) -> DbResult<()> {
        sqlx::query(
            "UPDATE tft_test_run_targets SET pipeline_id = $2, web_url = $3, status = $4 WHERE id = $1",
        )
        .bind(id)
        .bind(pipeline_id)
        .bind(web_url)
        .bind(TestingFarmResult::Queued.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn set_status(
        &self,
        id: uuid::Uuid,
        status: TestingFarmResult,
        web_url: Option<&str>,
    ) -> DbResult<()> {
        sqlx::query(
            "UPDATE tft_test_run_targets SET status = $2, web_url = COALESCE($3, web_url) WHERE id = $1",
        )
        .bind(id)
        .bind(status.as_str())
        .bind(web_url)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn targets_of_group(&self, group_id: uuid::Uuid) -> DbResult<Vec<TestRunTarget>> {
        let rows = sqlx::query_as::<_, TestRunRow>(
            "SELECT * FROM tft_test_run_targets WHERE tft_test_run_group_id = $1 ORDER BY target",
        )
        .bind(group_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn copr_builds_of(&self, id: uuid::Uuid) -> DbResult<Vec<uuid::Uuid>> {
        let ids: Vec<(uuid::Uuid,)> =
            sqlx::query_as("SELECT copr_id FROM tf_copr_build_association WHERE tft_id = $1")
                .bind(id)
                .fetch_all(&self.pool)
                .await?;
        Ok(ids.into_iter().map(|(id,)| id).collect())
    }

    async fn list(&self, limit: i64, offset: i64) -> DbResult<Vec<TestRunTarget>> {
        let rows = sqlx::query_as::<_, TestRunRow>(
            "SELECT * FROM tft_test_run_targets ORDER BY submitted_time DESC LIMIT $1 OFFSET $2",
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }
}
