//! Koji build groups and per-target builds.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use distbot_core::status::BuildStatus;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;

use crate::error::parse_column;
use crate::repo::BuildUpdate;
use crate::{DbError, DbResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct KojiBuildGroup {
    pub id: uuid::Uuid,
    pub submitted_time: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct KojiBuildRow {
    id: uuid::Uuid,
    build_id: String,
    commit_sha: String,
    status: String,
    target: String,
    web_url: Option<String>,
    build_logs_url: Option<String>,
    scratch: bool,
    data: serde_json::Value,
    submitted_time: DateTime<Utc>,
    start_time: Option<DateTime<Utc>>,
    finished_time: Option<DateTime<Utc>>,
    koji_build_group_id: Option<uuid::Uuid>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KojiBuildTarget {
    pub id: uuid::Uuid,
    /// Koji task id.
    pub build_id: String,
    pub commit_sha: String,
    pub status: BuildStatus,
    /// Koji target, e.g. `f37-candidate` or `rawhide`.
    pub target: String,
    pub web_url: Option<String>,
    pub build_logs_url: Option<String>,
    pub scratch: bool,
    /// Free-form metadata; `koji_state` holds the last raw Koji state.
    pub data: serde_json::Value,
    pub submitted_time: DateTime<Utc>,
    pub start_time: Option<DateTime<Utc>>,
    pub finished_time: Option<DateTime<Utc>>,
    pub koji_build_group_id: Option<uuid::Uuid>,
}

impl TryFrom<KojiBuildRow> for KojiBuildTarget {
    type Error = DbError;

    fn try_from(row: KojiBuildRow) -> Result<Self, Self::Error> {
        Ok(KojiBuildTarget {
            id: row.id,
            build_id: row.build_id,
            commit_sha: row.commit_sha,
            status: parse_column(&row.status)?,
            target: row.target,
            web_url: row.web_url,
            build_logs_url: row.build_logs_url,
            scratch: row.scratch,
            data: row.data,
            submitted_time: row.submitted_time,
            start_time: row.start_time,
            finished_time: row.finished_time,
            koji_build_group_id: row.koji_build_group_id,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewKojiBuild {
    pub group_id: uuid::Uuid,
    pub build_id: String,
    pub commit_sha: String,
    pub target: String,
    pub scratch: bool,
    pub status: BuildStatus,
    pub web_url: Option<String>,
    pub build_logs_url: Option<String>,
    pub data: serde_json::Value,
}

#[async_trait]
pub trait KojiBuildRepo: Send + Sync {
    async fn create_group(&self) -> DbResult<KojiBuildGroup>;
    async fn create_target(&self, build: NewKojiBuild) -> DbResult<KojiBuildTarget>;
    async fn get_target(&self, id: uuid::Uuid) -> DbResult<KojiBuildTarget>;
    async fn get_by_build_id(&self, build_id: &str) -> DbResult<Option<KojiBuildTarget>>;
    async fn targets_of_group(&self, group_id: uuid::Uuid) -> DbResult<Vec<KojiBuildTarget>>;
    async fn update(&self, id: uuid::Uuid, update: BuildUpdate) -> DbResult<KojiBuildTarget>;
    async fn list(&self, scratch: Option<bool>, limit: i64, offset: i64)
    -> DbResult<Vec<KojiBuildTarget>>;
}

/// PostgreSQL implementation of KojiBuildRepo.
pub struct PgKojiBuildRepo {
    pool: PgPool,
}

impl PgKojiBuildRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl KojiBuildRepo for PgKojiBuildRepo {
    async fn create_group(&self) -> DbResult<KojiBuildGroup> {
        let group = sqlx::query_as::<_, KojiBuildGroup>(
            "INSERT INTO koji_build_groups (id, submitted_time) VALUES ($1, NOW()) RETURNING *",
        )
        .bind(uuid::Uuid::now_v7())
        .fetch_one(&self.pool)
        .await?;
        Ok(group)
    }

    async fn create_target(&self, build: NewKojiBuild) -> DbResult<KojiBuildTarget> {
        let row = sqlx::query_as::<_, KojiBuildRow>(
            r#"
            INSERT INTO koji_build_targets (
                id, build_id, commit_sha, status, target, web_url, build_logs_url,
                scratch, data, submitted_time, koji_build_group_id
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, NOW(), $10)
            RETURNING *
            "#,
        )
        .bind(uuid::Uuid::now_v7())
        .bind(&build.build_id)
        .bind(&build.commit_sha)
        .bind(build.status.as_str())
        .bind(&build.target)
        .bind(&build.web_url)
        .bind(&build.build_logs_url)
        .bind(build.scratch)
        .bind(&build.data)
        .bind(build.group_id)
        .fetch_one(&self.pool)
        .await?;
        row.try_into()
    }

    async fn get_target(&self, id: uuid::Uuid) -> DbResult<KojiBuildTarget> {
        let row =
            sqlx::query_as::<_, KojiBuildRow>("SELECT * FROM koji_build_targets WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?
                .ok_or_else(|| DbError::NotFound(format!("Koji build {}", id)))?;
        row.try_into()
    }

    async fn get_by_build_id(&self, build_id: &str) -> DbResult<Option<KojiBuildTarget>> {
        let row = sqlx::query_as::<_, KojiBuildRow>(
            "SELECT * FROM koji_build_targets WHERE build_id = $1 ORDER BY submitted_time DESC LIMIT 1",
        )
        .bind(build_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(TryInto::try_into).transpose()
    }

    async fn targets_of_group(&self, group_id: uuid::Uuid) -> DbResult<Vec<KojiBuildTarget>> {
        let rows = sqlx::query_as::<_, KojiBuildRow>(
            "SELECT * FROM koji_build_targets WHERE koji_build_group_id = $1 ORDER BY target",
        )
        .bind(group_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn update(&self, id: uuid::Uuid, update: BuildUpdate) -> DbResult<KojiBuildTarget> {
        let row = sqlx::query_as::<_, KojiBuildRow>(
            r#"
            UPDATE koji_build_targets SET
                status = COALESCE($2, status),
                start_time = COALESCE($3, start_time),
                finished_time = COALESCE($4, finished_time),
                web_url = COALESCE($5, web_url),
                build_logs_url = COALESCE($6, build_logs_url),
                data = data || COALESCE($7, '{}'::jsonb)
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(update.status.map(|s| s.as_str()))
        .bind(update.start_time)
        .bind(update.finished_time)
        .bind(update.web_url)
        .bind(update.logs_url)
        .bind(update.data)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| DbError::NotFound(format!("Koji build {}", id)))?;
        row.try_into()
    }

    async fn list(
        &self,
        scratch: Option<bool>,
        limit: i64,
        offset: i64,
    ) -> DbResult<Vec<KojiBuildTarget>> {
        let rows = sqlx::query_as::<_, KojiBuildRow>(
            r#"
            SELECT * FROM koji_build_targets
            WHERE $1::boolean IS NULL OR scratch = $1
            ORDER BY submitted_time DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(scratch)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }
}
