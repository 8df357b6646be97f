//! Copr build groups and per-chroot build targets.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use distbot_core::status::BuildStatus;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;

use crate::error::parse_column;
use crate::repo::BuildUpdate;
use crate::{DbError, DbResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct CoprBuildGroup {
    pub id: uuid::Uuid,
    pub submitted_time: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct CoprBuildRow {
    id: uuid::Uuid,
    build_id: String,
    commit_sha: String,
    status: String,
    target: String,
    owner: String,
    project_name: String,
    web_url: Option<String>,
    build_logs_url: Option<String>,
    built_packages: Option<serde_json::Value>,
    data: serde_json::Value,
    task_accepted_time: Option<DateTime<Utc>>,
    submitted_time: DateTime<Utc>,
    start_time: Option<DateTime<Utc>>,
    finished_time: Option<DateTime<Utc>>,
    copr_build_group_id: Option<uuid::Uuid>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoprBuildTarget {
    pub id: uuid::Uuid,
    /// Copr build id, shared by all chroots of one submission.
    pub build_id: String,
    pub commit_sha: String,
    pub status: BuildStatus,
    /// Chroot, e.g. `fedora-rawhide-x86_64`.
    pub target: String,
    pub owner: String,
    pub project_name: String,
    pub web_url: Option<String>,
    pub build_logs_url: Option<String>,
    pub built_packages: Option<serde_json::Value>,
    pub data: serde_json::Value,
    pub task_accepted_time: Option<DateTime<Utc>>,
    pub submitted_time: DateTime<Utc>,
    pub start_time: Option<DateTime<Utc>>,
    pub finished_time: Option<DateTime<Utc>>,
    pub copr_build_group_id: Option<uuid::Uuid>,
}

impl TryFrom<CoprBuildRow> for CoprBuildTarget {
    type Error = DbError;

    fn try_from(row: CoprBuildRow) -> Result<Self, Self::Error> {
        Ok(CoprBuildTarget {
            id: row.id,
            build_id: row.build_id,
            commit_sha: row.commit_sha,
            status: parse_column(&row.status)?,
            target: row.target,
            owner: row.owner,
            project_name: row.project_name,
            web_url: row.web_url,
            build_logs_url: row.build_logs_url,
            built_packages: row.built_packages,
            data: row.data,
            task_accepted_time: row.task_accepted_time,
            submitted_time: row.submitted_time,
            start_time: row.start_time,
            finished_time: row.finished_time,
            copr_build_group_id: row.copr_build_group_id,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewCoprBuild {
    pub group_id: uuid::Uuid,
    pub build_id: String,
    pub commit_sha: String,
    pub target: String,
    pub owner: String,
    pub project_name: String,
    pub web_url: Option<String>,
    pub status: BuildStatus,
}

#[async_trait]
pub trait CoprBuildRepo: Send + Sync {
    async fn create_group(&self) -> DbResult<CoprBuildGroup>;
    async fn create_target(&self, build: NewCoprBuild) -> DbResult<CoprBuildTarget>;
    async fn get_target(&self, id: uuid::Uuid) -> DbResult<CoprBuildTarget>;
    async fn get_by_build(&self, build_id: &str, target: &str) -> DbResult<Option<CoprBuildTarget>>;
    async fn list_by_build(&self, build_id: &str) -> DbResult<Vec<CoprBuildTarget>>;
    async fn list_by_commit(&self, commit_sha: &str) -> DbResult<Vec<CoprBuildTarget>>;
    async fn targets_of_group(&self, group_id: uuid::Uuid) -> DbResult<Vec<CoprBuildTarget>>;
    /// Re-point the targets of a submission at the build Copr assigned.
    async fn set_build_id(&self, group_id: uuid::Uuid, build_id: &str, web_url: &str)
    -> DbResult<()>;
    async fn update(&self, id: uuid::Uuid, update: BuildUpdate) -> DbResult<CoprBuildTarget>;
    async fn list(&self, limit: i64, offset: i64) -> DbResult<Vec<CoprBuildTarget>>;
}

/// PostgreSQL implementation of CoprBuildRepo.
pub struct PgCoprBuildRepo {
    pool: PgPool,
}

impl PgCoprBuildRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch_many(&self, query: &str, key: &str) -> DbResult<Vec<CoprBuildTarget>> {
        let rows = sqlx::query_as::<_, CoprBuildRow>(query)
            .bind(key)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }
}

#[async_trait]
impl CoprBuildRepo for PgCoprBuildRepo {
    async fn create_group(&self) -> DbResult<CoprBuildGroup> {
        let group = sqlx::query_as::<_, CoprBuildGroup>(
            "INSERT INTO copr_build_groups (id, submitted_time) VALUES ($1, NOW()) RETURNING *",
        )
        .bind(uuid::Uuid::now_v7())
        .fetch_one(&self.pool)
        .await?;
        Ok(group)
    }

    async fn create_target(&self, build: NewCoprBuild) -> DbResult<CoprBuildTarget> {
        let row = sqlx::query_as::<_, CoprBuildRow>(
            r#"
            INSERT INTO copr_build_targets (
                id, build_id, commit_sha, status, target, owner, project_name,
                web_url, submitted_time, copr_build_group_id
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, NOW(), $9)
            RETURNING *
            "#,
        )
        .bind(uuid::Uuid::now_v7())
        .bind(&build.build_id)
        .bind(&build.commit_sha)
        .bind(build.status.as_str())
        .bind(&build.target)
        .bind(&build.owner)
        .bind(&build.project_name)
        .bind(&build.web_url)
        .bind(build.group_id)
        .fetch_one(&self.pool)
        .await?;
        row.try_into()
    }

    async fn get_target(&self, id: uuid::Uuid) -> DbResult<CoprBuildTarget> {
        let row =
            sqlx::query_as::<_, CoprBuildRow>("SELECT * FROM copr_build_targets WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?
                .ok_or_else(|| DbError::NotFound(format!("Copr build {}", id)))?;
        row.try_into()
    }

    async fn get_by_build(
        &self,
        build_id: &str,
        target: &str,
    ) -> DbResult<Option<CoprBuildTarget>> {
        let row = sqlx::query_as::<_, CoprBuildRow>(
            "SELECT * FROM copr_build_targets WHERE build_id = $1 AND target = $2",
        )
        .bind(build_id)
        .bind(target)
        .fetch_optional(&self.pool)
        .await?;
        row.map(TryInto::try_into).transpose()
    }

    async fn list_by_build(&self, build_id: &str) -> DbResult<Vec<CoprBuildTarget>> {
        self.fetch_many(
            "SELECT * FROM copr_build_targets WHERE build_id = $1 ORDER BY target",
            build_id,
        )
        .await
    }

    async fn list_by_commit(&self, commit_sha: &str) -> DbResult<Vec<CoprBuildTarget>> {
        self.fetch_many(
            "SELECT * FROM copr_build_targets WHERE commit_sha = $1 ORDER BY submitted_time DESC",
            commit_sha,
        )
        .await
    }

    async fn targets_of_group(&self, group_id: uuid::Uuid) -> DbResult<Vec<CoprBuildTarget>> {
        let rows = sqlx::query_as::<_, CoprBuildRow>(
            "SELECT * FROM copr_build_targets WHERE copr_build_group_id = $1 ORDER BY target",
        )
        .bind(group_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn set_build_id(
        &self,
        group_id: uuid::Uuid,
        build_id: &str,
        web_url: &str,
    ) -> DbResult<()> {
        sqlx::query(
            "UPDATE copr_build_targets SET build_id = $2, web_url = $3 WHERE copr_build_group_id = $1",
        )
        .bind(group_id)
        .bind(build_id)
        .bind(web_url)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update(&self, id: uuid::Uuid, update: BuildUpdate) -> DbResult<CoprBuildTarget> {
        let row = sqlx::query_as::<_, CoprBuildRow>(
            r#"
            UPDATE copr_build_targets SET
                status = COALESCE($2, status),
                start_time = COALESCE($3, start_time),
                finished_time = COALESCE($4, finished_time),
                web_url = COALESCE($5, web_url),
                build_logs_url = COALESCE($6, build_logs_url),
                data = data || COALESCE($7, '{}'::jsonb),
                built_packages = COALESCE($8, built_packages)
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
        .bind(update.built_packages)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| DbError::NotFound(format!("Copr build {}", id)))?;
        row.try_into()
    }

    async fn list(&self, limit: i64, offset: i64) -> DbResult<Vec<CoprBuildTarget>> {
        let rows = sqlx::query_as::<_, CoprBuildRow>(
            "SELECT * FROM copr_build_targets ORDER BY submitted_time DESC LIMIT $1 OFFSET $2",
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }
}
