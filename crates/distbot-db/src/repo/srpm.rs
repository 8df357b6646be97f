//! SRPM builds.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use distbot_core::status::BuildStatus;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;

use crate::error::parse_column;
use crate::repo::BuildUpdate;
use crate::{DbError, DbResult};

#[derive(Debug, Clone, sqlx::FromRow)]
struct SrpmBuildRow {
    id: uuid::Uuid,
    status: String,
    logs: Option<String>,
    url: Option<String>,
    logs_url: Option<String>,
    copr_build_id: Option<String>,
    copr_web_url: Option<String>,
    commit_sha: Option<String>,
    submitted_time: DateTime<Utc>,
    start_time: Option<DateTime<Utc>>,
    finished_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SrpmBuild {
    pub id: uuid::Uuid,
    pub status: BuildStatus,
    pub logs: Option<String>,
    /// Where the SRPM can be downloaded.
    pub url: Option<String>,
    pub logs_url: Option<String>,
    /// Set when Copr builds the SRPM.
    pub copr_build_id: Option<String>,
    pub copr_web_url: Option<String>,
    pub commit_sha: Option<String>,
    pub submitted_time: DateTime<Utc>,
    pub start_time: Option<DateTime<Utc>>,
    pub finished_time: Option<DateTime<Utc>>,
}

impl TryFrom<SrpmBuildRow> for SrpmBuild {
    type Error = DbError;

    fn try_from(row: SrpmBuildRow) -> Result<Self, Self::Error> {
        Ok(SrpmBuild {
            id: row.id,
            status: parse_column(&row.status)?,
            logs: row.logs,
            url: row.url,
            logs_url: row.logs_url,
            copr_build_id: row.copr_build_id,
            copr_web_url: row.copr_web_url,
            commit_sha: row.commit_sha,
            submitted_time: row.submitted_time,
            start_time: row.start_time,
            finished_time: row.finished_time,
        })
    }
}

#[async_trait]
pub trait SrpmBuildRepo: Send + Sync {
    async fn create(&self, commit_sha: &str, status: BuildStatus) -> DbResult<SrpmBuild>;
    async fn get(&self, id: uuid::Uuid) -> DbResult<SrpmBuild>;
    async fn get_by_copr_build_id(&self, copr_build_id: &str) -> DbResult<Option<SrpmBuild>>;
    async fn set_copr_build(&self, id: uuid::Uuid, copr_build_id: &str, web_url: &str)
    -> DbResult<()>;
    /// `web_url` is ignored; `logs_url` and `data["url"]` update the SRPM links.
    async fn update(&self, id: uuid::Uuid, update: BuildUpdate) -> DbResult<SrpmBuild>;
    async fn list(&self, limit: i64, offset: i64) -> DbResult<Vec<SrpmBuild>>;
}

/// PostgreSQL implementation of SrpmBuildRepo.
pub struct PgSrpmBuildRepo {
    pool: PgPool,
}

impl PgSrpmBuildRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SrpmBuildRepo for PgSrpmBuildRepo {
    async fn create(&self, commit_sha: &str, status: BuildStatus) -> DbResult<SrpmBuild> {
        let row = sqlx::query_as::<_, SrpmBuildRow>(
            r#"
            INSERT INTO srpm_builds (id, status, commit_sha, submitted_time)
            VALUES ($1, $2, $3, NOW())
            RETURNING *
            "#,
        )
        .bind(uuid::Uuid::now_v7())
        .bind(status.as_str())
        .bind(commit_sha)
        .fetch_one(&self.pool)
        .await?;
        row.try_into()
    }

    async fn get(&self, id: uuid::Uuid) -> DbResult<SrpmBuild> {
        let row = sqlx::query_as::<_, SrpmBuildRow>("SELECT * FROM srpm_builds WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DbError::NotFound(format!("SRPM build {}", id)))?;
        row.try_into()
    }

    async fn get_by_copr_build_id(&self, copr_build_id: &str) -> DbResult<Option<SrpmBuild>> {
        let row = sqlx::query_as::<_, SrpmBuildRow>(
            "SELECT * FROM srpm_builds WHERE copr_build_id = $1 ORDER BY submitted_time DESC LIMIT 1",
        )
        .bind(copr_build_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(TryInto::try_into).transpose()
    }

    async fn set_copr_build(
        &self,
        id: uuid::Uuid,
        copr_build_id: &str,
        web_url: &str,
    ) -> DbResult<()> {
        sqlx::query("UPDATE srpm_builds SET copr_build_id = $2, copr_web_url = $3 WHERE id = $1")
            .bind(id)
            .bind(copr_build_id)
            .bind(web_url)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn update(&self, id: uuid::Uuid, update: BuildUpdate) -> DbResult<SrpmBuild> {
        let url = update
            .data
            .as_ref()
            .and_then(|d| d.get("url"))
            .and_then(|u| u.as_str())
            .map(String::from);
        let row = sqlx::query_as::<_, SrpmBuildRow>(
            r#"
            UPDATE srpm_builds SET
                status = COALESCE($2, status),
                start_time = COALESCE($3, start_time),
                finished_time = COALESCE($4, finished_time),
                logs_url = COALESCE($5, logs_url),
                url = COALESCE($6, url)
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(update.status.map(|s| s.as_str()))
        .bind(update.start_time)
        .bind(update.finished_time)
        .bind(update.logs_url)
        .bind(url)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| DbError::NotFound(format!("SRPM build {}", id)))?;
        row.try_into()
    }

    async fn list(&self, limit: i64, offset: i64) -> DbResult<Vec<SrpmBuild>> {
        let rows = sqlx::query_as::<_, SrpmBuildRow>(
            "SELECT * FROM srpm_builds ORDER BY submitted_time DESC LIMIT $1 OFFSET $2",
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }
}
