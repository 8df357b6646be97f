//! VM image builds.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use distbot_core::status::VmImageBuildStatus;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;

use crate::error::parse_column;
use crate::{DbError, DbResult};

#[derive(Debug, Clone, sqlx::FromRow)]
struct VmImageBuildRow {
    id: uuid::Uuid,
    build_id: String,
    commit_sha: String,
    target: String,
    owner: String,
    project_name: String,
    project_url: String,
    status: String,
    data: serde_json::Value,
    submitted_time: DateTime<Utc>,
    start_time: Option<DateTime<Utc>>,
    finished_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VmImageBuild {
    pub id: uuid::Uuid,
    /// Image builder compose id.
    pub build_id: String,
    pub commit_sha: String,
    pub target: String,
    /// Copr owner and project the image installs packages from.
    pub owner: String,
    pub project_name: String,
    pub project_url: String,
    pub status: VmImageBuildStatus,
    pub data: serde_json::Value,
    pub submitted_time: DateTime<Utc>,
    pub start_time: Option<DateTime<Utc>>,
    pub finished_time: Option<DateTime<Utc>>,
}

impl TryFrom<VmImageBuildRow> for VmImageBuild {
    type Error = DbError;

    fn try_from(row: VmImageBuildRow) -> Result<Self, Self::Error> {
        Ok(VmImageBuild {
            id: row.id,
            build_id: row.build_id,
            commit_sha: row.commit_sha,
            target: row.target,
            owner: row.owner,
            project_name: row.project_name,
            project_url: row.project_url,
            status: parse_column(&row.status)?,
            data: row.data,
            submitted_time: row.submitted_time,
            start_time: row.start_time,
            finished_time: row.finished_time,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewVmImageBuild {
    pub build_id: String,
    pub commit_sha: String,
    pub target: String,
    pub owner: String,
    pub project_name: String,
    pub project_url: String,
    pub status: VmImageBuildStatus,
    pub data: serde_json::Value,
}

#[async_trait]
pub trait VmImageBuildRepo: Send + Sync {
    async fn create(&self, build: NewVmImageBuild) -> DbResult<VmImageBuild>;
    async fn get(&self, id: uuid::Uuid) -> DbResult<VmImageBuild>;
    async fn get_by_build_id(&self, build_id: &str) -> DbResult<Option<VmImageBuild>>;
    /// Set the status; reaching a final status sets `finished_time`.
    async fn set_status(
        &self,
        id: uuid::Uuid,
        status: VmImageBuildStatus,
        data: Option<serde_json::Value>,
    ) -> DbResult<VmImageBuild>;
    async fn list(&self, limit: i64, offset: i64) -> DbResult<Vec<VmImageBuild>>;
}

/// PostgreSQL implementation of VmImageBuildRepo.
pub struct PgVmImageBuildRepo {
    pool: PgPool,
}

impl PgVmImageBuildRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl VmImageBuildRepo for PgVmImageBuildRepo {
    async fn create(&self, build: NewVmImageBuild) -> DbResult<VmImageBuild> {
        let row = sqlx::query_as::<_, VmImageBuildRow>(
            r#"
            INSERT INTO vm_image_build_targets (
                id, build_id, commit_sha, target, owner, project_name, project_url,
                status, data, submitted_time
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, NOW())
            RETURNING *
            "#,
        )
        .bind(uuid::Uuid::now_v7())
        .bind(&build.build_id)
        .bind(&build.commit_sha)
        .bind(&build.target)
        .bind(&build.owner)
        .bind(&build.project_name)
        .bind(&build.project_url)
        .bind(build.status.as_str())
        .bind(&build.data)
        .fetch_one(&self.pool)
        .await?;
        row.try_into()
    }

    async fn get(&self, id: uuid::Uuid) -> DbResult<VmImageBuild> {
        let row = sqlx::query_as::<_, VmImageBuildRow>(
            "SELECT * FROM vm_image_build_targets WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| DbError::NotFound(format!("VM image build {}", id)))?;
        row.try_into()
    }

    async fn get_by_build_id(&self, build_id: &str) -> DbResult<Option<VmImageBuild>> {
        let row = sqlx::query_as::<_, VmImageBuildRow>(
            "SELECT * FROM vm_image_build_targets WHERE build_id = $1",
        )
        .bind(build_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(TryInto::try_into).transpose()
    }

    async fn set_status(
        &self,
        id: uuid::Uuid,
        status: VmImageBuildStatus,
        data: Option<serde_json::Value>,
    ) -> DbResult<VmImageBuild> {
        let row = sqlx::query_as::<_, VmImageBuildRow>(
            r#"
            UPDATE vm_image_build_targets SET
                status = $2,
                data = data || COALESCE($3, '{}'::jsonb),
                start_time = CASE WHEN $2 = 'building' THEN COALESCE(start_time, NOW()) ELSE start_time END,
                finished_time = CASE WHEN $4 THEN NOW() ELSE finished_time END
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(status.as_str())
        .bind(data)
        .bind(status.is_final())
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| DbError::NotFound(format!("VM image build {}", id)))?;
        row.try_into()
    }

    async fn list(&self, limit: i64, offset: i64) -> DbResult<Vec<VmImageBuild>> {
        let rows = sqlx::query_as::<_, VmImageBuildRow>(
            "SELECT * FROM vm_image_build_targets ORDER BY submitted_time DESC LIMIT $1 OFFSET $2",
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }
}
