//! Git projects and the job triggers (project events) they produce.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use distbot_core::ProjectRef;
use distbot_core::status::ProjectEventType;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;

use crate::error::parse_column;
use crate::{DbError, DbResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct GitProject {
    pub id: uuid::Uuid,
    pub namespace: String,
    pub repo_name: String,
    pub project_url: String,
    pub instance_url: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct JobTriggerRow {
    id: uuid::Uuid,
    trigger_type: String,
    project_id: uuid::Uuid,
    identifier: String,
    created_at: DateTime<Utc>,
}

/// A project event: pull request, branch push, release or issue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobTriggerRecord {
    pub id: uuid::Uuid,
    pub trigger_type: ProjectEventType,
    pub project_id: uuid::Uuid,
    /// PR number, branch name, tag name or issue number.
    pub identifier: String,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<JobTriggerRow> for JobTriggerRecord {
    type Error = DbError;

    fn try_from(row: JobTriggerRow) -> Result<Self, Self::Error> {
        Ok(JobTriggerRecord {
            id: row.id,
            trigger_type: parse_column(&row.trigger_type)?,
            project_id: row.project_id,
            identifier: row.identifier,
            created_at: row.created_at,
        })
    }
}

#[async_trait]
pub trait ProjectRepo: Send + Sync {
    async fn get_or_create_project(&self, project: &ProjectRef) -> DbResult<GitProject>;
    async fn get_project(&self, id: uuid::Uuid) -> DbResult<GitProject>;
    async fn get_or_create_trigger(
        &self,
        project_id: uuid::Uuid,
        trigger_type: ProjectEventType,
        identifier: &str,
    ) -> DbResult<JobTriggerRecord>;
    async fn get_trigger(&self, id: uuid::Uuid) -> DbResult<JobTriggerRecord>;
}

/// PostgreSQL implementation of ProjectRepo.
pub struct PgProjectRepo {
    pool: PgPool,
}

impl PgProjectRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProjectRepo for PgProjectRepo {
    async fn get_or_create_project(&self, project: &ProjectRef) -> DbResult<GitProject> {
        // The no-op update makes RETURNING yield the existing row on conflict
        let record = sqlx::query_as::<_, GitProject>(
            r#"
            INSERT INTO git_projects (id, namespace, repo_name, project_url, instance_url, created_at)
            VALUES ($1, $2, $3, $4, $5, NOW())
            ON CONFLICT (project_url) DO UPDATE SET project_url = EXCLUDED.project_url
            RETURNING *
            "#,
        )
        .bind(uuid::Uuid::now_v7())
        .bind(&project.namespace)
        .bind(&project.repo)
        .bind(project.project_url())
        .bind(&project.instance_url)
        .fetch_one(&self.pool)
        .await?;
        Ok(record)
    }

    async fn get_project(&self, id: uuid::Uuid) -> DbResult<GitProject> {
        let record = sqlx::query_as::<_, GitProject>("SELECT * FROM git_projects WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DbError::NotFound(format!("project {}", id)))?;
        Ok(record)
    }

    async fn get_or_create_trigger(
        &self,
        project_id: uuid::Uuid,
        trigger_type: ProjectEventType,
        identifier: &str,
    ) -> DbResult<JobTriggerRecord> {
        let row = sqlx::query_as::<_, JobTriggerRow>(
            r#"
            INSERT INTO job_triggers (id, trigger_type, project_id, identifier, created_at)
            VALUES ($1, $2, $3, $4, NOW())
            ON CONFLICT (project_id, trigger_type, identifier)
                DO UPDATE SET identifier = EXCLUDED.identifier
            RETURNING *
            "#,
        )
        .bind(uuid::Uuid::now_v7())
        .bind(trigger_type.as_str())
        .bind(project_id)
        .bind(identifier)
        .fetch_one(&self.pool)
        .await?;
        row.try_into()
    }

    async fn get_trigger(&self, id: uuid::Uuid) -> DbResult<JobTriggerRecord> {
        let row = sqlx::query_as::<_, JobTriggerRow>("SELECT * FROM job_triggers WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DbError::NotFound(format!("job trigger {}", id)))?;
        row.try_into()
    }
}
