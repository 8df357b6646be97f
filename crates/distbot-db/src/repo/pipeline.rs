//! Pipelines: the join rows between a job trigger and its artifacts.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;

use crate::{DbError, DbResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Pipeline {
    pub id: uuid::Uuid,
    pub created_at: DateTime<Utc>,
    pub job_trigger_id: Option<uuid::Uuid>,
    pub srpm_build_id: Option<uuid::Uuid>,
    pub copr_build_group_id: Option<uuid::Uuid>,
    pub koji_build_group_id: Option<uuid::Uuid>,
    pub test_run_group_id: Option<uuid::Uuid>,
    pub sync_release_run_id: Option<uuid::Uuid>,
    pub vm_image_build_id: Option<uuid::Uuid>,
}

/// Besides the SRPM a pipeline links at most one artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum PipelineArtifact {
    CoprBuildGroup(uuid::Uuid),
    KojiBuildGroup(uuid::Uuid),
    TestRunGroup(uuid::Uuid),
    SyncReleaseRun(uuid::Uuid),
    VmImageBuild(uuid::Uuid),
}

impl PipelineArtifact {
    fn column(&self) -> &'static str {
        match self {
            PipelineArtifact::CoprBuildGroup(_) => "copr_build_group_id",
            PipelineArtifact::KojiBuildGroup(_) => "koji_build_group_id",
            PipelineArtifact::TestRunGroup(_) => "test_run_group_id",
            PipelineArtifact::SyncReleaseRun(_) => "sync_release_run_id",
            PipelineArtifact::VmImageBuild(_) => "vm_image_build_id",
        }
    }

    pub fn id(&self) -> uuid::Uuid {
        match self {
            PipelineArtifact::CoprBuildGroup(id)
            | PipelineArtifact::KojiBuildGroup(id)
            | PipelineArtifact::TestRunGroup(id)
            | PipelineArtifact::SyncReleaseRun(id)
            | PipelineArtifact::VmImageBuild(id) => *id,
        }
    }
}

impl Pipeline {
    pub fn artifact(&self) -> Option<PipelineArtifact> {
        self.copr_build_group_id
            .map(PipelineArtifact::CoprBuildGroup)
            .or(self.koji_build_group_id.map(PipelineArtifact::KojiBuildGroup))
            .or(self.test_run_group_id.map(PipelineArtifact::TestRunGroup))
            .or(self.sync_release_run_id.map(PipelineArtifact::SyncReleaseRun))
            .or(self.vm_image_build_id.map(PipelineArtifact::VmImageBuild))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct NewPipeline {
    pub job_trigger_id: Option<uuid::Uuid>,
    pub srpm_build_id: Option<uuid::Uuid>,
    pub artifact: Option<PipelineArtifact>,
}

impl NewPipeline {
    pub fn new(job_trigger_id: uuid::Uuid, artifact: PipelineArtifact) -> Self {
        Self {
            job_trigger_id: Some(job_trigger_id),
            srpm_build_id: None,
            artifact: Some(artifact),
        }
    }

    pub fn with_srpm(mut self, srpm_build_id: uuid::Uuid) -> Self {
        self.srpm_build_id = Some(srpm_build_id);
        self
    }

    pub(crate) fn artifact_id(&self, pick: fn(&PipelineArtifact) -> bool) -> Option<uuid::Uuid> {
        self.artifact.filter(|a| pick(a)).map(|a| a.id())
    }
}

#[async_trait]
pub trait PipelineRepo: Send + Sync {
    async fn create(&self, pipeline: NewPipeline) -> DbResult<Pipeline>;
    async fn get(&self, id: uuid::Uuid) -> DbResult<Pipeline>;
    /// Pipelines linking `artifact`, oldest first.
    async fn find_by_artifact(&self, artifact: PipelineArtifact) -> DbResult<Vec<Pipeline>>;
    async fn list(&self, limit: i64, offset: i64) -> DbResult<Vec<Pipeline>>;
}

/// PostgreSQL implementation of PipelineRepo.
pub struct PgPipelineRepo {
    pool: PgPool,
}

impl PgPipelineRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PipelineRepo for PgPipelineRepo {
    async fn create(&self, pipeline: NewPipeline) -> DbResult<Pipeline> {
        let record = sqlx::query_as::<_, Pipeline>(
            r#"
            INSERT INTO pipelines (
                id, created_at, job_trigger_id, srpm_build_id, copr_build_group_id,
                koji_build_group_id, test_run_group_id, sync_release_run_id, vm_image_build_id
            )
            VALUES ($1, NOW(), $2, $3, $4, $5, $6, $7, $8)
            RETURNING *
            "#,
        )
        .bind(uuid::Uuid::now_v7())
        .bind(pipeline.job_trigger_id)
        .bind(pipeline.srpm_build_id)
        .bind(pipeline.artifact_id(|a| matches!(a, PipelineArtifact::CoprBuildGroup(_))))
        .bind(pipeline.artifact_id(|a| matches!(a, PipelineArtifact::KojiBuildGroup(_))))
        .bind(pipeline.artifact_id(|a| matches!(a, PipelineArtifact::TestRunGroup(_))))
        .bind(pipeline.artifact_id(|a| matches!(a, PipelineArtifact::SyncReleaseRun(_))))
        .bind(pipeline.artifact_id(|a| matches!(a, PipelineArtifact::VmImageBuild(_))))
        .fetch_one(&self.pool)
        .await?;
        Ok(record)
    }

    async fn get(&self, id: uuid::Uuid) -> DbResult<Pipeline> {
        let record = sqlx::query_as::<_, Pipeline>("SELECT * FROM pipelines WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DbError::NotFound(format!("pipeline {}", id)))?;
        Ok(record)
    }

    async fn find_by_artifact(&self, artifact: PipelineArtifact) -> DbResult<Vec<Pipeline>> {
        let query = format!(
            "SELECT * FROM pipelines WHERE {} = $1 ORDER BY created_at, id",
            artifact.column()
        );
        let records = sqlx::query_as::<_, Pipeline>(&query)
            .bind(artifact.id())
            .fetch_all(&self.pool)
            .await?;
        Ok(records)
    }

    async fn list(&self, limit: i64, offset: i64) -> DbResult<Vec<Pipeline>> {
        let records = sqlx::query_as::<_, Pipeline>(
            "SELECT * FROM pipelines ORDER BY created_at DESC, id DESC LIMIT $1 OFFSET $2",
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        Ok(records)
    }
}
