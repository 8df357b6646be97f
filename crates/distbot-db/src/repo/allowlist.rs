//! Allowlist of forge namespaces.
//!
//! Keys are paths like `github.com`, `github.com/packit` or
//! `github.com/packit/ogr.git`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use distbot_core::status::AllowlistStatus;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;

use crate::error::parse_column;
use crate::{DbError, DbResult};

#[derive(Debug, Clone, sqlx::FromRow)]
struct AllowlistRow {
    id: uuid::Uuid,
    namespace: String,
    status: String,
    fas_account: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllowlistEntry {
    pub id: uuid::Uuid,
    pub namespace: String,
    pub status: AllowlistStatus,
    pub fas_account: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<AllowlistRow> for AllowlistEntry {
    type Error = DbError;

    fn try_from(row: AllowlistRow) -> Result<Self, Self::Error> {
        Ok(AllowlistEntry {
            id: row.id,
            namespace: row.namespace,
            status: parse_column(&row.status)?,
            fas_account: row.fas_account,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[async_trait]
pub trait AllowlistRepo: Send + Sync {
    async fn get(&self, namespace: &str) -> DbResult<Option<AllowlistEntry>>;
    /// Insert or overwrite the entry for `namespace`.
    async fn upsert(
        &self,
        namespace: &str,
        status: AllowlistStatus,
        fas_account: Option<&str>,
    ) -> DbResult<AllowlistEntry>;
    /// Returns whether an entry was removed.
    async fn remove(&self, namespace: &str) -> DbResult<bool>;
    async fn list(&self, status: Option<AllowlistStatus>) -> DbResult<Vec<AllowlistEntry>>;
}

/// PostgreSQL implementation of AllowlistRepo.
pub struct PgAllowlistRepo {
    pool: PgPool,
}

impl PgAllowlistRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AllowlistRepo for PgAllowlistRepo {
    async fn get(&self, namespace: &str) -> DbResult<Option<AllowlistEntry>> {
        let row = sqlx::query_as::<_, AllowlistRow>("SELECT * FROM allowlist WHERE namespace = $1")
            .bind(namespace)
            .fetch_optional(&self.pool)
            .await?;
        row.map(TryInto::try_into).transpose()
    }

    async fn upsert(
        &self,
        namespace: &str,
        status: AllowlistStatus,
        fas_account: Option<&str>,
    ) -> DbResult<AllowlistEntry> {
        let row = sqlx::query_as::<_, AllowlistRow>(
            r#"
            INSERT INTO allowlist (id, namespace, status, fas_account, created_at, updated_at)
            VALUES ($1, $2, $3, $4, NOW(), NOW())
            ON CONFLICT (namespace) DO UPDATE SET
                status = EXCLUDED.status,
                fas_account = COALESCE(EXCLUDED.fas_account, allowlist.fas_account),
                updated_at = NOW()
            RETURNING *
            "#,
        )
        .bind(uuid::Uuid::now_v7())
        .bind(namespace)
        .bind(status.as_str())
        .bind(fas_account)
        .fetch_one(&self.pool)
        .await?;
        row.try_into()
    }

    async fn remove(&self, namespace: &str) -> DbResult<bool> {
        let result = sqlx::query("DELETE FROM allowlist WHERE namespace = $1")
            .bind(namespace)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list(&self, status: Option<AllowlistStatus>) -> DbResult<Vec<AllowlistEntry>> {
        let rows = sqlx::query_as::<_, AllowlistRow>(
            "SELECT * FROM allowlist WHERE $1::text IS NULL OR status = $1 ORDER BY namespace",
        )
        .bind(status.map(|s| s.as_str()))
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }
}
