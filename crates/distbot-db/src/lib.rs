//! Database layer for distbot.
//!
//! Provides repository traits, their PostgreSQL implementations and the
//! schema migrations.

pub mod error;
#[cfg(any(test, feature = "memory"))]
pub mod memory;
pub mod repo;

pub use error::{DbError, DbResult};
pub use repo::*;

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;

/// Create a new database connection pool.
pub async fn create_pool(database_url: &str) -> DbResult<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await?;
    Ok(pool)
}

/// Run database migrations.
pub async fn run_migrations(pool: &PgPool) -> DbResult<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Format used for timestamps in API responses.
pub const TIME_FORMAT: &str = "%d/%m/%Y %H:%M:%S";

/// Render an optional timestamp, keeping `None` as is.
pub fn optional_time(time: Option<DateTime<Utc>>) -> Option<String> {
    time.map(|t| t.format(TIME_FORMAT).to_string())
}

/// All repositories, as used by the worker, the API and the CLI.
#[derive(Clone)]
pub struct Store {
    pub projects: Arc<dyn ProjectRepo>,
    pub pipelines: Arc<dyn PipelineRepo>,
    pub srpm_builds: Arc<dyn SrpmBuildRepo>,
    pub copr_builds: Arc<dyn CoprBuildRepo>,
    pub koji_builds: Arc<dyn KojiBuildRepo>,
    pub test_runs: Arc<dyn TestRunRepo>,
    pub sync_releases: Arc<dyn SyncReleaseRepo>,
    pub vm_image_builds: Arc<dyn VmImageBuildRepo>,
    pub allowlist: Arc<dyn AllowlistRepo>,
}

impl Store {
    pub fn postgres(pool: PgPool) -> Self {
        Self {
            projects: Arc::new(PgProjectRepo::new(pool.clone())),
            pipelines: Arc::new(PgPipelineRepo::new(pool.clone())),
            srpm_builds: Arc::new(PgSrpmBuildRepo::new(pool.clone())),
            copr_builds: Arc::new(PgCoprBuildRepo::new(pool.clone())),
            koji_builds: Arc::new(PgKojiBuildRepo::new(pool.clone())),
            test_runs: Arc::new(PgTestRunRepo::new(pool.clone())),
            sync_releases: Arc::new(PgSyncReleaseRepo::new(pool.clone())),
            vm_image_builds: Arc::new(PgVmImageBuildRepo::new(pool.clone())),
            allowlist: Arc::new(PgAllowlistRepo::new(pool)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_optional_time() {
        let time = Utc.with_ymd_and_hms(2022, 11, 29, 10, 24, 0).unwrap();
        assert_eq!(optional_time(Some(time)).as_deref(), Some("29/11/2022 10:24:00"));
        assert_eq!(optional_time(None), None);
    }

    mod postgres {
        use super::*;
        use distbot_core::status::ProjectEventType;
        use distbot_core::{BuildStatus, ForgeKind, ProjectRef};
        use sqlx::{Connection, PgConnection};
        use uuid::Uuid;

        const INITIAL: &str = include_str!("../migrations/0001_initial.up.sql");
        const KOJI_GROUPS_UP: &str = include_str!("../migrations/0002_koji_build_groups.up.sql");
        const KOJI_GROUPS_DOWN: &str =
            include_str!("../migrations/0002_koji_build_groups.down.sql");

        async fn connect_isolated() -> (PgConnection, String) {
            let url = std::env::var("DATABASE_URL").unwrap();
            let mut conn = PgConnection::connect(&url).await.unwrap();
            let schema = format!("migration_{}", Uuid::now_v7().simple());
            sqlx::raw_sql(&format!("CREATE SCHEMA {schema}; SET search_path TO {schema};"))
                .execute(&mut conn)
                .await
                .unwrap();
            (conn, schema)
        }

        fn at(second: u32) -> DateTime<Utc> {
            Utc.with_ymd_and_hms(2022, 1, 1, 0, 0, second).unwrap()
        }

        async fn add_srpm(conn: &mut PgConnection) -> Uuid {
            let id = Uuid::now_v7();
            sqlx::query("INSERT INTO srpm_builds (id, status) VALUES ($1, 'success')")
                .bind(id)
                .execute(&mut *conn)
                .await
                .unwrap();
            id
        }

        async fn add_koji_build(conn: &mut PgConnection, task_id: &str, submitted: u32) -> Uuid {
            let id = Uuid::now_v7();
            sqlx::query(
                "INSERT INTO koji_build_targets (id, build_id, commit_sha, status, target, submitted_time) \
                 VALUES ($1, $2, 'ad0c308af91da45cf40b253cd82f07f63ea9cbbf', 'success', 'f37', $3)",
            )
            .bind(id)
            .bind(task_id)
            .bind(at(submitted))
            .execute(&mut *conn)
            .await
            .unwrap();
            id
        }

        async fn add_pipeline(
            conn: &mut PgConnection,
            created: u32,
            srpm: Option<Uuid>,
            koji_build: Option<Uuid>,
        ) -> Uuid {
            let id = Uuid::now_v7();
            sqlx::query(
                "INSERT INTO pipelines (id, created_at, srpm_build_id, koji_build_id) \
                 VALUES ($1, $2, $3, $4)",
            )
            .bind(id)
            .bind(at(created))
            .bind(srpm)
            .bind(koji_build)
            .execute(&mut *conn)
            .await
            .unwrap();
            id
        }

        async fn pipeline_column(conn: &mut PgConnection, column: &str, pipeline: Uuid) -> Option<Uuid> {
            sqlx::query_scalar(&format!("SELECT {column} FROM pipelines WHERE id = $1"))
                .bind(pipeline)
                .fetch_one(&mut *conn)
                .await
                .unwrap()
        }

        #[tokio::test]
        #[ignore = "requires PostgreSQL (DATABASE_URL)"]
        async fn test_koji_build_group_migration() {
            let (mut conn, schema) = connect_isolated().await;
            sqlx::raw_sql(INITIAL).execute(&mut conn).await.unwrap();

            let srpm_a = add_srpm(&mut conn).await;
            let srpm_b = add_srpm(&mut conn).await;
            let k1 = add_koji_build(&mut conn, "80001", 1).await;
            let k2 = add_koji_build(&mut conn, "80002", 2).await;
            let k3 = add_koji_build(&mut conn, "80003", 3).await;
            let p1 = add_pipeline(&mut conn, 1, Some(srpm_a), Some(k1)).await;
            let p2 = add_pipeline(&mut conn, 2, Some(srpm_a), Some(k2)).await;
            let p3 = add_pipeline(&mut conn, 3, None, Some(k3)).await;
            let p4 = add_pipeline(&mut conn, 4, Some(srpm_b), None).await;

            sqlx::raw_sql(KOJI_GROUPS_UP).execute(&mut conn).await.unwrap();

            let groups: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM koji_build_groups")
                .fetch_one(&mut conn)
                .await
                .unwrap();
            assert_eq!(groups, 2);

            let group_a = pipeline_column(&mut conn, "koji_build_group_id", p1).await;
            assert!(group_a.is_some());
            assert_eq!(pipeline_column(&mut conn, "koji_build_group_id", p2).await, group_a);
            let group_3 = pipeline_column(&mut conn, "koji_build_group_id", p3).await;
            assert!(group_3.is_some());
            assert_ne!(group_3, group_a);
            assert_eq!(pipeline_column(&mut conn, "koji_build_group_id", p4).await, None);

            let grouped: Vec<(Uuid, Option<Uuid>)> = sqlx::query_as(
                "SELECT id, koji_build_group_id FROM koji_build_targets ORDER BY submitted_time",
            )
            .fetch_all(&mut conn)
            .await
            .unwrap();
            assert_eq!(grouped, vec![(k1, group_a), (k2, group_a), (k3, group_3)]);

            // A later build in the group of p3 has no pipeline of its own yet
            let k4 = add_koji_build(&mut conn, "80004", 5).await;
            sqlx::query("UPDATE koji_build_targets SET koji_build_group_id = $1 WHERE id = $2")
                .bind(group_3)
                .bind(k4)
                .execute(&mut conn)
                .await
                .unwrap();

            sqlx::raw_sql(KOJI_GROUPS_DOWN).execute(&mut conn).await.unwrap();

            assert_eq!(pipeline_column(&mut conn, "koji_build_id", p1).await, Some(k1));
            assert_eq!(pipeline_column(&mut conn, "koji_build_id", p2).await, Some(k2));
            assert_eq!(pipeline_column(&mut conn, "koji_build_id", p3).await, Some(k3));
            assert_eq!(pipeline_column(&mut conn, "koji_build_id", p4).await, None);

            let created: Vec<(Option<Uuid>,)> = sqlx::query_as(
                "SELECT srpm_build_id FROM pipelines WHERE koji_build_id = $1 AND id <> ALL($2)",
            )
            .bind(k4)
            .bind(vec![p1, p2, p3, p4])
            .fetch_all(&mut conn)
            .await
            .unwrap();
            assert_eq!(created, vec![(None,)]);

            sqlx::raw_sql(&format!("DROP SCHEMA {schema} CASCADE"))
                .execute(&mut conn)
                .await
                .unwrap();
        }

        #[tokio::test]
        #[ignore = "requires PostgreSQL (DATABASE_URL)"]
        async fn test_koji_group_pipeline_round_trip() {
            let url = std::env::var("DATABASE_URL").unwrap();
            let pool = create_pool(&url).await.unwrap();
            run_migrations(&pool).await.unwrap();
            let store = Store::postgres(pool);

            let project = store
                .projects
                .get_or_create_project(&ProjectRef::new(
                    ForgeKind::Pagure,
                    "https://src.fedoraproject.org",
                    "rpms",
                    "python-ogr",
                ))
                .await
                .unwrap();
            let trigger = store
                .projects
                .get_or_create_trigger(project.id, ProjectEventType::BranchPush, "f37")
                .await
                .unwrap();
            let group = store.koji_builds.create_group().await.unwrap();
            let build_id = Uuid::now_v7().simple().to_string();
            store
                .koji_builds
                .create_target(NewKojiBuild {
                    group_id: group.id,
                    build_id: build_id.clone(),
                    commit_sha: "ad0c308af91da45cf40b253cd82f07f63ea9cbbf".into(),
                    target: "f37".into(),
                    scratch: false,
                    status: BuildStatus::Pending,
                    web_url: None,
                    build_logs_url: None,
                    data: serde_json::json!({"branch": "f37"}),
                })
                .await
                .unwrap();
            let pipeline = store
                .pipelines
                .create(NewPipeline::new(trigger.id, PipelineArtifact::KojiBuildGroup(group.id)))
                .await
                .unwrap();

            let build = store.koji_builds.get_by_build_id(&build_id).await.unwrap().unwrap();
            assert_eq!(build.koji_build_group_id, Some(group.id));
            assert_eq!(build.status, BuildStatus::Pending);
            assert_eq!(build.data["branch"], "f37");
            let found = store
                .pipelines
                .find_by_artifact(PipelineArtifact::KojiBuildGroup(group.id))
                .await
                .unwrap();
            assert_eq!(found.len(), 1);
            assert_eq!(found[0].id, pipeline.id);
            assert_eq!(found[0].job_trigger_id, Some(trigger.id));
        }
    }
}
