//! Application state.

use axum::http::StatusCode;
use distbot_config::ServiceConfig;
use distbot_core::{Event, ForgeKind, ForgeResolver};
use distbot_db::Store;
use distbot_services::{
    BodhiClient, CoprClient, DistGitSyncer, Forges, ImageBuilderClient, KojiCli,
    TestingFarmClient,
};
use distbot_worker::{Parser, Task, TaskSink, WorkerContext};
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::error::ApiError;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServiceConfig>,
    pub store: Store,
    pub parser: Parser,
    pub tasks: Arc<dyn TaskSink>,
    /// Checked by the readiness probe when the server runs against Postgres.
    pub pool: Option<PgPool>,
}

impl AppState {
    pub fn new(config: Arc<ServiceConfig>, store: Store, tasks: Arc<dyn TaskSink>) -> Self {
        let parser = Parser::new(&config);
        Self {
            config,
            store,
            parser,
            tasks,
            pool: None,
        }
    }

    pub fn with_pool(mut self, pool: PgPool) -> Self {
        self.pool = Some(pool);
        self
    }

    /// Queue a parsed event for the workers; `None` means there is nothing to do.
    pub async fn enqueue(&self, event: Option<Event>) -> Result<StatusCode, ApiError> {
        let Some(event) = event else {
            return Ok(StatusCode::OK);
        };
        info!(kind = %event.kind(), "Queueing event");
        self.tasks
            .schedule(Task::ProcessEvent { event }, Duration::ZERO)
            .await?;
        Ok(StatusCode::ACCEPTED)
    }
}

/// Wire the real service clients into a `WorkerContext`.
pub fn worker_context(
    config: Arc<ServiceConfig>,
    store: Store,
    tasks: Arc<dyn TaskSink>,
) -> WorkerContext {
    let forges: Arc<dyn ForgeResolver> = Arc::new(Forges::from_config(&config));
    let dist_git_token = config
        .forge_of_kind(ForgeKind::Pagure)
        .and_then(|f| f.token.clone());
    let syncer = DistGitSyncer::new(
        &config.work_dir,
        dist_git_token,
        config.dist_git_fork_namespace.clone(),
        forges.clone(),
    );

    WorkerContext {
        forges,
        copr: Arc::new(CoprClient::new(&config.copr)),
        koji: Arc::new(KojiCli::new(&config.koji)),
        bodhi: Arc::new(BodhiClient::new(&config.bodhi)),
        testing_farm: Arc::new(TestingFarmClient::new(
            &config.testing_farm,
            config.testing_farm_secret.clone(),
        )),
        image_builder: Arc::new(ImageBuilderClient::new(&config.image_builder)),
        syncer: Arc::new(syncer),
        store,
        tasks,
        config,
    }
}
