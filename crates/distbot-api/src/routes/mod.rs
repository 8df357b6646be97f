//! API routes.

pub mod allowlist;
pub mod builds;
pub mod health;
pub mod pipelines;
pub mod webhooks;

use crate::AppState;
use axum::Router;
use serde::Deserialize;

/// Build the main API router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .nest("/api/v1", api_router())
        .nest("/webhooks", webhooks::router())
        .merge(health::router())
        .with_state(state)
}

fn api_router() -> Router<AppState> {
    Router::new()
        .nest("/pipelines", pipelines::router())
        .merge(builds::router())
        .nest("/allowlist", allowlist::router())
}

const DEFAULT_PER_PAGE: i64 = 20;
const MAX_PER_PAGE: i64 = 100;

/// `?page=&per_page=` of list endpoints; pages start at 1.
#[derive(Debug, Default, Deserialize)]
pub struct Pagination {
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

impl Pagination {
    pub fn limit(&self) -> i64 {
        self.per_page.unwrap_or(DEFAULT_PER_PAGE).clamp(1, MAX_PER_PAGE)
    }

    pub fn offset(&self) -> i64 {
        (self.page.unwrap_or(1).max(1) - 1) * self.limit()
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::AppState;
    use axum::body::Body;
    use axum::http::{Request, Response};
    use distbot_config::ServiceConfig;
    use distbot_db::Store;
    use distbot_db::memory::MemoryDb;
    use distbot_worker::MemoryTaskSink;
    use serde_json::Value;
    use std::sync::Arc;
    use tower::ServiceExt;

    pub struct TestApp {
        pub state: AppState,
        pub db: Arc<MemoryDb>,
        pub tasks: Arc<MemoryTaskSink>,
    }

    impl TestApp {
        pub fn new(config: ServiceConfig) -> Self {
            let (store, db) = Store::memory();
            let tasks = Arc::new(MemoryTaskSink::new());
            let state = AppState::new(Arc::new(config), store, tasks.clone());
            Self { state, db, tasks }
        }

        pub async fn send(&self, request: Request<Body>) -> Response<Body> {
            super::router(self.state.clone())
                .oneshot(request)
                .await
                .unwrap()
        }

        pub async fn get_json(&self, uri: &str) -> (u16, Value) {
            let response = self
                .send(Request::get(uri).body(Body::empty()).unwrap())
                .await;
            let status = response.status().as_u16();
            let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
                .await
                .unwrap();
            (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
        }
    }

    #[test]
    fn test_pagination() {
        let page = super::Pagination {
            page: Some(3),
            per_page: Some(500),
        };
        assert_eq!(page.limit(), 100);
        assert_eq!(page.offset(), 200);
        assert_eq!(super::Pagination::default().offset(), 0);
    }
}
