//! VM image builder.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::Result;
use crate::job::ImageRequest;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageCompose {
    pub distribution: String,
    pub image_name: String,
    pub request: ImageRequest,
    pub packages: Vec<String>,
    /// Copr repository baked into the image.
    pub repo_url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComposeStatus {
    pub status: String,
    pub error: Option<String>,
}

#[async_trait]
pub trait ImageBuilderApi: Send + Sync {
    /// Start a compose; returns its id.
    async fn create_image(&self, compose: &ImageCompose) -> Result<String>;

    async fn compose_status(&self, compose_id: &str) -> Result<ComposeStatus>;

    fn compose_url(&self, compose_id: &str) -> String;
}
