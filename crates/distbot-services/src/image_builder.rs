//! Image builder API client.

use async_trait::async_trait;
use distbot_config::service::EndpointConfig;
use distbot_core::Result;
use distbot_core::backends::{ComposeStatus, ImageBuilderApi, ImageCompose};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::info;

use crate::http::{Auth, HttpClient};

const SERVICE: &str = "image-builder";

pub struct ImageBuilderClient {
    http: HttpClient,
}

#[derive(Debug, Deserialize)]
struct Created {
    id: String,
}

#[derive(Debug, Deserialize)]
struct Compose {
    image_status: ImageStatus,
}

#[derive(Debug, Deserialize)]
struct ImageStatus {
    status: String,
    #[serde(default)]
    error: Option<ImageError>,
}

#[derive(Debug, Deserialize)]
struct ImageError {
    reason: String,
}

impl ImageBuilderClient {
    pub fn new(config: &EndpointConfig) -> Self {
        let auth = config.token.clone().map(Auth::Bearer).unwrap_or(Auth::None);
        Self {
            http: HttpClient::new(&config.url, auth),
        }
    }
}

fn compose_payload(compose: &ImageCompose) -> Value {
    json!({
        "image_name": compose.image_name,
        "distribution": compose.distribution,
        "image_requests": [{
            "architecture": compose.request.architecture,
            "image_type": compose.request.image_type,
            "upload_request": {
                "type": compose.request.upload_type,
                "options": compose.request.upload_options,
            },
        }],
        "customizations": {
            "packages": compose.packages,
            "payload_repositories": [{
                "baseurl": compose.repo_url,
                "check_gpg": false,
            }],
        },
    })
}

#[async_trait]
impl ImageBuilderApi for ImageBuilderClient {
    async fn create_image(&self, compose: &ImageCompose) -> Result<String> {
        let created: Created = self
            .http
            .post("/compose", &compose_payload(compose))
            .await
            .map_err(|e| e.into_core(SERVICE))?;
        info!(compose_id = %created.id, image = %compose.image_name, "Started image compose");
        Ok(created.id)
    }

    async fn compose_status(&self, compose_id: &str) -> Result<ComposeStatus> {
        let compose: Compose = self
            .http
            .get(&format!("/composes/{compose_id}"))
            .await
            .map_err(|e| e.into_core(SERVICE))?;
        Ok(ComposeStatus {
            status: compose.image_status.status,
            error: compose.image_status.error.map(|e| e.reason),
        })
    }

    fn compose_url(&self, compose_id: &str) -> String {
        format!("{}/composes/{}", self.http.base_url(), compose_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use distbot_core::job::ImageRequest;
    use std::collections::BTreeMap;

    #[test]
    fn test_compose_payload() {
        let compose = ImageCompose {
            distribution: "fedora-37".into(),
            image_name: "ogr-42".into(),
            request: ImageRequest {
                architecture: "x86_64".into(),
                image_type: "aws".into(),
                upload_type: "aws".into(),
                upload_options: BTreeMap::from([(
                    "share_with_accounts".to_string(),
                    "123456".to_string(),
                )]),
            },
            packages: vec!["python3-ogr".into()],
            repo_url: "https://copr.fedorainfracloud.org/coprs/distbot/ogr/repo/fedora-37/distbot-ogr-fedora-37.repo".into(),
        };
        let payload = compose_payload(&compose);
        assert_eq!(payload["image_requests"][0]["image_type"], "aws");
        assert_eq!(
            payload["image_requests"][0]["upload_request"]["options"]["share_with_accounts"],
            "123456"
        );
        assert_eq!(payload["customizations"]["packages"][0], "python3-ogr");
    }
}
