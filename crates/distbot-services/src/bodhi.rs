//! Bodhi client.

use async_trait::async_trait;
use distbot_config::service::EndpointConfig;
use distbot_core::backends::{BodhiApi, BodhiRelease, BodhiUpdate};
use distbot_core::{Error, Result};
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

use crate::ServiceError;
use crate::http::{Auth, HttpClient};

const SERVICE: &str = "bodhi";

/// Errors Bodhi returns while the builds are not tagged as update candidates yet.
const NOT_TAGGED_MARKERS: &[&str] = &[
    "not tagged as an update candidate",
    "Cannot find any tags associated with build",
];

pub struct BodhiClient {
    http: HttpClient,
}

#[derive(Debug, Deserialize)]
struct Releases {
    releases: Vec<BodhiRelease>,
}

#[derive(Debug, Deserialize)]
struct CreatedUpdate {
    alias: String,
    url: Option<String>,
}

impl BodhiClient {
    pub fn new(config: &EndpointConfig) -> Self {
        let auth = config.token.clone().map(Auth::Bearer).unwrap_or(Auth::None);
        Self {
            http: HttpClient::new(&config.url, auth),
        }
    }
}

/// Map a failed update creation; untagged builds are retried later.
fn classify_update_error(error: ServiceError) -> Error {
    if let ServiceError::Api { message, .. } = &error {
        if NOT_TAGGED_MARKERS.iter().any(|m| message.contains(m)) {
            return Error::retriable(SERVICE, message.clone());
        }
    }
    error.into_core(SERVICE)
}

#[async_trait]
impl BodhiApi for BodhiClient {
    async fn active_releases(&self) -> Result<Vec<BodhiRelease>> {
        let releases: Releases = self
            .http
            .get("/releases/?exclude_archived=True&rows_per_page=100")
            .await
            .map_err(|e| e.into_core(SERVICE))?;
        Ok(releases.releases)
    }

    async fn create_update(
        &self,
        dist_git_branch: &str,
        update_type: &str,
        builds: &[String],
    ) -> Result<BodhiUpdate> {
        let notes = format!("Automatic update for {}.", builds.join(", "));
        let created: CreatedUpdate = self
            .http
            .post(
                "/updates/",
                &json!({
                    "builds": builds,
                    "type": update_type,
                    "notes": notes,
                    "autokarma": true,
                }),
            )
            .await
            .map_err(|e| {
                warn!(branch = %dist_git_branch, error = %e, "Bodhi update creation failed");
                classify_update_error(e)
            })?;

        info!(branch = %dist_git_branch, alias = %created.alias, "Created Bodhi update");
        let url = created
            .url
            .unwrap_or_else(|| format!("{}/updates/{}", self.http.base_url(), created.alias));
        Ok(BodhiUpdate {
            alias: created.alias,
            url,
        })
    }
}
