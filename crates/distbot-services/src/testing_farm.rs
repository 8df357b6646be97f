//! Testing Farm API client.

use async_trait::async_trait;
use distbot_config::service::EndpointConfig;
use distbot_core::backends::{TestingFarmApi, TestingFarmDetails, TestingFarmRequest};
use distbot_core::{Error, Result};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::info;

use crate::http::{Auth, HttpClient};

const SERVICE: &str = "testing-farm";
const ARTIFACTS_URL: &str = "https://artifacts.dev.testing-farm.io";

pub struct TestingFarmClient {
    http: HttpClient,
    api_key: Option<String>,
    /// Token echoed back in result notifications.
    notification_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Submitted {
    id: String,
}

#[derive(Debug, Deserialize)]
struct RequestState {
    state: String,
    #[serde(default)]
    result: Option<RequestResult>,
    #[serde(default)]
    run: Option<RequestRun>,
}

#[derive(Debug, Deserialize)]
struct RequestResult {
    overall: Option<String>,
    summary: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RequestRun {
    artifacts: Option<String>,
}

impl TestingFarmClient {
    pub fn new(config: &EndpointConfig, notification_token: Option<String>) -> Self {
        Self {
            http: HttpClient::new(&config.url, Auth::None),
            api_key: config.token.clone(),
            notification_token,
        }
    }

    fn payload(&self, request: &TestingFarmRequest) -> Value {
        let artifacts: Vec<Value> = request
            .artifacts
            .iter()
            .map(|a| {
                json!({
                    "id": format!("{}:{}", a.build_id, a.chroot),
                    "type": "fedora-copr-build",
                })
            })
            .collect();
        let distro = request.compose.to_lowercase();

        let mut payload = json!({
            "api_key": self.api_key,
            "test": {
                "fmf": {
                    "url": request.git_url,
                    "ref": request.git_ref,
                },
            },
            "environments": [{
                "arch": request.arch,
                "os": { "compose": request.compose },
                "artifacts": artifacts,
                "tmt": {
                    "context": {
                        "distro": distro,
                        "arch": request.arch,
                        "trigger": "commit",
                    },
                },
                "variables": request.env,
            }],
        });
        if let Some(plan) = &request.tmt_plan {
            payload["test"]["fmf"]["name"] = json!(plan);
        }
        if let Some(url) = &request.notification_url {
            payload["notification"] = json!({
                "webhook": { "url": url, "token": self.notification_token },
            });
        }
        payload
    }
}

#[async_trait]
impl TestingFarmApi for TestingFarmClient {
    async fn submit(&self, request: &TestingFarmRequest) -> Result<String> {
        if self.api_key.is_none() {
            return Err(Error::service(SERVICE, "no Testing Farm API key configured"));
        }
        let submitted: Submitted = self
            .http
            .post("/requests", &self.payload(request))
            .await
            .map_err(|e| e.into_core(SERVICE))?;
        info!(request_id = %submitted.id, compose = %request.compose, "Submitted Testing Farm request");
        Ok(submitted.id)
    }

    async fn request_details(&self, request_id: &str) -> Result<TestingFarmDetails> {
        let state: RequestState = self
            .http
            .get(&format!("/requests/{request_id}"))
            .await
            .map_err(|e| e.into_core(SERVICE))?;
        let (overall_result, summary) = state
            .result
            .map(|r| (r.overall, r.summary))
            .unwrap_or((None, None));
        Ok(TestingFarmDetails {
            state: state.state,
            overall_result,
            run_url: state.run.and_then(|r| r.artifacts),
            summary,
        })
    }

    fn web_url(&self, request_id: &str) -> String {
        format!("{ARTIFACTS_URL}/{request_id}")
    }
}
