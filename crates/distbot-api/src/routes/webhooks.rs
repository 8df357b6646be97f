//! Webhook endpoints for forges, the message bus and Testing Farm.
//!
//! Every endpoint only authenticates and classifies the payload; the
//! resulting event is queued and handled by the workers.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::{Json, Router};
use distbot_core::ForgeKind;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use serde_json::Value;
use sha2::Sha256;
use tracing::{info, warn};

use crate::AppState;
use crate::error::ApiError;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/github", post(github_webhook))
        .route("/gitlab", post(gitlab_webhook))
        .route("/fedora-messaging", post(fedora_messaging))
        .route("/testing-farm/results", post(testing_farm_results))
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn parse_json(body: &[u8]) -> Result<Value, ApiError> {
    serde_json::from_slice(body).map_err(|e| ApiError::BadRequest(format!("Invalid JSON: {}", e)))
}

/// Handle GitHub webhook events.
async fn github_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    let event_type = header(&headers, "X-GitHub-Event").unwrap_or("unknown");
    let delivery = header(&headers, "X-GitHub-Delivery");

    let secret = state
        .config
        .forge_of_kind(ForgeKind::Github)
        .and_then(|f| f.webhook_secret.as_deref());
    if let Some(secret) = secret {
        let signature = header(&headers, "X-Hub-Signature-256");
        if !verify_github_signature(secret, &body, signature) {
            warn!(event = %event_type, delivery = ?delivery, "Invalid webhook signature");
            return Err(ApiError::Unauthorized("Invalid signature".into()));
        }
    }

    let payload = parse_json(&body)?;
    info!(event = %event_type, delivery = ?delivery, "Received GitHub webhook");

    if event_type == "ping" {
        info!("Ping event received - webhook is configured correctly");
        return Ok(StatusCode::OK);
    }
    state
        .enqueue(state.parser.parse_github(event_type, &payload))
        .await
}

/// Handle GitLab webhook events. The shared token is looked up by the
/// host of the project the hook was sent for.
async fn gitlab_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    let event_type = header(&headers, "X-Gitlab-Event").unwrap_or("unknown");
    let payload = parse_json(&body)?;

    let host = payload
        .pointer("/project/web_url")
        .and_then(Value::as_str)
        .and_then(|url| url.split("://").nth(1))
        .and_then(|rest| rest.split('/').next())
        .unwrap_or_default();
    let Some(instance) = state.config.forge(host) else {
        warn!(host, "GitLab webhook from unknown instance");
        return Err(ApiError::Unauthorized(format!("Unknown GitLab instance {}", host)));
    };
    if let Some(secret) = &instance.webhook_secret {
        if header(&headers, "X-Gitlab-Token") != Some(secret.as_str()) {
            warn!(host, event = %event_type, "Invalid GitLab token");
            return Err(ApiError::Unauthorized("Invalid token".into()));
        }
    }

    info!(host, event = %event_type, "Received GitLab webhook");
    state
        .enqueue(state.parser.parse_gitlab(event_type, &payload))
        .await
}

/// A message relayed from Fedora messaging.
#[derive(Debug, Deserialize)]
struct BusMessage {
    topic: String,
    body: Value,
}

async fn fedora_messaging(
    State(state): State<AppState>,
    Json(message): Json<BusMessage>,
) -> Result<StatusCode, ApiError> {
    info!(topic = %message.topic, "Received message");
    state
        .enqueue(
            state
                .parser
                .parse_fedora_messaging(&message.topic, &message.body),
        )
        .await
}

async fn testing_farm_results(
    State(state): State<AppState>,
    Json(payload): Json<Value>,
) -> Result<StatusCode, ApiError> {
    if let Some(secret) = &state.config.testing_farm_secret {
        let token = payload.get("token").and_then(Value::as_str);
        if token != Some(secret.as_str()) {
            warn!("Invalid Testing Farm notification token");
            return Err(ApiError::Unauthorized("Invalid token".into()));
        }
    }
    let event = state.parser.parse_testing_farm(&payload);
    if event.is_none() {
        return Err(ApiError::BadRequest("Missing request_id".into()));
    }
    state.enqueue(event).await
}

/// Check `X-Hub-Signature-256` (`sha256=<hex>`) against the body.
fn verify_github_signature(secret: &str, body: &[u8], signature: Option<&str>) -> bool {
    let Some(signature) = signature else {
        return false;
    };
    let Some(sig_hex) = signature.strip_prefix("sha256=") else {
        return false;
    };
    let Ok(sig_bytes) = hex::decode(sig_hex) else {
        return false;
    };
    let Ok(mut mac) = Hmac::<Sha256>::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&sig_bytes).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::test_support::TestApp;
    use axum::body::Body;
    use axum::http::Request;
    use distbot_config::ServiceConfig;
    use distbot_config::service::ForgeInstance;
    use distbot_core::Event;
    use distbot_worker::Task;
    use serde_json::json;

    const SECRET: &str = "It's a Secret to Everybody";

    fn sign(body: &[u8]) -> String {
        let mut mac = Hmac::<Sha256>::new_from_slice(SECRET.as_bytes()).unwrap();
        mac.update(body);
        format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
    }

    fn config() -> ServiceConfig {
        let mut config = ServiceConfig::default();
        config.forges = vec![
            ForgeInstance {
                kind: ForgeKind::Github,
                instance_url: "https://github.com".into(),
                token: None,
                webhook_secret: Some(SECRET.into()),
            },
            ForgeInstance {
                kind: ForgeKind::Gitlab,
                instance_url: "https://gitlab.com".into(),
                token: None,
                webhook_secret: Some("gitlab-token".into()),
            },
        ];
        config.testing_farm_secret = Some("tf-token".into());
        config
    }

    fn release_payload() -> Vec<u8> {
        serde_json::to_vec(&json!({
            "action": "published",
            "release": {"tag_name": "0.40.0"},
            "repository": {"html_url": "https://github.com/packit/ogr"},
            "sender": {"login": "lbarcziova"}
        }))
        .unwrap()
    }

    fn github_request(event: &str, body: Vec<u8>, signature: Option<String>) -> Request<Body> {
        let mut request = Request::post("/webhooks/github")
            .header("X-GitHub-Event", event)
            .header("content-type", "application/json");
        if let Some(signature) = signature {
            request = request.header("X-Hub-Signature-256", signature);
        }
        request.body(Body::from(body)).unwrap()
    }

    #[test]
    fn test_verify_github_signature() {
        let body = b"Hello, World!";
        assert!(verify_github_signature(SECRET, body, Some(&sign(body))));
        assert!(!verify_github_signature(SECRET, body, Some("sha256=00")));
        assert!(!verify_github_signature(SECRET, body, Some("sha1=abc")));
        assert!(!verify_github_signature(SECRET, body, None));
    }

    #[tokio::test]
    async fn test_github_release_is_queued() {
        let app = TestApp::new(config());
        let body = release_payload();
        let signature = sign(&body);
        let response = app
            .send(github_request("release", body, Some(signature)))
            .await;

        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let tasks = app.tasks.take();
        assert_eq!(tasks.len(), 1);
        assert!(matches!(
            &tasks[0].0,
            Task::ProcessEvent { event: Event::Release(r) } if r.tag_name == "0.40.0"
        ));
    }

    #[tokio::test]
    async fn test_github_bad_signature_is_rejected() {
        let app = TestApp::new(config());
        let response = app
            .send(github_request("release", release_payload(), Some("sha256=00".into())))
            .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(app.tasks.is_empty());
    }

    #[tokio::test]
    async fn test_github_ignored_event_is_ok() {
        let app = TestApp::new(config());
        let body = serde_json::to_vec(&json!({"action": "deleted"})).unwrap();
        let signature = sign(&body);
        let response = app.send(github_request("star", body, Some(signature))).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(app.tasks.is_empty());
    }

    #[tokio::test]
    async fn test_gitlab_token() {
        let app = TestApp::new(config());
        let payload = json!({
            "ref": "refs/tags/v1.0.0",
            "checkout_sha": "fa64d5e66e3ea9be5a94cd3bac4a1d1e2f5d1ff0",
            "user_username": "shreyaspapi",
            "project": {"web_url": "https://gitlab.com/packit-service/hello-world"}
        });
        let request = |token: &str| {
            Request::post("/webhooks/gitlab")
                .header("X-Gitlab-Event", "Tag Push Hook")
                .header("X-Gitlab-Token", token)
                .header("content-type", "application/json")
                .body(Body::from(payload.to_string()))
                .unwrap()
        };

        let response = app.send(request("wrong")).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = app.send(request("gitlab-token")).await;
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        assert_eq!(app.tasks.len(), 1);
    }

    #[tokio::test]
    async fn test_fedora_messaging_koji_task() {
        let app = TestApp::new(config());
        let message = json!({
            "topic": "org.fedoraproject.prod.buildsys.task.state.change",
            "body": {"id": 94225123, "new": "OPEN", "old": "FREE"}
        });
        let response = app
            .send(
                Request::post("/webhooks/fedora-messaging")
                    .header("content-type", "application/json")
                    .body(Body::from(message.to_string()))
                    .unwrap(),
            )
            .await;
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        assert!(matches!(
            &app.tasks.take()[0].0,
            Task::ProcessEvent { event: Event::KojiTask(t) } if t.task_id == 94225123
        ));
    }

    #[tokio::test]
    async fn test_testing_farm_notification() {
        let app = TestApp::new(config());
        let request = |payload: Value| {
            Request::post("/webhooks/testing-farm/results")
                .header("content-type", "application/json")
                .body(Body::from(payload.to_string()))
                .unwrap()
        };

        let response = app
            .send(request(json!({"request_id": "7ae1eaeb", "token": "nope"})))
            .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = app.send(request(json!({"token": "tf-token"}))).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = app
            .send(request(json!({"request_id": "7ae1eaeb", "token": "tf-token"})))
            .await;
        assert_eq!(response.status(), StatusCode::ACCEPTED);
    }
}
