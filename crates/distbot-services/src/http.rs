//! Shared JSON-over-HTTP plumbing for the REST clients.

use reqwest::{Method, RequestBuilder, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::{ServiceError, ServiceResult};

const USER_AGENT: &str = "distbot";

#[derive(Debug, Clone)]
pub(crate) enum Auth {
    None,
    Bearer(String),
    /// Raw `Authorization` header value, e.g. `token abc` for Pagure.
    Header(String),
    Basic(String, String),
    PrivateToken(String),
}

#[derive(Debug, Clone)]
pub(crate) struct HttpClient {
    client: reqwest::Client,
    base_url: String,
    auth: Auth,
    accept: &'static str,
}

impl HttpClient {
    pub fn new(base_url: &str, auth: Auth) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            auth,
            accept: "application/json",
        }
    }

    pub fn with_accept(mut self, accept: &'static str) -> Self {
        self.accept = accept;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.request_accepting(method, path, self.accept)
    }

    pub fn request_accepting(&self, method: Method, path: &str, accept: &str) -> RequestBuilder {
        let url = if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else {
            format!("{}{}", self.base_url, path)
        };
        let builder = self
            .client
            .request(method, url)
            .header("User-Agent", USER_AGENT)
            .header("Accept", accept);
        match &self.auth {
            Auth::None => builder,
            Auth::Bearer(token) => builder.bearer_auth(token),
            Auth::Header(value) => builder.header("Authorization", value),
            Auth::Basic(login, token) => builder.basic_auth(login, Some(token)),
            Auth::PrivateToken(token) => builder.header("PRIVATE-TOKEN", token),
        }
    }

    /// Send and decode a JSON body; `Ok(None)` on 404.
    pub async fn send_optional<T: DeserializeOwned>(
        &self,
        builder: RequestBuilder,
    ) -> ServiceResult<Option<T>> {
        let response = builder
            .send()
            .await
            .map_err(|e| ServiceError::Request(e.to_string()))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(ServiceError::Api { status, message });
        }

        response
            .json()
            .await
            .map(Some)
            .map_err(|e| ServiceError::Parse(e.to_string()))
    }

    pub async fn send<T: DeserializeOwned>(&self, builder: RequestBuilder) -> ServiceResult<T> {
        let response = builder
            .send()
            .await
            .map_err(|e| ServiceError::Request(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(ServiceError::Api { status, message });
        }

        response
            .json()
            .await
            .map_err(|e| ServiceError::Parse(e.to_string()))
    }

    /// Send and return the body as text; `Ok(None)` on 404.
    pub async fn text_optional(&self, builder: RequestBuilder) -> ServiceResult<Option<String>> {
        let response = builder
            .send()
            .await
            .map_err(|e| ServiceError::Request(e.to_string()))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(ServiceError::Api { status, message });
        }

        response
            .text()
            .await
            .map(Some)
            .map_err(|e| ServiceError::Parse(e.to_string()))
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> ServiceResult<T> {
        self.send(self.request(Method::GET, path)).await
    }

    pub async fn get_optional<T: DeserializeOwned>(&self, path: &str) -> ServiceResult<Option<T>> {
        self.send_optional(self.request(Method::GET, path)).await
    }

    pub async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> ServiceResult<T> {
        self.send(self.request(Method::POST, path).json(body)).await
    }
}
