//! HTTP API client with bearer token support.

use reqwest::{Client, Method, RequestBuilder};
use roomchat_shared::ApiError;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// HTTP client for the backend's REST endpoints.
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl ApiClient {
    /// Create a new API client
    pub fn new() -> Self {
        Self {
            client: Client::new(),
            base_url: String::new(),
            token: None,
        }
    }

    /// Set the base URL for API requests
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Attach `Authorization: Bearer <token>` to every request
    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token;
        self
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub(crate) fn url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        if self.base_url.is_empty() {
            if path.starts_with('/') {
                path.to_string()
            } else {
                format!("/{path}")
            }
        } else {
            let base = self.base_url.trim_end_matches('/');
            let path = path.trim_start_matches('/');
            format!("{base}/{path}")
        }
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let rb = self.client.request(method, self.url(path));
        match &self.token {
            Some(token) => rb.bearer_auth(token),
            None => rb,
        }
    }

    /// Send the request and return the body of a successful response.
    async fn execute(&self, rb: RequestBuilder) -> Result<String, ApiError> {
        let resp = rb.send().await.map_err(|e| ApiError::Network(e.to_string()))?;

        let status = resp.status().as_u16();
        let is_success = resp.status().is_success();
        let text = resp
            .text()
            .await
            .map_err(|e| ApiError::Network(format!("failed to read body: {e}")))?;

        if !is_success {
            return Err(ApiError::Http { status, body: text });
        }
        Ok(text)
    }

    fn with_json<TReq: Serialize>(rb: RequestBuilder, body: &TReq) -> Result<RequestBuilder, ApiError> {
        let body_bytes =
            serde_json::to_vec(body).map_err(|e| ApiError::Deserialize(e.to_string()))?;
        Ok(rb
            .body(body_bytes)
            .header("Content-Type", "application/json"))
    }

    fn decode<TRes: DeserializeOwned>(text: &str) -> Result<TRes, ApiError> {
        let text = if text.is_empty() { "null" } else { text };
        serde_json::from_str(text).map_err(|e| ApiError::Deserialize(e.to_string()))
    }

    /// Make a GET request
    pub async fn get_json<TRes: DeserializeOwned>(&self, path: &str) -> Result<TRes, ApiError> {
        let text = self.execute(self.request(Method::GET, path)).await?;
        Self::decode(&text)
    }

    /// Make a POST request with JSON body
    pub async fn post_json<TReq: Serialize, TRes: DeserializeOwned>(
        &self,
        path: &str,
        body: &TReq,
    ) -> Result<TRes, ApiError> {
        let rb = Self::with_json(self.request(Method::POST, path), body)?;
        let text = self.execute(rb).await?;
        Self::decode(&text)
    }

    /// Make a PUT request with JSON body
    pub async fn put_json<TReq: Serialize, TRes: DeserializeOwned>(
        &self,
        path: &str,
        body: &TReq,
    ) -> Result<TRes, ApiError> {
        let rb = Self::with_json(self.request(Method::PUT, path), body)?;
        let text = self.execute(rb).await?;
        Self::decode(&text)
    }

    /// POST a JSON body to an endpoint that answers with plain text
    pub async fn post_text<TReq: Serialize>(&self, path: &str, body: &TReq) -> Result<String, ApiError> {
        let rb = Self::with_json(self.request(Method::POST, path), body)?;
        self.execute(rb).await
    }

    /// PUT a JSON body to an endpoint that answers with plain text
    pub async fn put_text<TReq: Serialize>(&self, path: &str, body: &TReq) -> Result<String, ApiError> {
        let rb = Self::with_json(self.request(Method::PUT, path), body)?;
        self.execute(rb).await
    }
}

impl Default for ApiClient {
    fn default() -> Self {
        Self::new()
    }
}
