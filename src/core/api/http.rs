use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, AUTHORIZATION, HeaderMap, HeaderValue, REFERER, USER_AGENT};
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use super::types::{AuthResponse, DiamondSnapshot, FarmingSnapshot, Profile, Task, TaskList};
use super::{ApiError, ApiFactory, FarmApi, Operation, SessionToken};
use crate::core::proxy::ProxyEndpoint;

const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Linux; Android 6.0; Nexus 5 Build/MRA58N) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/115.0.0.0 Mobile Safari/537.36";
const SEC_CH_UA: &str = r#""Not/A)Brand";v="99", "Google Chrome";v="115", "Chromium";v="115""#;

/// Builds one [`HttpFarmClient`] per account, each with its own proxy settings.
pub struct HttpApiFactory {
    base_url: String,
    timeout: Duration,
}

impl HttpApiFactory {
    pub fn new(base_url: &str, timeout: Duration) -> Self {
        Self {
            base_url: base_url.to_string(),
            timeout,
        }
    }
}

impl ApiFactory for HttpApiFactory {
    fn client_for(&self, proxy: Option<&ProxyEndpoint>) -> Result<Arc<dyn FarmApi>> {
        let client = HttpFarmClient::new(&self.base_url, proxy, self.timeout)?;
        Ok(Arc::new(client))
    }
}

pub struct HttpFarmClient {
    base_url: String,
    origin: String,
    client: Client,
}

impl HttpFarmClient {
    pub fn new(base_url: &str, proxy: Option<&ProxyEndpoint>, timeout: Duration) -> Result<Self> {
        let base_url = base_url.trim_end_matches('/').to_string();
        let origin = site_origin(&base_url);

        let mut builder = Client::builder()
            .default_headers(browser_headers(&origin))
            .timeout(timeout);
        if let Some(p) = proxy {
            let proxy = reqwest::Proxy::all(p.url())
                .with_context(|| format!("Invalid proxy {}", p))?
                .basic_auth(&p.user, &p.pass);
            builder = builder.proxy(proxy);
        }
        let client = builder.build().context("Failed to build HTTP client")?;

        Ok(Self {
            base_url,
            origin,
            client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authed(&self, request: RequestBuilder, token: &SessionToken) -> RequestBuilder {
        request.header(AUTHORIZATION, format!("Bearer {}", token.as_str()))
    }

    fn post_empty(&self, path: &str, token: &SessionToken) -> RequestBuilder {
        self.authed(self.client.post(self.url(path)), token).json(&json!({}))
    }

    /// Sends the request and returns the raw body of a 2xx response.
    async fn send(&self, operation: Operation, request: RequestBuilder) -> Result<String, ApiError> {
        let res = request
            .send()
            .await
            .map_err(|e| ApiError::new(operation, format!("request error: {}", e)))?;
        let status = res.status();
        let body = res
            .text()
            .await
            .map_err(|e| ApiError::new(operation, format!("body read error: {}", e)))?;
        if !status.is_success() {
            return Err(ApiError::new(
                operation,
                format!("HTTP {}: {}", status.as_u16(), truncate(&body, 200)),
            ));
        }
        let kind = if operation.is_mutating() { "write" } else { "read" };
        debug!("{} ({}) -> HTTP {}", operation, kind, status.as_u16());
        Ok(body)
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        operation: Operation,
        request: RequestBuilder,
    ) -> Result<T, ApiError> {
        let body = self.send(operation, request).await?;
        serde_json::from_str(&body)
            .map_err(|e| ApiError::new(operation, format!("malformed response: {}", e)))
    }
}

#[async_trait]
impl FarmApi for HttpFarmClient {
    async fn authenticate(&self, payload: &str) -> Result<SessionToken, ApiError> {
        let request = self
            .client
            .get(format!("{}?{}", self.url("/auth/telegram"), payload))
            .header("Webapp", "true");
        let parsed: AuthResponse = self.send_json(Operation::Auth, request).await?;
        parsed
            .token
            .filter(|t| !t.is_empty())
            .map(SessionToken::new)
            .ok_or_else(|| ApiError::new(Operation::Auth, "no token in response"))
    }

    async fn profile(&self, token: &SessionToken) -> Result<Profile, ApiError> {
        let request = self
            .authed(self.client.get(self.url("/referrals/data")), token)
            .header("Webapp", "false, true");
        self.send_json(Operation::Profile, request).await
    }

    async fn daily_check_in(&self, token: &SessionToken) -> Result<(), ApiError> {
        let request = self.post_empty("/daily-checkins", token);
        self.send(Operation::DailyCheckIn, request).await.map(|_| ())
    }

    async fn farming_state(&self, token: &SessionToken) -> Result<FarmingSnapshot, ApiError> {
        let request = self.authed(self.client.get(self.url("/farming/state")), token);
        self.send_json(Operation::FarmingState, request).await
    }

    async fn start_farming(&self, token: &SessionToken) -> Result<FarmingSnapshot, ApiError> {
        let request = self.post_empty("/farming/farm", token);
        let body = self.send(Operation::FarmingStart, request).await?;
        // The round has started once the call succeeded; an odd body only loses the finish time.
        Ok(serde_json::from_str(&body).unwrap_or_default())
    }

    async fn claim_farming(&self, token: &SessionToken) -> Result<(), ApiError> {
        let request = self.post_empty("/farming/claim", token);
        self.send(Operation::FarmingClaim, request).await.map(|_| ())
    }

    async fn diamond_state(&self, token: &SessionToken) -> Result<DiamondSnapshot, ApiError> {
        let request = self.authed(self.client.get(self.url("/clicker/diamond/state")), token);
        self.send_json(Operation::DiamondState, request).await
    }

    async fn claim_diamond(
        &self,
        token: &SessionToken,
        diamond_number: &Value,
    ) -> Result<(), ApiError> {
        let request = self
            .authed(self.client.post(self.url("/clicker/diamond/complete")), token)
            .json(&json!({ "diamondNumber": diamond_number }));
        self.send(Operation::DiamondClaim, request).await.map(|_| ())
    }

    async fn tasks(&self, token: &SessionToken) -> Result<Vec<Task>, ApiError> {
        let request = self.authed(self.client.get(self.url("/hold/tasks")), token);
        let list: TaskList = self.send_json(Operation::Tasks, request).await?;
        Ok(list.tasks)
    }

    async fn start_task(&self, token: &SessionToken, task_id: &str) -> Result<(), ApiError> {
        let path = format!("/hold/tasks/{}/start", urlencoding::encode(task_id));
        let request = self
            .post_empty(&path, token)
            .header("Origin", self.origin.as_str());
        self.send(Operation::TaskStart, request).await.map(|_| ())
    }

    async fn claim_task(&self, token: &SessionToken, task_id: &str) -> Result<(), ApiError> {
        let path = format!("/hold/tasks/{}/claim", urlencoding::encode(task_id));
        let request = self
            .post_empty(&path, token)
            .header("Origin", self.origin.as_str());
        self.send(Operation::TaskClaim, request).await.map(|_| ())
    }
}

fn browser_headers(origin: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static("application/json, text/plain, */*"));
    headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));
    headers.insert(USER_AGENT, HeaderValue::from_static(BROWSER_USER_AGENT));
    headers.insert("Sec-Ch-Ua", HeaderValue::from_static(SEC_CH_UA));
    headers.insert("Sec-Ch-Ua-Mobile", HeaderValue::from_static("?1"));
    headers.insert("Sec-Ch-Ua-Platform", HeaderValue::from_static("\"Android\""));
    if let Ok(referer) = HeaderValue::from_str(&format!("{}/", origin)) {
        headers.insert(REFERER, referer);
    }
    headers
}

/// `https://host/api` -> `https://host`. Unparsable urls pass through unchanged.
fn site_origin(base_url: &str) -> String {
    match reqwest::Url::parse(base_url) {
        Ok(url) => url.origin().ascii_serialization(),
        Err(_) => base_url.to_string(),
    }
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        let cut: String = text.chars().take(max).collect();
        format!("{}...", cut)
    }
}
