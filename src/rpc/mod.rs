//! RPC transport for function-call nodes.
//!
//! The node builds its request from graph configuration plus session state;
//! the transport only moves JSON. Hiding `reqwest` behind a trait keeps the
//! node testable with a scripted fake.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;

use crate::error::FlowResult;

/// Moves one JSON request/response pair to an external endpoint.
#[async_trait]
pub trait RpcTransport: Send + Sync {
    async fn get(
        &self,
        url: &str,
        params: &HashMap<String, String>,
        headers: &HashMap<String, String>,
    ) -> FlowResult<Value>;

    async fn post(
        &self,
        url: &str,
        params: &HashMap<String, String>,
        headers: &HashMap<String, String>,
    ) -> FlowResult<Value>;
}

/// Production transport backed by a pooled [`reqwest::Client`].
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        ReqwestTransport { client }
    }
}

impl Default for ReqwestTransport {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}

fn apply_headers(
    mut request: reqwest::RequestBuilder,
    headers: &HashMap<String, String>,
) -> reqwest::RequestBuilder {
    for (key, value) in headers {
        request = request.header(key.as_str(), value.as_str());
    }
    request
}

#[async_trait]
impl RpcTransport for ReqwestTransport {
    async fn get(
        &self,
        url: &str,
        params: &HashMap<String, String>,
        headers: &HashMap<String, String>,
    ) -> FlowResult<Value> {
        let request = apply_headers(self.client.get(url).query(params), headers);
        let response = request.send().await?.error_for_status()?;
        Ok(response.json().await?)
    }

    async fn post(
        &self,
        url: &str,
        params: &HashMap<String, String>,
        headers: &HashMap<String, String>,
    ) -> FlowResult<Value> {
        let request = apply_headers(self.client.post(url).json(params), headers);
        let response = request.send().await?.error_for_status()?;
        Ok(response.json().await?)
    }
}
