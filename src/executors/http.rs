use std::collections::HashMap;
use std::time::Duration;

use anyhow::{Context, bail};
use async_trait::async_trait;
use serde::Deserialize;

use crate::handler::TaskHandler;

const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Performs an HTTP request and fails the task on transport errors or
/// 4xx/5xx responses.
#[derive(Debug)]
pub struct HttpExecutor {
    client: reqwest::Client,
}

impl Default for HttpExecutor {
    fn default() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct HttpPayload {
    url: String,
    method: Option<String>,
    #[serde(default)]
    headers: HashMap<String, String>,
    body: Option<String>,
    /// Request timeout in seconds; defaults to 30.
    timeout: Option<u64>,
}

#[async_trait]
impl TaskHandler for HttpExecutor {
    async fn execute(&self, payload: &[u8]) -> anyhow::Result<()> {
        let payload: HttpPayload =
            serde_json::from_slice(payload).context("invalid http payload")?;
        if payload.url.is_empty() {
            bail!("url is required");
        }

        let method = payload.method.as_deref().unwrap_or("GET");
        let method = reqwest::Method::from_bytes(method.to_uppercase().as_bytes())
            .with_context(|| format!("invalid method {method:?}"))?;
        let timeout = Duration::from_secs(payload.timeout.unwrap_or(DEFAULT_TIMEOUT_SECS));

        let mut request = self.client.request(method, &payload.url).timeout(timeout);
        for (name, value) in &payload.headers {
            request = request.header(name, value);
        }
        if let Some(body) = payload.body {
            request = request.body(body);
        }

        let response = request.send().await.context("http request failed")?;
        let status = response.status();
        if status.is_client_error() || status.is_server_error() {
            let body = response.text().await.unwrap_or_default();
            let body: String = body.chars().take(512).collect();
            bail!("http {status}: {body}");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use claims::assert_err;

    #[tokio::test]
    async fn rejects_an_empty_url() {
        let error = HttpExecutor::default()
            .execute(br#"{"url": ""}"#)
            .await
            .unwrap_err();
        assert!(error.to_string().contains("url is required"));
    }

    #[tokio::test]
    async fn rejects_malformed_payloads() {
        assert_err!(HttpExecutor::default().execute(b"{").await);
    }

    #[tokio::test]
    async fn rejects_invalid_methods() {
        let payload = br#"{"url": "http://localhost", "method": "NOT A METHOD"}"#;
        let error = HttpExecutor::default().execute(payload).await.unwrap_err();
        assert!(error.to_string().contains("invalid method"));
    }
}
