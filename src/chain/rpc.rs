//! JSON-RPC transport with endpoint failover.

use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::Deserialize;

use crate::error::ChainError;

/// Error code wallets return when the user declines to sign (EIP-1193).
const USER_REJECTED_CODE: i64 = 4001;

/// Configuration for a chain RPC endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct ChainRpcConfig {
    pub rpc_url: String,
    pub timeout_ms: Option<u64>,
    pub max_retries: Option<u32>,
    pub fallback_urls: Option<Vec<String>>,
}

/// RPC client for the configured chain
pub struct RpcClient {
    pub primary_url: String,
    pub fallback_urls: Vec<String>,
    pub http: Client,
    pub max_retries: u32,
}

impl RpcClient {
    /// Create RPC client from chain config
    pub fn from_cfg(cfg: &ChainRpcConfig) -> Result<Self, ChainError> {
        let timeout = cfg.timeout_ms.unwrap_or(8000);
        let max_retries = cfg.max_retries.unwrap_or(3);

        let http = Client::builder()
            .timeout(Duration::from_millis(timeout))
            .build()
            .map_err(|e| ChainError::Other(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            primary_url: cfg.rpc_url.clone(),
            fallback_urls: cfg.fallback_urls.clone().unwrap_or_default(),
            http,
            max_retries,
        })
    }

    fn endpoints(&self) -> Vec<&str> {
        let mut urls: Vec<&str> = std::iter::once(self.primary_url.as_str())
            .chain(self.fallback_urls.iter().map(String::as_str))
            .collect();

        // Cycle back through the list when retries outnumber endpoints
        let wanted = (self.max_retries as usize).max(1).max(urls.len());
        let base = urls.clone();
        while urls.len() < wanted {
            urls.push(base[urls.len() % base.len()]);
        }
        urls
    }

    /// Call RPC method with automatic failover and exponential backoff.
    ///
    /// Only transport failures move on to the next endpoint; an error
    /// object in the response is final. Transaction submissions are never
    /// retried and go through [`RpcClient::call_once`].
    pub async fn call(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<serde_json::Value, ChainError> {
        if is_write(method) {
            return self.call_once(method, params).await;
        }

        let body = request_body(method, params);
        let endpoints = self.endpoints();
        let max_attempts = endpoints.len();
        let mut backoff_ms = 100u64;
        let mut last_err = ChainError::Network("no RPC endpoint configured".into());

        for (attempt, url) in endpoints.into_iter().enumerate() {
            if attempt > 0 {
                tracing::debug!(method, backoff_ms, "Backing off before retry");
                tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                backoff_ms = (backoff_ms * 2).min(10_000);
            }

            match self.post(url, method, &body).await {
                Ok(result) => {
                    if attempt > 0 {
                        tracing::info!(url = %url, method, "RPC request succeeded after {} retries", attempt);
                    }
                    return Ok(result);
                }
                Err(Attempt::Final(e)) => return Err(e),
                Err(Attempt::Retry(e)) => {
                    tracing::warn!(
                        url = %url,
                        method,
                        error = %e,
                        attempt = attempt + 1,
                        max_attempts,
                        "RPC request failed, will retry with backoff"
                    );
                    last_err = e;
                }
            }
        }

        Err(last_err)
    }

    /// Single request to the primary endpoint.
    ///
    /// A timeout here does not mean the node dropped the request: a write
    /// may still be mined, so it must not be sent again.
    pub async fn call_once(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<serde_json::Value, ChainError> {
        let body = request_body(method, params);
        match self.post(&self.primary_url, method, &body).await {
            Ok(result) => Ok(result),
            Err(Attempt::Final(e)) => Err(e),
            Err(Attempt::Retry(e)) => {
                tracing::warn!(url = %self.primary_url, method, error = %e, "RPC request failed, not retrying");
                Err(e)
            }
        }
    }

    async fn post(
        &self,
        url: &str,
        method: &str,
        body: &serde_json::Value,
    ) -> Result<serde_json::Value, Attempt> {
        let resp = self
            .http
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| Attempt::Retry(transport_error(&e)))?;

        if !resp.status().is_success() {
            tracing::warn!(url = %url, method, status = %resp.status(), "RPC endpoint returned error status");
            return Err(Attempt::Retry(if resp.status() == StatusCode::NOT_FOUND {
                ChainError::Network(format!("RPC endpoint not found: {}", url))
            } else {
                ChainError::Network(format!("RPC endpoint returned {}", resp.status()))
            }));
        }

        let json: serde_json::Value = resp.json().await.map_err(|e| {
            Attempt::Final(if e.is_timeout() {
                ChainError::Timeout(e.to_string())
            } else {
                ChainError::Decode(e.to_string())
            })
        })?;

        if let Some(err) = json.get("error").filter(|e| !e.is_null()) {
            tracing::warn!(method, error = %err, "RPC returned error response");
            return Err(Attempt::Final(rpc_error(err)));
        }

        Ok(json.get("result").cloned().unwrap_or(serde_json::Value::Null))
    }
}

/// Outcome of one HTTP round trip that did not produce a result.
enum Attempt {
    /// Transport trouble; another endpoint may do better
    Retry(ChainError),
    Final(ChainError),
}

/// Methods that submit a transaction. Not idempotent.
fn is_write(method: &str) -> bool {
    matches!(method, "eth_sendTransaction" | "eth_sendRawTransaction")
}

fn request_body(method: &str, params: serde_json::Value) -> serde_json::Value {
    serde_json::json!({
        "jsonrpc": "2.0",
        "id": 1,
        "method": method,
        "params": params,
    })
}

fn transport_error(e: &reqwest::Error) -> ChainError {
    if e.is_timeout() {
        ChainError::Timeout(e.to_string())
    } else {
        ChainError::Network(e.to_string())
    }
}

/// Map a JSON-RPC error object onto [`ChainError`].
pub(crate) fn rpc_error(err: &serde_json::Value) -> ChainError {
    let code = err.get("code").and_then(|c| c.as_i64()).unwrap_or(0);
    let message = err
        .get("message")
        .and_then(|m| m.as_str())
        .unwrap_or("unknown RPC error")
        .to_string();

    if code == USER_REJECTED_CODE {
        ChainError::Rejected
    } else {
        ChainError::Rpc { code, message }
    }
}
