use serde::{Deserialize, Serialize};

use crate::chain::rpc::ChainRpcConfig;

pub const DEFAULT_CHAIN_NAME: &str = "hoodi";
pub const DEFAULT_CHAIN_ID: u64 = 560_048;
pub const DEFAULT_RPC_URL: &str = "https://0xrpc.io/hoodi";

/// `[chain]` section: which network to talk to and how.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Name QR codes carry in their `chain` parameter
    pub name: String,
    pub chain_id: u64,
    pub rpc_url: String,
    /// Tried in order after `rpc_url` on transport failures
    pub fallback_urls: Vec<String>,
    pub timeout_ms: u64,
    pub max_retries: u32,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_CHAIN_NAME.to_string(),
            chain_id: DEFAULT_CHAIN_ID,
            rpc_url: DEFAULT_RPC_URL.to_string(),
            fallback_urls: Vec::new(),
            timeout_ms: 8_000,
            max_retries: 3,
        }
    }
}

impl NetworkConfig {
    pub fn rpc(&self) -> ChainRpcConfig {
        ChainRpcConfig {
            rpc_url: self.rpc_url.clone(),
            timeout_ms: Some(self.timeout_ms),
            max_retries: Some(self.max_retries),
            fallback_urls: Some(self.fallback_urls.clone()),
        }
    }
}
