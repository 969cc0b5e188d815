//! Configuration: `amipay.toml` plus environment overrides.
//!
//! Every field has a Hoodi testnet default, so a missing file is fine.
//! Environment variables win over the file:
//! `AMIPAY_RPC_URL`, `AMIPAY_CHAIN_ID`, `AMIPAY_STABLECOIN`,
//! `AMIPAY_SETTLEMENT`, `AMIPAY_DATA_DIR`, `AMIPAY_REFRESH_DELAY_MS`.

pub mod network;
pub mod wallet;

use std::path::{Path, PathBuf};
use std::time::Duration;

use alloy_primitives::Address;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::address::parse_address;
use crate::chain::rpc::ChainRpcConfig;
use crate::chain::Contracts;

pub use network::NetworkConfig;
pub use wallet::{default_data_dir, WalletConfig};

pub const DEFAULT_CONFIG_FILE: &str = "amipay.toml";
pub const DEFAULT_STABLECOIN: &str = "0xCad6980d7c09EEcd20D4c12110C8b89755D9A227";
pub const DEFAULT_SETTLEMENT: &str = "0x7b07761ae6D912B33Af13dFc962162ff8F611EaC";

/// Sub-directory of the data dir holding the sled priority store.
const PREFS_DIR: &str = "prefs";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContractsConfig {
    pub stablecoin: String,
    pub settlement: String,
}

impl Default for ContractsConfig {
    fn default() -> Self {
        Self {
            stablecoin: DEFAULT_STABLECOIN.to_string(),
            settlement: DEFAULT_SETTLEMENT.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub chain: NetworkConfig,
    pub contracts: ContractsConfig,
    pub wallet: WalletConfig,
}

/// Effective settings after defaults, file and environment are applied.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub chain_name: String,
    pub chain_id: u64,
    pub rpc: ChainRpcConfig,
    pub contracts: Contracts,
    pub confirmations: u64,
    pub refresh_delay: Duration,
    pub data_dir: PathBuf,
}

impl ResolvedConfig {
    pub fn prefs_path(&self) -> PathBuf {
        self.data_dir.join(PREFS_DIR)
    }
}

impl AppConfig {
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        let s = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        toml::from_str(&s).with_context(|| format!("parsing {}", path.display()))
    }

    /// Apply the process environment on top of this config.
    pub fn resolved(&self) -> Result<ResolvedConfig> {
        self.resolve_with(|key| std::env::var(key).ok())
    }

    /// Like [`AppConfig::resolved`], reading overrides from `env`.
    pub fn resolve_with(&self, env: impl Fn(&str) -> Option<String>) -> Result<ResolvedConfig> {
        let mut rpc = self.chain.rpc();
        if let Some(url) = env("AMIPAY_RPC_URL").filter(|s| !s.trim().is_empty()) {
            rpc.rpc_url = url.trim().to_string();
        }

        let chain_id = match env("AMIPAY_CHAIN_ID") {
            Some(raw) => raw
                .trim()
                .parse()
                .with_context(|| format!("AMIPAY_CHAIN_ID is not a number: {}", raw))?,
            None => self.chain.chain_id,
        };

        let stablecoin = resolve_address(
            "AMIPAY_STABLECOIN",
            env("AMIPAY_STABLECOIN"),
            &self.contracts.stablecoin,
        )?;
        let settlement = resolve_address(
            "AMIPAY_SETTLEMENT",
            env("AMIPAY_SETTLEMENT"),
            &self.contracts.settlement,
        )?;

        let refresh_delay_ms = match env("AMIPAY_REFRESH_DELAY_MS") {
            Some(raw) => raw
                .trim()
                .parse()
                .with_context(|| format!("AMIPAY_REFRESH_DELAY_MS is not a number: {}", raw))?,
            None => self.wallet.refresh_delay_ms,
        };

        let data_dir = env("AMIPAY_DATA_DIR")
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from)
            .or_else(|| self.wallet.data_dir.clone())
            .unwrap_or_else(default_data_dir);

        Ok(ResolvedConfig {
            chain_name: self.chain.name.clone(),
            chain_id,
            rpc,
            contracts: Contracts {
                stablecoin,
                settlement,
            },
            confirmations: self.wallet.confirmations.max(1),
            refresh_delay: Duration::from_millis(refresh_delay_ms),
            data_dir,
        })
    }
}

fn resolve_address(key: &str, env_value: Option<String>, file_value: &str) -> Result<Address> {
    match env_value {
        Some(raw) => parse_address(&raw).with_context(|| format!("{} is not an address", key)),
        None => parse_address(file_value)
            .with_context(|| format!("bad contract address in config: {}", file_value)),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn defaults_target_hoodi() {
        let cfg = AppConfig::default().resolve_with(no_env).unwrap();
        assert_eq!(cfg.chain_name, "hoodi");
        assert_eq!(cfg.chain_id, 560_048);
        assert_eq!(cfg.rpc.rpc_url, "https://0xrpc.io/hoodi");
        assert_eq!(cfg.contracts.stablecoin, parse_address(DEFAULT_STABLECOIN).unwrap());
        assert_eq!(cfg.contracts.settlement, parse_address(DEFAULT_SETTLEMENT).unwrap());
        assert_eq!(cfg.confirmations, 1);
        assert_eq!(cfg.refresh_delay, Duration::from_millis(700));
    }

    #[test]
    fn partial_toml_keeps_other_defaults() {
        let cfg: AppConfig = toml::from_str(
            r#"
            [chain]
            rpc_url = "http://localhost:8545"
            fallback_urls = ["http://backup:8545"]

            [wallet]
            refresh_delay_ms = 0
            "#,
        )
        .unwrap();
        let resolved = cfg.resolve_with(no_env).unwrap();
        assert_eq!(resolved.rpc.rpc_url, "http://localhost:8545");
        assert_eq!(
            resolved.rpc.fallback_urls,
            Some(vec!["http://backup:8545".to_string()])
        );
        assert_eq!(resolved.chain_id, 560_048);
        assert_eq!(resolved.refresh_delay, Duration::ZERO);
    }

    #[test]
    fn environment_wins_over_file() {
        let env: HashMap<&str, &str> = [
            ("AMIPAY_RPC_URL", "http://env:8545"),
            ("AMIPAY_CHAIN_ID", "31337"),
            ("AMIPAY_SETTLEMENT", "0x1111111111111111111111111111111111111111"),
            ("AMIPAY_DATA_DIR", "/tmp/amipay-env"),
            ("AMIPAY_REFRESH_DELAY_MS", "50"),
        ]
        .into_iter()
        .collect();

        let cfg = AppConfig::default()
            .resolve_with(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(cfg.rpc.rpc_url, "http://env:8545");
        assert_eq!(cfg.chain_id, 31_337);
        assert_eq!(cfg.contracts.settlement, Address::repeat_byte(0x11));
        assert_eq!(cfg.data_dir, PathBuf::from("/tmp/amipay-env"));
        assert_eq!(cfg.prefs_path(), PathBuf::from("/tmp/amipay-env/prefs"));
        assert_eq!(cfg.refresh_delay, Duration::from_millis(50));
    }

    #[test]
    fn bad_addresses_are_reported() {
        let err = AppConfig::default()
            .resolve_with(|k| (k == "AMIPAY_STABLECOIN").then(|| "usdc".to_string()))
            .unwrap_err();
        assert!(format!("{:#}", err).contains("AMIPAY_STABLECOIN"));
    }
}
