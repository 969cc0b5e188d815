//! `[wallet]` section.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

pub const DEFAULT_CONFIRMATIONS: u64 = 1;
/// Pause between a confirmed transaction and the balance refresh, giving
/// load-balanced RPC nodes time to catch up.
pub const DEFAULT_REFRESH_DELAY_MS: u64 = 700;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WalletConfig {
    pub confirmations: u64,
    pub refresh_delay_ms: u64,
    /// Where the priority store lives; platform data dir when unset
    pub data_dir: Option<PathBuf>,
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            confirmations: DEFAULT_CONFIRMATIONS,
            refresh_delay_ms: DEFAULT_REFRESH_DELAY_MS,
            data_dir: None,
        }
    }
}

/// `<platform data dir>/amipay`, or `.amipay` in the working directory when
/// the platform has none.
pub fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .map(|d| d.join("amipay"))
        .unwrap_or_else(|| PathBuf::from(".amipay"))
}
