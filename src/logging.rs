//! tracing-subscriber setup.

use tracing_subscriber::EnvFilter;

pub const LOG_ENV: &str = "AMIPAY_LOG";

/// Filter directive from `AMIPAY_LOG`, then `RUST_LOG`, else `info`.
pub fn filter_directive() -> String {
    std::env::var(LOG_ENV)
        .or_else(|_| std::env::var("RUST_LOG"))
        .unwrap_or_else(|_| "info".into())
}

/// Install the global fmt subscriber. A second call is a no-op.
pub fn init() {
    let env_filter = EnvFilter::try_new(filter_directive()).unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .try_init();
}
