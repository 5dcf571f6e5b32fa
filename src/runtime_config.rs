//! # Runtime Configuration Module
//!
//! Environment-driven settings for the coroutine runtime that
//! [`AppService::spawn`](crate::server::AppService::spawn) uses.
//!
//! ## Environment Variables
//!
//! ### `ROUTEWEAVE_STACK_SIZE`
//!
//! Stack size for request coroutines. Accepts values in:
//! - Decimal: `16384` (16 KB)
//! - Hexadecimal: `0x4000` (16 KB)
//!
//! Default: `0x4000` (16 KB). Unparseable values fall back to the default.
//!
//! Memory use is roughly `stack_size × concurrent requests`; handlers with
//! deep call chains or large locals need more.
//!
//! ```rust
//! use routeweave::runtime_config::RuntimeConfig;
//!
//! let config = RuntimeConfig::from_env();
//! assert!(config.stack_size > 0);
//! ```

use std::env;

pub const DEFAULT_STACK_SIZE: usize = 0x4000;

/// Runtime configuration loaded from environment variables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Stack size for request coroutines in bytes
    pub stack_size: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            stack_size: DEFAULT_STACK_SIZE,
        }
    }
}

impl RuntimeConfig {
    /// Load configuration from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        let stack_size = env::var("ROUTEWEAVE_STACK_SIZE")
            .ok()
            .and_then(|val| parse_size(&val))
            .unwrap_or(DEFAULT_STACK_SIZE);
        RuntimeConfig { stack_size }
    }
}

/// Decimal or `0x`-prefixed hexadecimal; zero is rejected.
fn parse_size(val: &str) -> Option<usize> {
    let val = val.trim();
    let parsed = match val.strip_prefix("0x").or_else(|| val.strip_prefix("0X")) {
        Some(hex) => usize::from_str_radix(hex, 16).ok(),
        None => val.parse().ok(),
    };
    parsed.filter(|&n| n > 0)
}
