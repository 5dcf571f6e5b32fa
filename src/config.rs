//! # Server Configuration
//!
//! [`ServerConfig`] is assembled from three layers, later ones winning:
//!
//! 1. built-in defaults (`ServerConfig::default()`)
//! 2. a YAML or TOML file, chosen by extension ([`ServerConfig::load`])
//! 3. `ROUTEWEAVE_*` environment variables ([`ServerConfig::with_env_overrides`])
//!
//! Every field has a serde default, so a file only needs the keys it changes:
//!
//! ```yaml
//! name: billing
//! route_overwrite: true
//! client_max_body_size: 1048576
//! status:
//!   handler: 503
//! ```
//!
//! ## Environment Variables
//!
//! | Variable                            | Field                  |
//! |-------------------------------------|------------------------|
//! | `ROUTEWEAVE_NAME`                   | `name`                 |
//! | `ROUTEWEAVE_ROUTE_OVERWRITE`        | `route_overwrite`      |
//! | `ROUTEWEAVE_DUMP_ROUTER_MAP`        | `dump_router_map`      |
//! | `ROUTEWEAVE_CLIENT_MAX_BODY_SIZE`   | `client_max_body_size` |
//! | `ROUTEWEAVE_FORM_PARSING_MEMORY`    | `form_parsing_memory`  |
//! | `ROUTEWEAVE_SESSION_ID_NAME`        | `session_id_name`      |
//! | `ROUTEWEAVE_ACCESS_LOG_ENABLED`     | `access_log_enabled`   |
//! | `ROUTEWEAVE_ERROR_LOG_ENABLED`      | `error_log_enabled`    |
//! | `ROUTEWEAVE_VALIDATION_BAIL`        | `validation_bail`      |
//! | `ROUTEWEAVE_ROUTE_CACHE_CAPACITY`   | `route_cache_capacity` |
//!
//! Booleans accept `true/false/1/0/yes/no/on/off`.

use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ConfigError;

/// Status code assigned to each request error category when nothing else
/// set a status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatusMapping {
    pub parse: u16,
    pub too_large: u16,
    pub validation: u16,
    pub bind: u16,
    pub handler: u16,
    pub panic: u16,
    pub canceled: u16,
}

impl Default for StatusMapping {
    fn default() -> Self {
        Self {
            parse: 400,
            too_large: 413,
            validation: 400,
            bind: 400,
            handler: 500,
            panic: 500,
            canceled: 503,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Server name, used in log lines.
    pub name: String,
    /// Let a later duplicate serving route replace an earlier one.
    pub route_overwrite: bool,
    /// Log the sealed route table at startup.
    pub dump_router_map: bool,
    /// Request body limit in bytes.
    pub client_max_body_size: u64,
    /// Multipart form limit in bytes.
    pub form_parsing_memory: u64,
    /// Cookie (then header) carrying the session id.
    pub session_id_name: String,
    pub access_log_enabled: bool,
    pub error_log_enabled: bool,
    /// Stop validation at the first failing rule.
    pub validation_bail: bool,
    /// Dispatch plan cache entries; 0 disables the cache.
    pub route_cache_capacity: usize,
    pub status: StatusMapping,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            route_overwrite: false,
            dump_router_map: false,
            client_max_body_size: 8 * 1024 * 1024,
            form_parsing_memory: 1024 * 1024,
            session_id_name: "sessionid".to_string(),
            access_log_enabled: false,
            error_log_enabled: true,
            validation_bail: false,
            route_cache_capacity: 1024,
            status: StatusMapping::default(),
        }
    }
}

impl ServerConfig {
    /// Read a YAML (`.yaml`/`.yml`) or TOML (`.toml`) file.
    ///
    /// # Errors
    ///
    /// I/O failures, parse failures and unknown extensions.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        let config = match ext.as_deref() {
            Some("yaml" | "yml") => serde_yaml::from_str(&content)?,
            Some("toml") => toml::from_str(&content)?,
            _ => return Err(ConfigError::UnsupportedFormat(path.to_path_buf())),
        };
        debug!(path = %path.display(), "Server configuration loaded");
        Ok(config)
    }

    /// Defaults with environment overrides applied.
    ///
    /// # Errors
    ///
    /// A variable that is set but does not parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().with_env_overrides()
    }

    /// Apply `ROUTEWEAVE_*` variables from the process environment.
    ///
    /// # Errors
    ///
    /// A variable that is set but does not parse.
    pub fn with_env_overrides(self) -> Result<Self, ConfigError> {
        self.with_overrides(|var| std::env::var(var).ok())
    }

    /// Apply overrides from an arbitrary lookup, keyed by variable name.
    ///
    /// # Errors
    ///
    /// A variable that is present but does not parse.
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        if let Some(v) = lookup("ROUTEWEAVE_NAME") {
            self.name = v;
        }
        if let Some(v) = lookup("ROUTEWEAVE_SESSION_ID_NAME") {
            self.session_id_name = v;
        }
        override_bool(&lookup, "ROUTEWEAVE_ROUTE_OVERWRITE", &mut self.route_overwrite)?;
        override_bool(&lookup, "ROUTEWEAVE_DUMP_ROUTER_MAP", &mut self.dump_router_map)?;
        override_bool(&lookup, "ROUTEWEAVE_ACCESS_LOG_ENABLED", &mut self.access_log_enabled)?;
        override_bool(&lookup, "ROUTEWEAVE_ERROR_LOG_ENABLED", &mut self.error_log_enabled)?;
        override_bool(&lookup, "ROUTEWEAVE_VALIDATION_BAIL", &mut self.validation_bail)?;
        override_num(&lookup, "ROUTEWEAVE_CLIENT_MAX_BODY_SIZE", &mut self.client_max_body_size)?;
        override_num(&lookup, "ROUTEWEAVE_FORM_PARSING_MEMORY", &mut self.form_parsing_memory)?;
        override_num(&lookup, "ROUTEWEAVE_ROUTE_CACHE_CAPACITY", &mut self.route_cache_capacity)?;
        Ok(self)
    }
}

fn override_bool(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    slot: &mut bool,
) -> Result<(), ConfigError> {
    let Some(value) = lookup(var) else {
        return Ok(());
    };
    *slot = match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => true,
        "0" | "false" | "no" | "off" => false,
        _ => return Err(ConfigError::InvalidEnv { var, value }),
    };
    Ok(())
}

fn override_num<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    slot: &mut T,
) -> Result<(), ConfigError> {
    let Some(value) = lookup(var) else {
        return Ok(());
    };
    *slot = value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidEnv { var, value })?;
    Ok(())
}
