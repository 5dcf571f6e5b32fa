//! Error taxonomy shared by the route table, the parameter resolver and the
//! chain executor.
//!
//! Setup-time problems (`RoutingError`, `ConfigError`) stop the server from
//! starting. Per-request problems (`RequestError`) are recorded in the request
//! context's error slot and mapped to a status code through
//! [`StatusMapping`](crate::config::StatusMapping).

use std::path::PathBuf;

use thiserror::Error;

use crate::binding::BindError;
use crate::config::StatusMapping;
use crate::validator::ValidationErrors;

/// Fatal configuration error raised while compiling patterns or sealing the
/// route table.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoutingError {
    #[error("route pattern is empty")]
    EmptyPattern,
    #[error("route path `{pattern}` must start with '/'")]
    MissingLeadingSlash { pattern: String },
    #[error("malformed capture in `{pattern}`: {reason}")]
    MalformedCapture { pattern: String, reason: String },
    #[error("capture `{name}` appears more than once in `{pattern}`")]
    DuplicateCapture { pattern: String, name: String },
    #[error("unknown HTTP method `{method}` in `{pattern}`")]
    UnknownMethod { pattern: String, method: String },
    #[error("unknown hook phase `{0}`")]
    UnknownHookPhase(String),
    #[error("invalid domain `{0}`")]
    InvalidDomain(String),
    #[error("duplicate route `{route}` registered at {second}, already registered at {first}")]
    DuplicateRoute {
        route: String,
        first: String,
        second: String,
    },
    #[error("no routes, hooks or middleware registered")]
    EmptyTable,
}

/// Failure to decode the query string or the request body.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("malformed {format} body: {message}")]
    Malformed {
        format: &'static str,
        message: String,
    },
    #[error("request body exceeds the {limit} byte limit")]
    TooLarge { limit: u64 },
    #[error("request was canceled while reading the body")]
    Canceled,
    #[error("failed to read request body: {0}")]
    Io(String),
}

/// Failure to load a [`ServerConfig`](crate::config::ServerConfig).
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid YAML config: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid TOML config: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("unsupported config file extension: {0}")]
    UnsupportedFormat(PathBuf),
    #[error("invalid value `{value}` for environment variable {var}")]
    InvalidEnv { var: &'static str, value: String },
}

/// Anything that can land in a request's error slot.
#[derive(Debug, Error)]
pub enum RequestError {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Validation(#[from] ValidationErrors),
    #[error(transparent)]
    Bind(BindError),
    #[error("handler failed: {0:#}")]
    Handler(anyhow::Error),
    #[error("handler panicked: {0}")]
    Panic(String),
    #[error("request canceled")]
    Canceled,
}

impl From<BindError> for RequestError {
    fn from(err: BindError) -> Self {
        match err {
            BindError::Validation(errors) => RequestError::Validation(errors),
            BindError::Parse(err) => RequestError::Parse(err),
            other => RequestError::Bind(other),
        }
    }
}

impl From<anyhow::Error> for RequestError {
    fn from(err: anyhow::Error) -> Self {
        RequestError::Handler(err)
    }
}

impl RequestError {
    /// Status code this error maps to when nothing has been written yet.
    #[must_use]
    pub fn status(&self, mapping: &StatusMapping) -> u16 {
        match self {
            RequestError::Parse(ParseError::TooLarge { .. }) => mapping.too_large,
            RequestError::Parse(ParseError::Canceled) | RequestError::Canceled => mapping.canceled,
            RequestError::Parse(_) => mapping.parse,
            RequestError::Validation(_) => mapping.validation,
            RequestError::Bind(_) => mapping.bind,
            RequestError::Handler(_) => mapping.handler,
            RequestError::Panic(_) => mapping.panic,
        }
    }

    /// Short machine-readable category used in log lines.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            RequestError::Parse(_) => "parse",
            RequestError::Validation(_) => "validation",
            RequestError::Bind(_) => "bind",
            RequestError::Handler(_) => "handler",
            RequestError::Panic(_) => "panic",
            RequestError::Canceled => "canceled",
        }
    }
}
