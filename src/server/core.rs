use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use tracing::{info, warn};

use super::service::AppService;
use crate::config::ServerConfig;
use crate::dispatcher::Dispatcher;
use crate::error::RoutingError;
use crate::request::{BodyDecoder, ContextSettings, SessionAccessor};
use crate::router::{Registry, RouterGroup};
use crate::runtime_config::RuntimeConfig;
use crate::validator::Validator;

/// Setup-time server: collects registrations and collaborators, then
/// [`Server::start`] seals them into an [`AppService`].
///
/// Every binder of [`RouterGroup`] is available directly on the server
/// and registers at the root of the default domain:
///
/// ```rust
/// use routeweave::router::HookPhase;
/// use routeweave::server::{InboundRequest, Server};
///
/// let mut server = Server::new();
/// server.bind_hook("/*", HookPhase::BeforeServe, |ctx| {
///     ctx.response_mut().set_header("x-served-by", "routeweave");
///     Ok(())
/// });
/// server.get("/ping", |ctx| {
///     ctx.response_mut().write("pong");
///     Ok(())
/// });
///
/// let service = server.start().unwrap();
/// let res = service.handle(InboundRequest::get("/ping"));
/// assert_eq!(res.body_string(), "pong");
/// assert_eq!(res.header("x-served-by"), Some("routeweave"));
/// ```
pub struct Server {
    config: ServerConfig,
    registry: Registry,
    root: RouterGroup,
    decoders: Vec<Arc<dyn BodyDecoder>>,
    validator: Option<Arc<dyn Validator>>,
    session: Option<Arc<dyn SessionAccessor>>,
    runtime: RuntimeConfig,
}

impl Default for Server {
    fn default() -> Self {
        Self::new()
    }
}

impl Server {
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(ServerConfig::default())
    }

    #[must_use]
    pub fn with_config(config: ServerConfig) -> Self {
        let registry = Registry::new();
        Self {
            config,
            root: RouterGroup::root(registry.clone()),
            registry,
            decoders: Vec::new(),
            validator: None,
            session: None,
            runtime: RuntimeConfig::from_env(),
        }
    }

    #[must_use]
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut ServerConfig {
        &mut self.config
    }

    /// Scope for routes served only to the given comma-separated host
    /// aliases.
    #[must_use]
    pub fn domain(&self, aliases: &str) -> RouterGroup {
        RouterGroup::for_domains(self.registry.clone(), aliases)
    }

    /// Add a body decoder; registered decoders are tried before the built-in
    /// JSON and XML ones.
    pub fn register_decoder(&mut self, decoder: impl BodyDecoder + 'static) -> &mut Self {
        self.decoders.push(Arc::new(decoder));
        self
    }

    /// Replace the rule-based validator used by binding.
    pub fn set_validator(&mut self, validator: impl Validator + 'static) -> &mut Self {
        self.validator = Some(Arc::new(validator));
        self
    }

    /// Replace the cookie/header session id lookup.
    pub fn set_session_accessor(&mut self, session: impl SessionAccessor + 'static) -> &mut Self {
        self.session = Some(Arc::new(session));
        self
    }

    /// Override the coroutine settings read from the environment.
    pub fn set_runtime(&mut self, runtime: RuntimeConfig) -> &mut Self {
        self.runtime = runtime;
        self
    }

    /// Seal every pending registration and build the request service.
    ///
    /// # Errors
    ///
    /// Malformed patterns, invalid domains, rejected duplicates, or a table
    /// with nothing registered at all.
    pub fn start(self) -> Result<AppService, RoutingError> {
        let table = self.registry.seal(self.config.route_overwrite)?;
        if table.is_empty() {
            warn!(name = %self.config.name, "Server started without any routes");
            return Err(RoutingError::EmptyTable);
        }
        if self.config.dump_router_map {
            table.dump();
        }

        let mut settings = ContextSettings::from_config(&self.config);
        if !self.decoders.is_empty() {
            let mut decoders = self.decoders;
            decoders.append(&mut settings.decoders);
            settings.decoders = decoders;
        }
        if let Some(validator) = self.validator {
            settings.validator = validator;
        }
        if let Some(session) = self.session {
            settings.session = session;
        }

        info!(
            name = %self.config.name,
            routes_count = table.len(),
            stack_size = self.runtime.stack_size,
            "Server started"
        );

        let dispatcher = Dispatcher::new(Arc::new(table), self.config.route_cache_capacity);
        Ok(AppService::new(dispatcher, settings, self.config, self.runtime))
    }
}

impl Deref for Server {
    type Target = RouterGroup;

    fn deref(&self) -> &RouterGroup {
        &self.root
    }
}

impl DerefMut for Server {
    fn deref_mut(&mut self) -> &mut RouterGroup {
        &mut self.root
    }
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("name", &self.config.name)
            .field("pending", &self.registry.pending())
            .finish()
    }
}
