use std::sync::Arc;
use std::time::{Duration, Instant};

use http::Method;
use tracing::debug;

use crate::config::{ServerConfig, StatusMapping};
use crate::error::RequestError;
use crate::ids::{RequestId, REQUEST_ID_HEADER};
use crate::middleware::{ExitKind, HandlerResult, Interrupt};
use crate::pattern::{normalize_path, ParamVec};
use crate::router::{HandlerEntry, RouteDescriptor};
use crate::server::{find_header, normalize_host, parse_cookies, split_uri, Body, CancelToken, HeaderVec, InboundRequest, Response};
use crate::validator::{RuleValidator, Validator};

use super::body::{default_decoders, BodyDecoder};
use super::params::ParamState;
use super::session::{CookieSessionAccessor, SessionAccessor};

/// Server-wide settings every request context reads.
#[derive(Clone)]
pub struct ContextSettings {
    pub max_body_size: u64,
    /// Limit for multipart payloads.
    pub form_parsing_memory: u64,
    pub decoders: Vec<Arc<dyn BodyDecoder>>,
    pub validator: Arc<dyn Validator>,
    pub session: Arc<dyn SessionAccessor>,
    /// Default validation bail mode.
    pub bail: bool,
    pub status: StatusMapping,
}

impl ContextSettings {
    #[must_use]
    pub fn from_config(config: &ServerConfig) -> Self {
        Self {
            max_body_size: config.client_max_body_size,
            form_parsing_memory: config.form_parsing_memory,
            decoders: default_decoders(),
            validator: Arc::new(RuleValidator),
            session: Arc::new(CookieSessionAccessor::new(&config.session_id_name)),
            bail: config.validation_bail,
            status: config.status.clone(),
        }
    }
}

impl Default for ContextSettings {
    fn default() -> Self {
        Self::from_config(&ServerConfig::default())
    }
}

impl std::fmt::Debug for ContextSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextSettings")
            .field("max_body_size", &self.max_body_size)
            .field("form_parsing_memory", &self.form_parsing_memory)
            .field("decoders", &self.decoders.iter().map(|d| d.name()).collect::<Vec<_>>())
            .field("bail", &self.bail)
            .field("status", &self.status)
            .finish()
    }
}

/// One entry of the serving chain with the captures its pattern produced.
#[derive(Debug, Clone)]
pub(crate) struct ChainStep {
    pub entry: HandlerEntry,
    pub params: ParamVec,
    /// The serving handler, as opposed to wrapping middleware.
    pub serving: bool,
}

/// Latched exit signals.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct ExitFlags {
    pub current: bool,
    pub all: bool,
    pub hooks: bool,
}

impl ExitFlags {
    pub(crate) fn latch(&mut self, kind: ExitKind) {
        match kind {
            ExitKind::Current => self.current = true,
            ExitKind::All => {
                self.current = true;
                self.all = true;
            }
            ExitKind::Hooks => self.hooks = true,
        }
    }
}

/// Per-request state handed to every handler, hook and middleware.
///
/// Owned by the task serving the request; nothing in it is shared.
pub struct RequestContext {
    method: Method,
    uri: String,
    path: String,
    raw_query: String,
    host: String,
    headers: HeaderVec,
    cookies: HeaderVec,
    pub(crate) body_source: Option<Body>,
    pub(crate) cancel: Option<CancelToken>,
    pub(crate) deadline: Option<Instant>,
    request_id: RequestId,
    started: Instant,
    pub(crate) settings: Arc<ContextSettings>,
    pub(crate) params: ParamState,
    pub(crate) router_params: ParamVec,
    route: Option<RouteDescriptor>,
    response: Response,
    error: Option<RequestError>,
    pub(crate) chain: Vec<ChainStep>,
    pub(crate) chain_index: usize,
    pub(crate) in_serving: bool,
    pub(crate) served: bool,
    pub(crate) exit: ExitFlags,
}

impl RequestContext {
    /// Build the context of one inbound request.
    ///
    /// The path is normalized, the host lowercased without its port, and a
    /// valid `X-Request-Id` header is reused as the request id.
    #[must_use]
    pub fn new(req: InboundRequest, settings: Arc<ContextSettings>) -> Self {
        let (path, raw_query) = split_uri(&req.uri);
        let path = normalize_path(path);
        let raw_query = raw_query.to_string();
        let host = match req.host.as_str() {
            "" => find_header(&req.headers, "host").map(normalize_host).unwrap_or_default(),
            h => normalize_host(h),
        };
        let request_id = RequestId::from_header_or_new(find_header(&req.headers, REQUEST_ID_HEADER));
        let cookies = parse_cookies(&req.headers);
        let mut response = Response::new();
        response.set_request_id(request_id);

        Self {
            method: req.method,
            uri: req.uri,
            path,
            raw_query,
            host,
            headers: req.headers,
            cookies,
            body_source: Some(req.body),
            cancel: req.cancel,
            deadline: req.deadline,
            request_id,
            started: Instant::now(),
            settings,
            params: ParamState::default(),
            router_params: ParamVec::new(),
            route: None,
            response,
            error: None,
            chain: Vec::new(),
            chain_index: 0,
            in_serving: false,
            served: false,
            exit: ExitFlags::default(),
        }
    }

    #[must_use]
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Request target as received, query string included.
    #[must_use]
    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// Normalized request path.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    #[must_use]
    pub fn raw_query(&self) -> &str {
        &self.raw_query
    }

    /// Lowercase host without port, empty when the request carried none.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    #[must_use]
    pub fn headers(&self) -> &HeaderVec {
        &self.headers
    }

    #[must_use]
    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies
            .iter()
            .rfind(|(k, _)| k.as_ref() == name)
            .map(|(_, v)| v.as_str())
    }

    /// Lowercase media type of the request body, without parameters.
    #[must_use]
    pub fn content_type(&self) -> String {
        self.header("content-type")
            .map(super::body::media_type)
            .unwrap_or_default()
    }

    #[must_use]
    pub fn request_id(&self) -> RequestId {
        self.request_id
    }

    /// Session id read through the configured [`SessionAccessor`].
    #[must_use]
    pub fn session_id(&self) -> Option<String> {
        self.settings.session.session_id(self)
    }

    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Whether the transport canceled the request or its deadline passed.
    #[must_use]
    pub fn is_canceled(&self) -> bool {
        self.cancel.as_ref().is_some_and(CancelToken::is_canceled)
            || self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Descriptor of the serving route, `None` when nothing matched.
    #[must_use]
    pub fn route(&self) -> Option<&RouteDescriptor> {
        self.route.as_ref()
    }

    pub(crate) fn set_route(&mut self, route: Option<RouteDescriptor>) {
        self.response.set_route(route.clone());
        self.route = route;
    }

    #[must_use]
    pub fn response(&self) -> &Response {
        &self.response
    }

    pub fn response_mut(&mut self) -> &mut Response {
        &mut self.response
    }

    pub(crate) fn into_response(self) -> Response {
        self.response
    }

    /// Error recorded for this request, if any.
    #[must_use]
    pub fn error(&self) -> Option<&RequestError> {
        self.error.as_ref()
    }

    /// Record an error. The first recorded error is kept.
    pub fn set_error(&mut self, err: RequestError) {
        if self.error.is_none() {
            debug!(request_id = %self.request_id, kind = err.kind(), error = %err, "Request error recorded");
            self.error = Some(err);
        }
    }

    /// Clear the error slot, e.g. from an error-recovering middleware.
    pub fn take_error(&mut self) -> Option<RequestError> {
        self.error.take()
    }

    /// Run the next entry of the serving chain.
    ///
    /// Outside the serving chain (in hooks) this does nothing. Once an exit
    /// signal has been raised the rest of the chain no longer runs.
    pub fn next(&mut self) -> HandlerResult {
        if !self.in_serving {
            return Ok(());
        }
        if self.exit.current || self.exit.all {
            return Err(Interrupt::Exit(if self.exit.all {
                ExitKind::All
            } else {
                ExitKind::Current
            }));
        }
        let Some(step) = self.chain.get(self.chain_index).cloned() else {
            return Ok(());
        };
        self.chain_index += 1;
        if step.serving {
            self.served = true;
        }
        self.router_params = step.params;
        match step.entry.invoke(self) {
            // Hook skipping never unwinds the enclosing middleware.
            Err(Interrupt::Exit(ExitKind::Hooks)) => {
                self.exit.latch(ExitKind::Hooks);
                Ok(())
            }
            Err(Interrupt::Exit(kind)) => {
                self.exit.latch(kind);
                Err(Interrupt::Exit(kind))
            }
            other => other,
        }
    }

    /// Stop the current phase. `return ctx.exit();`
    pub fn exit(&mut self) -> HandlerResult {
        self.exit.latch(ExitKind::Current);
        Err(Interrupt::Exit(ExitKind::Current))
    }

    /// Stop the current phase and every later one; the response is still
    /// flushed.
    pub fn exit_all(&mut self) -> HandlerResult {
        self.exit.latch(ExitKind::All);
        Err(Interrupt::Exit(ExitKind::All))
    }

    /// Skip every remaining hook. The caller keeps running, as does the
    /// serving chain around it.
    pub fn exit_hooks(&mut self) -> HandlerResult {
        self.exit.latch(ExitKind::Hooks);
        Ok(())
    }

    #[must_use]
    pub fn is_exited(&self) -> bool {
        self.exit.current || self.exit.all
    }

    #[must_use]
    pub fn is_exited_all(&self) -> bool {
        self.exit.all
    }

    #[must_use]
    pub fn is_exited_hooks(&self) -> bool {
        self.exit.hooks
    }
}

impl std::fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestContext")
            .field("request_id", &self.request_id)
            .field("method", &self.method)
            .field("host", &self.host)
            .field("path", &self.path)
            .field("route", &self.route)
            .field("chain_index", &self.chain_index)
            .field("exit", &self.exit)
            .finish_non_exhaustive()
    }
}
