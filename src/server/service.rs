use std::io;
use std::sync::Arc;

use may::coroutine::JoinHandle;
use tracing::{debug, info};

use super::request::InboundRequest;
use super::response::Response;
use crate::config::ServerConfig;
use crate::dispatcher::Dispatcher;
use crate::middleware::execute;
use crate::request::{ContextSettings, RequestContext};
use crate::router::RouteItem;
use crate::runtime_config::RuntimeConfig;

struct ServiceInner {
    dispatcher: Dispatcher,
    settings: Arc<ContextSettings>,
    config: ServerConfig,
    runtime: RuntimeConfig,
}

/// A started server. Cheap to clone; clones share the sealed route table.
#[derive(Clone)]
pub struct AppService {
    inner: Arc<ServiceInner>,
}

impl AppService {
    pub(crate) fn new(
        dispatcher: Dispatcher,
        settings: ContextSettings,
        config: ServerConfig,
        runtime: RuntimeConfig,
    ) -> Self {
        Self {
            inner: Arc::new(ServiceInner {
                dispatcher,
                settings: Arc::new(settings),
                config,
                runtime,
            }),
        }
    }

    /// Serve one request on the calling task and return the finalized
    /// response.
    pub fn handle(&self, req: InboundRequest) -> Response {
        let inner = &self.inner;
        let mut ctx = RequestContext::new(req, Arc::clone(&inner.settings));
        let plan = inner.dispatcher.dispatch(ctx.method(), ctx.host(), ctx.path());

        execute(
            &mut ctx,
            &plan,
            inner.dispatcher.table(),
            inner.config.error_log_enabled,
        );

        if inner.config.access_log_enabled {
            info!(
                request_id = %ctx.request_id(),
                method = %ctx.method(),
                host = %ctx.host(),
                path = %ctx.path(),
                route = ctx.route().map_or("-", |r| r.template.as_str()),
                status = ctx.response().status(),
                latency_ms = ctx.elapsed().as_millis() as u64,
                "Request completed"
            );
        }
        ctx.into_response()
    }

    /// Serve one request on its own coroutine.
    ///
    /// # Errors
    ///
    /// The runtime could not allocate the coroutine.
    pub fn spawn(&self, req: InboundRequest) -> io::Result<JoinHandle<Response>> {
        let service = self.clone();
        let stack_size = self.inner.runtime.stack_size;
        debug!(stack_size, "Spawning request coroutine");
        // SAFETY: `Builder::spawn` is unsafe because the closure must not hold
        // thread-local references across yields. The closure owns its
        // service handle and request and touches no thread-locals.
        #[allow(unsafe_code)]
        unsafe {
            may::coroutine::Builder::new()
                .stack_size(stack_size)
                .spawn(move || service.handle(req))
        }
    }

    /// Rows of the sealed route table.
    #[must_use]
    pub fn routes(&self) -> Vec<RouteItem> {
        self.inner.dispatcher.table().routes()
    }

    #[must_use]
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.inner.dispatcher
    }

    #[must_use]
    pub fn config(&self) -> &ServerConfig {
        &self.inner.config
    }

    #[must_use]
    pub fn settings(&self) -> &ContextSettings {
        &self.inner.settings
    }
}

impl std::fmt::Debug for AppService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppService")
            .field("name", &self.inner.config.name)
            .field("dispatcher", &self.inner.dispatcher)
            .finish()
    }
}
