use std::panic::Location;
use std::sync::Arc;

use crate::middleware::{HandlerResult, Middleware};
use crate::pattern::split_pattern;
use crate::request::RequestContext;
use crate::typed::{self, TypedHandler};

use super::controller::{method_to_uri, Controller};
use super::entry::{HandlerEntry, HandlerFn, HookPhase};
use super::registry::{PendingRegistration, PendingTarget, Registry};

const REST_METHODS: [&str; 9] = [
    "get", "put", "post", "delete", "patch", "head", "connect", "options", "trace",
];

/// Registration scope carrying a path prefix, inherited middleware and an
/// optional set of domain aliases.
///
/// Groups are values: [`RouterGroup::group`] and `clone()` branch off a copy,
/// so adding middleware to a child never affects its parent. Serving routes
/// capture the middleware list as it is when they are registered.
///
/// A domain object (see `Server::domain`) is a group whose registrations are
/// bound to its host aliases instead of the default domain.
#[derive(Clone)]
pub struct RouterGroup {
    registry: Registry,
    prefix: String,
    middleware: Vec<Arc<dyn Middleware>>,
    domains: Vec<String>,
}

impl RouterGroup {
    pub(crate) fn root(registry: Registry) -> Self {
        Self {
            registry,
            prefix: String::new(),
            middleware: Vec::new(),
            domains: Vec::new(),
        }
    }

    pub(crate) fn for_domains(registry: Registry, aliases: &str) -> Self {
        let domains = aliases
            .split(',')
            .map(|a| a.trim().to_ascii_lowercase())
            .collect();
        Self {
            domains,
            ..Self::root(registry)
        }
    }

    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    #[must_use]
    pub fn domains(&self) -> &[String] {
        &self.domains
    }

    /// Branch a sub-group under `prefix`, configure it in `f`, and return it.
    pub fn group(&self, prefix: &str, f: impl FnOnce(&mut RouterGroup)) -> RouterGroup {
        let mut child = self.clone();
        child.prefix = join_paths(&self.prefix, prefix);
        f(&mut child);
        child
    }

    /// Append middleware inherited by serving routes registered from now on
    /// through this group and its future sub-groups.
    pub fn middleware(&mut self, middleware: impl Middleware) -> &mut Self {
        self.middleware.push(Arc::new(middleware));
        self
    }

    #[track_caller]
    pub fn bind_handler<F>(&mut self, pattern: &str, handler: F) -> &mut Self
    where
        F: Fn(&mut RequestContext) -> HandlerResult + Send + Sync + 'static,
    {
        let entry = HandlerEntry::Handler(Arc::new(handler));
        self.push_route(Location::caller(), self.full_pattern(pattern), entry);
        self
    }

    #[track_caller]
    pub fn all<F>(&mut self, pattern: &str, handler: F) -> &mut Self
    where
        F: Fn(&mut RequestContext) -> HandlerResult + Send + Sync + 'static,
    {
        self.bind_method(Location::caller(), &["ALL"], pattern, Arc::new(handler))
    }

    #[track_caller]
    pub fn get<F>(&mut self, pattern: &str, handler: F) -> &mut Self
    where
        F: Fn(&mut RequestContext) -> HandlerResult + Send + Sync + 'static,
    {
        self.bind_method(Location::caller(), &["GET"], pattern, Arc::new(handler))
    }

    #[track_caller]
    pub fn put<F>(&mut self, pattern: &str, handler: F) -> &mut Self
    where
        F: Fn(&mut RequestContext) -> HandlerResult + Send + Sync + 'static,
    {
        self.bind_method(Location::caller(), &["PUT"], pattern, Arc::new(handler))
    }

    #[track_caller]
    pub fn post<F>(&mut self, pattern: &str, handler: F) -> &mut Self
    where
        F: Fn(&mut RequestContext) -> HandlerResult + Send + Sync + 'static,
    {
        self.bind_method(Location::caller(), &["POST"], pattern, Arc::new(handler))
    }

    #[track_caller]
    pub fn delete<F>(&mut self, pattern: &str, handler: F) -> &mut Self
    where
        F: Fn(&mut RequestContext) -> HandlerResult + Send + Sync + 'static,
    {
        self.bind_method(Location::caller(), &["DELETE"], pattern, Arc::new(handler))
    }

    #[track_caller]
    pub fn patch<F>(&mut self, pattern: &str, handler: F) -> &mut Self
    where
        F: Fn(&mut RequestContext) -> HandlerResult + Send + Sync + 'static,
    {
        self.bind_method(Location::caller(), &["PATCH"], pattern, Arc::new(handler))
    }

    #[track_caller]
    pub fn head<F>(&mut self, pattern: &str, handler: F) -> &mut Self
    where
        F: Fn(&mut RequestContext) -> HandlerResult + Send + Sync + 'static,
    {
        self.bind_method(Location::caller(), &["HEAD"], pattern, Arc::new(handler))
    }

    #[track_caller]
    pub fn connect<F>(&mut self, pattern: &str, handler: F) -> &mut Self
    where
        F: Fn(&mut RequestContext) -> HandlerResult + Send + Sync + 'static,
    {
        self.bind_method(Location::caller(), &["CONNECT"], pattern, Arc::new(handler))
    }

    #[track_caller]
    pub fn options<F>(&mut self, pattern: &str, handler: F) -> &mut Self
    where
        F: Fn(&mut RequestContext) -> HandlerResult + Send + Sync + 'static,
    {
        self.bind_method(Location::caller(), &["OPTIONS"], pattern, Arc::new(handler))
    }

    #[track_caller]
    pub fn trace<F>(&mut self, pattern: &str, handler: F) -> &mut Self
    where
        F: Fn(&mut RequestContext) -> HandlerResult + Send + Sync + 'static,
    {
        self.bind_method(Location::caller(), &["TRACE"], pattern, Arc::new(handler))
    }

    /// Bind `GET`, `PUT`, `POST` and `DELETE` at once.
    #[track_caller]
    pub fn common<F>(&mut self, pattern: &str, handler: F) -> &mut Self
    where
        F: Fn(&mut RequestContext) -> HandlerResult + Send + Sync + 'static,
    {
        self.bind_method(
            Location::caller(),
            &["GET", "PUT", "POST", "DELETE"],
            pattern,
            Arc::new(handler),
        )
    }

    #[track_caller]
    pub fn bind_hook<F>(&mut self, pattern: &str, phase: HookPhase, hook: F) -> &mut Self
    where
        F: Fn(&mut RequestContext) -> HandlerResult + Send + Sync + 'static,
    {
        let entry = HandlerEntry::Hook(phase, Arc::new(hook));
        self.push_route(Location::caller(), self.full_pattern(pattern), entry);
        self
    }

    /// Bind middleware to every request whose path matches `pattern`, whether
    /// or not a serving route matches it.
    #[track_caller]
    pub fn bind_middleware(&mut self, pattern: &str, middleware: impl Middleware) -> &mut Self {
        let entry = HandlerEntry::Middleware(Arc::new(middleware));
        self.push_route(Location::caller(), self.full_pattern(pattern), entry);
        self
    }

    /// [`RouterGroup::bind_middleware`] on `/*` below this group's prefix.
    #[track_caller]
    pub fn bind_middleware_default(&mut self, middleware: impl Middleware) -> &mut Self {
        let entry = HandlerEntry::Middleware(Arc::new(middleware));
        self.push_route(Location::caller(), self.full_pattern("/*"), entry);
        self
    }

    /// Bind each controller method at `pattern/<method-uri>`; a method
    /// named `Index` is also bound at `pattern` itself.
    #[track_caller]
    pub fn bind_controller(&mut self, pattern: &str, controller: impl Controller) -> &mut Self {
        let source = Location::caller();
        let controller: Arc<dyn Controller> = Arc::new(controller);
        for name in controller.methods() {
            let uri = method_to_uri(name);
            let entry = HandlerEntry::ControllerMethod {
                controller: Arc::clone(&controller),
                method: Arc::from(name),
            };
            if uri == "index" {
                self.push_route(source, self.full_pattern(pattern), entry.clone());
            }
            let suffixed = append_path(pattern, &uri);
            self.push_route(source, self.full_pattern(&suffixed), entry);
        }
        self
    }

    #[track_caller]
    pub fn bind_controller_method(
        &mut self,
        pattern: &str,
        controller: impl Controller,
        method: &str,
    ) -> &mut Self {
        let entry = HandlerEntry::ControllerMethod {
            controller: Arc::new(controller),
            method: Arc::from(method),
        };
        self.push_route(Location::caller(), self.full_pattern(pattern), entry);
        self
    }

    /// Bind controller methods named after HTTP verbs (`get`, `post`, ...)
    /// to the matching HTTP method on `pattern`.
    #[track_caller]
    pub fn bind_controller_rest(&mut self, pattern: &str, controller: impl Controller) -> &mut Self {
        let source = Location::caller();
        let controller: Arc<dyn Controller> = Arc::new(controller);
        for name in controller.methods() {
            let verb = name.to_ascii_lowercase();
            if !REST_METHODS.contains(&verb.as_str()) {
                continue;
            }
            let entry = HandlerEntry::ControllerMethod {
                controller: Arc::clone(&controller),
                method: Arc::from(name),
            };
            let (_, path, domain) = split_pattern(pattern);
            let rest = with_domain(&format!("{}:{path}", verb.to_ascii_uppercase()), domain);
            self.push_route(source, self.full_pattern(&rest), entry);
        }
        self
    }

    /// Bind a typed handler: the request is bound and validated into
    /// `H::Request`, and `H::Response` is written as JSON.
    #[track_caller]
    pub fn bind_typed<H: TypedHandler>(&mut self, pattern: &str, handler: H) -> &mut Self {
        let entry = HandlerEntry::Handler(typed::into_handler(handler));
        self.push_route(Location::caller(), self.full_pattern(pattern), entry);
        self
    }

    /// Custom handler run when the final status of a request in this scope's
    /// domain equals `status`.
    #[track_caller]
    pub fn bind_status_handler<F>(&mut self, status: u16, handler: F) -> &mut Self
    where
        F: Fn(&mut RequestContext) -> HandlerResult + Send + Sync + 'static,
    {
        self.registry.push(PendingRegistration {
            domains: self.domains.clone(),
            source: Location::caller(),
            target: PendingTarget::StatusHandler {
                status,
                handler: Arc::new(handler),
            },
        });
        self
    }

    fn bind_method(
        &mut self,
        source: &'static Location<'static>,
        methods: &[&str],
        pattern: &str,
        handler: HandlerFn,
    ) -> &mut Self {
        let (_, path, domain) = split_pattern(pattern);
        for method in methods {
            let full = with_domain(&format!("{method}:{path}"), domain);
            let entry = HandlerEntry::Handler(Arc::clone(&handler));
            self.push_route(source, self.full_pattern(&full), entry);
        }
        self
    }

    fn push_route(&self, source: &'static Location<'static>, pattern: String, entry: HandlerEntry) {
        let middleware = if entry.is_serving() {
            self.middleware.clone()
        } else {
            Vec::new()
        };
        self.registry.push(PendingRegistration {
            domains: self.domains.clone(),
            source,
            target: PendingTarget::Route {
                pattern,
                entry,
                middleware,
            },
        });
    }

    /// Insert this group's prefix into the path part of `pattern`.
    fn full_pattern(&self, pattern: &str) -> String {
        let (method, path, domain) = split_pattern(pattern);
        let mut out = String::with_capacity(pattern.len() + self.prefix.len() + 1);
        if let Some(method) = method {
            out.push_str(method);
            out.push(':');
        }
        out.push_str(&join_paths(&self.prefix, path));
        with_domain(&out, domain)
    }
}

fn with_domain(pattern: &str, domain: Option<&str>) -> String {
    match domain {
        Some(domain) => format!("{pattern}@{domain}"),
        None => pattern.to_string(),
    }
}

/// Append a path segment to the path part of a full pattern.
fn append_path(pattern: &str, segment: &str) -> String {
    let (method, path, domain) = split_pattern(pattern);
    let mut out = String::new();
    if let Some(method) = method {
        out.push_str(method);
        out.push(':');
    }
    out.push_str(&join_paths(path, segment));
    with_domain(&out, domain)
}

fn join_paths(prefix: &str, path: &str) -> String {
    let prefix = prefix.trim_end_matches('/');
    if prefix.is_empty() {
        return match path.starts_with('/') || path.is_empty() {
            true => path.to_string(),
            false => format!("/{path}"),
        };
    }
    if path.is_empty() {
        return prefix.to_string();
    }
    let mut joined = format!("{prefix}/{path}");
    while joined.contains("//") {
        joined = joined.replace("//", "/");
    }
    joined
}
