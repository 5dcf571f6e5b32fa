//! Route table core - the sealed, read-only table the dispatcher searches.

use std::collections::HashMap;
use std::panic::Location;
use std::sync::Arc;

use http::Method;
use serde::Serialize;
use tracing::{info, warn};

use crate::error::RoutingError;
use crate::middleware::Middleware;
use crate::pattern::{RouteMethod, RoutePattern, DEFAULT_DOMAIN};

use super::entry::{HandlerEntry, HandlerFn};

/// A compiled registration: pattern, entry, inherited middleware and the
/// place in the source where it was registered.
pub struct Route {
    pub pattern: RoutePattern,
    pub entry: HandlerEntry,
    /// Group middleware inherited at registration time, outermost first.
    pub middleware: Vec<Arc<dyn Middleware>>,
    pub source: &'static Location<'static>,
    /// Monotonic registration sequence; lower registered earlier.
    pub seq: u64,
    /// Domain key this copy of the route lives under.
    pub domain: Arc<str>,
}

impl Route {
    #[must_use]
    pub fn descriptor(&self) -> RouteDescriptor {
        RouteDescriptor {
            template: self.pattern.path().to_string(),
            method: self.pattern.method().to_string(),
            domain: self.domain.to_string(),
            source: location(self.source),
        }
    }

    /// `Less` means `self` is preferred over `other`.
    fn priority_cmp(&self, other: &Route) -> std::cmp::Ordering {
        other
            .pattern
            .specificity()
            .cmp(&self.pattern.specificity())
            .then_with(|| self.seq.cmp(&other.seq))
    }
}

impl std::fmt::Debug for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Route")
            .field("pattern", &self.pattern.to_string())
            .field("entry", &self.entry)
            .field("domain", &self.domain)
            .field("seq", &self.seq)
            .finish()
    }
}

/// Descriptor of the route that served a request, for observability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RouteDescriptor {
    pub template: String,
    pub method: String,
    pub domain: String,
    pub source: String,
}

/// One row of [`RouteTable::routes`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RouteItem {
    pub domain: String,
    pub method: String,
    pub route: String,
    pub kind: &'static str,
    pub hook: Option<&'static str>,
    pub middleware: usize,
    pub source: String,
}

pub(crate) fn location(loc: &Location<'_>) -> String {
    format!("{}:{}", loc.file(), loc.line())
}

/// Routes of one domain.
#[derive(Default)]
pub struct DomainTable {
    /// Serving routes per concrete method, `ALL` routes merged in, best first.
    by_method: HashMap<Method, Vec<Arc<Route>>>,
    /// `ALL` routes only, used for non-standard methods.
    any: Vec<Arc<Route>>,
    /// Hooks in registration order.
    hooks: Vec<Arc<Route>>,
    /// Pattern-bound middleware in registration order.
    middleware: Vec<Arc<Route>>,
    /// Serving routes in registration order, for dumps.
    serving: Vec<Arc<Route>>,
    index: HashMap<(RouteMethod, String), usize>,
}

impl DomainTable {
    /// Priority-ordered serving candidates for `method`.
    #[must_use]
    pub fn candidates(&self, method: &Method) -> &[Arc<Route>] {
        self.by_method.get(method).unwrap_or(&self.any)
    }

    #[must_use]
    pub fn hooks(&self) -> &[Arc<Route>] {
        &self.hooks
    }

    #[must_use]
    pub fn middleware(&self) -> &[Arc<Route>] {
        &self.middleware
    }

    fn insert(&mut self, route: Route, overwrite: bool) -> Result<(), RoutingError> {
        if !route.entry.is_serving() {
            let route = Arc::new(route);
            if route.entry.hook_phase().is_some() {
                self.hooks.push(route);
            } else {
                self.middleware.push(route);
            }
            return Ok(());
        }

        let key = (
            route.pattern.method().clone(),
            route.pattern.path().to_string(),
        );
        if let Some(&idx) = self.index.get(&key) {
            let existing = &self.serving[idx];
            if !overwrite {
                return Err(RoutingError::DuplicateRoute {
                    route: format!("{}:{}@{}", key.0, key.1, route.domain),
                    first: location(existing.source),
                    second: location(route.source),
                });
            }
            warn!(
                domain = %route.domain,
                method = %key.0,
                route = %key.1,
                previous = %location(existing.source),
                replacement = %location(route.source),
                "Duplicate route overwritten"
            );
            self.serving[idx] = Arc::new(route);
            return Ok(());
        }
        self.index.insert(key, self.serving.len());
        self.serving.push(Arc::new(route));
        Ok(())
    }

    /// Build the per-method candidate lists once every route is inserted.
    fn finish(&mut self) {
        let mut any: Vec<Arc<Route>> = self
            .serving
            .iter()
            .filter(|r| r.pattern.method().is_all())
            .cloned()
            .collect();
        any.sort_by(|a, b| a.priority_cmp(b));

        let mut by_method = HashMap::new();
        for method in RouteMethod::standard() {
            let mut list: Vec<Arc<Route>> = self
                .serving
                .iter()
                .filter(|r| r.pattern.method().matches(method))
                .cloned()
                .collect();
            list.sort_by(|a, b| a.priority_cmp(b));
            by_method.insert(method.clone(), list);
        }
        self.by_method = by_method;
        self.any = any;
    }
}

/// The sealed route table: per-domain serving routes, hooks, middleware and
/// status handlers. Read-only once built.
#[derive(Default)]
pub struct RouteTable {
    domains: HashMap<Arc<str>, DomainTable>,
    status_handlers: HashMap<(Arc<str>, u16), HandlerFn>,
}

impl std::fmt::Debug for RouteTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteTable")
            .field("domains", &self.domains.keys().collect::<Vec<_>>())
            .field("status_handlers", &self.status_handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl RouteTable {
    pub(crate) fn insert(&mut self, route: Route, overwrite: bool) -> Result<(), RoutingError> {
        self.domains
            .entry(Arc::clone(&route.domain))
            .or_default()
            .insert(route, overwrite)
    }

    pub(crate) fn insert_status_handler(&mut self, domain: Arc<str>, status: u16, handler: HandlerFn) {
        self.status_handlers.insert((domain, status), handler);
    }

    pub(crate) fn finish(&mut self) {
        for table in self.domains.values_mut() {
            table.finish();
        }
    }

    /// Table of the default domain, if anything was registered there.
    #[must_use]
    pub fn default_domain(&self) -> Option<&DomainTable> {
        self.domains.get(DEFAULT_DOMAIN)
    }

    /// Table of a specific host, port already stripped and lowercased.
    #[must_use]
    pub fn domain(&self, host: &str) -> Option<&DomainTable> {
        if host == DEFAULT_DOMAIN {
            return None;
        }
        self.domains.get(host)
    }

    /// Custom handler for a final status, preferring the request's domain.
    #[must_use]
    pub fn status_handler(&self, host: &str, status: u16) -> Option<&HandlerFn> {
        self.status_handlers
            .get(&(Arc::from(host), status))
            .or_else(|| self.status_handlers.get(&(Arc::from(DEFAULT_DOMAIN), status)))
    }

    /// Number of serving routes over every domain.
    #[must_use]
    pub fn len(&self) -> usize {
        self.domains.values().map(|d| d.serving.len()).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.domains.values().all(|d| {
            d.serving.is_empty() && d.hooks.is_empty() && d.middleware.is_empty()
        })
    }

    /// Every entry of the table, sorted by domain, route and method.
    #[must_use]
    pub fn routes(&self) -> Vec<RouteItem> {
        let mut items: Vec<RouteItem> = self
            .domains
            .values()
            .flat_map(|d| d.serving.iter().chain(&d.hooks).chain(&d.middleware))
            .map(|route| RouteItem {
                domain: route.domain.to_string(),
                method: route.pattern.method().to_string(),
                route: route.pattern.path().to_string(),
                kind: route.entry.kind(),
                hook: route.entry.hook_phase().map(|p| p.as_str()),
                middleware: route.middleware.len(),
                source: location(route.source),
            })
            .collect();
        items.sort_by(|a, b| {
            (&a.domain, &a.route, &a.method, a.kind).cmp(&(&b.domain, &b.route, &b.method, b.kind))
        });
        items
    }

    /// Log every entry, one structured line each.
    pub fn dump(&self) {
        let items = self.routes();
        info!(routes_count = items.len(), "Route table");
        for item in &items {
            info!(
                domain = %item.domain,
                method = %item.method,
                route = %item.route,
                kind = item.kind,
                hook = item.hook.unwrap_or("-"),
                middleware = item.middleware,
                source = %item.source,
                "Route"
            );
        }
    }
}
