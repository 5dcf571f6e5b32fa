//! Dispatcher core module - hot path for request dispatch.
//!
//! The clippy lints below keep needless allocations out of the lookup path.

#![deny(clippy::inefficient_to_string)]
#![deny(clippy::format_push_string)]
#![deny(clippy::unnecessary_to_owned)]

use std::num::NonZeroUsize;
use std::sync::Arc;

use http::Method;
use lru::LruCache;
use parking_lot::Mutex;
use tracing::debug;

use crate::pattern::{normalize_path, ParamVec};
use crate::router::{DomainTable, HookPhase, Route, RouteDescriptor, RouteTable};

/// A route whose pattern matched the request path, with its captures.
#[derive(Debug, Clone)]
pub struct Matched {
    pub route: Arc<Route>,
    pub params: ParamVec,
}

/// Everything that runs for one (method, host, path).
#[derive(Debug, Clone, Default)]
pub struct DispatchPlan {
    /// Best serving match, if any.
    pub serving: Option<Matched>,
    /// Pattern-bound middleware, registration order.
    pub middleware: Vec<Matched>,
    /// Hook entries per phase, registration order.
    pub hooks: [Vec<Matched>; 4],
}

impl DispatchPlan {
    #[must_use]
    pub fn hooks(&self, phase: HookPhase) -> &[Matched] {
        &self.hooks[phase.index()]
    }

    /// Descriptor of the serving route.
    #[must_use]
    pub fn descriptor(&self) -> Option<RouteDescriptor> {
        self.serving.as_ref().map(|m| m.route.descriptor())
    }

    /// Nothing at all matched.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.serving.is_none() && self.middleware.is_empty() && self.hooks.iter().all(Vec::is_empty)
    }
}

type CacheKey = (Method, String, String);

/// Resolves requests against a sealed [`RouteTable`].
///
/// Read-only after construction apart from the bounded plan cache, so one
/// dispatcher is shared by every request.
pub struct Dispatcher {
    table: Arc<RouteTable>,
    cache: Option<Mutex<LruCache<CacheKey, Arc<DispatchPlan>>>>,
}

impl Dispatcher {
    /// `cache_capacity` of 0 disables plan caching.
    #[must_use]
    pub fn new(table: Arc<RouteTable>, cache_capacity: usize) -> Self {
        let cache = NonZeroUsize::new(cache_capacity).map(|cap| Mutex::new(LruCache::new(cap)));
        Self { table, cache }
    }

    #[must_use]
    pub fn table(&self) -> &RouteTable {
        &self.table
    }

    /// Resolve the plan for a request. `host` must be lowercase without a
    /// port; an unknown host falls back to the default domain.
    #[must_use]
    pub fn dispatch(&self, method: &Method, host: &str, path: &str) -> Arc<DispatchPlan> {
        let path = normalize_path(path);
        let Some(cache) = &self.cache else {
            return Arc::new(self.resolve(method, host, &path));
        };

        let key = (method.clone(), host.to_string(), path);
        if let Some(plan) = cache.lock().get(&key) {
            return Arc::clone(plan);
        }
        let plan = Arc::new(self.resolve(method, host, &key.2));
        cache.lock().put(key, Arc::clone(&plan));
        plan
    }

    fn resolve(&self, method: &Method, host: &str, path: &str) -> DispatchPlan {
        let scoped = self.table.domain(host);
        let fallback = self.table.default_domain();

        let serving = scoped
            .and_then(|d| best_match(d, method, path))
            .or_else(|| fallback.and_then(|d| best_match(d, method, path)));

        let mut middleware = Vec::new();
        let mut hooks: [Vec<Matched>; 4] = Default::default();
        for domain in fallback.into_iter().chain(scoped) {
            collect(domain.middleware(), method, path, &mut middleware);
            for route in domain.hooks() {
                if let Some(phase) = route.entry.hook_phase() {
                    collect(std::slice::from_ref(route), method, path, &mut hooks[phase.index()]);
                }
            }
        }
        middleware.sort_by_key(|m| m.route.seq);
        for list in &mut hooks {
            list.sort_by_key(|m| m.route.seq);
        }

        debug!(
            method = %method,
            host = %host,
            path = %path,
            route = serving.as_ref().map_or("-", |m| m.route.pattern.path()),
            middleware = middleware.len(),
            hooks = hooks.iter().map(Vec::len).sum::<usize>(),
            "Dispatch resolved"
        );

        DispatchPlan {
            serving,
            middleware,
            hooks,
        }
    }
}

/// Candidates are pre-sorted best first, so the first match wins.
fn best_match(domain: &DomainTable, method: &Method, path: &str) -> Option<Matched> {
    domain.candidates(method).iter().find_map(|route| {
        route.pattern.match_path(path).map(|params| Matched {
            route: Arc::clone(route),
            params,
        })
    })
}

fn collect(routes: &[Arc<Route>], method: &Method, path: &str, out: &mut Vec<Matched>) {
    for route in routes {
        if !route.pattern.method().matches(method) {
            continue;
        }
        if let Some(params) = route.pattern.match_path(path) {
            out.push(Matched {
                route: Arc::clone(route),
                params,
            });
        }
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("routes", &self.table.len())
            .field("cache", &self.cache.as_ref().map(|c| c.lock().cap()))
            .finish()
    }
}
