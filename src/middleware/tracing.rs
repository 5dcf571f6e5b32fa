use std::time::Instant;

use tracing::{field, info, info_span};

use super::core::{HandlerResult, Middleware};
use crate::request::RequestContext;

/// Wraps the rest of the serving chain in a `request` span and logs the
/// outcome with its latency.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingMiddleware;

impl Middleware for TracingMiddleware {
    fn handle(&self, ctx: &mut RequestContext) -> HandlerResult {
        let span = info_span!(
            "request",
            request_id = %ctx.request_id(),
            method = %ctx.method(),
            path = %ctx.path(),
            route = field::Empty,
            status = field::Empty,
            latency_ms = field::Empty,
        );
        let _guard = span.enter();
        if let Some(route) = ctx.route() {
            span.record("route", route.template.as_str());
        }

        let start = Instant::now();
        let result = ctx.next();
        let latency_ms = start.elapsed().as_millis() as u64;
        let status = ctx.response().status();

        span.record("status", status);
        span.record("latency_ms", latency_ms);
        info!(status, latency_ms, failed = result.is_err(), "Chain completed");
        result
    }
}
