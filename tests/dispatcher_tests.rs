//! Dispatch plan composition: best serving match, matching middleware and
//! hooks per phase, domain fallback and the plan cache.

use std::sync::Arc;

use http::Method;
use routeweave::config::ServerConfig;
use routeweave::dispatcher::Matched;
use routeweave::middleware::HandlerResult;
use routeweave::request::RequestContext;
use routeweave::router::HookPhase;
use routeweave::server::{AppService, Server};

fn noop(_ctx: &mut RequestContext) -> HandlerResult {
    Ok(())
}

fn pass(ctx: &mut RequestContext) -> HandlerResult {
    ctx.next()
}

fn param<'a>(matched: &'a Matched, name: &str) -> Option<&'a str> {
    matched
        .params
        .iter()
        .find(|(k, _)| k.as_ref() == name)
        .map(|(_, v)| v.as_str())
}

fn templates(list: &[Matched]) -> Vec<&str> {
    list.iter().map(|m| m.route.pattern.path()).collect()
}

fn service_with(config: ServerConfig) -> AppService {
    let mut server = Server::with_config(config);
    server.get("/user/:id", noop);
    server.get("/user/profile", noop);
    server.post("/user/:id", noop);
    server.bind_hook("/user/*", HookPhase::BeforeServe, noop);
    server.bind_hook("/*", HookPhase::BeforeServe, noop);
    server.bind_hook("/user/:id", HookPhase::AfterOutput, noop);
    server.bind_middleware("/user/*rest", pass);
    server.bind_middleware_default(pass);
    server.bind_middleware("POST:/user/*", pass);
    server.start().unwrap()
}

#[test]
fn test_plan_contains_best_match_and_every_matching_entry() {
    let service = service_with(ServerConfig::default());
    let plan = service.dispatcher().dispatch(&Method::GET, "", "/user/42");

    let serving = plan.serving.as_ref().unwrap();
    assert_eq!(serving.route.pattern.path(), "/user/:id");
    assert_eq!(param(serving, "id"), Some("42"));

    assert_eq!(templates(&plan.middleware), vec!["/user/*rest", "/*"]);
    assert_eq!(param(&plan.middleware[0], "rest"), Some("42"));

    assert_eq!(templates(plan.hooks(HookPhase::BeforeServe)), vec!["/user/*", "/*"]);
    assert!(plan.hooks(HookPhase::AfterServe).is_empty());
    assert_eq!(templates(plan.hooks(HookPhase::AfterOutput)), vec!["/user/:id"]);
}

#[test]
fn test_literal_route_preferred_over_capture() {
    let service = service_with(ServerConfig::default());
    let plan = service.dispatcher().dispatch(&Method::GET, "", "/user/profile");
    let serving = plan.serving.as_ref().unwrap();
    assert_eq!(serving.route.pattern.path(), "/user/profile");
    assert!(serving.params.is_empty());
}

#[test]
fn test_method_scoped_entries_follow_request_method() {
    let service = service_with(ServerConfig::default());
    let plan = service.dispatcher().dispatch(&Method::POST, "", "/user/profile");

    let serving = plan.serving.as_ref().unwrap();
    assert_eq!(serving.route.pattern.path(), "/user/:id");
    assert_eq!(
        templates(&plan.middleware),
        vec!["/user/*rest", "/*", "/user/*"]
    );

    let plan = service.dispatcher().dispatch(&Method::DELETE, "", "/user/profile");
    assert!(plan.serving.is_none());
    assert_eq!(plan.middleware.len(), 2);
}

#[test]
fn test_unmatched_path_still_collects_wildcards() {
    let service = service_with(ServerConfig::default());
    let plan = service.dispatcher().dispatch(&Method::GET, "", "/elsewhere");
    assert!(plan.serving.is_none());
    assert!(plan.descriptor().is_none());
    assert_eq!(templates(&plan.middleware), vec!["/*"]);
    assert_eq!(templates(plan.hooks(HookPhase::BeforeServe)), vec!["/*"]);
    assert!(!plan.is_empty());
}

#[test]
fn test_path_is_normalized_before_matching() {
    let service = service_with(ServerConfig::default());
    let plan = service.dispatcher().dispatch(&Method::GET, "", "//user///7/");
    let serving = plan.serving.as_ref().unwrap();
    assert_eq!(param(serving, "id"), Some("7"));
}

#[test]
fn test_domain_plan_merges_default_entries() {
    let mut server = Server::new();
    server.bind_hook("/*", HookPhase::BeforeServe, noop);
    server.get("/shared", noop);
    let mut domain = server.domain("api.example.com");
    domain.bind_hook("/*", HookPhase::BeforeServe, noop);
    domain.get("/only", noop);
    let service = server.start().unwrap();
    let dispatcher = service.dispatcher();

    let plan = dispatcher.dispatch(&Method::GET, "api.example.com", "/only");
    assert_eq!(plan.descriptor().unwrap().domain, "api.example.com");
    assert_eq!(plan.hooks(HookPhase::BeforeServe).len(), 2);

    let plan = dispatcher.dispatch(&Method::GET, "api.example.com", "/shared");
    assert_eq!(plan.serving.as_ref().unwrap().route.pattern.path(), "/shared");

    let plan = dispatcher.dispatch(&Method::GET, "www.example.com", "/only");
    assert!(plan.serving.is_none());
    assert_eq!(plan.hooks(HookPhase::BeforeServe).len(), 1);
}

#[test]
fn test_plan_cache_reuses_plans() {
    let service = service_with(ServerConfig::default());
    let dispatcher = service.dispatcher();
    let first = dispatcher.dispatch(&Method::GET, "", "/user/1");
    let second = dispatcher.dispatch(&Method::GET, "", "/user/1");
    assert!(Arc::ptr_eq(&first, &second));

    let other = dispatcher.dispatch(&Method::GET, "", "/user/2");
    assert!(!Arc::ptr_eq(&first, &other));
    assert_eq!(param(other.serving.as_ref().unwrap(), "id"), Some("2"));
}

#[test]
fn test_plan_cache_disabled() {
    let config = ServerConfig {
        route_cache_capacity: 0,
        ..ServerConfig::default()
    };
    let service = service_with(config);
    let dispatcher = service.dispatcher();
    let first = dispatcher.dispatch(&Method::GET, "", "/user/1");
    let second = dispatcher.dispatch(&Method::GET, "", "/user/1");
    assert!(!Arc::ptr_eq(&first, &second));
    assert_eq!(
        first.serving.as_ref().unwrap().route.seq,
        second.serving.as_ref().unwrap().route.seq
    );
}
