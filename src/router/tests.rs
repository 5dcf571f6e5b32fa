use std::str::FromStr;

use http::Method;

use super::*;
use crate::error::RoutingError;
use crate::middleware::HandlerResult;
use crate::request::RequestContext;

fn noop(_ctx: &mut RequestContext) -> HandlerResult {
    Ok(())
}

fn root() -> (Registry, RouterGroup) {
    let registry = Registry::new();
    let group = RouterGroup::root(registry.clone());
    (registry, group)
}

fn templates(table: &DomainTable, method: Method) -> Vec<String> {
    table
        .candidates(&method)
        .iter()
        .map(|r| r.pattern.to_string())
        .collect()
}

#[test]
fn test_candidates_are_priority_ordered() {
    let (registry, mut g) = root();
    g.bind_handler("/user/*rest", noop)
        .bind_handler("/user/:id", noop)
        .bind_handler("GET:/user/list", noop)
        .bind_handler("/user/list", noop);
    let table = registry.seal(false).unwrap();
    let default = table.default_domain().unwrap();
    assert_eq!(
        templates(default, Method::GET),
        vec!["GET:/user/list", "ALL:/user/list", "ALL:/user/:id", "ALL:/user/*rest"]
    );
    assert_eq!(
        templates(default, Method::POST),
        vec!["ALL:/user/list", "ALL:/user/:id", "ALL:/user/*rest"]
    );
}

#[test]
fn test_equal_specificity_keeps_registration_order() {
    let (registry, mut g) = root();
    g.bind_handler("/a/:x", noop).bind_handler("/:y/b", noop);
    let table = registry.seal(false).unwrap();
    let default = table.default_domain().unwrap();
    let list = templates(default, Method::GET);
    assert_eq!(list, vec!["ALL:/a/:x", "ALL:/:y/b"]);
}

#[test]
fn test_duplicate_route_is_rejected() {
    let (registry, mut g) = root();
    g.get("/dup", noop);
    g.get("/dup/", noop);
    let err = registry.seal(false).unwrap_err();
    match err {
        RoutingError::DuplicateRoute { route, first, second } => {
            assert_eq!(route, "GET:/dup@default");
            assert!(first.contains("tests.rs"));
            assert_ne!(first, second);
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[test]
fn test_duplicate_route_overwrite() {
    let (registry, mut g) = root();
    g.get("/dup", noop);
    g.get("/dup", noop);
    let table = registry.seal(true).unwrap();
    assert_eq!(table.len(), 1);
}

#[test]
fn test_method_and_all_are_not_duplicates() {
    let (registry, mut g) = root();
    g.get("/x", noop).all("/x", noop);
    assert_eq!(registry.seal(false).unwrap().len(), 2);
}

#[test]
fn test_malformed_pattern_aborts_seal() {
    let (registry, mut g) = root();
    g.get("/ok", noop).bind_handler("/bad/{id", noop);
    assert!(matches!(
        registry.seal(false).unwrap_err(),
        RoutingError::MalformedCapture { .. }
    ));
}

#[test]
fn test_group_prefix_and_copy_on_branch() {
    let (registry, mut g) = root();
    let api = g.group("/api", |api| {
        api.middleware(|ctx: &mut RequestContext| ctx.next());
        api.get("/one", noop);
        let _v1 = api.group("/v1", |v1| {
            v1.middleware(|ctx: &mut RequestContext| ctx.next());
            v1.get("/two", noop);
        });
        api.get("/three", noop);
    });
    assert_eq!(api.prefix(), "/api");
    g.get("/four", noop);

    let table = registry.seal(false).unwrap();
    let default = table.default_domain().unwrap();
    let counts: Vec<(String, usize)> = default
        .candidates(&Method::GET)
        .iter()
        .map(|r| (r.pattern.path().to_string(), r.middleware.len()))
        .collect();
    assert!(counts.contains(&("/api/one".to_string(), 1)));
    assert!(counts.contains(&("/api/v1/two".to_string(), 2)));
    assert!(counts.contains(&("/api/three".to_string(), 1)));
    assert!(counts.contains(&("/four".to_string(), 0)));
}

#[test]
fn test_domain_routes_are_scoped() {
    let registry = Registry::new();
    let mut d = RouterGroup::for_domains(registry.clone(), "A.com, b.com");
    d.get("/x", noop);
    let mut g = RouterGroup::root(registry.clone());
    g.get("/y@c.com", noop);
    let table = registry.seal(false).unwrap();
    assert!(table.default_domain().is_none());
    assert_eq!(table.domain("a.com").unwrap().candidates(&Method::GET).len(), 1);
    assert_eq!(table.domain("b.com").unwrap().candidates(&Method::GET).len(), 1);
    assert_eq!(table.domain("c.com").unwrap().candidates(&Method::GET).len(), 1);
}

#[test]
fn test_hooks_and_middleware_accumulate() {
    let (registry, mut g) = root();
    g.bind_hook("/*", HookPhase::BeforeServe, noop)
        .bind_hook("/*", HookPhase::BeforeServe, noop)
        .bind_middleware_default(|ctx: &mut RequestContext| ctx.next())
        .bind_middleware_default(|ctx: &mut RequestContext| ctx.next());
    let table = registry.seal(false).unwrap();
    let default = table.default_domain().unwrap();
    assert_eq!(default.hooks().len(), 2);
    assert_eq!(default.middleware().len(), 2);
    assert!(default.hooks()[0].seq < default.hooks()[1].seq);
    assert_eq!(table.len(), 0);
}

#[test]
fn test_status_handler_prefers_domain() {
    let registry = Registry::new();
    RouterGroup::root(registry.clone()).bind_status_handler(404, noop);
    RouterGroup::for_domains(registry.clone(), "a.com").bind_status_handler(500, noop);
    let table = registry.seal(false).unwrap();
    assert!(table.status_handler("a.com", 404).is_some());
    assert!(table.status_handler("a.com", 500).is_some());
    assert!(table.status_handler("b.com", 500).is_none());
}

#[test]
fn test_registration_after_seal_is_ignored() {
    let (registry, mut g) = root();
    g.get("/before", noop);
    let table = registry.seal(false).unwrap();
    g.get("/after", noop);
    assert!(registry.is_sealed());
    assert_eq!(registry.pending(), 0);
    assert_eq!(table.len(), 1);
}

#[test]
fn test_route_items() {
    let (registry, mut g) = root();
    g.common("/c", noop);
    g.bind_hook("/c", HookPhase::AfterOutput, noop);
    let items = registry.seal(false).unwrap().routes();
    assert_eq!(items.len(), 5);
    assert!(items.iter().any(|i| i.kind == "hook" && i.hook == Some("AfterOutput")));
    assert!(items.iter().all(|i| i.domain == "default"));
}

#[test]
fn test_hook_phase_identifiers() {
    for phase in HookPhase::ALL {
        assert_eq!(HookPhase::from_str(phase.as_str()).unwrap(), phase);
    }
    assert_eq!(
        HookPhase::from_str("HOOK_BEFORE_SERVE").unwrap(),
        HookPhase::BeforeServe
    );
    assert_eq!(HookPhase::from_str("after-output").unwrap(), HookPhase::AfterOutput);
    assert!(HookPhase::from_str("During").is_err());
}
