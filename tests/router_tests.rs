use http::Method;
use routeweave::config::ServerConfig;
use routeweave::middleware::HandlerResult;
use routeweave::request::RequestContext;
use routeweave::router::Controller;
use routeweave::server::{AppService, InboundRequest, Server};
use routeweave::RoutingError;

fn echo(key: &'static str) -> impl Fn(&mut RequestContext) -> HandlerResult + Send + Sync {
    move |ctx| {
        let value = ctx.get_str(key).unwrap_or_default();
        ctx.response_mut().write(value);
        Ok(())
    }
}

fn text(body: &'static str) -> impl Fn(&mut RequestContext) -> HandlerResult + Send + Sync {
    move |ctx| {
        ctx.response_mut().write(body);
        Ok(())
    }
}

fn on_host(service: &AppService, host: &str, path: &str) -> String {
    service
        .handle(InboundRequest::get(path).host(host))
        .body_string()
}

#[test]
fn test_more_specific_route_wins_regardless_of_order() {
    let mut server = Server::new();
    server.bind_handler("/:name/*any", echo("any"));
    server.bind_handler("/:name/:action", echo("action"));
    server.bind_handler("/:name/update", echo("name"));
    server.bind_handler("/user/list/{field}.html", echo("field"));
    let service = server.start().unwrap();

    assert_eq!(on_host(&service, "", "/john/update"), "john");
    assert_eq!(on_host(&service, "", "/john/edit"), "edit");
    assert_eq!(on_host(&service, "", "/john/a/b"), "a/b");
    assert_eq!(on_host(&service, "", "/user/list/100.html"), "100");
}

#[test]
fn test_equal_specificity_first_registered_wins() {
    let mut server = Server::new();
    server.bind_handler("/item/:id", text("first"));
    server.bind_handler("/item/:key", text("second"));
    let service = server.start().unwrap();

    assert_eq!(on_host(&service, "", "/item/1"), "first");
}

#[test]
fn test_method_restricted_routes() {
    let mut server = Server::new();
    server.bind_handler("GET:/get", text("get"));
    server.bind_handler("POST:/post", text("post"));
    let service = server.start().unwrap();

    let res = service.handle(InboundRequest::post("/get"));
    assert_eq!(res.status(), 404);
    assert_eq!(res.body_string(), "Not Found");

    let res = service.handle(InboundRequest::get("/get"));
    assert_eq!(res.status(), 200);
    assert_eq!(res.body_string(), "get");

    let res = service.handle(InboundRequest::post("/post"));
    assert_eq!(res.body_string(), "post");
    assert_eq!(service.handle(InboundRequest::get("/post")).status(), 404);
}

#[test]
fn test_method_specific_beats_all() {
    let mut server = Server::new();
    server.all("/thing", text("all"));
    server.put("/thing", text("put"));
    let service = server.start().unwrap();

    let res = service.handle(InboundRequest::new(Method::PUT, "/thing"));
    assert_eq!(res.body_string(), "put");
    let res = service.handle(InboundRequest::new(Method::PATCH, "/thing"));
    assert_eq!(res.body_string(), "all");
}

#[test]
fn test_domain_routes_only_reachable_through_their_hosts() {
    let mut server = Server::new();
    let mut domain = server.domain("localhost, local");
    domain.bind_handler("/:name", text("/:name"));
    domain.bind_handler("/:name/update", echo("name"));
    domain.bind_handler("/:name/:action", echo("action"));
    domain.bind_handler("/:name/*any", echo("any"));
    domain.bind_handler("/user/list/{field}.html", echo("field"));
    let service = server.start().unwrap();

    for path in ["/john", "/john/update", "/john/edit", "/user/list/100.html"] {
        assert_eq!(on_host(&service, "127.0.0.1", path), "Not Found");
    }
    for host in ["localhost", "local:8080", "LOCALHOST"] {
        assert_eq!(on_host(&service, host, "/john"), "");
        assert_eq!(on_host(&service, host, "/john/update"), "john");
        assert_eq!(on_host(&service, host, "/john/edit"), "edit");
        assert_eq!(on_host(&service, host, "/user/list/100.html"), "100");
    }
}

#[test]
fn test_domain_status_handler() {
    let mut server = Server::new();
    let mut domain = server.domain("localhost, local");
    domain.bind_handler("/", text("hello"));
    domain.bind_status_handler(404, text("404 page"));
    let service = server.start().unwrap();

    assert_eq!(on_host(&service, "127.0.0.1", "/"), "Not Found");
    assert_eq!(on_host(&service, "127.0.0.1", "/ThisDoesNotExist"), "Not Found");
    for host in ["localhost", "local"] {
        assert_eq!(on_host(&service, host, "/"), "hello");
        assert_eq!(on_host(&service, host, "/ThisDoesNotExist"), "404 page");
    }
}

#[test]
fn test_domain_groups_with_methods() {
    let mut server = Server::new();
    server.domain("localhost, local").group("/", |group| {
        group.group("/app", |app| {
            app.get("/{table}/list/{page}.html", |ctx| {
                let table = ctx.get_str("table").unwrap_or_default();
                let page = ctx.get_str("page").unwrap_or_default();
                ctx.response_mut().write(format!("{table}&{page}"));
                Ok(())
            });
            app.get("/order/info/{order_id}", echo("order_id"));
            app.delete("/comment/{id}", echo("id"));
        });
    });
    let service = server.start().unwrap();

    assert_eq!(on_host(&service, "local", "/app/t/list/2.html"), "t&2");
    assert_eq!(on_host(&service, "127.0.0.1", "/app/t/list/2.html"), "Not Found");
    assert_eq!(on_host(&service, "local", "/app/order/info/2"), "2");
    assert_eq!(on_host(&service, "local", "/app/comment/20"), "Not Found");

    let delete = |host: &str| {
        service
            .handle(InboundRequest::new(Method::DELETE, "/app/comment/20").host(host))
            .body_string()
    };
    assert_eq!(delete("local"), "20");
    assert_eq!(delete("127.0.0.1"), "Not Found");
}

#[test]
fn test_pattern_domain_suffix() {
    let mut server = Server::new();
    server.get("/who@api.example.com", text("api"));
    server.get("/who", text("default"));
    let service = server.start().unwrap();

    assert_eq!(on_host(&service, "api.example.com", "/who"), "api");
    assert_eq!(on_host(&service, "www.example.com", "/who"), "default");
}

#[test]
fn test_duplicate_route_fails_start() {
    let mut server = Server::new();
    server.get("/dup", text("one"));
    server.get("/dup/", text("two"));
    let err = server.start().unwrap_err();
    assert!(matches!(err, RoutingError::DuplicateRoute { .. }));
    assert!(err.to_string().contains("router_tests.rs"));
}

#[test]
fn test_duplicate_route_overwrite_when_configured() {
    let config = ServerConfig {
        route_overwrite: true,
        ..ServerConfig::default()
    };
    let mut server = Server::with_config(config);
    server.get("/dup", text("one"));
    server.get("/dup", text("two"));
    let service = server.start().unwrap();

    assert_eq!(on_host(&service, "", "/dup"), "two");
}

#[test]
fn test_malformed_pattern_fails_start() {
    let mut server = Server::new();
    server.get("/ok", text("ok"));
    server.get("/item/{id", text("bad"));
    assert!(matches!(
        server.start(),
        Err(RoutingError::MalformedCapture { .. })
    ));
}

#[test]
fn test_empty_server_fails_start() {
    assert!(matches!(Server::new().start(), Err(RoutingError::EmptyTable)));
}

#[test]
fn test_group_clone_does_not_leak_middleware() {
    let mut server = Server::new();
    let parent = server.group("/api", |api| {
        api.get("/plain", text("plain"));
    });
    parent.group("/v1", |v1| {
        v1.middleware(|ctx: &mut RequestContext| -> HandlerResult {
            ctx.response_mut().write("[mw]");
            ctx.next()
        });
        v1.get("/wrapped", text("wrapped"));
    });
    let mut again = parent.clone();
    again.get("/after", text("after"));
    let service = server.start().unwrap();

    assert_eq!(on_host(&service, "", "/api/plain"), "plain");
    assert_eq!(on_host(&service, "", "/api/v1/wrapped"), "[mw]wrapped");
    assert_eq!(on_host(&service, "", "/api/after"), "after");
}

struct Users;

impl Controller for Users {
    fn methods(&self) -> Vec<&'static str> {
        vec!["Get", "Post", "ShowList"]
    }

    fn call(&self, method: &str, ctx: &mut RequestContext) -> HandlerResult {
        ctx.response_mut().write(method);
        Ok(())
    }
}

#[test]
fn test_controller_bindings() {
    let mut server = Server::new();
    server.bind_controller("/users", Users);
    server.bind_controller_rest("/rest", Users);
    server.bind_controller_method("/one", Users, "ShowList");
    let service = server.start().unwrap();

    assert_eq!(on_host(&service, "", "/users/show-list"), "ShowList");
    assert_eq!(on_host(&service, "", "/users/get"), "Get");
    assert_eq!(on_host(&service, "", "/one"), "ShowList");

    assert_eq!(on_host(&service, "", "/rest"), "Get");
    let res = service.handle(InboundRequest::post("/rest"));
    assert_eq!(res.body_string(), "Post");
    let res = service.handle(InboundRequest::new(Method::PUT, "/rest"));
    assert_eq!(res.status(), 404);
}

#[test]
fn test_routes_listing() {
    let mut server = Server::new();
    server.get("/a", text("a"));
    server.bind_hook("/*", routeweave::router::HookPhase::BeforeServe, text(""));
    server.bind_middleware_default(|ctx: &mut RequestContext| -> HandlerResult { ctx.next() });
    let service = server.start().unwrap();

    let routes = service.routes();
    assert_eq!(routes.len(), 3);
    let served = routes.iter().find(|r| r.kind == "handler").unwrap();
    assert_eq!(served.route, "/a");
    assert_eq!(served.method, "GET");
    let hook = routes.iter().find(|r| r.kind == "hook").unwrap();
    assert_eq!(hook.hook, Some("BeforeServe"));
}

#[test]
fn test_response_carries_route_descriptor() {
    let mut server = Server::new();
    server.get("/user/:id", text("u"));
    let service = server.start().unwrap();

    let res = service.handle(InboundRequest::get("/user/5"));
    let route = res.route().unwrap();
    assert_eq!(route.template, "/user/:id");
    assert_eq!(route.method, "GET");
    assert!(route.source.contains("router_tests.rs"));
    assert!(service.handle(InboundRequest::get("/none")).route().is_none());
}
