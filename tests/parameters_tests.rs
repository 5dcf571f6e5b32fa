use std::io::Read;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use http::Method;
use routeweave::config::ServerConfig;
use routeweave::error::ParseError;
use routeweave::request::{BodyDecoder, RequestContext};
use routeweave::server::{AppService, CancelToken, InboundRequest, Server};
use serde_json::{json, Map, Value};

const FORM: &str = "application/x-www-form-urlencoded";

fn text(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => "-".to_string(),
    }
}

fn single<F>(pattern: &str, handler: F) -> AppService
where
    F: Fn(&mut RequestContext) -> routeweave::HandlerResult + Send + Sync + 'static,
{
    let mut server = Server::new();
    server.bind_handler(pattern, handler);
    server.start().unwrap()
}

#[test]
fn test_source_precedence() {
    let service = single("/p/:a", |ctx| {
        let router = ctx.router_value("a").unwrap_or("-").to_string();
        let query = text(ctx.query("a"));
        let form = text(ctx.form("a"));
        let merged = ctx.get_str("a").unwrap_or_default();
        ctx.set_param("a", "prog");
        let programmatic = ctx.get_str("a").unwrap_or_default();
        ctx.response_mut()
            .write(format!("{router}|{query}|{form}|{merged}|{programmatic}"));
        Ok(())
    });

    let res = service.handle(
        InboundRequest::post("/p/r?a=q")
            .header("Content-Type", FORM)
            .body("a=f"),
    );
    assert_eq!(res.body_string(), "r|q|f|f|prog");

    let res = service.handle(InboundRequest::get("/p/r?a=q"));
    assert_eq!(res.body_string(), "r|q|-|q|prog");

    let res = service.handle(InboundRequest::get("/p/r"));
    assert_eq!(res.body_string(), "r|-|-|r|prog");
}

#[test]
fn test_query_and_form_same_key() {
    let service = single("/form", |ctx| {
        let query = text(ctx.query("a"));
        let merged = ctx.get_str("a").unwrap_or_default();
        ctx.response_mut().write(format!("{query},{merged}"));
        Ok(())
    });
    let res = service.handle(
        InboundRequest::post("/form?a=1")
            .header("Content-Type", FORM)
            .body("a=100"),
    );
    assert_eq!(res.body_string(), "1,100");
}

#[test]
fn test_json_body() {
    let service = single("/json", |ctx| {
        let name = ctx.get_str("name").unwrap_or_default();
        let tags: Vec<String> = ctx.get_as("tags")?.unwrap_or_default();
        let n: i64 = ctx.get_as("n")?.unwrap_or_default();
        let count: i64 = ctx.get_as("count")?.unwrap_or_default();
        ctx.response_mut()
            .write(format!("{name};{};{n};{count}", tags.join(",")));
        Ok(())
    });

    let res = service.handle(
        InboundRequest::post("/json?name=query")
            .header("Content-Type", "application/json; charset=utf-8")
            .body(r#"{"name":"ada","tags":["x","y"],"n":3,"count":"12"}"#),
    );
    assert_eq!(res.status(), 200);
    assert_eq!(res.body_string(), "ada;x,y;3;12");
}

#[test]
fn test_json_body_without_content_type_is_sniffed() {
    let service = single("/json", |ctx| {
        let id = ctx.get_str("id").unwrap_or_default();
        ctx.response_mut().write(id);
        Ok(())
    });
    let res = service.handle(InboundRequest::new(Method::PUT, "/json").body(r#" {"id": 7}"#));
    assert_eq!(res.body_string(), "7");
}

#[test]
fn test_non_object_json_body() {
    let service = single("/list", |ctx| {
        let keys = ctx.body_map().len();
        let items = ctx
            .body_json()
            .and_then(Value::as_array)
            .map_or(0, Vec::len);
        ctx.response_mut().write(format!("{keys}:{items}"));
        Ok(())
    });
    let res = service.handle(
        InboundRequest::post("/list")
            .header("Content-Type", "application/json")
            .body("[1,2,3]"),
    );
    assert_eq!(res.body_string(), "0:3");
}

#[test]
fn test_xml_body() {
    let service = single("/xml", |ctx| {
        let id = text(ctx.body_value("@id"));
        let name = ctx.get_str("name").unwrap_or_default();
        let roles = text(ctx.body_value("role"));
        ctx.response_mut().write(format!("{id} {name} {roles}"));
        Ok(())
    });
    let res = service.handle(
        InboundRequest::post("/xml")
            .header("Content-Type", "application/xml")
            .body(r#"<user id="7"><name>ada</name><role>a</role><role>b</role></user>"#),
    );
    assert_eq!(res.body_string(), r#"7 ada ["a","b"]"#);
}

#[test]
fn test_array_and_map_keys() {
    let service = single("/keys", |ctx| {
        let ids = ctx.query("ids").cloned();
        let filter = ctx.query("filter").cloned();
        let ordered = ctx.form("list").cloned();
        ctx.response_mut().write_json(&json!({
            "ids": ids,
            "filter": filter,
            "list": ordered,
        }))?;
        Ok(())
    });
    let res = service.handle(
        InboundRequest::post("/keys?ids[]=1&ids[]=2&filter[name]=x&filter[age][min]=3")
            .header("Content-Type", FORM)
            .body("list[1]=b&list[0]=a"),
    );
    let body: Value = serde_json::from_slice(res.body()).unwrap();
    assert_eq!(
        body,
        json!({
            "ids": ["1", "2"],
            "filter": {"name": "x", "age": {"min": "3"}},
            "list": ["a", "b"],
        })
    );
}

const MULTIPART_BODY: &str = "--BOUND\r\n\
    Content-Disposition: form-data; name=\"title\"\r\n\r\n\
    holiday\r\n\
    --BOUND\r\n\
    Content-Disposition: form-data; name=\"photos[]\"; filename=\"a.png\"\r\n\
    Content-Type: image/png\r\n\r\n\
    PNGDATA\r\n\
    --BOUND\r\n\
    Content-Disposition: form-data; name=\"photos[]\"; filename=\"b.jpg\"\r\n\
    Content-Type: image/jpeg\r\n\r\n\
    JPG\r\n\
    --BOUND--\r\n";

#[test]
fn test_multipart_fields_and_uploads() {
    let service = single("/upload", |ctx| {
        let title = ctx.get_str("title").unwrap_or_default();
        let files: Vec<String> = ctx
            .upload_files("photos")
            .iter()
            .map(|f| format!("{}:{}", f.filename, f.size()))
            .collect();
        let same = ctx.upload_files("photos[]").len();
        ctx.response_mut()
            .write(format!("{title} {} {same}", files.join(",")));
        Ok(())
    });
    let res = service.handle(
        InboundRequest::post("/upload")
            .header("Content-Type", "multipart/form-data; boundary=BOUND")
            .body(MULTIPART_BODY),
    );
    assert_eq!(res.status(), 200);
    assert_eq!(res.body_string(), "holiday a.png:7,b.jpg:3 2");
}

#[test]
fn test_multipart_over_form_limit_is_413() {
    let config = ServerConfig {
        form_parsing_memory: 8,
        ..ServerConfig::default()
    };
    let mut server = Server::with_config(config);
    server.post("/upload", |ctx| {
        let _ = ctx.upload_files("photos");
        Ok(())
    });
    let service = server.start().unwrap();
    let res = service.handle(
        InboundRequest::post("/upload")
            .header("Content-Type", "multipart/form-data; boundary=BOUND")
            .body(MULTIPART_BODY),
    );
    assert_eq!(res.status(), 413);
    assert_eq!(res.body_string(), "Payload Too Large");
}

#[test]
fn test_multipart_value_may_contain_boundary_text() {
    let service = single("/note", |ctx| {
        let t = text(ctx.form("t"));
        ctx.response_mut().write(t);
        Ok(())
    });
    let body = "--XyZ\r\n\
        Content-Disposition: form-data; name=\"t\"\r\n\r\n\
        foo--XyZbar\r\n\
        --XyZ--\r\n";
    let res = service.handle(
        InboundRequest::post("/note")
            .header("Content-Type", "multipart/form-data; boundary=XyZ")
            .body(body),
    );
    assert_eq!(res.status(), 200);
    assert_eq!(res.body_string(), "foo--XyZbar");
}

#[test]
fn test_get_body_merges_into_query() {
    let service = single("/search", |ctx| {
        let a = text(ctx.query("a"));
        let b = text(ctx.query("b"));
        let body = ctx.body_map().len();
        ctx.response_mut().write(format!("{a}{b}{body}"));
        Ok(())
    });
    let res = service.handle(InboundRequest::get("/search?a=1").body("b=2"));
    assert_eq!(res.body_string(), "120");

    let res = service.handle(InboundRequest::get("/search?a=1").body(r#"{"a":"x","b":"y"}"#));
    assert_eq!(res.body_string(), "xy0");
}

#[test]
fn test_reload_params_keeps_raw_body_and_programmatic() {
    let service = single("/reload", |ctx| {
        ctx.set_param("extra", 1);
        let before = ctx.get_str("a").unwrap_or_default();
        ctx.reload_params();
        let after = ctx.get_str("a").unwrap_or_default();
        let extra = ctx.get_str("extra").unwrap_or_default();
        let raw = ctx.raw_body().len();
        ctx.response_mut().write(format!("{before}{after}{extra}{raw}"));
        Ok(())
    });
    let res = service.handle(
        InboundRequest::post("/reload")
            .header("Content-Type", FORM)
            .body("a=z"),
    );
    assert_eq!(res.body_string(), "zz13");
}

#[test]
fn test_request_map_with_defaults() {
    let service = single("/page/:section", |ctx| {
        let mut defaults = Map::new();
        defaults.insert("section".into(), json!("home"));
        defaults.insert("page".into(), json!(1));
        defaults.insert("size".into(), json!(10));
        let map = ctx.request_map_with_defaults(&defaults);
        ctx.response_mut().write_json(&map)?;
        Ok(())
    });
    let res = service.handle(InboundRequest::get("/page/news?page=3&ignored=x"));
    let body: Value = serde_json::from_slice(res.body()).unwrap();
    assert_eq!(body, json!({"section": "news", "page": "3", "size": 10}));
}

#[test]
fn test_get_as_conversion_error_is_400() {
    let service = single("/num", |ctx| {
        let n: Option<u32> = ctx.get_as("n")?;
        ctx.response_mut().write(n.unwrap_or_default().to_string());
        Ok(())
    });
    assert_eq!(service.handle(InboundRequest::get("/num?n=41")).body_string(), "41");
    let res = service.handle(InboundRequest::get("/num?n=abc"));
    assert_eq!(res.status(), 400);
    assert_eq!(res.body_string(), "Bad Request");
}

#[test]
fn test_oversized_body_is_413() {
    let config = ServerConfig {
        client_max_body_size: 8,
        ..ServerConfig::default()
    };
    let mut server = Server::with_config(config);
    server.post("/big", |ctx| {
        let seen = ctx.get("x").is_some();
        if matches!(ctx.parse_error(), Some(ParseError::TooLarge { limit: 8 })) && !seen {
            ctx.response_mut().set_header("x-limit", "8");
        }
        Ok(())
    });
    let service = server.start().unwrap();

    let res = service.handle(
        InboundRequest::post("/big")
            .header("Content-Type", "application/json")
            .body(r#"{"x":"0123456789"}"#),
    );
    assert_eq!(res.status(), 413);
    assert_eq!(res.header("x-limit"), Some("8"));
    assert_eq!(res.body_string(), "Payload Too Large");

    let res = service.handle(
        InboundRequest::post("/big")
            .header("Content-Type", "application/json")
            .body(r#"{"x":1}"#),
    );
    assert_eq!(res.status(), 200);
}

#[test]
fn test_malformed_body_keeps_handler_output() {
    let service = single("/bad", |ctx| {
        let seen = ctx.get("x").is_none();
        ctx.response_mut().write(format!("seen={seen}"));
        Ok(())
    });
    let res = service.handle(
        InboundRequest::post("/bad")
            .header("Content-Type", "application/json")
            .body("{oops"),
    );
    assert_eq!(res.status(), 400);
    assert_eq!(res.body_string(), "seen=true");
}

#[test]
fn test_canceled_before_dispatch() {
    let service = single("/slow", |ctx| {
        ctx.response_mut().write("ran");
        Ok(())
    });
    let token = CancelToken::new();
    token.cancel();
    let res = service.handle(InboundRequest::get("/slow").cancel_token(token));
    assert_eq!(res.status(), 503);
    assert_eq!(res.body_string(), "Service Unavailable");

    let past = Instant::now().checked_sub(Duration::from_millis(5)).unwrap();
    let res = service.handle(InboundRequest::get("/slow").deadline(past));
    assert_eq!(res.status(), 503);
}

struct CancelingReader {
    token: CancelToken,
    sent: bool,
}

impl Read for CancelingReader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if self.sent {
            return Ok(0);
        }
        self.sent = true;
        self.token.cancel();
        buf[..2].copy_from_slice(b"a=");
        Ok(2)
    }
}

#[test]
fn test_canceled_while_reading_body() {
    let service = single("/stream", |ctx| {
        let _ = ctx.form("a");
        Ok(())
    });
    let token = CancelToken::new();
    let reader = CancelingReader {
        token: token.clone(),
        sent: false,
    };
    let res = service.handle(
        InboundRequest::post("/stream")
            .header("Content-Type", FORM)
            .reader(reader)
            .cancel_token(token),
    );
    assert_eq!(res.status(), 503);
}

struct KeyValueDecoder;

impl BodyDecoder for KeyValueDecoder {
    fn name(&self) -> &'static str {
        "kv"
    }

    fn accepts(&self, content_type: &str) -> bool {
        content_type == "text/x-kv"
    }

    fn decode(&self, body: &[u8]) -> Result<Value, ParseError> {
        let text = std::str::from_utf8(body).map_err(|e| ParseError::Malformed {
            format: "kv",
            message: e.to_string(),
        })?;
        let map: Map<String, Value> = text
            .split(';')
            .filter_map(|pair| pair.split_once(':'))
            .map(|(k, v)| (k.trim().to_string(), Value::String(v.trim().to_string())))
            .collect();
        Ok(Value::Object(map))
    }
}

#[test]
fn test_custom_body_decoder() {
    let mut server = Server::new();
    server.register_decoder(KeyValueDecoder);
    server.post("/kv", |ctx| {
        let a = ctx.get_str("a").unwrap_or_default();
        let b = ctx.get_str("b").unwrap_or_default();
        ctx.response_mut().write(format!("{a}{b}"));
        Ok(())
    });
    let service = server.start().unwrap();

    let res = service.handle(
        InboundRequest::post("/kv")
            .header("Content-Type", "text/x-kv")
            .body("a: 1; b: 2"),
    );
    assert_eq!(res.body_string(), "12");

    let res = service.handle(
        InboundRequest::post("/kv")
            .header("Content-Type", "application/json")
            .body(r#"{"a":"j"}"#),
    );
    assert_eq!(res.body_string(), "j");
}

/// Counts decode calls; optionally fails the first one.
struct CountingDecoder {
    calls: Arc<AtomicUsize>,
    fail_first: bool,
}

impl BodyDecoder for CountingDecoder {
    fn name(&self) -> &'static str {
        "counting"
    }

    fn accepts(&self, content_type: &str) -> bool {
        content_type == "text/x-counted"
    }

    fn decode(&self, body: &[u8]) -> Result<Value, ParseError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_first && call == 0 {
            return Err(ParseError::Malformed {
                format: "counting",
                message: "first call fails".to_string(),
            });
        }
        Ok(json!({ "a": String::from_utf8_lossy(body) }))
    }
}

fn counting_service<F>(fail_first: bool, handler: F) -> (AppService, Arc<AtomicUsize>)
where
    F: Fn(&mut RequestContext) -> routeweave::HandlerResult + Send + Sync + 'static,
{
    let calls = Arc::new(AtomicUsize::new(0));
    let mut server = Server::new();
    server.register_decoder(CountingDecoder {
        calls: Arc::clone(&calls),
        fail_first,
    });
    server.post("/count", handler);
    (server.start().unwrap(), calls)
}

#[test]
fn test_body_decoded_once_until_reload() {
    let (service, calls) = counting_service(false, |ctx| {
        let _ = ctx.body_value("a");
        let _ = ctx.get("a");
        let _ = ctx.request_map();
        let _ = ctx.body_json();
        ctx.reload_params();
        let _ = ctx.get("a");
        let _ = ctx.request_map();
        Ok(())
    });
    let res = service.handle(
        InboundRequest::post("/count")
            .header("Content-Type", "text/x-counted")
            .body("v"),
    );
    assert_eq!(res.status(), 200);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[test]
fn test_reload_params_forgets_decode_failure() {
    let (service, calls) = counting_service(true, |ctx| {
        let first = ctx.get_str("a").unwrap_or_default();
        let failed = ctx.parse_error().is_some();
        ctx.reload_params();
        let second = ctx.get_str("a").unwrap_or_default();
        let cleared = ctx.parse_error().is_none();
        ctx.take_error();
        ctx.response_mut()
            .write(format!("[{first}] {failed} [{second}] {cleared}"));
        Ok(())
    });
    let res = service.handle(
        InboundRequest::post("/count")
            .header("Content-Type", "text/x-counted")
            .body("v"),
    );
    assert_eq!(res.status(), 200);
    assert_eq!(res.body_string(), "[] true [v] true");
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[test]
fn test_reload_params_keeps_body_read_failure() {
    let config = ServerConfig {
        client_max_body_size: 2,
        ..ServerConfig::default()
    };
    let mut server = Server::with_config(config);
    server.post("/big", |ctx| {
        let _ = ctx.get("a");
        ctx.reload_params();
        let kept = matches!(ctx.parse_error(), Some(ParseError::TooLarge { .. }));
        ctx.response_mut().write(kept.to_string());
        Ok(())
    });
    let service = server.start().unwrap();
    let res = service.handle(
        InboundRequest::post("/big")
            .header("Content-Type", FORM)
            .body("a=long"),
    );
    assert_eq!(res.status(), 413);
    assert_eq!(res.body_string(), "true");
}

#[test]
fn test_session_id_from_cookie_or_header() {
    let config = ServerConfig {
        session_id_name: "sid".into(),
        ..ServerConfig::default()
    };
    let mut server = Server::with_config(config);
    server.get("/me", |ctx| {
        let id = ctx.session_id().unwrap_or_else(|| "none".into());
        ctx.response_mut().write(id);
        Ok(())
    });
    let service = server.start().unwrap();

    let res = service.handle(InboundRequest::get("/me").header("Cookie", "theme=dark; sid=abc"));
    assert_eq!(res.body_string(), "abc");
    let res = service.handle(InboundRequest::get("/me").header("sid", "xyz"));
    assert_eq!(res.body_string(), "xyz");
    let res = service.handle(InboundRequest::get("/me").header("Cookie", "sessionid=abc"));
    assert_eq!(res.body_string(), "none");
}
