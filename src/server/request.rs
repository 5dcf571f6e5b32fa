use std::fmt;
use std::io::Read;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use http::Method;
use smallvec::SmallVec;

/// Maximum inline headers/cookies before heap allocation.
/// Most requests have ≤16 headers.
pub const MAX_INLINE_HEADERS: usize = 16;

/// Stack-allocated header/cookie storage. Header names are stored lowercase.
pub type HeaderVec = SmallVec<[(Arc<str>, String); MAX_INLINE_HEADERS]>;

/// Cooperative cancellation flag shared between the transport and the
/// request being served.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    #[must_use]
    pub fn is_canceled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Where the request body comes from.
#[derive(Default)]
pub enum Body {
    #[default]
    Empty,
    Bytes(Vec<u8>),
    /// Streamed body, read at most once and only when a handler asks for it.
    Reader(Box<dyn Read + Send>),
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Body::Empty => f.write_str("Body::Empty"),
            Body::Bytes(b) => write!(f, "Body::Bytes({} bytes)", b.len()),
            Body::Reader(_) => f.write_str("Body::Reader"),
        }
    }
}

/// Request handed to the core by the transport.
///
/// ```rust
/// use routeweave::server::InboundRequest;
///
/// let req = InboundRequest::post("/users?notify=1")
///     .host("api.example.com:8080")
///     .header("Content-Type", "application/json")
///     .body(r#"{"name":"john"}"#);
/// assert_eq!(req.get_header("content-type"), Some("application/json"));
/// ```
#[derive(Debug)]
pub struct InboundRequest {
    pub method: Method,
    /// Path including the query string.
    pub uri: String,
    pub host: String,
    pub headers: HeaderVec,
    pub body: Body,
    pub cancel: Option<CancelToken>,
    pub deadline: Option<Instant>,
}

impl InboundRequest {
    #[must_use]
    pub fn new(method: Method, uri: impl Into<String>) -> Self {
        Self {
            method,
            uri: uri.into(),
            host: String::new(),
            headers: HeaderVec::new(),
            body: Body::Empty,
            cancel: None,
            deadline: None,
        }
    }

    #[must_use]
    pub fn get(uri: impl Into<String>) -> Self {
        Self::new(Method::GET, uri)
    }

    #[must_use]
    pub fn post(uri: impl Into<String>) -> Self {
        Self::new(Method::POST, uri)
    }

    #[must_use]
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    #[must_use]
    pub fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers
            .push((Arc::from(name.to_ascii_lowercase()), value.into()));
        self
    }

    #[must_use]
    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = Body::Bytes(body.into());
        self
    }

    #[must_use]
    pub fn reader(mut self, reader: impl Read + Send + 'static) -> Self {
        self.body = Body::Reader(Box::new(reader));
        self
    }

    #[must_use]
    pub fn cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    #[must_use]
    pub fn deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Get a header by name (case-insensitive per RFC 7230).
    #[must_use]
    pub fn get_header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }
}

pub(crate) fn find_header<'a>(headers: &'a HeaderVec, name: &str) -> Option<&'a str> {
    headers
        .iter()
        .rfind(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

/// Parse the `Cookie` header into name/value pairs.
#[must_use]
pub fn parse_cookies(headers: &HeaderVec) -> HeaderVec {
    find_header(headers, "cookie")
        .map(|c| {
            c.split(';')
                .filter_map(|pair| {
                    let mut parts = pair.trim().splitn(2, '=');
                    let name = parts.next()?.trim();
                    if name.is_empty() {
                        return None;
                    }
                    let value = parts.next().unwrap_or("").trim().to_string();
                    Some((Arc::from(name), value))
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Split a request URI into its path and raw query string.
#[must_use]
pub fn split_uri(uri: &str) -> (&str, &str) {
    let uri = uri.split('#').next().unwrap_or("");
    match uri.find('?') {
        Some(pos) => (&uri[..pos], &uri[pos + 1..]),
        None => (uri, ""),
    }
}

/// Lowercase a Host header value and strip its port.
#[must_use]
pub fn normalize_host(host: &str) -> String {
    let host = host.trim();
    let host = if let Some(rest) = host.strip_prefix('[') {
        // [::1]:8080
        rest.split(']').next().unwrap_or(rest)
    } else {
        host.rsplit_once(':')
            .filter(|(_, port)| port.chars().all(|c| c.is_ascii_digit()))
            .map_or(host, |(name, _)| name)
    };
    host.to_ascii_lowercase()
}
