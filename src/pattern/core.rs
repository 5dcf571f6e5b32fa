//! Pattern compiler core - turns `[METHOD:]path[@domain]` strings into
//! compiled [`RoutePattern`]s.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use http::Method;
use regex::Regex;
use smallvec::SmallVec;

use crate::error::RoutingError;

/// Domain key used for routes that are not bound to a specific host.
pub const DEFAULT_DOMAIN: &str = "default";

/// Maximum number of captures before heap allocation.
/// Most routes have ≤4 captures (e.g., `/users/:id/posts/:post`).
pub const MAX_INLINE_PARAMS: usize = 8;

/// Stack-allocated capture storage for the hot path.
///
/// Capture names use `Arc<str>` because they come from the compiled pattern
/// (known at startup) and are shared by every request; values are per-request
/// data taken from the URL.
pub type ParamVec = SmallVec<[(Arc<str>, String); MAX_INLINE_PARAMS]>;

const STANDARD_METHODS: [Method; 9] = [
    Method::GET,
    Method::PUT,
    Method::POST,
    Method::DELETE,
    Method::PATCH,
    Method::HEAD,
    Method::CONNECT,
    Method::OPTIONS,
    Method::TRACE,
];

/// HTTP method filter of a route: one concrete method or any method.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RouteMethod {
    All,
    Only(Method),
}

impl RouteMethod {
    /// Parse a method name case-insensitively. `ALL` yields [`RouteMethod::All`];
    /// only the nine standard HTTP methods are accepted otherwise.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        let upper = name.trim().to_ascii_uppercase();
        if upper == "ALL" {
            return Some(RouteMethod::All);
        }
        STANDARD_METHODS
            .iter()
            .find(|m| m.as_str() == upper)
            .map(|m| RouteMethod::Only(m.clone()))
    }

    /// Whether a request with `method` passes this filter.
    #[inline]
    #[must_use]
    pub fn matches(&self, method: &Method) -> bool {
        match self {
            RouteMethod::All => true,
            RouteMethod::Only(m) => m == method,
        }
    }

    #[must_use]
    pub fn is_all(&self) -> bool {
        matches!(self, RouteMethod::All)
    }

    /// The concrete methods a route can be served for, in a stable order.
    #[must_use]
    pub fn standard() -> &'static [Method] {
        &STANDARD_METHODS
    }
}

impl fmt::Display for RouteMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RouteMethod::All => f.write_str("ALL"),
            RouteMethod::Only(m) => f.write_str(m.as_str()),
        }
    }
}

/// One `/`-separated piece of a compiled path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Matches exactly this text.
    Literal(String),
    /// `:name`, one whole segment. `None` for an anonymous `:`.
    Named(Option<Arc<str>>),
    /// `*name`, the remainder of the path. `None` for an anonymous `*`.
    Wildcard(Option<Arc<str>>),
    /// Literals mixed with `{name}` captures, e.g. `{id}.html`.
    Field(Vec<FieldPart>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldPart {
    Literal(String),
    Capture(Arc<str>),
}

/// Ranking of a compiled pattern. A greater value is more specific.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Specificity {
    /// Number of path segments.
    pub depth: usize,
    /// Total number of variable parts (`:`, `*`, `{}`), named or not.
    pub captures: usize,
    /// Number of `{name}` captures.
    pub fields: usize,
    /// Number of `:name` segments.
    pub named: usize,
    /// Number of literal characters, slashes excluded.
    pub literal_len: usize,
    /// `true` unless the route is bound with `ALL`.
    pub method_specific: bool,
}

impl Specificity {
    fn of(segments: &[Segment], method: &RouteMethod) -> Self {
        let mut score = Specificity {
            depth: segments.len(),
            method_specific: !method.is_all(),
            ..Default::default()
        };
        for segment in segments {
            match segment {
                Segment::Literal(text) => score.literal_len += text.chars().count(),
                Segment::Named(_) => {
                    score.captures += 1;
                    score.named += 1;
                }
                Segment::Wildcard(_) => score.captures += 1,
                Segment::Field(parts) => {
                    for part in parts {
                        match part {
                            FieldPart::Literal(text) => score.literal_len += text.chars().count(),
                            FieldPart::Capture(_) => {
                                score.captures += 1;
                                score.fields += 1;
                            }
                        }
                    }
                }
            }
        }
        score
    }
}

impl Ord for Specificity {
    fn cmp(&self, other: &Self) -> Ordering {
        self.depth
            .cmp(&other.depth)
            .then_with(|| other.captures.cmp(&self.captures))
            .then_with(|| self.fields.cmp(&other.fields))
            .then_with(|| self.named.cmp(&other.named))
            .then_with(|| self.literal_len.cmp(&other.literal_len))
            .then_with(|| self.method_specific.cmp(&other.method_specific))
    }
}

impl PartialOrd for Specificity {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Split a full pattern into its optional method prefix, path and optional
/// domain suffix without validating any of them.
///
/// ```rust
/// use routeweave::pattern::split_pattern;
///
/// assert_eq!(split_pattern("GET:/a/:b@x.io"), (Some("GET"), "/a/:b", Some("x.io")));
/// assert_eq!(split_pattern("/a/:b"), (None, "/a/:b", None));
/// ```
#[must_use]
pub fn split_pattern(pattern: &str) -> (Option<&str>, &str, Option<&str>) {
    let mut rest = pattern.trim();
    let mut method = None;
    if let Some(idx) = rest.find(':') {
        let prefix = &rest[..idx];
        if !prefix.is_empty() && prefix.bytes().all(|b| b.is_ascii_alphabetic()) {
            method = Some(prefix);
            rest = &rest[idx + 1..];
        }
    }
    let mut domain = None;
    if let Some(idx) = rest.rfind('@') {
        let suffix = &rest[idx + 1..];
        if !suffix.is_empty()
            && suffix
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'_' | b'.' | b'-'))
        {
            domain = Some(suffix);
            rest = &rest[..idx];
        }
    }
    (method, rest, domain)
}

/// Collapse repeated slashes and drop a trailing slash, keeping `/` for the root.
#[must_use]
pub fn normalize_path(path: &str) -> String {
    let mut out = String::with_capacity(path.len() + 1);
    if !path.starts_with('/') {
        out.push('/');
    }
    for c in path.chars() {
        if c == '/' && out.ends_with('/') {
            continue;
        }
        out.push(c);
    }
    if out.len() > 1 && out.ends_with('/') {
        out.pop();
    }
    out
}

/// A compiled route pattern. Immutable once built.
#[derive(Debug, Clone)]
pub struct RoutePattern {
    method: RouteMethod,
    domain: Option<String>,
    path: String,
    segments: Vec<Segment>,
    regex: Regex,
    names: Vec<Arc<str>>,
    specificity: Specificity,
}

impl RoutePattern {
    /// Compile a full `[METHOD:]path[@domain]` pattern.
    ///
    /// # Errors
    ///
    /// Returns a [`RoutingError`] for an empty path, a path not starting with
    /// `/`, an unknown method, malformed captures or duplicate capture names.
    pub fn compile(pattern: &str) -> Result<Self, RoutingError> {
        let (method, path, domain) = split_pattern(pattern);
        let method = match method {
            None => RouteMethod::All,
            Some(name) => RouteMethod::parse(name).ok_or_else(|| RoutingError::UnknownMethod {
                pattern: pattern.to_string(),
                method: name.to_string(),
            })?,
        };
        if path.is_empty() {
            return Err(RoutingError::EmptyPattern);
        }
        if !path.starts_with('/') {
            return Err(RoutingError::MissingLeadingSlash {
                pattern: pattern.to_string(),
            });
        }
        let path = normalize_path(path);

        let raw_segments: Vec<&str> = path.split('/').skip(1).filter(|s| !s.is_empty()).collect();
        let mut segments = Vec::with_capacity(raw_segments.len());
        for (idx, raw) in raw_segments.iter().enumerate() {
            segments.push(parse_segment(pattern, raw, idx + 1 == raw_segments.len())?);
        }

        let (source, names) = build_regex(&segments);
        for (idx, name) in names.iter().enumerate() {
            if names[..idx].contains(name) {
                return Err(RoutingError::DuplicateCapture {
                    pattern: pattern.to_string(),
                    name: name.to_string(),
                });
            }
        }
        let regex = Regex::new(&source).map_err(|e| RoutingError::MalformedCapture {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })?;
        let specificity = Specificity::of(&segments, &method);

        Ok(Self {
            method,
            domain: domain.map(str::to_ascii_lowercase),
            path,
            segments,
            regex,
            names,
            specificity,
        })
    }

    /// Match a normalized request path, returning the percent-decoded
    /// captures in pattern order.
    #[must_use]
    pub fn match_path(&self, path: &str) -> Option<ParamVec> {
        let caps = self.regex.captures(path)?;
        let mut params = ParamVec::new();
        for (idx, name) in self.names.iter().enumerate() {
            let raw = caps.get(idx + 1).map_or("", |m| m.as_str());
            let value = urlencoding::decode(raw)
                .map(|v| v.into_owned())
                .unwrap_or_else(|_| raw.to_string());
            params.push((Arc::clone(name), value));
        }
        Some(params)
    }

    #[inline]
    #[must_use]
    pub fn is_match(&self, path: &str) -> bool {
        self.regex.is_match(path)
    }

    #[must_use]
    pub fn method(&self) -> &RouteMethod {
        &self.method
    }

    #[must_use]
    pub fn domain(&self) -> Option<&str> {
        self.domain.as_deref()
    }

    /// Normalized path part of the pattern (no method, no domain).
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    #[must_use]
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Capture names in the order they appear in the pattern.
    #[must_use]
    pub fn names(&self) -> &[Arc<str>] {
        &self.names
    }

    #[must_use]
    pub fn specificity(&self) -> Specificity {
        self.specificity
    }
}

impl fmt::Display for RoutePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.method, self.path)?;
        if let Some(domain) = &self.domain {
            write!(f, "@{domain}")?;
        }
        Ok(())
    }
}

fn malformed(pattern: &str, reason: impl Into<String>) -> RoutingError {
    RoutingError::MalformedCapture {
        pattern: pattern.to_string(),
        reason: reason.into(),
    }
}

fn valid_name(name: &str) -> bool {
    name.chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
}

fn optional_name(pattern: &str, name: &str) -> Result<Option<Arc<str>>, RoutingError> {
    if name.is_empty() {
        return Ok(None);
    }
    if !valid_name(name) {
        return Err(malformed(pattern, format!("invalid capture name `{name}`")));
    }
    Ok(Some(Arc::from(name)))
}

fn parse_segment(pattern: &str, raw: &str, is_last: bool) -> Result<Segment, RoutingError> {
    if let Some(name) = raw.strip_prefix(':') {
        return Ok(Segment::Named(optional_name(pattern, name)?));
    }
    if let Some(name) = raw.strip_prefix('*') {
        if !is_last {
            return Err(malformed(pattern, format!("wildcard `{raw}` must be the last segment")));
        }
        return Ok(Segment::Wildcard(optional_name(pattern, name)?));
    }
    if raw.contains('{') || raw.contains('}') {
        return parse_field(pattern, raw);
    }
    Ok(Segment::Literal(raw.to_string()))
}

fn parse_field(pattern: &str, raw: &str) -> Result<Segment, RoutingError> {
    let mut parts = Vec::new();
    let mut literal = String::new();
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        match c {
            '{' => {
                let mut name = String::new();
                let mut closed = false;
                for c in chars.by_ref() {
                    match c {
                        '}' => {
                            closed = true;
                            break;
                        }
                        '{' => return Err(malformed(pattern, "nested `{` in capture")),
                        _ => name.push(c),
                    }
                }
                if !closed {
                    return Err(malformed(pattern, format!("unclosed `{{` in `{raw}`")));
                }
                if name.is_empty() {
                    return Err(malformed(pattern, "empty `{}` capture"));
                }
                if !valid_name(&name) {
                    return Err(malformed(pattern, format!("invalid capture name `{name}`")));
                }
                if !literal.is_empty() {
                    parts.push(FieldPart::Literal(std::mem::take(&mut literal)));
                }
                parts.push(FieldPart::Capture(Arc::from(name)));
            }
            '}' => return Err(malformed(pattern, format!("unmatched `}}` in `{raw}`"))),
            _ => literal.push(c),
        }
    }
    if !literal.is_empty() {
        parts.push(FieldPart::Literal(literal));
    }
    Ok(Segment::Field(parts))
}

fn build_regex(segments: &[Segment]) -> (String, Vec<Arc<str>>) {
    let mut source = String::with_capacity(segments.len() * 12 + 3);
    let mut names = Vec::new();
    source.push('^');
    if segments.is_empty() {
        source.push('/');
    }
    for segment in segments {
        match segment {
            Segment::Literal(text) => {
                source.push('/');
                source.push_str(&regex::escape(text));
            }
            Segment::Named(Some(name)) => {
                source.push_str("/([^/]+)");
                names.push(Arc::clone(name));
            }
            Segment::Named(None) => source.push_str("/[^/]+"),
            Segment::Wildcard(Some(name)) => {
                source.push_str("(?:/(.*))?");
                names.push(Arc::clone(name));
            }
            Segment::Wildcard(None) => source.push_str("(?:/.*)?"),
            Segment::Field(parts) => {
                source.push('/');
                for part in parts {
                    match part {
                        FieldPart::Literal(text) => source.push_str(&regex::escape(text)),
                        FieldPart::Capture(name) => {
                            source.push_str("([^/]+)");
                            names.push(Arc::clone(name));
                        }
                    }
                }
            }
        }
    }
    source.push('$');
    (source, names)
}
