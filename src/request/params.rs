//! Parameter accessors of [`RequestContext`].
//!
//! Every source is parsed on first access and memoized until
//! [`RequestContext::reload_params`]. Combined lookups follow the fixed
//! precedence router < query < body < form < programmatic.

use http::Method;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::binding::{bind_with, descriptor_of, from_value_weak, Bind, BindError, FieldSource};
use crate::error::ParseError;

use super::body::{looks_like_json, read_body, JsonDecoder, BodyDecoder, XmlDecoder};
use super::context::RequestContext;
use super::keys;
use super::multipart::{self, UploadFile};

const FORM_URLENCODED: &str = "application/x-www-form-urlencoded";
const MULTIPART: &str = "multipart/form-data";

/// Memoized parameter sources of one request.
#[derive(Debug, Default)]
pub(crate) struct ParamState {
    raw_body: Option<Vec<u8>>,
    query: Option<Map<String, Value>>,
    body: Option<Map<String, Value>>,
    body_value: Option<Value>,
    form: Option<Map<String, Value>>,
    uploads: Vec<UploadFile>,
    programmatic: Map<String, Value>,
    parse_error: Option<ParseError>,
    // Reading the body happens once, so its failure outlives a reload.
    read_error: Option<ParseError>,
}

fn merge(into: &mut Map<String, Value>, from: Map<String, Value>) {
    for (key, value) in from {
        into.insert(key, value);
    }
}

impl RequestContext {
    /// Raw request body, read from the transport at most once.
    ///
    /// A read failure (size limit, cancellation, I/O) is recorded as a
    /// [`ParseError`] and an empty body is returned.
    pub fn raw_body(&mut self) -> &[u8] {
        if self.params.raw_body.is_none() {
            let source = self.body_source.take().unwrap_or_default();
            let limit = self.settings.max_body_size;
            let bytes = match read_body(source, limit, self.cancel.as_ref(), self.deadline) {
                Ok(bytes) => bytes,
                Err(err) => {
                    warn!(request_id = %self.request_id(), error = %err, "Failed to read request body");
                    self.params.read_error = Some(err.clone());
                    self.record_parse_error(err);
                    Vec::new()
                }
            };
            self.params.raw_body = Some(bytes);
        }
        self.params.raw_body.as_deref().unwrap_or_default()
    }

    fn record_parse_error(&mut self, err: ParseError) {
        if self.params.parse_error.is_none() {
            self.params.parse_error = Some(err.clone());
        }
        self.set_error(err.into());
    }

    /// First body or query parse failure of this request.
    #[must_use]
    pub fn parse_error(&self) -> Option<&ParseError> {
        self.params.parse_error.as_ref()
    }

    fn ensure_query(&mut self) {
        if self.params.query.is_some() {
            return;
        }
        let mut map = keys::parse_urlencoded(self.raw_query().as_bytes());
        if *self.method() == Method::GET && !self.raw_body().is_empty() {
            let raw = self.raw_body();
            let from_body = if looks_like_json(raw) {
                match serde_json::from_slice::<Value>(raw) {
                    Ok(Value::Object(obj)) => Ok(obj),
                    Ok(_) => Ok(Map::new()),
                    Err(e) => Err(ParseError::Malformed {
                        format: "json",
                        message: e.to_string(),
                    }),
                }
            } else {
                Ok(keys::parse_urlencoded(raw))
            };
            match from_body {
                Ok(obj) => merge(&mut map, obj),
                Err(err) => self.record_parse_error(err),
            }
        }
        debug!(keys = map.len(), "Query parameters parsed");
        self.params.query = Some(map);
    }

    fn ensure_body(&mut self) {
        if self.params.body.is_some() {
            return;
        }
        let content_type = self.content_type();
        let skip = *self.method() == Method::GET
            || content_type == FORM_URLENCODED
            || content_type == MULTIPART;
        if skip || self.raw_body().is_empty() {
            self.params.body = Some(Map::new());
            return;
        }

        let decoded = {
            let raw = self.params.raw_body.as_deref().unwrap_or_default();
            let custom = self
                .settings
                .decoders
                .iter()
                .find(|d| !content_type.is_empty() && d.accepts(&content_type));
            match custom {
                Some(decoder) => Some(decoder.decode(raw)),
                None if content_type.is_empty() && looks_like_json(raw) => Some(JsonDecoder.decode(raw)),
                None if content_type.is_empty() && raw.first() == Some(&b'<') => Some(XmlDecoder.decode(raw)),
                None => None,
            }
        };

        let map = match decoded {
            Some(Ok(Value::Object(obj))) => {
                self.params.body_value = Some(Value::Object(obj.clone()));
                obj
            }
            Some(Ok(other)) => {
                self.params.body_value = Some(other);
                Map::new()
            }
            Some(Err(err)) => {
                self.record_parse_error(err);
                Map::new()
            }
            None => Map::new(),
        };
        self.params.body = Some(map);
    }

    fn ensure_form(&mut self) {
        if self.params.form.is_some() {
            return;
        }
        let content_type = self.content_type();
        let map = if content_type == FORM_URLENCODED {
            keys::parse_urlencoded(self.raw_body())
        } else if content_type == MULTIPART {
            let header = self.header("content-type").unwrap_or_default().to_string();
            let limit = self.settings.form_parsing_memory;
            let parsed = multipart::parse_boundary(&header)
                .and_then(|boundary| multipart::parse(self.raw_body(), &boundary, limit));
            match parsed {
                Ok(parts) => {
                    let mut map = Map::new();
                    for (name, value) in parts.fields {
                        keys::insert(&mut map, &name, Value::String(value));
                    }
                    keys::finish(&mut map);
                    self.params.uploads = parts.files;
                    map
                }
                Err(err) => {
                    self.record_parse_error(err);
                    Map::new()
                }
            }
        } else {
            Map::new()
        };
        self.params.form = Some(map);
    }

    /// Capture of the pattern currently running.
    ///
    /// Hooks and middleware see their own pattern's captures; the serving
    /// handler sees the serving route's.
    #[must_use]
    pub fn router_value(&self, key: &str) -> Option<&str> {
        self.router_params
            .iter()
            .rfind(|(k, _)| k.as_ref() == key)
            .map(|(_, v)| v.as_str())
    }

    #[must_use]
    pub fn router_map(&self) -> Map<String, Value> {
        self.router_params
            .iter()
            .map(|(k, v)| (k.to_string(), Value::String(v.clone())))
            .collect()
    }

    /// Query parameter, including a GET request's body.
    pub fn query(&mut self, key: &str) -> Option<&Value> {
        self.ensure_query();
        self.params.query.as_ref().and_then(|m| m.get(key))
    }

    pub fn query_map(&mut self) -> &Map<String, Value> {
        self.ensure_query();
        self.params.query.get_or_insert_with(Map::new)
    }

    /// Field of a JSON or XML body.
    pub fn body_value(&mut self, key: &str) -> Option<&Value> {
        self.ensure_body();
        self.params.body.as_ref().and_then(|m| m.get(key))
    }

    pub fn body_map(&mut self) -> &Map<String, Value> {
        self.ensure_body();
        self.params.body.get_or_insert_with(Map::new)
    }

    /// Whole decoded body, including non-object JSON such as arrays.
    pub fn body_json(&mut self) -> Option<&Value> {
        self.ensure_body();
        self.params.body_value.as_ref()
    }

    /// Field of a url-encoded or multipart form body.
    pub fn form(&mut self, key: &str) -> Option<&Value> {
        self.ensure_form();
        self.params.form.as_ref().and_then(|m| m.get(key))
    }

    pub fn form_map(&mut self) -> &Map<String, Value> {
        self.ensure_form();
        self.params.form.get_or_insert_with(Map::new)
    }

    /// Uploaded files of a multipart field; `name` and `name[]` are the
    /// same field.
    pub fn upload_files(&mut self, name: &str) -> Vec<&UploadFile> {
        self.ensure_form();
        let base = name.strip_suffix("[]").unwrap_or(name);
        self.params
            .uploads
            .iter()
            .filter(|f| f.field.strip_suffix("[]").unwrap_or(&f.field) == base)
            .collect()
    }

    /// Programmatic parameter set with [`RequestContext::set_param`].
    #[must_use]
    pub fn param(&self, key: &str) -> Option<&Value> {
        self.params.programmatic.get(key)
    }

    /// Set a parameter that shadows every request source.
    pub fn set_param(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.params.programmatic.insert(key.into(), value.into());
    }

    #[must_use]
    pub fn params_map(&self) -> &Map<String, Value> {
        &self.params.programmatic
    }

    /// Look `key` up in every source, highest precedence first.
    pub fn get(&mut self, key: &str) -> Option<Value> {
        if let Some(v) = self.params.programmatic.get(key) {
            return Some(v.clone());
        }
        if let Some(v) = self.form(key) {
            return Some(v.clone());
        }
        if let Some(v) = self.body_value(key) {
            return Some(v.clone());
        }
        if let Some(v) = self.query(key) {
            return Some(v.clone());
        }
        self.router_value(key).map(|v| Value::String(v.to_string()))
    }

    /// [`RequestContext::get`] rendered as text; non-string values use
    /// their JSON form.
    pub fn get_str(&mut self, key: &str) -> Option<String> {
        match self.get(key)? {
            Value::String(s) => Some(s),
            Value::Null => None,
            other => Some(other.to_string()),
        }
    }

    /// [`RequestContext::get`] deserialized with weak typing.
    ///
    /// # Errors
    ///
    /// [`BindError::Deserialize`] when the value does not fit `T`.
    pub fn get_as<T: DeserializeOwned>(&mut self, key: &str) -> Result<Option<T>, BindError> {
        match self.get(key) {
            Some(value) => Ok(Some(from_value_weak(value)?)),
            None => Ok(None),
        }
    }

    /// Every source merged under the precedence order.
    pub fn request_map(&mut self) -> Map<String, Value> {
        let mut map = self.router_map();
        let query = self.query_map().clone();
        merge(&mut map, query);
        let body = self.body_map().clone();
        merge(&mut map, body);
        let form = self.form_map().clone();
        merge(&mut map, form);
        merge(&mut map, self.params.programmatic.clone());
        map
    }

    /// The merged map restricted to the keys of `defaults`, with the default
    /// used for every absent key.
    pub fn request_map_with_defaults(&mut self, defaults: &Map<String, Value>) -> Map<String, Value> {
        let mut merged = self.request_map();
        defaults
            .iter()
            .map(|(key, default)| {
                let value = merged.remove(key).unwrap_or_else(|| default.clone());
                (key.clone(), value)
            })
            .collect()
    }

    /// Drop memoized query, body and form maps so the next access parses
    /// again. The raw body is kept; it cannot be read twice.
    ///
    /// Decode failures are forgotten and [`Self::parse_error`] reflects the
    /// next parse. A failed body read stays reported. The request error slot
    /// is left as is.
    pub fn reload_params(&mut self) {
        self.params.parse_error = self.params.read_error.clone();
        self.params.query = None;
        self.params.body = None;
        self.params.body_value = None;
        self.params.form = None;
        self.params.uploads.clear();
    }

    /// Bind the merged parameters onto `T`: header/cookie sources, name
    /// remapping, defaults, weak conversion, then validation.
    ///
    /// # Errors
    ///
    /// [`BindError::Parse`] when the body could not be decoded, otherwise
    /// conversion, validation or deserialization failures.
    pub fn parse<T: Bind>(&mut self) -> Result<T, BindError> {
        let params = self.request_map();
        if let Some(err) = &self.params.parse_error {
            return Err(BindError::Parse(err.clone()));
        }
        let table = descriptor_of::<T>();
        let validator = std::sync::Arc::clone(&self.settings.validator);
        let bail = self.settings.bail;
        let external = |source: &FieldSource| match source {
            FieldSource::Header(name) => self.header(name).map(str::to_string),
            FieldSource::Cookie(name) => self.cookie(name).map(str::to_string),
            FieldSource::Params => None,
        };
        bind_with(params, &table, validator.as_ref(), bail, &external)
    }
}
