use std::sync::Arc;

use serde::Serialize;
use tracing::warn;

use crate::ids::RequestId;
use crate::router::RouteDescriptor;

use super::request::{find_header, HeaderVec};

/// Canonical reason phrase for a status code.
#[must_use]
pub fn status_reason(status: u16) -> &'static str {
    http::StatusCode::from_u16(status)
        .ok()
        .and_then(|s| s.canonical_reason())
        .unwrap_or("Unknown Status")
}

/// Response buffer of one request, and the finalized response handed back
/// to the transport.
///
/// Until the flush that follows the `BeforeOutput` hooks, status, headers and
/// body are freely editable. After it, status and headers are frozen and
/// further body writes are appended to what was already flushed.
#[derive(Debug, Default)]
pub struct Response {
    status: Option<u16>,
    headers: HeaderVec,
    body: Vec<u8>,
    flushed: bool,
    route: Option<RouteDescriptor>,
    request_id: Option<RequestId>,
}

impl Response {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Final status; `200` when nothing set one.
    #[must_use]
    pub fn status(&self) -> u16 {
        self.status.unwrap_or(200)
    }

    /// Status explicitly set by a handler, hook or the executor.
    #[must_use]
    pub fn explicit_status(&self) -> Option<u16> {
        self.status
    }

    pub fn set_status(&mut self, status: u16) {
        if self.flushed {
            warn!(status, "Status change after flush ignored");
            return;
        }
        self.status = Some(status);
    }

    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    #[must_use]
    pub fn headers(&self) -> &HeaderVec {
        &self.headers
    }

    /// Set a header, replacing any previous value with the same name.
    pub fn set_header(&mut self, name: &str, value: impl Into<String>) {
        if self.flushed {
            warn!(header = %name, "Header change after flush ignored");
            return;
        }
        let name = name.to_ascii_lowercase();
        self.headers.retain(|(k, _)| k.as_ref() != name);
        self.headers.push((Arc::from(name), value.into()));
    }

    pub fn write(&mut self, data: impl AsRef<[u8]>) {
        self.body.extend_from_slice(data.as_ref());
    }

    /// Replace the buffered body with `data`.
    pub fn write_over(&mut self, data: impl AsRef<[u8]>) {
        self.clear_buffer();
        self.write(data);
    }

    /// Set `status` and, when the body is still empty, write its reason
    /// phrase.
    pub fn write_status(&mut self, status: u16) {
        self.set_status(status);
        if self.body.is_empty() {
            self.write(status_reason(status));
        }
    }

    pub fn writeln(&mut self, data: impl AsRef<[u8]>) {
        self.write(data);
        self.body.push(b'\n');
    }

    /// Serialize `value` as JSON into the body and set the content type.
    ///
    /// # Errors
    ///
    /// Returns the serializer error; the body is left untouched then.
    pub fn write_json<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), serde_json::Error> {
        let bytes = serde_json::to_vec(value)?;
        if self.header("content-type").is_none() {
            self.set_header("content-type", "application/json");
        }
        self.body.extend_from_slice(&bytes);
        Ok(())
    }

    /// Drop buffered body bytes. Bytes already flushed cannot be recalled.
    pub fn clear_buffer(&mut self) {
        if self.flushed {
            warn!("Buffer clear after flush ignored");
            return;
        }
        self.body.clear();
    }

    #[must_use]
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Body as text, lossy for invalid UTF-8.
    #[must_use]
    pub fn body_string(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    #[must_use]
    pub fn into_body(self) -> Vec<u8> {
        self.body
    }

    /// Whether a status or any body bytes have been produced.
    #[must_use]
    pub fn is_written(&self) -> bool {
        self.status.is_some() || !self.body.is_empty()
    }

    #[must_use]
    pub fn is_flushed(&self) -> bool {
        self.flushed
    }

    /// Descriptor of the serving route, if one matched.
    #[must_use]
    pub fn route(&self) -> Option<&RouteDescriptor> {
        self.route.as_ref()
    }

    #[must_use]
    pub fn request_id(&self) -> Option<RequestId> {
        self.request_id
    }

    pub(crate) fn flush(&mut self) {
        if self.status.is_none() {
            self.status = Some(200);
        }
        if self.header("content-type").is_none() && !self.body.is_empty() {
            self.headers
                .push((Arc::from("content-type"), "text/plain; charset=utf-8".to_string()));
        }
        self.flushed = true;
    }

    pub(crate) fn set_route(&mut self, route: Option<RouteDescriptor>) {
        self.route = route;
    }

    pub(crate) fn set_request_id(&mut self, id: RequestId) {
        self.request_id = Some(id);
    }
}
