use super::context::RequestContext;

/// Resolves the session id of a request. Session storage itself belongs to
/// the caller.
pub trait SessionAccessor: Send + Sync + 'static {
    fn session_id(&self, ctx: &RequestContext) -> Option<String>;
}

/// Reads the session id from a cookie, then from a header of the same name.
#[derive(Debug, Clone)]
pub struct CookieSessionAccessor {
    name: String,
}

impl CookieSessionAccessor {
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl SessionAccessor for CookieSessionAccessor {
    fn session_id(&self, ctx: &RequestContext) -> Option<String> {
        ctx.cookie(&self.name)
            .or_else(|| ctx.header(&self.name))
            .filter(|id| !id.is_empty())
            .map(str::to_string)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::request::ContextSettings;
    use crate::server::InboundRequest;

    #[test]
    fn test_cookie_then_header() {
        let settings = Arc::new(ContextSettings::default());
        let accessor = CookieSessionAccessor::new("sid");

        let ctx = RequestContext::new(
            InboundRequest::get("/").header("Cookie", "sid=from-cookie").header("sid", "from-header"),
            Arc::clone(&settings),
        );
        assert_eq!(accessor.session_id(&ctx).as_deref(), Some("from-cookie"));

        let ctx = RequestContext::new(InboundRequest::get("/").header("SID", "from-header"), Arc::clone(&settings));
        assert_eq!(accessor.session_id(&ctx).as_deref(), Some("from-header"));

        let ctx = RequestContext::new(InboundRequest::get("/"), settings);
        assert_eq!(accessor.session_id(&ctx), None);
    }
}
