use std::marker::PhantomData;
use std::sync::Arc;

use serde::Serialize;
use serde_json::json;
use tracing::debug;

use crate::binding::{Bind, BindError};
use crate::error::RequestError;
use crate::middleware::{HandlerResult, Interrupt};
use crate::request::RequestContext;
use crate::router::HandlerFn;

/// Handler with a typed request record and a typed, JSON-serialized
/// response.
///
/// The request is bound from the merged parameters with
/// [`RequestContext::parse`]; binding failures never reach `handle`.
pub trait TypedHandler: Send + Sync + 'static {
    /// The typed request type (bound and validated from the parameters)
    type Request: Bind;
    /// The typed response type (serialized to JSON)
    type Response: Serialize;

    /// # Errors
    ///
    /// Any error becomes a handler fault and is mapped to a status by the
    /// executor.
    fn handle(&self, ctx: &mut RequestContext, req: Self::Request) -> anyhow::Result<Self::Response>;
}

/// Adapter turning a closure into a [`TypedHandler`], see [`typed`].
pub struct TypedFn<F, Req, Res> {
    f: F,
    _marker: PhantomData<fn(Req) -> Res>,
}

impl<F, Req, Res> TypedHandler for TypedFn<F, Req, Res>
where
    F: Fn(&mut RequestContext, Req) -> anyhow::Result<Res> + Send + Sync + 'static,
    Req: Bind,
    Res: Serialize + 'static,
{
    type Request = Req;
    type Response = Res;

    fn handle(&self, ctx: &mut RequestContext, req: Req) -> anyhow::Result<Res> {
        (self.f)(ctx, req)
    }
}

/// Wrap a closure as a typed handler.
///
/// ```rust
/// use routeweave::binding::Bind;
/// use routeweave::server::Server;
/// use routeweave::typed::typed;
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Deserialize)]
/// struct Greet { name: String }
/// impl Bind for Greet {}
///
/// #[derive(Serialize)]
/// struct Greeting { message: String }
///
/// let mut server = Server::new();
/// server.bind_typed("/greet", typed(|_ctx, req: Greet| {
///     Ok(Greeting { message: format!("hello {}", req.name) })
/// }));
/// ```
pub fn typed<F, Req, Res>(f: F) -> TypedFn<F, Req, Res>
where
    F: Fn(&mut RequestContext, Req) -> anyhow::Result<Res> + Send + Sync + 'static,
    Req: Bind,
    Res: Serialize + 'static,
{
    TypedFn {
        f,
        _marker: PhantomData,
    }
}

/// JSON body describing a binding failure.
fn bind_error_body(err: &BindError) -> serde_json::Value {
    match err {
        BindError::Validation(errors) => json!({
            "error": "Validation failed",
            "fields": errors.clone().into_map(),
        }),
        other => json!({
            "error": "Invalid request data",
            "message": other.to_string(),
        }),
    }
}

/// Erase a typed handler into a plain serving callback.
///
/// On a binding failure the mapped status and a JSON description are written
/// and the error is recorded; on success the response is serialized as JSON.
pub fn into_handler<H: TypedHandler>(handler: H) -> HandlerFn {
    let handler = Arc::new(handler);
    Arc::new(move |ctx: &mut RequestContext| -> HandlerResult {
        let req = match ctx.parse::<H::Request>() {
            Ok(req) => req,
            Err(err) => {
                debug!(request_id = %ctx.request_id(), error = %err, "Typed request rejected");
                let body = bind_error_body(&err);
                let err = RequestError::from(err);
                let status = err.status(&ctx.settings.status);
                let res = ctx.response_mut();
                res.clear_buffer();
                res.set_status(status);
                res.write_json(&body)?;
                return Err(Interrupt::Fault(err));
            }
        };
        let out = handler.handle(ctx, req)?;
        ctx.response_mut().write_json(&out)?;
        Ok(())
    })
}
