use crate::binding::BindError;
use crate::error::{ParseError, RequestError};
use crate::request::RequestContext;
use crate::validator::ValidationErrors;

/// Which early-termination signal was raised.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitKind {
    /// Abort the rest of the current phase, keep the response as-is.
    Current,
    /// Abort the current phase and every later phase.
    All,
    /// Skip every remaining hook entry; the serving chain is unaffected.
    Hooks,
}

/// Non-success outcome of a handler, hook or middleware.
#[derive(Debug)]
pub enum Interrupt {
    /// Cooperative early exit, see [`ExitKind`].
    Exit(ExitKind),
    /// Failure; recorded in the error slot at the executor boundary.
    Fault(RequestError),
}

/// Return type of every handler, hook and middleware.
///
/// `?` on `anyhow`, parse, bind and validation errors converts them into
/// [`Interrupt::Fault`], and `ctx.next()?` carries exit signals through
/// middleware frames.
pub type HandlerResult = Result<(), Interrupt>;

impl Interrupt {
    #[must_use]
    pub fn is_exit(&self) -> bool {
        matches!(self, Interrupt::Exit(_))
    }

    #[must_use]
    pub fn fault(&self) -> Option<&RequestError> {
        match self {
            Interrupt::Fault(err) => Some(err),
            Interrupt::Exit(_) => None,
        }
    }
}

impl From<RequestError> for Interrupt {
    fn from(err: RequestError) -> Self {
        Interrupt::Fault(err)
    }
}

impl From<anyhow::Error> for Interrupt {
    fn from(err: anyhow::Error) -> Self {
        Interrupt::Fault(RequestError::Handler(err))
    }
}

impl From<ParseError> for Interrupt {
    fn from(err: ParseError) -> Self {
        Interrupt::Fault(err.into())
    }
}

impl From<BindError> for Interrupt {
    fn from(err: BindError) -> Self {
        Interrupt::Fault(err.into())
    }
}

impl From<ValidationErrors> for Interrupt {
    fn from(err: ValidationErrors) -> Self {
        Interrupt::Fault(err.into())
    }
}

impl From<serde_json::Error> for Interrupt {
    fn from(err: serde_json::Error) -> Self {
        Interrupt::Fault(RequestError::Handler(err.into()))
    }
}

/// Middleware wraps the rest of the chain: call `ctx.next()` to continue,
/// return without calling it to short-circuit.
///
/// Plain closures are middleware too:
///
/// ```rust
/// use routeweave::middleware::HandlerResult;
/// use routeweave::request::RequestContext;
///
/// let timing = |ctx: &mut RequestContext| -> HandlerResult {
///     ctx.response_mut().write("before ");
///     ctx.next()?;
///     ctx.response_mut().write(" after");
///     Ok(())
/// };
/// # let _ = timing;
/// ```
pub trait Middleware: Send + Sync + 'static {
    fn handle(&self, ctx: &mut RequestContext) -> HandlerResult;
}

impl<F> Middleware for F
where
    F: Fn(&mut RequestContext) -> HandlerResult + Send + Sync + 'static,
{
    fn handle(&self, ctx: &mut RequestContext) -> HandlerResult {
        self(ctx)
    }
}
