use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::error::RoutingError;
use crate::middleware::{HandlerResult, Middleware};
use crate::request::RequestContext;

use super::controller::Controller;

/// Shared handler callback.
pub type HandlerFn = Arc<dyn Fn(&mut RequestContext) -> HandlerResult + Send + Sync>;

/// The four hook phases, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum HookPhase {
    BeforeServe,
    AfterServe,
    BeforeOutput,
    AfterOutput,
}

impl HookPhase {
    pub const ALL: [HookPhase; 4] = [
        HookPhase::BeforeServe,
        HookPhase::AfterServe,
        HookPhase::BeforeOutput,
        HookPhase::AfterOutput,
    ];

    /// Stable identifier, e.g. `BeforeServe`.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            HookPhase::BeforeServe => "BeforeServe",
            HookPhase::AfterServe => "AfterServe",
            HookPhase::BeforeOutput => "BeforeOutput",
            HookPhase::AfterOutput => "AfterOutput",
        }
    }

    #[must_use]
    pub(crate) fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for HookPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HookPhase {
    type Err = RoutingError;

    /// Accepts `BeforeServe`, `before_serve` and `HOOK_BEFORE_SERVE` spellings.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key: String = s
            .trim()
            .trim_start_matches("HOOK_")
            .chars()
            .filter(|c| *c != '_' && *c != '-')
            .collect::<String>()
            .to_ascii_lowercase();
        match key.as_str() {
            "beforeserve" => Ok(HookPhase::BeforeServe),
            "afterserve" => Ok(HookPhase::AfterServe),
            "beforeoutput" => Ok(HookPhase::BeforeOutput),
            "afteroutput" => Ok(HookPhase::AfterOutput),
            _ => Err(RoutingError::UnknownHookPhase(s.to_string())),
        }
    }
}

/// What a route runs when it is selected.
#[derive(Clone)]
pub enum HandlerEntry {
    /// Serving handler.
    Handler(HandlerFn),
    /// Hook entry of one phase.
    Hook(HookPhase, HandlerFn),
    /// Pattern-bound middleware; must call `ctx.next()` to continue.
    Middleware(Arc<dyn Middleware>),
    /// Serving handler backed by a controller method.
    ControllerMethod {
        controller: Arc<dyn Controller>,
        method: Arc<str>,
    },
}

impl HandlerEntry {
    /// Run the entry against the context.
    ///
    /// Controller methods are wrapped by the controller's `init`/`shut`
    /// callbacks; `shut` runs even when the method fails.
    pub fn invoke(&self, ctx: &mut RequestContext) -> HandlerResult {
        match self {
            HandlerEntry::Handler(f) | HandlerEntry::Hook(_, f) => f(ctx),
            HandlerEntry::Middleware(m) => m.handle(ctx),
            HandlerEntry::ControllerMethod { controller, method } => {
                let result = controller
                    .init(ctx)
                    .and_then(|()| controller.call(method, ctx));
                let shut = controller.shut(ctx);
                result.and(shut)
            }
        }
    }

    /// Short label used by route dumps and logs.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            HandlerEntry::Handler(_) => "handler",
            HandlerEntry::Hook(..) => "hook",
            HandlerEntry::Middleware(_) => "middleware",
            HandlerEntry::ControllerMethod { .. } => "controller",
        }
    }

    /// Serving entries compete for the single best match.
    #[must_use]
    pub fn is_serving(&self) -> bool {
        matches!(
            self,
            HandlerEntry::Handler(_) | HandlerEntry::ControllerMethod { .. }
        )
    }

    #[must_use]
    pub fn hook_phase(&self) -> Option<HookPhase> {
        match self {
            HandlerEntry::Hook(phase, _) => Some(*phase),
            _ => None,
        }
    }
}

impl fmt::Debug for HandlerEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandlerEntry::Hook(phase, _) => write!(f, "Hook({phase})"),
            HandlerEntry::ControllerMethod { method, .. } => write!(f, "ControllerMethod({method})"),
            other => f.write_str(other.kind()),
        }
    }
}
