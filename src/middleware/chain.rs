//! Request pipeline: hooks, the serving chain, status finalization and output.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use tracing::{debug, error, warn};

use super::core::{ExitKind, Interrupt};
use crate::dispatcher::{DispatchPlan, Matched};
use crate::error::RequestError;
use crate::pattern::ParamVec;
use crate::request::{ChainStep, RequestContext};
use crate::router::{HandlerEntry, HookPhase, RouteTable};

/// Run one request through its plan.
///
/// Phases, in order: `BeforeServe` hooks, the serving chain, `AfterServe`
/// hooks, status finalization, `BeforeOutput` hooks, flush, `AfterOutput`
/// hooks. An `exit_all` anywhere skips every later phase except
/// finalization and flush.
pub(crate) fn execute(ctx: &mut RequestContext, plan: &DispatchPlan, table: &RouteTable, error_log: bool) {
    ctx.set_route(plan.descriptor());
    ctx.chain = build_chain(plan);
    let serving_params = plan
        .serving
        .as_ref()
        .map(|m| m.params.clone())
        .unwrap_or_default();

    let before_ok = run_hooks(ctx, plan, HookPhase::BeforeServe, &serving_params);

    if !ctx.exit.all && before_ok {
        serve(ctx);
    }

    if !ctx.exit.all {
        run_hooks(ctx, plan, HookPhase::AfterServe, &serving_params);
    }

    finalize(ctx, plan, table, error_log);

    if !ctx.exit.all {
        run_hooks(ctx, plan, HookPhase::BeforeOutput, &serving_params);
    }

    ctx.response_mut().flush();

    if !ctx.exit.all {
        run_hooks(ctx, plan, HookPhase::AfterOutput, &serving_params);
    }
}

/// Pattern middleware, then the serving route's group middleware, then the
/// serving handler. Without a serving match the chain is middleware only.
fn build_chain(plan: &DispatchPlan) -> Vec<ChainStep> {
    let mut chain: Vec<ChainStep> = plan
        .middleware
        .iter()
        .map(|m| ChainStep {
            entry: m.route.entry.clone(),
            params: m.params.clone(),
            serving: false,
        })
        .collect();

    if let Some(Matched { route, params }) = &plan.serving {
        chain.extend(route.middleware.iter().map(|mw| ChainStep {
            entry: HandlerEntry::Middleware(Arc::clone(mw)),
            params: params.clone(),
            serving: false,
        }));
        chain.push(ChainStep {
            entry: route.entry.clone(),
            params: params.clone(),
            serving: true,
        });
    }
    chain
}

fn serve(ctx: &mut RequestContext) {
    if ctx.is_canceled() {
        debug!(request_id = %ctx.request_id(), "Request canceled before serving");
        ctx.set_error(RequestError::Canceled);
        return;
    }

    ctx.in_serving = true;
    ctx.exit.current = false;
    ctx.chain_index = 0;
    let outcome = catch_unwind(AssertUnwindSafe(|| ctx.next()));
    ctx.in_serving = false;

    match outcome {
        Ok(Ok(())) | Ok(Err(Interrupt::Exit(_))) => {}
        Ok(Err(Interrupt::Fault(err))) => ctx.set_error(err),
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            error!(
                request_id = %ctx.request_id(),
                path = %ctx.path(),
                panic = %message,
                "Serving chain panicked"
            );
            ctx.set_error(RequestError::Panic(message));
        }
    }
    ctx.exit.current = false;
}

/// Run the hooks of one phase. Returns `false` when a hook failed, which
/// also ends the phase.
fn run_hooks(ctx: &mut RequestContext, plan: &DispatchPlan, phase: HookPhase, serving_params: &ParamVec) -> bool {
    let mut ok = true;
    for hook in plan.hooks(phase) {
        if ctx.exit.hooks || ctx.exit.all {
            break;
        }
        ctx.router_params = hook.params.clone();
        let outcome = catch_unwind(AssertUnwindSafe(|| hook.route.entry.invoke(ctx)));
        match outcome {
            Ok(Ok(())) => {}
            // Exit from a hook ends that hook entry only.
            Ok(Err(Interrupt::Exit(ExitKind::Current))) => ctx.exit.current = false,
            Ok(Err(Interrupt::Exit(kind))) => ctx.exit.latch(kind),
            Ok(Err(Interrupt::Fault(err))) => {
                warn!(
                    request_id = %ctx.request_id(),
                    phase = %phase,
                    hook = %hook.route.pattern,
                    error = %err,
                    "Hook failed"
                );
                ctx.set_error(err);
                ok = false;
                break;
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                error!(
                    request_id = %ctx.request_id(),
                    phase = %phase,
                    hook = %hook.route.pattern,
                    panic = %message,
                    "Hook panicked"
                );
                ctx.set_error(RequestError::Panic(message));
                ok = false;
                break;
            }
        }
    }
    ctx.router_params = serving_params.clone();
    ok
}

/// Settle the status code and body before output.
fn finalize(ctx: &mut RequestContext, plan: &DispatchPlan, table: &RouteTable, error_log: bool) {
    if let Some(err) = ctx.error() {
        let status = err.status(&ctx.settings.status);
        if error_log {
            error!(
                request_id = %ctx.request_id(),
                method = %ctx.method(),
                path = %ctx.path(),
                kind = err.kind(),
                error = %err,
                status,
                "Request failed"
            );
        }
        let res = ctx.response_mut();
        if res.explicit_status().is_none() {
            res.set_status(status);
        }
        if res.body().is_empty() {
            let reason = crate::server::status_reason(res.status());
            res.write(reason);
        }
    }

    if ctx.response().explicit_status().is_none() {
        let found = plan.serving.is_some() && (ctx.served || !ctx.response().body().is_empty());
        if !found {
            ctx.response_mut().set_status(404);
        }
    }

    let status = ctx.response().status();
    let host = ctx.host().to_string();
    if let Some(handler) = table.status_handler(&host, status).cloned() {
        ctx.response_mut().clear_buffer();
        let outcome = catch_unwind(AssertUnwindSafe(|| handler(ctx)));
        match outcome {
            Ok(Ok(())) | Ok(Err(Interrupt::Exit(_))) => {}
            Ok(Err(Interrupt::Fault(err))) => {
                warn!(request_id = %ctx.request_id(), status, error = %err, "Status handler failed");
            }
            Err(payload) => {
                error!(
                    request_id = %ctx.request_id(),
                    status,
                    panic = %panic_message(payload.as_ref()),
                    "Status handler panicked"
                );
            }
        }
        ctx.exit.current = false;
    }

    let res = ctx.response_mut();
    if res.status() == 404 && res.body().is_empty() {
        res.write("Not Found");
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

