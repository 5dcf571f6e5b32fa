//! # Middleware Module
//!
//! Handlers, hooks and middleware all return [`HandlerResult`]. Middleware
//! wraps the rest of the serving chain and decides whether to continue by
//! calling [`RequestContext::next`](crate::request::RequestContext::next).
//!
//! ## Chain Order
//!
//! For one request the serving chain is:
//!
//! 1. pattern-bound middleware whose pattern matches, in registration order
//! 2. the group middleware inherited by the serving route, outermost first
//! 3. the serving handler
//!
//! ## Exit Signals
//!
//! - [`ExitKind::Current`]: stop the current phase; later hooks still run
//! - [`ExitKind::All`]: stop this phase and every later one
//! - [`ExitKind::Hooks`]: skip all remaining hook entries
//!
//! Faults and panics are recorded in the request's error slot and mapped to
//! a status during finalization unless something already set one.

mod chain;
mod core;
mod tracing;

pub use core::{ExitKind, HandlerResult, Interrupt, Middleware};
pub use tracing::TracingMiddleware;

pub(crate) use chain::execute;
