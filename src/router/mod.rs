//! # Router Module
//!
//! The router module owns route registration and the sealed route table the
//! dispatcher searches for every request.
//!
//! ## Overview
//!
//! The router is responsible for:
//! - Queuing registrations made during setup ([`Registry`])
//! - Grouping registrations under path prefixes with inherited middleware
//!   ([`RouterGroup`])
//! - Scoping routes to domains (a [`RouterGroup`] bound to host aliases)
//! - Compiling and ordering everything once at startup ([`RouteTable`])
//!
//! ## Lifecycle
//!
//! Registration is two-phase:
//!
//! 1. **Setup**: every `bind_*` call on a server, group or domain records a
//!    [`PendingRegistration`] together with its source location. Nothing is
//!    compiled yet, so groups can be declared in any order.
//!
//! 2. **Seal**: when the server starts, [`Registry::seal`] compiles every
//!    pattern and builds per-domain, per-method candidate lists ordered by
//!    specificity and registration sequence. A malformed pattern or a
//!    rejected duplicate aborts startup. The resulting [`RouteTable`] is never
//!    mutated again.
//!
//! ## Example
//!
//! ```rust
//! use routeweave::server::Server;
//!
//! let mut server = Server::new();
//! server.group("/api", |api| {
//!     api.get("/users/:id", |ctx| {
//!         let id = ctx.router_value("id").unwrap_or_default().to_string();
//!         ctx.response_mut().write(id);
//!         Ok(())
//!     });
//! });
//! let service = server.start().unwrap();
//! assert_eq!(service.routes().len(), 1);
//! ```
//!
//! ## Duplicates
//!
//! Two serving routes with the same domain, method and normalized path are a
//! configuration error by default. Setting `route_overwrite` in the server
//! configuration lets the later registration replace the earlier one with a
//! warning. Hooks and middleware never conflict; they accumulate.

mod controller;
mod core;
mod entry;
mod group;
mod registry;
#[cfg(test)]
mod tests;

pub use controller::{method_to_uri, Controller};
pub use core::{DomainTable, Route, RouteDescriptor, RouteItem, RouteTable};
pub use entry::{HandlerEntry, HandlerFn, HookPhase};
pub use group::RouterGroup;
pub use registry::{PendingRegistration, PendingTarget, Registry};
