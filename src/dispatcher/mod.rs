//! # Dispatcher Module
//!
//! The dispatcher turns (method, host, path) into a [`DispatchPlan`]: the
//! single best serving route plus every hook and pattern-bound middleware
//! whose pattern matches.
//!
//! ## Selection
//!
//! 1. The request host selects a domain table; when it has no matching
//!    serving route the default domain is searched.
//! 2. Candidates are pre-sorted by specificity (deeper, fewer captures,
//!    `{}` over `:` over `*`, longer literals, method-specific over `ALL`),
//!    ties broken by registration order, so the first path match wins.
//! 3. Hooks and middleware are collected from both the default and the
//!    request domain in registration order, independent of the serving match.
//!
//! A plan without a serving match is still executed: hooks and middleware
//! run and the response ends as 404.
//!
//! ## Caching
//!
//! The route table is immutable once sealed, so resolved plans are cached in a
//! bounded LRU keyed by (method, host, normalized path). A capacity of 0
//! disables the cache.
//!
//! ```rust
//! use routeweave::server::Server;
//! use http::Method;
//!
//! let mut server = Server::new();
//! server.get("/user/:id", |_ctx| Ok(()));
//! server.get("/user/*rest", |_ctx| Ok(()));
//! let service = server.start().unwrap();
//!
//! let plan = service.dispatcher().dispatch(&Method::GET, "", "/user/42");
//! let serving = plan.serving.as_ref().unwrap();
//! assert_eq!(serving.route.pattern.path(), "/user/:id");
//! ```

mod core;

pub use core::{DispatchPlan, Dispatcher, Matched};
