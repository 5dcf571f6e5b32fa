//! # routeweave
//!
//! **routeweave** is the request-dispatch core of an HTTP server: it compiles
//! route patterns into a priority-ordered table, picks the best route for each
//! request, runs middleware and a four-phase hook pipeline around it, and
//! resolves request parameters from five sources with typed binding and
//! validation.
//!
//! ## Architecture
//!
//! - **[`pattern`]** - Route pattern compiler (`:name`, `*name`, `{name}`, `METHOD:`, `@domain`)
//! - **[`router`]** - Lazy registration, groups, domains and the sealed route table
//! - **[`dispatcher`]** - Best-match selection plus matching hooks and middleware
//! - **[`middleware`]** - Chain executor, exit signals and the tracing middleware
//! - **[`request`]** - Per-request context and the parameter resolver
//! - **[`binding`]** - Typed binding with field descriptors, defaults and weak typing
//! - **[`validator`]** - Rule-based validation with structured errors
//! - **[`typed`]** - Handlers with typed request and JSON response records
//! - **[`server`]** - `Server` setup, `AppService` and the transport boundary types
//! - **[`config`]**, **[`runtime_config`]**, **[`logging`]** - Configuration and tracing setup
//!
//! ### Request Flow
//!
//! ```mermaid
//! sequenceDiagram
//!     participant T as Transport
//!     participant S as AppService
//!     participant D as Dispatcher
//!     participant E as Chain Executor
//!     participant H as Handler
//!
//!     T->>S: handle(InboundRequest)
//!     S->>D: dispatch(method, host, path)
//!     D-->>S: DispatchPlan (serving, middleware, hooks)
//!     S->>E: execute(ctx, plan)
//!     E->>E: BeforeServe hooks
//!     E->>H: middleware → ctx.next() → handler
//!     H-->>E: HandlerResult
//!     E->>E: AfterServe hooks, finalize status
//!     E->>E: BeforeOutput hooks, flush, AfterOutput hooks
//!     S-->>T: Response
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use routeweave::server::{InboundRequest, Server};
//!
//! let mut server = Server::new();
//! server.get("/hello/:name", |ctx| {
//!     let name = ctx.get_str("name").unwrap_or_default();
//!     ctx.response_mut().write(format!("hello {name}"));
//!     Ok(())
//! });
//!
//! let service = server.start().expect("valid routes");
//! let res = service.handle(InboundRequest::get("/hello/ada"));
//! assert_eq!(res.status(), 200);
//! assert_eq!(res.body_string(), "hello ada");
//!
//! let res = service.handle(InboundRequest::get("/nope"));
//! assert_eq!(res.status(), 404);
//! ```
//!
//! ## Runtime
//!
//! One request runs on one task from start to finish. [`server::AppService::spawn`]
//! starts a `may` coroutine per request; the sealed route table is shared
//! read-only between them.

pub mod binding;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod ids;
pub mod logging;
pub mod middleware;
pub mod pattern;
pub mod request;
pub mod router;
pub mod runtime_config;
pub mod server;
pub mod typed;
pub mod validator;

pub use error::{ConfigError, ParseError, RequestError, RoutingError};
pub use middleware::{HandlerResult, Interrupt};
pub use request::RequestContext;
pub use server::{AppService, InboundRequest, Response, Server};
