//! # Server Module
//!
//! The transport boundary. A transport builds an [`InboundRequest`] from
//! whatever it received, hands it to [`AppService::handle`] (or
//! [`AppService::spawn`] for one coroutine per request) and writes back the
//! finalized [`Response`].
//!
//! [`Server`] is the setup half: bind routes, hooks, middleware and
//! collaborators, then [`Server::start`] seals the route table. Nothing can
//! be registered on a started service.

mod core;
mod request;
mod response;
mod service;

pub use core::Server;
pub use request::{
    normalize_host, parse_cookies, split_uri, Body, CancelToken, HeaderVec, InboundRequest,
    MAX_INLINE_HEADERS,
};
pub use response::{status_reason, Response};
pub use service::AppService;

pub(crate) use request::find_header;
