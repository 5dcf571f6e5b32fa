//! # Request Module
//!
//! [`RequestContext`] is the per-request object every handler, hook and
//! middleware receives. It carries the request line and headers, the
//! response buffer, the error slot, the serving chain position and the exit
//! flags, plus the parameter resolver:
//!
//! | Source       | Accessor                                   | Parsed from                          |
//! |--------------|--------------------------------------------|--------------------------------------|
//! | router       | [`RequestContext::router_value`]           | captures of the running pattern      |
//! | query        | [`RequestContext::query`]                  | query string, GET body               |
//! | body         | [`RequestContext::body_value`]             | JSON / XML / custom decoders         |
//! | form         | [`RequestContext::form`]                   | url-encoded and multipart bodies     |
//! | programmatic | [`RequestContext::param`]                  | [`RequestContext::set_param`]        |
//!
//! [`RequestContext::get`] and [`RequestContext::request_map`] combine the
//! sources; a later row overwrites an earlier one on key collision.
//! Every source is parsed once and memoized.

mod body;
mod context;
mod keys;
mod multipart;
mod params;
mod session;

pub use body::{default_decoders, looks_like_json, media_type, BodyDecoder, JsonDecoder, XmlDecoder};
pub use context::{ContextSettings, RequestContext};
pub use keys::parse_urlencoded;
pub use multipart::UploadFile;
pub use session::{CookieSessionAccessor, SessionAccessor};

pub(crate) use context::ChainStep;
