//! # Pattern Module
//!
//! Compiles declarative route patterns into matchable [`RoutePattern`]s.
//!
//! ## Syntax
//!
//! A full pattern has the form `[METHOD:]path[@domain]`:
//!
//! - `GET:/user/:id` binds only `GET` requests; without a prefix the route is
//!   method-agnostic (`ALL`).
//! - `/user/:id@api.example.com` binds the route to one domain.
//!
//! Path segments come in four shapes:
//!
//! | Segment        | Matches                                   | Capture         |
//! |----------------|-------------------------------------------|-----------------|
//! | `user`         | exactly `user`                            | none            |
//! | `:id`          | exactly one segment                       | `id`            |
//! | `*rest`        | the remainder of the path, possibly empty | `rest`          |
//! | `{id}.{ext}`   | literals mixed with segment captures      | `id`, `ext`     |
//!
//! `:` and `*` without a name match without capturing.
//!
//! ## Specificity
//!
//! When several patterns match one path, the one with the highest
//! [`Specificity`] serves the request: deeper patterns first, then fewer
//! captures, then more `{}` captures, then more `:` captures, then more
//! literal characters, then method-specific over `ALL`. Equal specificity is
//! resolved by the route table using registration order.
//!
//! ## Example
//!
//! ```rust
//! use routeweave::pattern::RoutePattern;
//!
//! let pattern = RoutePattern::compile("GET:/user/{id}.html").unwrap();
//! let params = pattern.match_path("/user/42.html").unwrap();
//! assert_eq!(params[0].1, "42");
//! ```

mod core;

pub use core::{
    normalize_path, split_pattern, FieldPart, ParamVec, RouteMethod, RoutePattern, Segment,
    Specificity, DEFAULT_DOMAIN, MAX_INLINE_PARAMS,
};
