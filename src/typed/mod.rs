//! # Typed Module
//!
//! Typed handlers receive a bound, validated request record and return a
//! response record that is serialized to JSON.
//!
//! ## Usage
//!
//! ```rust
//! use routeweave::binding::{Bind, Field, FieldTable};
//! use routeweave::request::RequestContext;
//! use routeweave::server::{InboundRequest, Server};
//! use routeweave::typed::TypedHandler;
//! use routeweave::validator::Rule;
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Deserialize)]
//! struct GetPetRequest {
//!     id: u64,
//! }
//!
//! impl Bind for GetPetRequest {
//!     fn describe() -> FieldTable {
//!         FieldTable::new().field(Field::int("id").rule(Rule::min(1.0)))
//!     }
//! }
//!
//! #[derive(Serialize)]
//! struct Pet {
//!     id: u64,
//!     name: String,
//! }
//!
//! struct GetPet;
//!
//! impl TypedHandler for GetPet {
//!     type Request = GetPetRequest;
//!     type Response = Pet;
//!
//!     fn handle(&self, _ctx: &mut RequestContext, req: GetPetRequest) -> anyhow::Result<Pet> {
//!         Ok(Pet { id: req.id, name: "Rex".into() })
//!     }
//! }
//!
//! let mut server = Server::new();
//! server.bind_typed("GET:/pets/:id", GetPet);
//! let service = server.start().unwrap();
//!
//! let res = service.handle(InboundRequest::get("/pets/7"));
//! assert_eq!(res.body_string(), r#"{"id":7,"name":"Rex"}"#);
//!
//! let res = service.handle(InboundRequest::get("/pets/0"));
//! assert_eq!(res.status(), 400);
//! ```
//!
//! ## Error Handling
//!
//! - **Binding failure** (conversion, validation, malformed body): the mapped
//!   status (400 by default, 413 for oversized bodies) with a JSON body; for
//!   validation failures `fields` maps field → rule → message
//! - **Handler error**: recorded as a handler fault, 500 by default
//! - **Panic**: caught by the executor, 500 by default

mod core;

pub use core::{into_handler, typed, TypedFn, TypedHandler};
