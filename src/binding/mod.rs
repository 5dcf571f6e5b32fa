//! # Binding Module
//!
//! Converts the merged request parameters into typed records.
//!
//! A target type implements [`Bind`] and describes its fields once in a
//! [`FieldTable`]. The table is built on first use and cached per type.
//! Binding then runs, in order:
//!
//! 1. header and cookie sourced fields take their value from the request
//! 2. parameter names are remapped onto field names (explicit aliases, then
//!    fuzzy matching that ignores case, `-`, `_`, space and `.`)
//! 3. defaults fill absent or empty fields
//! 4. values are weakly converted to the field kind (`"42"` → `42`, a single
//!    value → a one-element list), descending into nested and embedded records
//! 5. validation rules run, collecting every failure or bailing at the first
//! 6. serde deserializes the converted map
//!
//! ## Example
//!
//! ```rust
//! use routeweave::binding::{bind, Bind, Field, FieldTable};
//! use routeweave::validator::{Rule, RuleValidator};
//! use serde::Deserialize;
//! use serde_json::json;
//!
//! #[derive(Deserialize)]
//! struct Page {
//!     page: u32,
//!     size: u32,
//!     tags: Vec<String>,
//! }
//!
//! impl Bind for Page {
//!     fn describe() -> FieldTable {
//!         FieldTable::new()
//!             .field(Field::int("page").default(1).rule(Rule::min(1.0)))
//!             .field(Field::int("size").alias("per_page").default(20))
//!             .field(Field::list("tags", routeweave::binding::FieldKind::String).default(json!([])))
//!     }
//! }
//!
//! let params = json!({"per_page": "50", "tags": "new"});
//! let page: Page = bind(params.as_object().unwrap().clone(), &RuleValidator, false).unwrap();
//! assert_eq!((page.page, page.size), (1, 50));
//! assert_eq!(page.tags, vec!["new"]);
//! ```

mod core;
mod descriptor;

pub use core::{bind, from_value_weak, BindError};
pub use descriptor::{descriptor_of, Bind, Field, FieldKind, FieldSource, FieldTable};

pub(crate) use core::bind_with;
