use std::any::TypeId;
use std::sync::Arc;

use dashmap::DashMap;
use once_cell::sync::Lazy;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::validator::Rule;

/// A record that request parameters can be bound onto.
///
/// The default `describe` returns an empty table: binding then relies on
/// serde alone, with no remapping, defaults or validation.
pub trait Bind: DeserializeOwned + Send + 'static {
    fn describe() -> FieldTable {
        FieldTable::new()
    }
}

/// Target shape of a field, driving weak conversion.
#[derive(Debug, Clone)]
pub enum FieldKind {
    /// Passed through unchanged.
    Any,
    String,
    Int,
    Float,
    Bool,
    List(Box<FieldKind>),
    /// Nested record described by its own table.
    Record(fn() -> Arc<FieldTable>),
}

/// Where a field's value comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldSource {
    /// The merged parameter map.
    Params,
    /// A request header, overriding the parameter map.
    Header(&'static str),
    /// A request cookie, overriding the parameter map.
    Cookie(&'static str),
}

/// Binding metadata of one field.
///
/// `name` must be the field's serialized name, as serde sees it.
#[derive(Debug, Clone)]
pub struct Field {
    pub name: &'static str,
    pub kind: FieldKind,
    pub source: FieldSource,
    /// Parameter names tried before fuzzy matching.
    pub aliases: Vec<&'static str>,
    /// Used when the parameter is absent, null or an empty string.
    pub default: Option<Value>,
    pub rules: Vec<Rule>,
    /// Fields of an embedded record live at this record's level
    /// (`#[serde(flatten)]`).
    pub embedded: bool,
}

impl Field {
    #[must_use]
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            kind: FieldKind::Any,
            source: FieldSource::Params,
            aliases: Vec::new(),
            default: None,
            rules: Vec::new(),
            embedded: false,
        }
    }

    #[must_use]
    pub fn string(name: &'static str) -> Self {
        Self::new(name).kind(FieldKind::String)
    }

    #[must_use]
    pub fn int(name: &'static str) -> Self {
        Self::new(name).kind(FieldKind::Int)
    }

    #[must_use]
    pub fn float(name: &'static str) -> Self {
        Self::new(name).kind(FieldKind::Float)
    }

    #[must_use]
    pub fn bool(name: &'static str) -> Self {
        Self::new(name).kind(FieldKind::Bool)
    }

    #[must_use]
    pub fn list(name: &'static str, item: FieldKind) -> Self {
        Self::new(name).kind(FieldKind::List(Box::new(item)))
    }

    /// Nested record bound from an object parameter.
    #[must_use]
    pub fn record<T: Bind>(name: &'static str) -> Self {
        Self::new(name).kind(FieldKind::Record(descriptor_of::<T>))
    }

    /// Embedded record whose fields are read from the enclosing level.
    #[must_use]
    pub fn embedded<T: Bind>() -> Self {
        let mut field = Self::new("").kind(FieldKind::Record(descriptor_of::<T>));
        field.embedded = true;
        field
    }

    #[must_use]
    pub fn kind(mut self, kind: FieldKind) -> Self {
        self.kind = kind;
        self
    }

    #[must_use]
    pub fn alias(mut self, alias: &'static str) -> Self {
        self.aliases.push(alias);
        self
    }

    #[must_use]
    pub fn default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    #[must_use]
    pub fn rule(mut self, rule: Rule) -> Self {
        self.rules.push(rule);
        self
    }

    #[must_use]
    pub fn header(mut self, name: &'static str) -> Self {
        self.source = FieldSource::Header(name);
        self
    }

    #[must_use]
    pub fn cookie(mut self, name: &'static str) -> Self {
        self.source = FieldSource::Cookie(name);
        self
    }
}

/// Field metadata of a [`Bind`] type.
#[derive(Debug, Clone, Default)]
pub struct FieldTable {
    fields: Vec<Field>,
    bail: Option<bool>,
}

impl FieldTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn field(mut self, field: Field) -> Self {
        self.fields.push(field);
        self
    }

    /// Override the server's validation bail setting for this type.
    #[must_use]
    pub fn bail(mut self, bail: bool) -> Self {
        self.bail = Some(bail);
        self
    }

    #[must_use]
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    #[must_use]
    pub fn bail_mode(&self) -> Option<bool> {
        self.bail
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| !f.embedded && f.name == name)
    }
}

static DESCRIPTORS: Lazy<DashMap<TypeId, Arc<FieldTable>>> = Lazy::new(DashMap::new);

/// Field table of `T`, built on first use and cached for the process.
#[must_use]
pub fn descriptor_of<T: Bind>() -> Arc<FieldTable> {
    let id = TypeId::of::<T>();
    if let Some(table) = DESCRIPTORS.get(&id) {
        return Arc::clone(table.value());
    }
    // Built outside the entry lock: describe() may call descriptor_of for
    // nested records.
    let table = Arc::new(T::describe());
    Arc::clone(DESCRIPTORS.entry(id).or_insert(table).value())
}
