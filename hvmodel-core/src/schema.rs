//! Per-kind attribute schemas.
//!
//! A schema names every attribute a resource kind knows about, its semantic
//! type and default, and which attributes are lazy. Lazy attributes are never
//! requested by plain list/get calls and never take part in change tracking.

use std::fmt::Debug;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::collection::Scope;
use crate::error::Result;
use crate::invoker::Record;

/// Semantic type of an attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttrType {
    String,
    Bool,
    Integer,
    Reference,
    List,
}

/// Default value declared for an attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttrDefault {
    Bool(bool),
    Str(&'static str),
}

impl AttrDefault {
    pub fn to_value(self) -> Value {
        match self {
            AttrDefault::Bool(b) => Value::Bool(b),
            AttrDefault::Str(s) => Value::String(s.to_string()),
        }
    }
}

/// Declaration of a single attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttributeDef {
    pub name: &'static str,
    pub ty: AttrType,
    pub default: Option<AttrDefault>,
    pub lazy: bool,
}

impl AttributeDef {
    pub const fn new(name: &'static str, ty: AttrType) -> Self {
        Self {
            name,
            ty,
            default: None,
            lazy: false,
        }
    }

    pub const fn string(name: &'static str) -> Self {
        Self::new(name, AttrType::String)
    }

    pub const fn bool(name: &'static str) -> Self {
        Self::new(name, AttrType::Bool)
    }

    pub const fn integer(name: &'static str) -> Self {
        Self::new(name, AttrType::Integer)
    }

    pub const fn list(name: &'static str) -> Self {
        Self::new(name, AttrType::List)
    }

    pub const fn reference(name: &'static str) -> Self {
        Self::new(name, AttrType::Reference)
    }

    pub const fn default(mut self, default: AttrDefault) -> Self {
        self.default = Some(default);
        self
    }

    pub const fn lazy(mut self) -> Self {
        self.lazy = true;
        self
    }
}

/// Attribute schema of one resource kind.
#[derive(Debug)]
pub struct Schema {
    /// Human readable kind name used in errors and logs.
    pub kind: &'static str,
    pub attributes: &'static [AttributeDef],
}

impl Schema {
    pub fn get(&self, name: &str) -> Option<&AttributeDef> {
        self.attributes.iter().find(|def| def.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn is_lazy(&self, name: &str) -> bool {
        self.get(name).is_some_and(|def| def.lazy)
    }

    /// All attribute names in declaration order.
    pub fn names(&self) -> Vec<&'static str> {
        self.attributes.iter().map(|def| def.name).collect()
    }

    pub fn lazy_names(&self) -> Vec<&'static str> {
        self.attributes
            .iter()
            .filter(|def| def.lazy)
            .map(|def| def.name)
            .collect()
    }

    /// Attributes that take part in change tracking and are requested on
    /// list/get: the schema minus its lazy attributes.
    pub fn tracked_names(&self) -> Vec<&'static str> {
        self.attributes
            .iter()
            .filter(|def| !def.lazy)
            .map(|def| def.name)
            .collect()
    }

    pub fn return_fields(&self) -> Value {
        Value::from(self.tracked_names())
    }

    pub fn full_return_fields(&self) -> Value {
        Value::from(self.names())
    }
}

/// Typed attribute record of a resource kind.
///
/// Implementors are plain serde structs whose field names match the schema.
/// Lazy attributes live outside the struct, so the serialised record only
/// ever carries tracked attributes.
pub trait Attributes:
    Serialize + DeserializeOwned + Clone + Debug + Default + PartialEq + Send + Sync + 'static
{
    const SCHEMA: &'static Schema;

    /// Opaque identity assigned by the remote side.
    fn identity(&self) -> Option<&str> {
        None
    }

    fn name(&self) -> Option<&str> {
        None
    }

    /// Host owning the resource.
    fn computer_name(&self) -> Option<&str> {
        None
    }

    /// Virtual machine owning the resource.
    fn vm_name(&self) -> Option<&str> {
        None
    }

    fn cluster_name(&self) -> Option<&str> {
        None
    }

    /// Network adapter owning the resource.
    fn adapter_name(&self) -> Option<&str> {
        None
    }

    /// Fills attributes the caller left unset from a collection scope.
    fn apply_scope(&mut self, _scope: &Scope) {}

    /// Copies addressing fields the remote reply does not echo back from a
    /// previous copy of the same resource.
    fn carry_address(&mut self, _previous: &Self) {}

    /// Fills unset attributes with their schema defaults.
    fn with_defaults(self) -> Self {
        let mut record = self.to_record();
        let mut filled = false;
        for def in Self::SCHEMA.attributes {
            let Some(default) = def.default else { continue };
            if record.get(def.name).is_none_or(Value::is_null) {
                record.insert(def.name.to_string(), default.to_value());
                filled = true;
            }
        }
        if !filled {
            return self;
        }
        match Self::from_record(record) {
            Ok(filled) => filled,
            Err(e) => {
                debug_assert!(false, "{} defaults do not fit: {e}", Self::SCHEMA.kind);
                self
            }
        }
    }

    fn to_record(&self) -> Record {
        match serde_json::to_value(self) {
            Ok(Value::Object(record)) => record,
            other => {
                debug_assert!(
                    false,
                    "{} attributes did not serialise to a record: {other:?}",
                    Self::SCHEMA.kind
                );
                Record::new()
            }
        }
    }

    fn from_record(record: Record) -> Result<Self> {
        Ok(serde_json::from_value(Value::Object(record))?)
    }
}

/// Fills an unset attribute from a scope value.
pub(crate) fn inherit(slot: &mut Option<String>, value: &Option<String>) {
    if slot.is_none() {
        slot.clone_from(value);
    }
}
