//! Process-wide, additive-only registry mapping canonical type names to
//! singleton `Type` values. Used to resolve a field's `type` program result
//! (e.g. `"uint16"`) to a concrete `Type`.

use std::collections::HashMap;
use std::sync::RwLock;

use once_cell::sync::Lazy;

use super::{Kind, Type};
use crate::error::{bail, Result};

static REGISTRY: Lazy<RwLock<HashMap<String, Type>>> = Lazy::new(|| {
    let mut m = HashMap::new();
    for (name, kind) in [
        ("bool", Kind::Bool),
        ("int8", Kind::Int8),
        ("int16", Kind::Int16),
        ("int32", Kind::Int32),
        ("int64", Kind::Int64),
        ("uint8", Kind::Uint8),
        ("byte", Kind::Uint8),
        ("uint16", Kind::Uint16),
        ("uint32", Kind::Uint32),
        ("uint64", Kind::Uint64),
        ("float32", Kind::Float32),
        ("float64", Kind::Float64),
        ("uvarint", Kind::UVarint),
        ("varint", Kind::Varint),
        ("string", Kind::String),
    ] {
        m.insert(name.to_string(), Type::basic(kind));
    }
    RwLock::new(m)
});

/// The `Types` registry named by schema Invariant 6.
pub struct Types;

impl Types {
    /// Look up a canonical name (`"int32"`, `"byte"`, ...).
    pub fn get(name: &str) -> Option<Type> {
        REGISTRY.read().expect("types registry poisoned").get(name).cloned()
    }

    /// Register a new canonical name. The registry is additive: redefining
    /// an existing name is a schema-invariant error.
    pub fn register(name: impl Into<String>, ty: Type) -> Result<()> {
        let name = name.into();
        let mut reg = REGISTRY.write().expect("types registry poisoned");
        if reg.contains_key(&name) {
            bail!(schema, "type {name:?} is already registered");
        }
        reg.insert(name, ty);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_names_resolve() {
        assert_eq!(Types::get("uint16").unwrap().kind, Kind::Uint16);
        assert_eq!(Types::get("byte").unwrap().kind, Kind::Uint8);
        assert!(Types::get("nonexistent").is_none());
    }

    #[test]
    fn register_is_additive_only() {
        Types::register("my_custom_marker_type", Type::basic(Kind::Uint8)).unwrap();
        assert!(Types::get("my_custom_marker_type").is_some());
        assert!(Types::register("my_custom_marker_type", Type::basic(Kind::Uint8)).is_err());
    }
}
