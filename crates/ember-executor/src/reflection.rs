//! Capabilities the executor uses to inspect and build values.
//!
//! - [`TypeResolver`] decides whether a parameter is a scalar with a
//!   registered type handler or an object whose properties must be read.
//! - [`PropertyAccessor`] reads and writes (dotted) property paths.
//! - [`ObjectFactory`] creates default instances of a requested type.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use ember_common::error::{EmberError, EmberResult};
use ember_common::types::{ObjectRef, Record, Value, ValueType};

// =============================================================================
// Type resolution
// =============================================================================

/// Answers whether a value type binds directly as a single parameter.
pub trait TypeResolver: Send + Sync {
    /// Returns true if a type handler is registered for the type.
    fn has_type_handler(&self, value_type: &ValueType) -> bool;
}

/// Registry of value types that bind directly.
///
/// Every scalar type is registered by default. Record types can be added
/// for objects that bind as a unit.
#[derive(Debug, Clone)]
pub struct TypeHandlerRegistry {
    types: HashSet<ValueType>,
}

impl TypeHandlerRegistry {
    /// Creates a registry with the scalar types registered.
    pub fn new() -> Self {
        let types = [
            ValueType::Boolean,
            ValueType::Int,
            ValueType::BigInt,
            ValueType::Double,
            ValueType::String,
            ValueType::Bytes,
        ]
        .into_iter()
        .collect();
        Self { types }
    }

    /// Registers an additional type.
    pub fn register(&mut self, value_type: ValueType) {
        self.types.insert(value_type);
    }
}

impl Default for TypeHandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeResolver for TypeHandlerRegistry {
    fn has_type_handler(&self, value_type: &ValueType) -> bool {
        self.types.contains(value_type)
    }
}

// =============================================================================
// Property access
// =============================================================================

/// Reads and writes named properties on values.
pub trait PropertyAccessor: Send + Sync {
    /// Reads a property.
    fn get_value(&self, object: &Value, property: &str) -> EmberResult<Value>;

    /// Writes a property.
    fn set_value(&self, object: &Value, property: &str, value: Value) -> EmberResult<()>;
}

/// Property accessor over [`Record`] fields.
///
/// Paths are dot-separated (`author.name`). A null intermediate value
/// reads as null; reading a missing field or descending into a non-record
/// value is an error. Writes create the final field if it is missing.
#[derive(Debug, Clone, Copy, Default)]
pub struct RecordAccessor;

impl RecordAccessor {
    /// Creates a record accessor.
    pub fn new() -> Self {
        Self
    }

    fn field(object: &Value, segment: &str, path: &str) -> EmberResult<Value> {
        match object {
            Value::Null => Ok(Value::Null),
            Value::Object(record) => record.get(segment).ok_or_else(|| {
                EmberError::reflection(
                    path,
                    format!(
                        "there is no property named '{}' in '{}'",
                        segment,
                        record.type_name()
                    ),
                )
            }),
            other => Err(EmberError::reflection(
                path,
                format!("cannot read '{}' from a {} value", segment, other.value_type()),
            )),
        }
    }
}

impl PropertyAccessor for RecordAccessor {
    fn get_value(&self, object: &Value, property: &str) -> EmberResult<Value> {
        let mut current = object.clone();
        for segment in property.split('.') {
            current = Self::field(&current, segment, property)?;
        }
        Ok(current)
    }

    fn set_value(&self, object: &Value, property: &str, value: Value) -> EmberResult<()> {
        let (parent, name) = match property.rsplit_once('.') {
            Some((parent_path, name)) => (self.get_value(object, parent_path)?, name),
            None => (object.clone(), property),
        };

        match parent {
            Value::Object(record) => {
                record.set(name, value);
                Ok(())
            }
            Value::Null => Err(EmberError::reflection(
                property,
                "cannot set a property on a null value",
            )),
            other => Err(EmberError::reflection(
                property,
                format!("cannot set '{}' on a {} value", name, other.value_type()),
            )),
        }
    }
}

// =============================================================================
// Object creation
// =============================================================================

/// Constructor for a registered record type.
pub type RecordConstructor = Arc<dyn Fn() -> Record + Send + Sync>;

/// Creates default instances of requested types.
pub trait ObjectFactory: Send + Sync {
    /// Creates a default instance of the type.
    fn create(&self, value_type: &ValueType) -> EmberResult<Value>;

    /// Returns true if instances of the type hold multiple values.
    fn is_collection(&self, value_type: &ValueType) -> bool;
}

/// Default object factory.
///
/// Scalars are created as their zero value and lists as empty lists.
/// Record types use a registered constructor when one exists and an empty
/// record of that type otherwise. Null cannot be instantiated.
#[derive(Default)]
pub struct DefaultObjectFactory {
    constructors: RwLock<HashMap<String, RecordConstructor>>,
}

impl DefaultObjectFactory {
    /// Creates a factory with no registered constructors.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a constructor for a record type.
    pub fn register<F>(&self, type_name: impl Into<String>, constructor: F)
    where
        F: Fn() -> Record + Send + Sync + 'static,
    {
        self.constructors
            .write()
            .insert(type_name.into(), Arc::new(constructor));
    }
}

impl ObjectFactory for DefaultObjectFactory {
    fn create(&self, value_type: &ValueType) -> EmberResult<Value> {
        let value = match value_type {
            ValueType::Null => {
                return Err(EmberError::instantiation("null", "null has no instances"))
            }
            ValueType::Boolean => Value::Boolean(false),
            ValueType::Int => Value::Int(0),
            ValueType::BigInt => Value::BigInt(0),
            ValueType::Double => Value::Double(0.0),
            ValueType::String => Value::String(String::new()),
            ValueType::Bytes => Value::Bytes(Vec::new()),
            ValueType::List => Value::List(Vec::new()),
            ValueType::Object(name) => {
                let constructor = self.constructors.read().get(name).cloned();
                let record = match constructor {
                    Some(constructor) => constructor(),
                    None => Record::new(name.clone()),
                };
                if record.type_name() != name {
                    return Err(EmberError::instantiation(
                        name.clone(),
                        format!("constructor produced a '{}'", record.type_name()),
                    ));
                }
                Value::Object(ObjectRef::new(record))
            }
        };
        Ok(value)
    }

    fn is_collection(&self, value_type: &ValueType) -> bool {
        matches!(value_type, ValueType::List)
    }
}

impl fmt::Debug for DefaultObjectFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let constructors = self.constructors.read();
        f.debug_struct("DefaultObjectFactory")
            .field("registered", &constructors.keys().collect::<Vec<_>>())
            .finish()
    }
}
