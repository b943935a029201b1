//! Records and shared record handles.
//!
//! Mapped result objects are graphs: a deferred association load assigns a
//! property on an object that already sits inside a cached result list.
//! `ObjectRef` gives records the shared, mutable identity that requires.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::value::Value;

/// A named record type with string-keyed fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Name of the record type.
    type_name: String,
    /// Field values, ordered by name.
    fields: BTreeMap<String, Value>,
}

impl Record {
    /// Creates an empty record of the given type.
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            fields: BTreeMap::new(),
        }
    }

    /// Returns the record type name.
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Returns the value of a field.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Sets a field, returning the previous value.
    pub fn set(&mut self, name: impl Into<String>, value: Value) -> Option<Value> {
        self.fields.insert(name.into(), value)
    }

    /// Returns true if the record has a field with the given name.
    pub fn has_field(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    /// Returns the field names in order.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    /// Returns the number of fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns true if the record has no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Returns a hash that is stable across processes.
    ///
    /// Records nested in fields contribute only their type name, so the
    /// hash of a cyclic graph terminates.
    pub fn stable_hash(&self) -> i32 {
        let fields = self.fields.iter().fold(0i32, |acc, (name, value)| {
            let name_hash = Value::String(name.clone()).stable_hash();
            acc.wrapping_add(name_hash ^ value.member_hash())
        });
        Value::String(self.type_name.clone())
            .stable_hash()
            .wrapping_mul(31)
            .wrapping_add(fields)
    }
}

/// Copies made so far during one deep clone, keyed by source record address.
pub(crate) type CloneMap = HashMap<usize, ObjectRef>;

/// A shared handle to a mutable record.
///
/// Cloning the handle shares the record; use [`ObjectRef::deep_clone`] for
/// an independent copy. Two handles are equal when they point at the same
/// record or at records with equal contents. Comparison, hashing, and
/// deep cloning all terminate on cyclic graphs.
#[derive(Clone)]
pub struct ObjectRef(Arc<RwLock<Record>>);

impl ObjectRef {
    /// Wraps a record in a new shared handle.
    pub fn new(record: Record) -> Self {
        Self(Arc::new(RwLock::new(record)))
    }

    /// Returns the record type name.
    pub fn type_name(&self) -> String {
        self.0.read_recursive().type_name.clone()
    }

    /// Locks the record for reading.
    pub fn read(&self) -> RwLockReadGuard<'_, Record> {
        self.0.read()
    }

    /// Locks the record for reading while this thread may already hold
    /// a read lock on it.
    pub(crate) fn read_recursive(&self) -> RwLockReadGuard<'_, Record> {
        self.0.read_recursive()
    }

    /// Locks the record for writing.
    pub fn write(&self) -> RwLockWriteGuard<'_, Record> {
        self.0.write()
    }

    /// Returns a copy of a field value.
    pub fn get(&self, name: &str) -> Option<Value> {
        self.0.read().get(name).cloned()
    }

    /// Sets a field, returning the previous value.
    pub fn set(&self, name: impl Into<String>, value: Value) -> Option<Value> {
        self.0.write().set(name, value)
    }

    /// Returns true if both handles point at the same record.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Returns a handle to an independent copy of the record graph.
    ///
    /// Sharing and cycles in the source graph are reproduced in the copy.
    pub fn deep_clone(&self) -> Self {
        self.deep_clone_in(&mut CloneMap::new())
    }

    pub(crate) fn deep_clone_in(&self, copies: &mut CloneMap) -> Self {
        if let Some(copy) = copies.get(&self.addr()) {
            return copy.clone();
        }
        let source = self.0.read_recursive();
        let copy = Self::new(Record::new(source.type_name.clone()));
        copies.insert(self.addr(), copy.clone());
        for (name, value) in &source.fields {
            let value = value.deep_clone_in(copies);
            copy.0.write().fields.insert(name.clone(), value);
        }
        copy
    }

    fn addr(&self) -> usize {
        Arc::as_ptr(&self.0) as usize
    }
}

thread_local! {
    /// Record pairs under comparison on this thread, outermost first.
    static COMPARING: RefCell<Vec<(usize, usize)>> = const { RefCell::new(Vec::new()) };
}

/// Marks a record pair as under comparison until dropped.
struct ComparisonGuard((usize, usize));

impl ComparisonGuard {
    /// Returns `None` if the pair is already being compared further up.
    fn enter(pair: (usize, usize)) -> Option<Self> {
        COMPARING.with(|comparing| {
            let mut comparing = comparing.borrow_mut();
            if comparing.contains(&pair) {
                None
            } else {
                comparing.push(pair);
                Some(Self(pair))
            }
        })
    }
}

impl Drop for ComparisonGuard {
    fn drop(&mut self) {
        COMPARING.with(|comparing| {
            let mut comparing = comparing.borrow_mut();
            if let Some(pos) = comparing.iter().rposition(|pair| *pair == self.0) {
                comparing.remove(pos);
            }
        });
    }
}

impl PartialEq for ObjectRef {
    fn eq(&self, other: &Self) -> bool {
        if self.ptr_eq(other) {
            return true;
        }
        // A pair met again inside its own comparison is taken as equal; any
        // difference is found where the outer comparison continues.
        match ComparisonGuard::enter((self.addr(), other.addr())) {
            None => true,
            Some(_guard) => *self.0.read_recursive() == *other.0.read_recursive(),
        }
    }
}

impl Eq for ObjectRef {}

impl fmt::Debug for ObjectRef {
    // Field values are omitted: result graphs may be cyclic.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let record = self.0.read();
        write!(f, "{}@{:p}", record.type_name, Arc::as_ptr(&self.0))?;
        f.debug_set().entries(record.field_names()).finish()
    }
}

impl From<Record> for ObjectRef {
    fn from(record: Record) -> Self {
        Self::new(record)
    }
}
