//! Deferred association loads.
//!
//! When row mapping needs an association whose query is already in flight
//! (a cycle in the result graph), the assignment is recorded as a
//! [`DeferredLoad`] and resolved from the local cache once the outermost
//! query completes.

use std::sync::Arc;

use tracing::debug;

use ember_cache::{CacheKey, LocalCache};
use ember_common::error::{EmberError, EmberResult};
use ember_common::types::{ObjectRef, Value, ValueType};

use crate::executor::ResultList;
use crate::reflection::{ObjectFactory, PropertyAccessor};

/// Shape of the value assigned to a deferred property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetType {
    /// The row list itself.
    List,
    /// A factory-created collection holding the distinct rows. Objects
    /// are distinct by identity, other values by equality.
    Set,
    /// An array whose elements must all be of the given type.
    Array(ValueType),
    /// A single value: null for no rows, the row for one row.
    Single(ValueType),
}

/// Converts a cached row list into the value assigned to a property.
#[derive(Clone)]
pub struct ResultExtractor {
    object_factory: Arc<dyn ObjectFactory>,
}

impl ResultExtractor {
    /// Creates an extractor.
    pub fn new(object_factory: Arc<dyn ObjectFactory>) -> Self {
        Self { object_factory }
    }

    /// Extracts a value of the target shape from a row list.
    pub fn extract(&self, rows: &[Value], target: &TargetType) -> EmberResult<Value> {
        match target {
            TargetType::List => Ok(Value::List(rows.to_vec())),
            TargetType::Set => {
                let mut collection = match self.object_factory.create(&ValueType::List)? {
                    Value::List(items) => items,
                    other => {
                        return Err(EmberError::instantiation(
                            "set",
                            format!("object factory produced a {} value", other.value_type()),
                        ))
                    }
                };
                for row in rows {
                    if !collection.iter().any(|existing| same_row(existing, row)) {
                        collection.push(row.clone());
                    }
                }
                Ok(Value::List(collection))
            }
            TargetType::Array(element_type) => {
                if let Some(row) = rows
                    .iter()
                    .find(|row| !row.is_null() && row.value_type() != *element_type)
                {
                    return Err(EmberError::instantiation(
                        format!("{}[]", element_type),
                        format!("element of type {} does not fit", row.value_type()),
                    ));
                }
                Ok(Value::List(rows.to_vec()))
            }
            TargetType::Single(value_type) if self.object_factory.is_collection(value_type) => {
                Ok(Value::List(rows.to_vec()))
            }
            TargetType::Single(_) => match rows {
                [] => Ok(Value::Null),
                [row] => Ok(row.clone()),
                _ => Err(EmberError::TooManyResults {
                    expected: 1,
                    actual: rows.len(),
                }),
            },
        }
    }
}

/// A pending assignment of a cached result to an object property.
///
/// The target object is shared with the result graph, not owned by the
/// load: resolving the load mutates the object every holder sees.
#[derive(Debug, Clone)]
pub struct DeferredLoad {
    result_object: ObjectRef,
    property: String,
    key: CacheKey,
    target_type: TargetType,
}

impl DeferredLoad {
    /// Creates a deferred load.
    pub fn new(
        result_object: ObjectRef,
        property: impl Into<String>,
        key: CacheKey,
        target_type: TargetType,
    ) -> Self {
        Self {
            result_object,
            property: property.into(),
            key,
            target_type,
        }
    }

    /// Returns the property to assign.
    pub fn property(&self) -> &str {
        &self.property
    }

    /// Returns the cache key the value is read from.
    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    /// Returns true if the cache holds a ready result for the key.
    pub fn can_load(&self, cache: &LocalCache<ResultList>) -> bool {
        cache.get_ready(&self.key).is_some()
    }

    /// Assigns the cached result to the property.
    ///
    /// Does nothing if the key is not ready in the cache.
    pub fn load(
        &self,
        cache: &LocalCache<ResultList>,
        extractor: &ResultExtractor,
        accessor: &dyn PropertyAccessor,
    ) -> EmberResult<()> {
        let Some(rows) = cache.get_ready(&self.key) else {
            debug!(property = %self.property, "deferred load has no ready result");
            return Ok(());
        };
        let value = extractor.extract(rows, &self.target_type)?;
        accessor.set_value(
            &Value::Object(self.result_object.clone()),
            &self.property,
            value,
        )
    }
}

fn same_row(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Object(a), Value::Object(b)) => a.ptr_eq(b),
        _ => a == b,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reflection::{DefaultObjectFactory, RecordAccessor};
    use ember_common::types::Record;

    fn extractor() -> ResultExtractor {
        ResultExtractor::new(Arc::new(DefaultObjectFactory::new()))
    }

    fn author(id: i32) -> Value {
        Value::object("Author", [("id", Value::from(id))])
    }

    #[test]
    fn test_extract_list() {
        let rows = vec![author(1), author(2)];
        let value = extractor().extract(&rows, &TargetType::List).unwrap();
        assert_eq!(value.as_list().unwrap().len(), 2);
    }

    #[test]
    fn test_extract_set_dedups() {
        let rows = vec![Value::from(1), Value::from(2), Value::from(1)];
        let value = extractor().extract(&rows, &TargetType::Set).unwrap();
        assert_eq!(value, Value::List(vec![Value::from(1), Value::from(2)]));
    }

    /// Author `id` and a blog referring to each other.
    fn author_with_blog(id: i32) -> Value {
        let author = ObjectRef::new(Record::new("Author"));
        let blog = ObjectRef::new(Record::new("Blog"));
        blog.set("author", Value::Object(author.clone()));
        blog.set("id", Value::from(id));
        author.set("blog", Value::Object(blog));
        author.set("id", Value::from(id));
        Value::Object(author)
    }

    #[test]
    fn test_extract_set_of_cyclic_objects() {
        let first = author_with_blog(1);
        let second = author_with_blog(2);
        let rows = vec![first.clone(), second.clone(), first.clone()];

        let value = extractor().extract(&rows, &TargetType::Set).unwrap();
        let items = value.as_list().unwrap();

        assert_eq!(items.len(), 2);
        assert!(items[0].as_object().unwrap().ptr_eq(first.as_object().unwrap()));
        assert!(items[1].as_object().unwrap().ptr_eq(second.as_object().unwrap()));
    }

    #[test]
    fn test_extract_set_keeps_distinct_objects_with_equal_contents() {
        let rows = vec![author(1), author(1)];
        let value = extractor().extract(&rows, &TargetType::Set).unwrap();
        assert_eq!(value.as_list().unwrap().len(), 2);
    }

    #[test]
    fn test_extract_array_checks_elements() {
        let extractor = extractor();
        let ints = vec![Value::from(1), Value::Null, Value::from(3)];
        assert!(extractor
            .extract(&ints, &TargetType::Array(ValueType::Int))
            .is_ok());

        let mixed = vec![Value::from(1), Value::from("two")];
        let err = extractor
            .extract(&mixed, &TargetType::Array(ValueType::Int))
            .unwrap_err();
        assert!(matches!(err, EmberError::Instantiation { .. }));
    }

    #[test]
    fn test_extract_single() {
        let extractor = extractor();
        let target = TargetType::Single(ValueType::Object("Author".into()));

        assert!(extractor.extract(&[], &target).unwrap().is_null());
        assert_eq!(extractor.extract(&[author(1)], &target).unwrap(), author(1));

        let err = extractor
            .extract(&[author(1), author(2)], &target)
            .unwrap_err();
        assert!(matches!(
            err,
            EmberError::TooManyResults {
                expected: 1,
                actual: 2
            }
        ));
    }

    #[test]
    fn test_extract_single_collection_type() {
        let rows = vec![author(1), author(2)];
        let value = extractor()
            .extract(&rows, &TargetType::Single(ValueType::List))
            .unwrap();
        assert_eq!(value.as_list().unwrap().len(), 2);
    }

    #[test]
    fn test_load_assigns_shared_object() {
        let key = CacheKey::from_parts(["selectAuthor", "1"]);
        let mut cache: LocalCache<ResultList> = LocalCache::new("LocalCache");

        let blog = ObjectRef::new(Record::new("Blog"));
        let in_graph = blog.clone();
        let load = DeferredLoad::new(
            blog,
            "author",
            key.clone(),
            TargetType::Single(ValueType::Object("Author".into())),
        );

        assert!(!load.can_load(&cache));
        cache.put_placeholder(key.clone());
        assert!(!load.can_load(&cache));

        cache.put_ready(key, Arc::new(vec![author(1)]));
        assert!(load.can_load(&cache));

        load.load(&cache, &extractor(), &RecordAccessor::new()).unwrap();
        assert_eq!(in_graph.get("author"), Some(author(1)));
    }

    #[test]
    fn test_load_without_ready_result_is_noop() {
        let cache: LocalCache<ResultList> = LocalCache::new("LocalCache");
        let blog = ObjectRef::new(Record::new("Blog"));
        let load = DeferredLoad::new(
            blog.clone(),
            "author",
            CacheKey::from_parts(["missing"]),
            TargetType::List,
        );
        load.load(&cache, &extractor(), &RecordAccessor::new()).unwrap();
        assert!(blog.get("author").is_none());
    }
}
