//! Named statement lookup.

use std::collections::HashMap;
use std::sync::Arc;

use ember_common::error::{EmberError, EmberResult};
use ember_executor::MappedStatement;

/// The statements a session factory can run, keyed by id.
#[derive(Debug, Default)]
pub struct StatementRegistry {
    statements: HashMap<String, Arc<MappedStatement>>,
}

impl StatementRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a statement. Ids must be unique.
    pub fn add(&mut self, statement: MappedStatement) -> EmberResult<()> {
        if self.statements.contains_key(statement.id()) {
            return Err(EmberError::configuration(format!(
                "statement '{}' is already registered",
                statement.id()
            )));
        }
        self.statements
            .insert(statement.id().to_string(), Arc::new(statement));
        Ok(())
    }

    /// Adds a statement, builder style.
    pub fn with(mut self, statement: MappedStatement) -> EmberResult<Self> {
        self.add(statement)?;
        Ok(self)
    }

    /// Looks up a statement by id.
    pub fn get(&self, id: &str) -> EmberResult<Arc<MappedStatement>> {
        self.statements
            .get(id)
            .cloned()
            .ok_or_else(|| EmberError::configuration(format!("no statement registered as '{}'", id)))
    }

    /// Returns true if a statement with the id exists.
    pub fn contains(&self, id: &str) -> bool {
        self.statements.contains_key(id)
    }

    /// Returns the number of statements.
    pub fn len(&self) -> usize {
        self.statements.len()
    }

    /// Returns true if no statements are registered.
    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ember_executor::StaticSqlSource;

    fn statement(id: &str) -> MappedStatement {
        MappedStatement::builder(id, Arc::new(StaticSqlSource::new("SELECT 1", vec![]))).build()
    }

    #[test]
    fn test_add_and_get() {
        let registry = StatementRegistry::new()
            .with(statement("getUser"))
            .unwrap()
            .with(statement("listUsers"))
            .unwrap();

        assert_eq!(registry.len(), 2);
        assert!(registry.contains("getUser"));
        assert_eq!(registry.get("listUsers").unwrap().id(), "listUsers");
    }

    #[test]
    fn test_unknown_statement() {
        let registry = StatementRegistry::new();
        let err = registry.get("missing").unwrap_err();
        assert!(matches!(err, EmberError::Configuration { .. }));
    }

    #[test]
    fn test_duplicate_statement() {
        let mut registry = StatementRegistry::new();
        registry.add(statement("getUser")).unwrap();
        assert!(registry.add(statement("getUser")).is_err());
        assert_eq!(registry.len(), 1);
    }
}
