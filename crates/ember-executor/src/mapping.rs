//! Statement metadata consumed by the executor.
//!
//! A [`MappedStatement`] describes one named statement: its identity, the
//! resource it was declared in, how it is executed, and the [`SqlSource`]
//! that turns a parameter object into [`BoundSql`].

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use ember_common::constants::{NO_ROW_LIMIT, NO_ROW_OFFSET};
use ember_common::error::EmberResult;
use ember_common::types::{Value, ValueType};

/// How a statement is sent to the database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StatementKind {
    /// Plain statement with inlined SQL.
    Statement,
    /// Prepared statement with bound parameters.
    #[default]
    Prepared,
    /// Stored-procedure call with IN/OUT/INOUT parameters.
    Callable,
}

/// The kind of SQL command a statement issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SqlCommandType {
    /// Unknown command.
    #[default]
    Unknown,
    /// INSERT.
    Insert,
    /// UPDATE.
    Update,
    /// DELETE.
    Delete,
    /// SELECT.
    Select,
    /// FLUSH (batch flush marker).
    Flush,
}

/// Direction of a bound parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParameterMode {
    /// Input only.
    #[default]
    In,
    /// Output only.
    Out,
    /// Input and output.
    InOut,
}

/// One parameter binding in [`BoundSql`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterMapping {
    /// Property path the value is read from (and written back to for
    /// OUT/INOUT parameters).
    property: String,
    /// Direction.
    mode: ParameterMode,
    /// Declared value type, if any.
    value_type: Option<ValueType>,
}

impl ParameterMapping {
    /// Creates a mapping with the given mode.
    pub fn new(property: impl Into<String>, mode: ParameterMode) -> Self {
        Self {
            property: property.into(),
            mode,
            value_type: None,
        }
    }

    /// Creates an IN mapping.
    pub fn input(property: impl Into<String>) -> Self {
        Self::new(property, ParameterMode::In)
    }

    /// Creates an OUT mapping.
    pub fn output(property: impl Into<String>) -> Self {
        Self::new(property, ParameterMode::Out)
    }

    /// Creates an INOUT mapping.
    pub fn in_out(property: impl Into<String>) -> Self {
        Self::new(property, ParameterMode::InOut)
    }

    /// Sets the declared value type.
    pub fn with_value_type(mut self, value_type: ValueType) -> Self {
        self.value_type = Some(value_type);
        self
    }

    /// Returns the property path.
    pub fn property(&self) -> &str {
        &self.property
    }

    /// Returns the direction.
    pub fn mode(&self) -> ParameterMode {
        self.mode
    }

    /// Returns the declared value type.
    pub fn value_type(&self) -> Option<&ValueType> {
        self.value_type.as_ref()
    }
}

/// Final SQL text plus its ordered parameter bindings.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundSql {
    /// SQL with placeholders.
    sql: String,
    /// Ordered parameter bindings.
    parameter_mappings: Vec<ParameterMapping>,
    /// The parameter object the SQL was bound from.
    parameter_object: Option<Value>,
    /// Values computed while building the SQL (loop variables and the
    /// like), consulted before the parameter object.
    additional_parameters: HashMap<String, Value>,
}

impl BoundSql {
    /// Creates bound SQL.
    pub fn new(
        sql: impl Into<String>,
        parameter_mappings: Vec<ParameterMapping>,
        parameter_object: Option<Value>,
    ) -> Self {
        Self {
            sql: sql.into(),
            parameter_mappings,
            parameter_object,
            additional_parameters: HashMap::new(),
        }
    }

    /// Returns the SQL text.
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Returns the ordered parameter bindings.
    pub fn parameter_mappings(&self) -> &[ParameterMapping] {
        &self.parameter_mappings
    }

    /// Returns the parameter object.
    pub fn parameter_object(&self) -> Option<&Value> {
        self.parameter_object.as_ref()
    }

    /// Sets an additional parameter.
    pub fn set_additional_parameter(&mut self, name: impl Into<String>, value: Value) {
        self.additional_parameters.insert(name.into(), value);
    }

    /// Returns true if the first segment of a property path names an
    /// additional parameter.
    ///
    /// `item.name` is resolved against the additional parameter `item`.
    pub fn has_additional_parameter(&self, property: &str) -> bool {
        self.additional_parameters
            .contains_key(split_root(property).0)
    }

    /// Returns the additional parameter named by the first segment of a
    /// property path, together with the remaining path.
    pub fn additional_parameter_root<'a>(
        &'a self,
        property: &'a str,
    ) -> Option<(&'a Value, Option<&'a str>)> {
        let (root, rest) = split_root(property);
        self.additional_parameters.get(root).map(|value| (value, rest))
    }
}

/// Splits `a.b.c` into `("a", Some("b.c"))`.
fn split_root(property: &str) -> (&str, Option<&str>) {
    match property.split_once('.') {
        Some((root, rest)) => (root, Some(rest)),
        None => (property, None),
    }
}

/// Produces [`BoundSql`] for a parameter object.
pub trait SqlSource: Send + Sync {
    /// Binds the statement's SQL for the given parameter object.
    fn bound_sql(&self, parameter: Option<&Value>) -> EmberResult<BoundSql>;
}

/// SQL source whose text and bindings do not depend on the parameter.
#[derive(Debug, Clone)]
pub struct StaticSqlSource {
    sql: String,
    parameter_mappings: Vec<ParameterMapping>,
}

impl StaticSqlSource {
    /// Creates a static SQL source.
    pub fn new(sql: impl Into<String>, parameter_mappings: Vec<ParameterMapping>) -> Self {
        Self {
            sql: sql.into(),
            parameter_mappings,
        }
    }
}

impl SqlSource for StaticSqlSource {
    fn bound_sql(&self, parameter: Option<&Value>) -> EmberResult<BoundSql> {
        Ok(BoundSql::new(
            self.sql.clone(),
            self.parameter_mappings.clone(),
            parameter.cloned(),
        ))
    }
}

/// Pagination bounds applied to a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RowBounds {
    offset: i32,
    limit: i32,
}

impl RowBounds {
    /// No pagination.
    pub const DEFAULT: RowBounds = RowBounds {
        offset: NO_ROW_OFFSET,
        limit: NO_ROW_LIMIT,
    };

    /// Creates row bounds.
    pub fn new(offset: i32, limit: i32) -> Self {
        Self { offset, limit }
    }

    /// Returns the number of rows to skip.
    pub fn offset(&self) -> i32 {
        self.offset
    }

    /// Returns the maximum number of rows.
    pub fn limit(&self) -> i32 {
        self.limit
    }

    /// Returns true if no pagination is applied.
    pub fn is_default(&self) -> bool {
        *self == Self::DEFAULT
    }
}

impl Default for RowBounds {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// A named statement and everything needed to execute it.
#[derive(Clone)]
pub struct MappedStatement {
    id: String,
    resource: String,
    kind: StatementKind,
    command_type: SqlCommandType,
    flush_cache_required: bool,
    timeout: Option<Duration>,
    sql_source: Arc<dyn SqlSource>,
}

impl MappedStatement {
    /// Creates a builder for a statement with the given id.
    pub fn builder(id: impl Into<String>, sql_source: Arc<dyn SqlSource>) -> MappedStatementBuilder {
        MappedStatementBuilder::new(id, sql_source)
    }

    /// Returns the statement id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns the resource the statement was declared in.
    pub fn resource(&self) -> &str {
        &self.resource
    }

    /// Returns how the statement is executed.
    pub fn kind(&self) -> StatementKind {
        self.kind
    }

    /// Returns the SQL command type.
    pub fn command_type(&self) -> SqlCommandType {
        self.command_type
    }

    /// Returns true if the local cache must be cleared before this
    /// statement runs as a top-level query.
    pub fn flush_cache_required(&self) -> bool {
        self.flush_cache_required
    }

    /// Returns the statement's own timeout.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Binds the statement's SQL for a parameter object.
    pub fn bound_sql(&self, parameter: Option<&Value>) -> EmberResult<BoundSql> {
        self.sql_source.bound_sql(parameter)
    }
}

impl fmt::Debug for MappedStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MappedStatement")
            .field("id", &self.id)
            .field("resource", &self.resource)
            .field("kind", &self.kind)
            .field("command_type", &self.command_type)
            .field("flush_cache_required", &self.flush_cache_required)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

/// Builder for [`MappedStatement`].
pub struct MappedStatementBuilder {
    statement: MappedStatement,
    flush_cache_required: Option<bool>,
}

impl MappedStatementBuilder {
    fn new(id: impl Into<String>, sql_source: Arc<dyn SqlSource>) -> Self {
        Self {
            statement: MappedStatement {
                id: id.into(),
                resource: String::new(),
                kind: StatementKind::default(),
                command_type: SqlCommandType::default(),
                flush_cache_required: false,
                timeout: None,
                sql_source,
            },
            flush_cache_required: None,
        }
    }

    /// Sets the declaring resource.
    pub fn resource(mut self, resource: impl Into<String>) -> Self {
        self.statement.resource = resource.into();
        self
    }

    /// Sets the statement kind.
    pub fn kind(mut self, kind: StatementKind) -> Self {
        self.statement.kind = kind;
        self
    }

    /// Sets the command type.
    pub fn command_type(mut self, command_type: SqlCommandType) -> Self {
        self.statement.command_type = command_type;
        self
    }

    /// Overrides the flush-before-read flag.
    ///
    /// Defaults to true for every command except SELECT.
    pub fn flush_cache_required(mut self, required: bool) -> Self {
        self.flush_cache_required = Some(required);
        self
    }

    /// Sets the statement timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.statement.timeout = Some(timeout);
        self
    }

    /// Builds the statement.
    pub fn build(mut self) -> MappedStatement {
        self.statement.flush_cache_required = self
            .flush_cache_required
            .unwrap_or(self.statement.command_type != SqlCommandType::Select);
        self.statement
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(sql: &str) -> Arc<dyn SqlSource> {
        Arc::new(StaticSqlSource::new(sql, vec![ParameterMapping::input("id")]))
    }

    #[test]
    fn test_builder_defaults() {
        let select = MappedStatement::builder("getUser", source("SELECT 1"))
            .command_type(SqlCommandType::Select)
            .build();
        assert!(!select.flush_cache_required());
        assert_eq!(select.kind(), StatementKind::Prepared);

        let update = MappedStatement::builder("updateUser", source("UPDATE users"))
            .command_type(SqlCommandType::Update)
            .build();
        assert!(update.flush_cache_required());

        let forced = MappedStatement::builder("getFresh", source("SELECT 1"))
            .command_type(SqlCommandType::Select)
            .flush_cache_required(true)
            .resource("UserMapper.xml")
            .build();
        assert!(forced.flush_cache_required());
        assert_eq!(forced.resource(), "UserMapper.xml");
    }

    #[test]
    fn test_static_bound_sql() {
        let statement = MappedStatement::builder("getUser", source("SELECT * FROM users WHERE id=?"))
            .build();
        let param = Value::from(5);
        let bound = statement.bound_sql(Some(&param)).unwrap();
        assert_eq!(bound.sql(), "SELECT * FROM users WHERE id=?");
        assert_eq!(bound.parameter_mappings().len(), 1);
        assert_eq!(bound.parameter_object(), Some(&param));
    }

    #[test]
    fn test_additional_parameters() {
        let mut bound = BoundSql::new("SELECT ?", vec![], None);
        bound.set_additional_parameter("item", Value::object("Tag", [("name", Value::from("rust"))]));

        assert!(bound.has_additional_parameter("item"));
        assert!(bound.has_additional_parameter("item.name"));
        assert!(!bound.has_additional_parameter("other"));

        let (root, rest) = bound.additional_parameter_root("item.name").unwrap();
        assert_eq!(root.value_type(), ValueType::Object("Tag".to_string()));
        assert_eq!(rest, Some("name"));

        let path = format!("{}.{}", "item", "tags.first");
        let (_, rest) = bound.additional_parameter_root(&path).unwrap();
        assert_eq!(rest, Some("tags.first"));
        assert!(bound.additional_parameter_root("missing.name").is_none());
    }

    #[test]
    fn test_row_bounds() {
        assert!(RowBounds::default().is_default());
        assert_eq!(RowBounds::DEFAULT.limit(), i32::MAX);
        let page = RowBounds::new(20, 10);
        assert_eq!(page.offset(), 20);
        assert!(!page.is_default());
    }
}
