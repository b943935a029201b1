//! Executor configuration: settings plus the injected capabilities.

use std::fmt;
use std::sync::Arc;

use ember_common::config::{ExecutorSettings, LocalCacheScope};

use crate::reflection::{
    DefaultObjectFactory, ObjectFactory, PropertyAccessor, RecordAccessor, TypeHandlerRegistry,
    TypeResolver,
};

/// Everything an executor reads but never mutates.
///
/// Shared between all executors of a session factory.
#[derive(Clone)]
pub struct Configuration {
    settings: ExecutorSettings,
    type_resolver: Arc<dyn TypeResolver>,
    property_accessor: Arc<dyn PropertyAccessor>,
    object_factory: Arc<dyn ObjectFactory>,
}

impl Configuration {
    /// Creates a configuration with the default capabilities.
    pub fn new(settings: ExecutorSettings) -> Self {
        Self {
            settings,
            type_resolver: Arc::new(TypeHandlerRegistry::new()),
            property_accessor: Arc::new(RecordAccessor::new()),
            object_factory: Arc::new(DefaultObjectFactory::new()),
        }
    }

    /// Replaces the type resolver.
    pub fn with_type_resolver(mut self, resolver: Arc<dyn TypeResolver>) -> Self {
        self.type_resolver = resolver;
        self
    }

    /// Replaces the property accessor.
    pub fn with_property_accessor(mut self, accessor: Arc<dyn PropertyAccessor>) -> Self {
        self.property_accessor = accessor;
        self
    }

    /// Replaces the object factory.
    pub fn with_object_factory(mut self, factory: Arc<dyn ObjectFactory>) -> Self {
        self.object_factory = factory;
        self
    }

    /// Returns the settings.
    pub fn settings(&self) -> &ExecutorSettings {
        &self.settings
    }

    /// Returns the local-cache scope.
    pub fn local_cache_scope(&self) -> LocalCacheScope {
        self.settings.local_cache_scope
    }

    /// Returns the active environment id.
    pub fn environment_id(&self) -> Option<&str> {
        self.settings.environment_id.as_deref()
    }

    /// Returns the type resolver.
    pub fn type_resolver(&self) -> &dyn TypeResolver {
        self.type_resolver.as_ref()
    }

    /// Returns the property accessor.
    pub fn property_accessor(&self) -> &dyn PropertyAccessor {
        self.property_accessor.as_ref()
    }

    /// Returns a shared handle to the object factory.
    pub fn object_factory(&self) -> Arc<dyn ObjectFactory> {
        Arc::clone(&self.object_factory)
    }
}

impl Default for Configuration {
    fn default() -> Self {
        Self::new(ExecutorSettings::default())
    }
}

impl fmt::Debug for Configuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Configuration")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}
