//! Executor configuration.
//!
//! These settings control local-cache lifetime, the environment folded into
//! cache keys, and how sessions build their executors. They can be loaded
//! from and saved to TOML.

use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Lifetime of entries in the local (first-level) cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LocalCacheScope {
    /// Entries live until the session commits, rolls back, updates, or closes.
    #[default]
    Session,
    /// Entries are discarded when each top-level query returns.
    Statement,
}

/// Execution strategy used by new executors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutorType {
    /// A fresh statement per call.
    #[default]
    Simple,
    /// Prepared statements are reused within the session.
    Reuse,
    /// Updates are buffered and sent on flush.
    Batch,
}

/// Executor settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutorSettings {
    /// Lifetime of local-cache entries.
    #[serde(default)]
    pub local_cache_scope: LocalCacheScope,

    /// Active environment id, folded into every cache key when set.
    #[serde(default)]
    pub environment_id: Option<String>,

    /// Execution strategy for new sessions.
    #[serde(default)]
    pub default_executor_type: ExecutorType,

    /// Statement timeout in seconds applied when a statement sets none.
    #[serde(default)]
    pub default_statement_timeout_secs: Option<u64>,

    /// Whether new sessions open in auto-commit mode.
    #[serde(default)]
    pub auto_commit: bool,
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self {
            local_cache_scope: LocalCacheScope::Session,
            environment_id: None,
            default_executor_type: ExecutorType::Simple,
            default_statement_timeout_secs: None,
            auto_commit: false,
        }
    }
}

impl ExecutorSettings {
    /// Creates a new default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from a file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let settings: Self = toml::from_str(&content)?;
        Ok(settings)
    }

    /// Saves configuration to a file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = self.to_toml()?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(path, content)?;
        Ok(())
    }

    /// Converts configuration to TOML string.
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Returns the default statement timeout.
    pub fn default_statement_timeout(&self) -> Option<Duration> {
        self.default_statement_timeout_secs.map(Duration::from_secs)
    }

    /// Creates a builder for configuration.
    pub fn builder() -> ExecutorSettingsBuilder {
        ExecutorSettingsBuilder::new()
    }
}

/// Builder for executor settings.
#[derive(Default)]
pub struct ExecutorSettingsBuilder {
    settings: ExecutorSettings,
}

impl ExecutorSettingsBuilder {
    /// Creates a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the local-cache scope.
    pub fn local_cache_scope(mut self, scope: LocalCacheScope) -> Self {
        self.settings.local_cache_scope = scope;
        self
    }

    /// Sets the environment id.
    pub fn environment_id(mut self, id: impl Into<String>) -> Self {
        self.settings.environment_id = Some(id.into());
        self
    }

    /// Sets the executor type.
    pub fn default_executor_type(mut self, executor_type: ExecutorType) -> Self {
        self.settings.default_executor_type = executor_type;
        self
    }

    /// Sets the default statement timeout in seconds.
    pub fn default_statement_timeout_secs(mut self, secs: u64) -> Self {
        self.settings.default_statement_timeout_secs = Some(secs);
        self
    }

    /// Enables or disables auto-commit for new sessions.
    pub fn auto_commit(mut self, enabled: bool) -> Self {
        self.settings.auto_commit = enabled;
        self
    }

    /// Builds the configuration.
    pub fn build(self) -> ExecutorSettings {
        self.settings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_settings() {
        let settings = ExecutorSettings::default();
        assert_eq!(settings.local_cache_scope, LocalCacheScope::Session);
        assert_eq!(settings.default_executor_type, ExecutorType::Simple);
        assert!(settings.environment_id.is_none());
        assert!(!settings.auto_commit);
        assert!(settings.default_statement_timeout().is_none());
    }

    #[test]
    fn test_builder() {
        let settings = ExecutorSettings::builder()
            .local_cache_scope(LocalCacheScope::Statement)
            .environment_id("dev")
            .default_executor_type(ExecutorType::Batch)
            .default_statement_timeout_secs(30)
            .auto_commit(true)
            .build();

        assert_eq!(settings.local_cache_scope, LocalCacheScope::Statement);
        assert_eq!(settings.environment_id.as_deref(), Some("dev"));
        assert_eq!(settings.default_executor_type, ExecutorType::Batch);
        assert_eq!(
            settings.default_statement_timeout(),
            Some(Duration::from_secs(30))
        );
        assert!(settings.auto_commit);
    }

    #[test]
    fn test_parse_partial_toml() {
        let settings: ExecutorSettings = toml::from_str(
            r#"
            local_cache_scope = "statement"
            environment_id = "prod"
            "#,
        )
        .unwrap();

        assert_eq!(settings.local_cache_scope, LocalCacheScope::Statement);
        assert_eq!(settings.environment_id.as_deref(), Some("prod"));
        assert_eq!(settings.default_executor_type, ExecutorType::Simple);
    }

    #[test]
    fn test_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("conf").join("ember.toml");

        let settings = ExecutorSettings::builder()
            .environment_id("dev")
            .default_executor_type(ExecutorType::Reuse)
            .build();

        settings.save(&path).unwrap();

        let loaded = ExecutorSettings::from_file(&path).unwrap();
        assert_eq!(loaded, settings);
    }

    #[test]
    fn test_reject_unknown_scope() {
        let parsed: Result<ExecutorSettings, _> = toml::from_str(r#"local_cache_scope = "global""#);
        assert!(parsed.is_err());
    }
}
