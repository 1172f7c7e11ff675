use std::env;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

pub const ENV_MAX_CONCURRENCY: &str = "FIXPOOL_MAX_CONCURRENCY";
pub const ENV_THREAD_NAME_PREFIX: &str = "FIXPOOL_THREAD_NAME_PREFIX";
pub const ENV_STACK_SIZE: &str = "FIXPOOL_STACK_SIZE";

// ── Scheduler config ──────────────────────────────────────────

/// Scheduler configuration, typically parsed from TOML and/or the environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Upper bound on live worker threads. 0 = available parallelism.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    /// Worker threads are named `{prefix}-{index}`.
    #[serde(default = "default_thread_name_prefix")]
    pub thread_name_prefix: String,
    /// Stack size in bytes for worker threads (platform default when unset).
    #[serde(default)]
    pub stack_size: Option<usize>,
}

fn default_max_concurrency() -> usize { 0 }
fn default_thread_name_prefix() -> String { "fixpool-worker".to_string() }

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
            thread_name_prefix: default_thread_name_prefix(),
            stack_size: None,
        }
    }
}

impl SchedulerConfig {
    /// Config with an explicit concurrency bound and defaults elsewhere.
    pub fn with_max_concurrency(max_concurrency: usize) -> Self {
        Self {
            max_concurrency,
            ..Self::default()
        }
    }

    /// Build config from environment variables (call `load_dotenv()` first).
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse config from a TOML string, then apply env overrides.
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        let mut config: Self = toml::from_str(toml_str)?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Load config from a file path.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml(&content)
    }

    /// Override fields from `FIXPOOL_*` environment variables.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides_with(env_opt)
    }

    /// Override fields from an arbitrary key lookup. Unset keys leave fields untouched.
    pub fn apply_overrides_with<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup(ENV_MAX_CONCURRENCY) {
            self.max_concurrency = parse_usize(ENV_MAX_CONCURRENCY, &v)?;
        }
        if let Some(v) = lookup(ENV_THREAD_NAME_PREFIX) {
            self.thread_name_prefix = v;
        }
        if let Some(v) = lookup(ENV_STACK_SIZE) {
            self.stack_size = Some(parse_usize(ENV_STACK_SIZE, &v)?);
        }
        Ok(())
    }

    /// Resolve the concurrency bound (0 means use available parallelism).
    pub fn resolved_max_concurrency(&self) -> usize {
        if self.max_concurrency == 0 {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4)
        } else {
            self.max_concurrency
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.thread_name_prefix.trim().is_empty() {
            return Err(ConfigError::Invalid("thread_name_prefix must not be empty".into()));
        }
        if self.stack_size == Some(0) {
            return Err(ConfigError::Invalid("stack_size must be > 0".into()));
        }
        Ok(())
    }

    /// Print a summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!(
            max_concurrency = self.resolved_max_concurrency(),
            thread_name_prefix = %self.thread_name_prefix,
            stack_size = ?self.stack_size,
            "scheduler config loaded"
        );
    }
}

fn parse_usize(key: &str, value: &str) -> Result<usize, ConfigError> {
    value.trim().parse().map_err(|_| {
        ConfigError::Invalid(format!("{key}: expected unsigned integer, got {value:?}"))
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::io::Write;

    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults() {
        let config = SchedulerConfig::default();
        assert_eq!(config.max_concurrency, 0);
        assert_eq!(config.thread_name_prefix, "fixpool-worker");
        assert_eq!(config.stack_size, None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn resolved_max_concurrency() {
        let mut config = SchedulerConfig::default();
        // 0 means auto-detect
        assert!(config.resolved_max_concurrency() > 0);

        config.max_concurrency = 3;
        assert_eq!(config.resolved_max_concurrency(), 3);
    }

    #[test]
    fn parse_partial_toml_keeps_defaults() {
        let config: SchedulerConfig = toml::from_str("max_concurrency = 8").unwrap();
        assert_eq!(config.max_concurrency, 8);
        assert_eq!(config.thread_name_prefix, "fixpool-worker");
    }

    #[test]
    fn parse_full_toml() {
        let config: SchedulerConfig = toml::from_str(
            r#"
            max_concurrency = 2
            thread_name_prefix = "manifest"
            stack_size = 1048576
            "#,
        )
        .unwrap();
        assert_eq!(config.max_concurrency, 2);
        assert_eq!(config.thread_name_prefix, "manifest");
        assert_eq!(config.stack_size, Some(1_048_576));
    }

    #[test]
    fn malformed_toml_is_parse_error() {
        let err = toml::from_str::<SchedulerConfig>("max_concurrency = \"lots\"").unwrap_err();
        let err = ConfigError::from(err);
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn overrides_replace_fields() {
        let mut config = SchedulerConfig::with_max_concurrency(1);
        config
            .apply_overrides_with(lookup_from(&[
                (ENV_MAX_CONCURRENCY, "6"),
                (ENV_THREAD_NAME_PREFIX, "io"),
                (ENV_STACK_SIZE, "65536"),
            ]))
            .unwrap();
        assert_eq!(config.max_concurrency, 6);
        assert_eq!(config.thread_name_prefix, "io");
        assert_eq!(config.stack_size, Some(65536));
    }

    #[test]
    fn overrides_leave_unset_fields() {
        let mut config = SchedulerConfig::with_max_concurrency(5);
        config.apply_overrides_with(lookup_from(&[])).unwrap();
        assert_eq!(config, SchedulerConfig::with_max_concurrency(5));
    }

    #[test]
    fn override_with_garbage_is_invalid() {
        let mut config = SchedulerConfig::default();
        let err = config
            .apply_overrides_with(lookup_from(&[(ENV_MAX_CONCURRENCY, "-2")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn validate_rejects_empty_prefix_and_zero_stack() {
        let mut config = SchedulerConfig::default();
        config.thread_name_prefix = "  ".into();
        assert!(config.validate().is_err());

        let mut config = SchedulerConfig::default();
        config.stack_size = Some(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn from_file_reads_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "thread_name_prefix = \"from-file\"").unwrap();
        writeln!(file, "max_concurrency = 3").unwrap();

        let config = SchedulerConfig::from_file(file.path()).unwrap();
        assert_eq!(config.thread_name_prefix, "from-file");
    }

    #[test]
    fn from_file_missing_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = SchedulerConfig::from_file(dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
