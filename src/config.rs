//! Query layer configuration.
//!
//! This exposes [`QueryConfig`] so applications can load settings from
//! `config/config.toml` or environment variables using
//! `QueryConfig::load()`. The config value is threaded explicitly into
//! list constructors; there is no global feature-flag lookup inside the
//! query layer itself.

use config::{Config, ConfigError, Environment, File};
use once_cell::sync::Lazy;
use serde::Deserialize;

/// Settings for query composition.
#[derive(Debug, Clone, Deserialize)]
pub struct QueryConfig {
    /// When set, ID collections consisting entirely of non-negative
    /// integers are inlined into IN-predicates as literal SQL text instead
    /// of bound placeholders. Any non-integer or negative member of the
    /// collection forces the parameterized path regardless of this flag.
    #[serde(default = "default_inline_integer_ids")]
    pub inline_integer_ids: bool,
}

fn default_inline_integer_ids() -> bool {
    true
}

impl Default for QueryConfig {
    fn default() -> Self {
        QueryConfig {
            inline_integer_ids: default_inline_integer_ids(),
        }
    }
}

static PROCESS_DEFAULT: Lazy<QueryConfig> = Lazy::new(|| QueryConfig::load().unwrap_or_default());

impl QueryConfig {
    /// The process-wide configuration, loaded once and cached. Falls back
    /// to defaults when no config file or environment override exists.
    pub fn process_default() -> &'static QueryConfig {
        &PROCESS_DEFAULT
    }

    /// Load the query configuration from `config/config.toml`, falling back
    /// to environment variables with the `SANDBAR` prefix.
    pub fn load() -> Result<Self, ConfigError> {
        // Build configuration by reading the TOML file (optional) and environment variables
        let builder = Config::builder()
            .add_source(File::with_name("config/config.toml").required(false))
            .add_source(Environment::with_prefix("SANDBAR").separator("__"));

        let settings = match builder.build() {
            Ok(cfg) => cfg,
            Err(err) => {
                // If the file existed but was unreadable (parse error, permission issue, etc.), warn and retry with env only
                if std::path::Path::new("config/config.toml").exists() {
                    log::warn!("failed to load config file, falling back to env: {err}");
                }
                Config::builder()
                    .add_source(Environment::with_prefix("SANDBAR").separator("__"))
                    .build()
                    .map_err(|env_err| {
                        ConfigError::Message(format!(
                            "Failed to load configuration from file and env: {err}, then env-only error: {env_err}"
                        ))
                    })?
            }
        };

        match settings.get::<QueryConfig>("query") {
            Ok(cfg) => Ok(cfg),
            // A config source with no [query] section means defaults, not an error
            Err(ConfigError::NotFound(_)) => Ok(QueryConfig::default()),
            Err(e) => Err(ConfigError::Message(format!(
                "Query configuration could not be loaded from file or environment: {e}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_inlines_integer_ids() {
        let cfg = QueryConfig::default();
        assert!(cfg.inline_integer_ids);
    }

    #[test]
    fn test_load_without_sources_uses_defaults() {
        // No config/config.toml in the test working directory and no env
        // override: load() falls through to defaults.
        let cfg = QueryConfig::load().expect("load should not fail without sources");
        assert!(cfg.inline_integer_ids);
    }
}
