use crate::error::{EngineError, Result};
use context_cache::CacheConfig;
use context_merkle::BuilderConfig;
use context_scoring::{BudgetShares, LearningConfig, SelectionRules, SelectorConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Per-workspace state directory.
pub const CONTEXT_DIR: &str = ".context";
pub const CONFIG_FILE_NAME: &str = "engine.toml";
pub const CACHE_DB_FILE_NAME: &str = "cache.db";

pub const DEFAULT_TOKEN_LIMIT: usize = 32_000;
pub const DEFAULT_DEBOUNCE_MS: u64 = 100;

const ENV_CACHE_DB: &str = "CONTEXT_ENGINE_CACHE_DB";
const ENV_MEMORY_CEILING: &str = "CONTEXT_ENGINE_MEMORY_CEILING";
const ENV_DEBOUNCE_MS: &str = "CONTEXT_ENGINE_DEBOUNCE_MS";
const ENV_CONCURRENCY: &str = "CONTEXT_ENGINE_CONCURRENCY";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    #[serde(flatten)]
    pub rules: SelectionRules,
    pub learning: LearningConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenConfig {
    pub default_limit: usize,
    pub shares: BudgetShares,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            default_limit: DEFAULT_TOKEN_LIMIT,
            shares: BudgetShares::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    pub debounce_ms: u64,
    /// Upper bound on how long a continuous burst can defer its rebuild.
    pub max_batch_wait_ms: u64,
    /// Substring or wildcard patterns; matching events are dropped.
    pub ignore: Vec<String>,
    pub channel_capacity: usize,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            max_batch_wait_ms: 2_000,
            ignore: [".git/", "node_modules/", "target/", ".context/", "*.swp", "*~", ".DS_Store"]
                .iter()
                .map(|s| (*s).to_string())
                .collect(),
            channel_capacity: 256,
        }
    }
}

impl WatchConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn max_batch_wait(&self) -> Duration {
        Duration::from_millis(self.max_batch_wait_ms.max(self.debounce_ms))
    }
}

/// Everything the engine reads from `.context/engine.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub merkle: BuilderConfig,
    pub cache: CacheConfig,
    pub selector: SelectorConfig,
    pub scoring: ScoringConfig,
    pub tokens: TokenConfig,
    pub watch: WatchConfig,
    /// Bound on concurrent per-file work; unset means available parallelism.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub concurrency: Option<usize>,
}

impl EngineConfig {
    /// Explicit file, else `<workspace>/.context/engine.toml`, else defaults;
    /// then environment overrides, then validation.
    pub fn load(workspace: &Path, explicit: Option<&Path>) -> Result<Self> {
        let mut config = match explicit {
            Some(path) => Self::from_file(path)?,
            None => {
                let default_path = config_path(workspace);
                if default_path.is_file() {
                    Self::from_file(&default_path)?
                } else {
                    Self::default()
                }
            }
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            EngineError::ConfigError(format!("failed to read {}: {e}", path.display()))
        })?;
        let config = Self::from_toml_str(&raw)?;
        log::debug!("Loaded engine config from {}", path.display());
        Ok(config)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    /// Apply `CONTEXT_ENGINE_*` overrides read through `lookup`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        let read = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(path) = read(ENV_CACHE_DB) {
            self.cache.durable_path = Some(PathBuf::from(path));
        }
        if let Some(raw) = read(ENV_MEMORY_CEILING) {
            self.cache.memory_ceiling_bytes = parse_env(ENV_MEMORY_CEILING, &raw)?;
        }
        if let Some(raw) = read(ENV_DEBOUNCE_MS) {
            self.watch.debounce_ms = parse_env(ENV_DEBOUNCE_MS, &raw)?;
        }
        if let Some(raw) = read(ENV_CONCURRENCY) {
            self.concurrency = Some(parse_env(ENV_CONCURRENCY, &raw)?);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.cache.memory_ceiling_bytes == 0 {
            return Err(EngineError::ConfigError(
                "cache.memory_ceiling_bytes must be > 0".to_string(),
            ));
        }
        if self.tokens.default_limit == 0 {
            return Err(EngineError::ConfigError(
                "tokens.default_limit must be > 0".to_string(),
            ));
        }
        if self.selector.max_file_size == 0 {
            return Err(EngineError::ConfigError(
                "selector.max_file_size must be > 0".to_string(),
            ));
        }
        if self.watch.channel_capacity == 0 {
            return Err(EngineError::ConfigError(
                "watch.channel_capacity must be > 0".to_string(),
            ));
        }
        if self.concurrency == Some(0) {
            return Err(EngineError::ConfigError("concurrency must be > 0".to_string()));
        }
        let learning = &self.scoring.learning;
        if !(0.0..=1.0).contains(&learning.min_similarity) {
            return Err(EngineError::ConfigError(
                "scoring.learning.min_similarity must be within 0..=1".to_string(),
            ));
        }
        if learning.decay_per_hour < 0.0 || learning.pattern_boost_cap < 0.0
            || learning.cooccurrence_boost_cap < 0.0
        {
            return Err(EngineError::ConfigError(
                "scoring.learning decay and caps must be non-negative".to_string(),
            ));
        }
        self.tokens.shares.validate()?;
        self.scoring.rules.validate()?;
        context_merkle::IgnoreMatcher::new(&self.merkle.ignore)?;
        Ok(())
    }

    /// Cache settings with the durable path resolved against `workspace`.
    pub fn cache_config(&self, workspace: &Path) -> CacheConfig {
        let mut cache = self.cache.clone();
        let path = match cache.durable_path.take() {
            Some(path) if path.is_relative() => workspace.join(path),
            Some(path) => path,
            None => workspace.join(CONTEXT_DIR).join(CACHE_DB_FILE_NAME),
        };
        cache.durable_path = Some(path);
        cache
    }
}

pub fn config_path(workspace: &Path) -> PathBuf {
    workspace.join(CONTEXT_DIR).join(CONFIG_FILE_NAME)
}

fn parse_env<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.parse()
        .map_err(|_| EngineError::ConfigError(format!("{key}: cannot parse `{raw}`")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    #[test]
    fn parses_sections_over_defaults() {
        let config = EngineConfig::from_toml_str(
            r#"
            concurrency = 4

            [cache]
            memory_ceiling_bytes = 1048576
            durable = false

            [scoring]
            include = ["src/**"]

            [scoring.weights]
            recency = 4.0

            [scoring.learning]
            top_patterns = 3

            [tokens]
            default_limit = 8000

            [watch]
            debounce_ms = 250
            "#,
        )
        .unwrap();
        assert_eq!(config.cache.memory_ceiling_bytes, 1_048_576);
        assert!(!config.cache.durable);
        assert_eq!(config.scoring.rules.include, vec!["src/**"]);
        assert_eq!(config.scoring.rules.weights.recency, 4.0);
        assert_eq!(config.scoring.rules.weights.exported, 0.5);
        assert_eq!(config.scoring.learning.top_patterns, 3);
        assert_eq!(config.tokens.default_limit, 8_000);
        assert_eq!(config.watch.debounce(), Duration::from_millis(250));
        assert_eq!(config.concurrency, Some(4));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn env_overrides_hot_knobs() {
        let vars: HashMap<&str, &str> = [
            ("CONTEXT_ENGINE_CACHE_DB", "/tmp/other.db"),
            ("CONTEXT_ENGINE_MEMORY_CEILING", "2048"),
            ("CONTEXT_ENGINE_DEBOUNCE_MS", " 50 "),
        ]
        .into_iter()
        .collect();
        let mut config = EngineConfig::default();
        config
            .apply_env(|key| vars.get(key).map(|v| (*v).to_string()))
            .unwrap();
        assert_eq!(config.cache.durable_path, Some(PathBuf::from("/tmp/other.db")));
        assert_eq!(config.cache.memory_ceiling_bytes, 2048);
        assert_eq!(config.watch.debounce_ms, 50);
        assert_eq!(config.concurrency, None);

        let mut config = EngineConfig::default();
        let err = config
            .apply_env(|key| (key == "CONTEXT_ENGINE_MEMORY_CEILING").then(|| "lots".to_string()))
            .unwrap_err();
        assert!(matches!(err, EngineError::ConfigError(_)));
    }

    #[test]
    fn rejects_shares_not_summing_to_one() {
        let config = EngineConfig::from_toml_str(
            "[tokens.shares]\nfile_map = 0.5\ncode_map = 0.5\ncontent = 0.5\n",
        )
        .unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn resolves_cache_path_inside_workspace() {
        let config = EngineConfig::default();
        let cache = config.cache_config(Path::new("/repo"));
        assert_eq!(
            cache.durable_path,
            Some(PathBuf::from("/repo/.context/cache.db"))
        );
    }

    #[test]
    fn loads_workspace_config_file() {
        let temp = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(temp.path().join(CONTEXT_DIR)).unwrap();
        std::fs::write(config_path(temp.path()), "[watch]\ndebounce_ms = 30\n").unwrap();
        let config = EngineConfig::from_file(&config_path(temp.path())).unwrap();
        assert_eq!(config.watch.debounce_ms, 30);
    }
}
