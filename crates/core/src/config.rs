//! Runtime configuration read from `REKON_*` environment variables.

use std::time::Duration;

pub const DEFAULT_TRIGGER_QUEUE: &str = "trigger-queue";

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.trim().parse::<T>().ok())
}

/// Guards applied when parsing applied-manifest YAML.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ManifestLimits {
    pub max_bytes: usize,
    pub max_nodes: usize,
}

impl Default for ManifestLimits {
    fn default() -> Self { Self { max_bytes: 64 * 1024 * 1024, max_nodes: 100_000 } }
}

impl ManifestLimits {
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            max_bytes: env_parse("REKON_MAX_YAML_BYTES").unwrap_or(d.max_bytes),
            max_nodes: env_parse("REKON_MAX_YAML_NODES").unwrap_or(d.max_nodes),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Upper bound on cached owner trees; `None` keeps every tree.
    pub owner_cache_cap: Option<usize>,
    pub fetch_timeout: Option<Duration>,
    pub trigger_queue: String,
    pub manifest: ManifestLimits,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            owner_cache_cap: None,
            fetch_timeout: None,
            trigger_queue: DEFAULT_TRIGGER_QUEUE.to_string(),
            manifest: ManifestLimits::default(),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            owner_cache_cap: env_parse::<usize>("REKON_OWNER_CACHE_CAP").filter(|n| *n > 0),
            fetch_timeout: env_parse::<u64>("REKON_FETCH_TIMEOUT_MS").map(Duration::from_millis),
            trigger_queue: std::env::var("REKON_TRIGGER_QUEUE")
                .ok()
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| DEFAULT_TRIGGER_QUEUE.to_string()),
            manifest: ManifestLimits::from_env(),
        }
    }
}
