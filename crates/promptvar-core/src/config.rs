//! Resolver and cache configuration types.

use std::time::Duration;

use derive_builder::Builder;
use serde::{Deserialize, Serialize};

use crate::handle::{ListOptions, ReadOptions};

/// Configuration for the handle cache.
#[derive(Debug, Clone, Builder, Serialize, Deserialize)]
#[builder(setter(into), build_fn(validate = "Self::validate"))]
pub struct CacheConfig {
    /// Whether caching is enabled at all.
    #[builder(default = "true")]
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Maximum number of entries before LRU eviction.
    #[builder(default = "100")]
    #[serde(default = "default_max_size")]
    pub max_size: usize,

    /// Time-to-live for entries set without an explicit TTL.
    #[builder(default = "300")]
    #[serde(default = "default_ttl_secs")]
    pub default_ttl_secs: u64,

    /// Interval of the background sweep of expired entries.
    #[builder(default = "600")]
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

fn default_true() -> bool {
    true
}

fn default_max_size() -> usize {
    100
}

fn default_ttl_secs() -> u64 {
    300
}

fn default_sweep_interval_secs() -> u64 {
    600
}

fn default_max_concurrent_reads() -> usize {
    4
}

impl CacheConfigBuilder {
    fn validate(&self) -> Result<(), String> {
        if self.max_size == Some(0) {
            return Err("Cache max_size must be at least 1".to_string());
        }
        if self.sweep_interval_secs == Some(0) {
            return Err("Sweep interval cannot be zero".to_string());
        }
        Ok(())
    }
}

impl CacheConfig {
    /// Create a new cache config builder.
    pub fn builder() -> CacheConfigBuilder {
        CacheConfigBuilder::default()
    }

    /// A config with caching turned off.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    /// Default TTL as a duration.
    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_secs)
    }

    /// Sweep interval as a duration.
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_size: default_max_size(),
            default_ttl_secs: default_ttl_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

/// Configuration for resolving file and directory variables.
#[derive(Debug, Clone, Builder, Serialize, Deserialize)]
#[builder(setter(into), build_fn(validate = "Self::validate"))]
pub struct ResolverConfig {
    /// Maximum concurrent handle reads per batch.
    #[builder(default = "4")]
    #[serde(default = "default_max_concurrent_reads")]
    pub max_concurrent_reads: usize,

    /// Read through the handle cache.
    #[builder(default = "true")]
    #[serde(default = "default_true")]
    pub use_cache: bool,

    /// Re-resolve stale handle references through the registry.
    #[builder(default = "true")]
    #[serde(default = "default_true")]
    pub auto_reacquire_handles: bool,

    /// How file contents are decoded.
    #[builder(default)]
    #[serde(default)]
    pub read: ReadOptions,

    /// How directories are listed.
    #[builder(default)]
    #[serde(default)]
    pub list: ListOptions,
}

impl ResolverConfigBuilder {
    fn validate(&self) -> Result<(), String> {
        if self.max_concurrent_reads == Some(0) {
            return Err("max_concurrent_reads must be at least 1".to_string());
        }
        Ok(())
    }
}

impl ResolverConfig {
    /// Create a new resolver config builder.
    pub fn builder() -> ResolverConfigBuilder {
        ResolverConfigBuilder::default()
    }
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            max_concurrent_reads: default_max_concurrent_reads(),
            use_cache: true,
            auto_reacquire_handles: true,
            read: ReadOptions::default(),
            list: ListOptions::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_config_builder() {
        let config = CacheConfig::builder()
            .max_size(10usize)
            .default_ttl_secs(30u64)
            .build()
            .unwrap();

        assert!(config.enabled);
        assert_eq!(config.max_size, 10);
        assert_eq!(config.default_ttl(), Duration::from_secs(30));
        assert_eq!(config.sweep_interval(), Duration::from_secs(600));
    }

    #[test]
    fn test_cache_config_rejects_zero_size() {
        assert!(CacheConfig::builder().max_size(0usize).build().is_err());
    }

    #[test]
    fn test_resolver_config_defaults() {
        let config = ResolverConfig::builder().build().unwrap();
        assert_eq!(config.max_concurrent_reads, 4);
        assert!(config.use_cache);
        assert!(config.auto_reacquire_handles);
        assert!(config.list.recursive);
    }

    #[test]
    fn test_resolver_config_rejects_zero_concurrency() {
        assert!(ResolverConfig::builder()
            .max_concurrent_reads(0usize)
            .build()
            .is_err());
    }
}
