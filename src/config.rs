// Configuration module for cnav
// Reads from environment variables with sensible defaults

use std::env;
use std::sync::OnceLock;

/// Global configuration instance
static CONFIG: OnceLock<Config> = OnceLock::new();

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Embedding vector dimension (CNAV_EMBEDDING_DIM)
    pub embedding_dim: usize,

    /// Reciprocal rank fusion constant (CNAV_RRF_K)
    pub rrf_k: u32,

    /// Maximum causal traversal depth (CNAV_MAX_DEPTH)
    pub max_traversal_depth: u32,

    /// File watch debounce window in milliseconds (CNAV_DEBOUNCE_MS)
    pub watch_debounce_ms: u64,

    /// Lexical search subprocess timeout in seconds (CNAV_SEARCH_TIMEOUT_SECS)
    pub search_timeout_secs: u32,

    /// Database connection pool size (CNAV_POOL_SIZE)
    pub pool_size: u32,

    /// Database connection pool minimum idle connections (CNAV_POOL_MIN_IDLE)
    pub pool_min_idle: u32,

    /// Serve cached skeletons when the file on disk is unchanged (CNAV_SKELETON_CACHE)
    pub skeleton_cache: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            embedding_dim: 256,
            rrf_k: 60,
            max_traversal_depth: 3,
            watch_debounce_ms: 100,
            search_timeout_secs: 5,
            pool_size: 10,
            pool_min_idle: 2,
            skeleton_cache: true,
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    fn from_env() -> Self {
        let mut config = Config::default();

        if let Ok(val) = env::var("CNAV_EMBEDDING_DIM") {
            if let Ok(parsed) = val.parse() {
                config.embedding_dim = parsed;
            } else {
                eprintln!(
                    "cnav: Warning: Invalid CNAV_EMBEDDING_DIM value: {}, using default: {}",
                    val, config.embedding_dim
                );
            }
        }

        if let Ok(val) = env::var("CNAV_RRF_K") {
            if let Ok(parsed) = val.parse() {
                config.rrf_k = parsed;
            } else {
                eprintln!(
                    "cnav: Warning: Invalid CNAV_RRF_K value: {}, using default: {}",
                    val, config.rrf_k
                );
            }
        }

        if let Ok(val) = env::var("CNAV_MAX_DEPTH") {
            if let Ok(parsed) = val.parse() {
                config.max_traversal_depth = parsed;
            } else {
                eprintln!(
                    "cnav: Warning: Invalid CNAV_MAX_DEPTH value: {}, using default: {}",
                    val, config.max_traversal_depth
                );
            }
        }

        if let Ok(val) = env::var("CNAV_DEBOUNCE_MS") {
            if let Ok(parsed) = val.parse() {
                config.watch_debounce_ms = parsed;
            } else {
                eprintln!(
                    "cnav: Warning: Invalid CNAV_DEBOUNCE_MS value: {}, using default: {}",
                    val, config.watch_debounce_ms
                );
            }
        }

        if let Ok(val) = env::var("CNAV_SEARCH_TIMEOUT_SECS") {
            if let Ok(parsed) = val.parse() {
                config.search_timeout_secs = parsed;
            } else {
                eprintln!(
                    "cnav: Warning: Invalid CNAV_SEARCH_TIMEOUT_SECS value: {}, using default: {}",
                    val, config.search_timeout_secs
                );
            }
        }

        if let Ok(val) = env::var("CNAV_POOL_SIZE") {
            if let Ok(parsed) = val.parse() {
                config.pool_size = parsed;
            } else {
                eprintln!(
                    "cnav: Warning: Invalid CNAV_POOL_SIZE value: {}, using default: {}",
                    val, config.pool_size
                );
            }
        }

        if let Ok(val) = env::var("CNAV_POOL_MIN_IDLE") {
            if let Ok(parsed) = val.parse() {
                config.pool_min_idle = parsed;
            } else {
                eprintln!(
                    "cnav: Warning: Invalid CNAV_POOL_MIN_IDLE value: {}, using default: {}",
                    val, config.pool_min_idle
                );
            }
        }

        if let Ok(val) = env::var("CNAV_SKELETON_CACHE") {
            if let Ok(parsed) = val.parse() {
                config.skeleton_cache = parsed;
            } else {
                eprintln!(
                    "cnav: Warning: Invalid CNAV_SKELETON_CACHE value: {}, using default: {}",
                    val, config.skeleton_cache
                );
            }
        }

        config
    }

    /// Get the global configuration instance
    pub fn get() -> &'static Config {
        CONFIG.get_or_init(Config::from_env)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.embedding_dim, 256);
        assert_eq!(config.rrf_k, 60);
        assert_eq!(config.max_traversal_depth, 3);
        assert_eq!(config.watch_debounce_ms, 100);
        assert_eq!(config.search_timeout_secs, 5);
        assert_eq!(config.pool_size, 10);
        assert_eq!(config.pool_min_idle, 2);
        assert!(config.skeleton_cache);
    }
}
