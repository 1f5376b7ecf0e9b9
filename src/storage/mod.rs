//! Storage for configuration, paths, and the response cache.

pub mod cache;
pub mod config;
pub mod paths;

pub use cache::{CacheStats, ResponseCache, fingerprint};
pub use config::{
    Config, ENV_CACHE_TTL_SECONDS, ENV_CONFIG, ENV_DAILY_BUDGET, ENV_MAX_INPUT_LENGTH,
    ENV_MONTHLY_BUDGET, ENV_RATE_LIMIT_PER_MINUTE, ProviderConfig,
};
pub use paths::AppPaths;
