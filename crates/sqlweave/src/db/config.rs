use crate::dialect::Dialect;
use std::time::Duration;

/// Default prepared statement cache capacity.
pub const DEFAULT_STATEMENT_CACHE_CAPACITY: usize = 256;

/// Configuration for [`super::Db`].
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// Prepared statement cache configuration.
    pub statement_cache: StatementCacheConfig,
    /// Default deadline for every statement. A builder's own `timeout` wins.
    pub query_timeout: Option<Duration>,
    /// Dialect override. `None` derives it from the driver name.
    pub dialect: Option<Dialect>,
}

/// Prepared statement cache configuration.
#[derive(Debug, Clone)]
pub struct StatementCacheConfig {
    pub enabled: bool,
    pub capacity: usize,
}

impl Default for StatementCacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            capacity: DEFAULT_STATEMENT_CACHE_CAPACITY,
        }
    }
}

impl StatementCacheConfig {
    /// Capacity actually handed to the cache; 0 when disabled.
    pub(crate) fn effective_capacity(&self) -> usize {
        if self.enabled { self.capacity } else { 0 }
    }
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            statement_cache: StatementCacheConfig::default(),
            query_timeout: None,
            dialect: None,
        }
    }
}

impl DbConfig {
    /// Create a new configuration with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable prepared statement caching with the given capacity.
    ///
    /// A capacity of 0 disables the cache.
    pub fn statement_cache(mut self, cap: usize) -> Self {
        self.statement_cache = StatementCacheConfig {
            enabled: cap > 0,
            capacity: cap,
        };
        self
    }

    /// Disable prepared statement caching.
    pub fn no_statement_cache(mut self) -> Self {
        self.statement_cache.enabled = false;
        self
    }

    /// Set the default query timeout.
    pub fn timeout(mut self, duration: Duration) -> Self {
        self.query_timeout = Some(duration);
        self
    }

    /// Force a dialect instead of deriving it from the driver name.
    pub fn dialect(mut self, dialect: Dialect) -> Self {
        self.dialect = Some(dialect);
        self
    }
}
