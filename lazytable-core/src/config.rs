//! Table configuration types and builder
//!
//! A [`TableConfig`] carries everything about a table that is fixed at
//! construction time: its optional TTL and whether concurrent misses for the
//! same key share a single loader call.

use std::time::Duration;

use crate::error::{CacheError, Result};

/// Configuration for a single table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TableConfig {
    /// Time-to-live for entries (None = entries never expire)
    pub ttl: Option<Duration>,

    /// Coalesce concurrent misses for one key onto a single loader call
    pub single_flight: bool,
}

impl TableConfig {
    /// Create a new configuration builder
    pub fn builder() -> TableConfigBuilder {
        TableConfigBuilder::default()
    }

    /// Quick preset for a TTL table
    ///
    /// # Example
    /// ```
    /// use std::time::Duration;
    ///
    /// use lazytable_core::TableConfig;
    ///
    /// let config = TableConfig::ttl(Duration::from_secs(300));
    /// assert_eq!(config.ttl, Some(Duration::from_secs(300)));
    /// ```
    pub fn ttl(duration: Duration) -> Self {
        Self {
            ttl: Some(duration),
            single_flight: false,
        }
    }

    /// Quick preset for a table whose entries live until removed
    pub fn no_expiry() -> Self {
        Self::default()
    }

    /// Checks the configuration for values a table cannot honour.
    pub fn validate(&self) -> Result<()> {
        validate_ttl(self.ttl)
    }
}

pub(crate) fn validate_ttl(ttl: Option<Duration>) -> Result<()> {
    match ttl {
        Some(ttl) if ttl.is_zero() => Err(CacheError::InvalidTtl),
        _ => Ok(()),
    }
}

/// Builder for TableConfig with fluent API
#[derive(Debug, Default)]
pub struct TableConfigBuilder {
    config: TableConfig,
}

impl TableConfigBuilder {
    /// Set the time-to-live applied to every entry
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.config.ttl = Some(ttl);
        self
    }

    /// Set or clear the TTL
    pub fn maybe_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.config.ttl = ttl;
        self
    }

    /// Enable or disable single-flight loading
    pub fn single_flight(mut self, enabled: bool) -> Self {
        self.config.single_flight = enabled;
        self
    }

    /// Validate and build the configuration
    ///
    /// # Example
    /// ```
    /// use std::time::Duration;
    ///
    /// use lazytable_core::TableConfig;
    ///
    /// let config = TableConfig::builder()
    ///     .ttl(Duration::from_millis(500))
    ///     .single_flight(true)
    ///     .build()
    ///     .unwrap();
    /// assert!(config.single_flight);
    /// ```
    pub fn build(self) -> Result<TableConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_has_no_ttl() {
        let config = TableConfig::default();
        assert_eq!(config.ttl, None);
        assert!(!config.single_flight);
        assert_eq!(config, TableConfig::no_expiry());
    }

    #[test]
    fn test_builder_rejects_zero_ttl() {
        let result = TableConfig::builder().ttl(Duration::ZERO).build();
        assert_eq!(result, Err(CacheError::InvalidTtl));
    }

    #[test]
    fn test_builder_maybe_ttl_clears() {
        let config = TableConfig::builder()
            .ttl(Duration::from_secs(1))
            .maybe_ttl(None)
            .build()
            .unwrap();
        assert_eq!(config.ttl, None);
    }
}
