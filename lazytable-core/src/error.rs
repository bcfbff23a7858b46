//! Error types for lazytable.
//!
//! Only configuration problems are represented here. Errors raised by a
//! loader are returned to the caller as-is and never wrapped in
//! [`CacheError`].

use thiserror::Error;

/// Errors reported by table and registry configuration calls.
///
/// # Example
///
/// ```
/// use lazytable_core::{CacheError, Table};
/// use std::time::Duration;
///
/// let result = Table::from_fn_with_ttl(|id: &u32| *id, Duration::ZERO);
/// assert!(matches!(result, Err(CacheError::InvalidTtl)));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheError {
    /// A zero TTL would expire every entry the moment it is stored.
    #[error("invalid TTL: time-to-live must be greater than zero")]
    InvalidTtl,

    /// A table for this value type exists but was built for other key or
    /// loader error types.
    #[error("table for value type '{value_type}' is not a {expected}")]
    TableTypeMismatch {
        /// Name of the value type the table is registered under
        value_type: &'static str,
        /// Name of the table type the caller asked for
        expected: &'static str,
    },
}

impl CacheError {
    pub(crate) fn mismatch<T: ?Sized>(value_type: &'static str) -> Self {
        CacheError::TableTypeMismatch {
            value_type,
            expected: std::any::type_name::<T>(),
        }
    }
}

/// Result alias for configuration operations.
pub type Result<T, E = CacheError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_ttl_message() {
        assert_eq!(
            CacheError::InvalidTtl.to_string(),
            "invalid TTL: time-to-live must be greater than zero"
        );
    }

    #[test]
    fn test_mismatch_names_both_types() {
        let err = CacheError::mismatch::<Vec<u8>>("alloc::string::String");
        let msg = err.to_string();
        assert!(msg.contains("alloc::string::String"));
        assert!(msg.contains("Vec<u8>"));
    }
}
