//! Configuration for the storage engine.

use serde::{Deserialize, Serialize};
use time::Duration;

/// Maximum size of the volatile tier, in bytes.
pub const DEFAULT_MAX_VOLATILE_BYTES: u64 = 10 * 1000 * 1024; // 10 MB

/// Maximum number of rows in the volatile tier.
pub const DEFAULT_MAX_VOLATILE_ROWS: u64 = 10_000;

/// Minimum time data points are retained in the persistent tier.
pub const DEFAULT_RETENTION_HOURS: i64 = 24;

/// Default number of results returned when the caller gives no limit.
pub const DEFAULT_QUERY_LIMIT: usize = 100;

/// Hard cap on the number of query results.
pub const QUERY_RESULTS_CAP: usize = 10_000;

/// Hard cap on query results in high-volume mode, where individual data
/// points can be huge.
pub const QUERY_RESULTS_CAP_HIGH_VOLUME: usize = 60;

/// Tunables for a [`StorageEngine`](crate::StorageEngine).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Byte ceiling for the volatile tier.
    #[serde(default = "default_max_volatile_bytes")]
    pub max_volatile_bytes: u64,
    /// Row-count ceiling for the volatile tier.
    #[serde(default = "default_max_volatile_rows")]
    pub max_volatile_rows: u64,
    /// Minimum time persisted data points are guaranteed to survive,
    /// in hours.
    #[serde(default = "default_retention_hours")]
    pub retention_hours: i64,
    /// Whether data is uploaded to a remote archive. When true, only
    /// uploaded data points become eligible for the retention sweep.
    #[serde(default = "default_use_remote_archive")]
    pub use_remote_archive: bool,
    /// Result count when the caller gives no limit.
    #[serde(default = "default_query_limit")]
    pub default_query_limit: usize,
    /// Lowers the query result cap for workloads with very large
    /// data points.
    #[serde(default)]
    pub high_volume_mode: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            max_volatile_bytes: default_max_volatile_bytes(),
            max_volatile_rows: default_max_volatile_rows(),
            retention_hours: default_retention_hours(),
            use_remote_archive: default_use_remote_archive(),
            default_query_limit: default_query_limit(),
            high_volume_mode: false,
        }
    }
}

impl StoreConfig {
    /// The retention window as a [`time::Duration`].
    #[must_use]
    pub fn retention_window(&self) -> Duration {
        Duration::hours(self.retention_hours)
    }

    /// The hard cap applied to every query's result count.
    #[must_use]
    pub fn result_cap(&self) -> usize {
        if self.high_volume_mode {
            QUERY_RESULTS_CAP_HIGH_VOLUME
        } else {
            QUERY_RESULTS_CAP
        }
    }

    /// Clamp a caller-supplied limit to the result cap, falling back to
    /// the default limit when none was given.
    #[must_use]
    pub fn effective_limit(&self, requested: Option<usize>) -> usize {
        requested
            .unwrap_or(self.default_query_limit)
            .min(self.result_cap())
    }
}

fn default_max_volatile_bytes() -> u64 {
    DEFAULT_MAX_VOLATILE_BYTES
}

fn default_max_volatile_rows() -> u64 {
    DEFAULT_MAX_VOLATILE_ROWS
}

fn default_retention_hours() -> i64 {
    DEFAULT_RETENTION_HOURS
}

fn default_use_remote_archive() -> bool {
    true
}

fn default_query_limit() -> usize {
    DEFAULT_QUERY_LIMIT
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_constants() {
        let config = StoreConfig::default();
        assert_eq!(config.max_volatile_bytes, DEFAULT_MAX_VOLATILE_BYTES);
        assert_eq!(config.max_volatile_rows, DEFAULT_MAX_VOLATILE_ROWS);
        assert_eq!(config.retention_hours, 24);
        assert!(config.use_remote_archive);
        assert_eq!(config.default_query_limit, 100);
        assert!(!config.high_volume_mode);
    }

    #[test]
    fn test_result_cap_high_volume() {
        let mut config = StoreConfig::default();
        assert_eq!(config.result_cap(), QUERY_RESULTS_CAP);

        config.high_volume_mode = true;
        assert_eq!(config.result_cap(), QUERY_RESULTS_CAP_HIGH_VOLUME);
    }

    #[test]
    fn test_effective_limit() {
        let config = StoreConfig::default();
        assert_eq!(config.effective_limit(None), 100);
        assert_eq!(config.effective_limit(Some(5)), 5);
        assert_eq!(config.effective_limit(Some(1_000_000)), QUERY_RESULTS_CAP);
    }

    #[test]
    fn test_deserialize_with_partial_fields() {
        let config: StoreConfig = serde_json::from_str(r#"{"retention_hours": 48}"#).unwrap();
        assert_eq!(config.retention_hours, 48);
        assert_eq!(config.max_volatile_rows, DEFAULT_MAX_VOLATILE_ROWS);
    }
}
