//! Tiered local storage for streamed sensor data.
//!
//! This crate buffers high-rate sensor data points in a bounded in-memory
//! SQLite tier and spills them into a persistent on-disk tier when the
//! buffer fills, so recent data survives restarts without unbounded disk
//! growth.
//!
//! # Features
//!
//! - Bounded volatile tier with automatic promotion on overflow
//! - Retention sweep of the persistent tier, gated on upload state
//! - Selection-string predicates over the fixed data-point columns
//! - Merged, ordered queries across both tiers
//! - Optional read-only remote archive (HTTP client behind the
//!   `remote-http` feature)
//!
//! # Example
//!
//! ```no_run
//! use sensetier_store::{StorageEngine, StoreConfig, Target};
//! use sensetier_types::{DataPoint, DataType, SortOrder};
//!
//! let engine = StorageEngine::open("sensors.db", StoreConfig::default())?;
//!
//! let point = DataPoint::new("noise_sensor", DataType::Float, 1_700_000_000_000, "62.5");
//! engine.insert(&point)?;
//!
//! for point in engine.query(
//!     Target::Local,
//!     Some("sensor_name='noise_sensor'"),
//!     &[],
//!     SortOrder::Descending,
//!     Some(10),
//! )? {
//!     println!("{} = {}", point.timestamp, point.value);
//! }
//! # Ok::<(), sensetier_store::Error>(())
//! ```

mod config;
mod engine;
mod error;
mod merge;
mod predicate;
mod remote;
mod retention;
mod schema;
mod tier;

pub use config::{
    DEFAULT_MAX_VOLATILE_BYTES, DEFAULT_MAX_VOLATILE_ROWS, DEFAULT_QUERY_LIMIT,
    DEFAULT_RETENTION_HOURS, QUERY_RESULTS_CAP, QUERY_RESULTS_CAP_HIGH_VOLUME, StoreConfig,
};
pub use engine::{QueryCursor, StorageEngine, Target};
pub use error::{Error, Result};
pub use merge::{MergeCursor, MergeSources};
pub use predicate::{Predicate, PredicateError, TextFilter, TimeRange};
pub use remote::{MockArchive, RemoteArchive, RemoteError, RemoteQuery};
pub use retention::RetentionPolicy;
pub use tier::{DataPointUpdate, InsertOutcome, Tier, VolatileLimits};

#[cfg(feature = "remote-http")]
pub use remote::HttpArchive;
