//! Shared data types for the sensetier tiered sensor-data store.
//!
//! This crate provides the types that flow between the storage engine,
//! its callers, and remote-archive implementations:
//!
//! - [`DataPoint`] — a single sensor reading
//! - [`DataType`] — the payload type of a reading's serialized value
//! - [`TransmitState`] — whether a reading has been uploaded
//! - [`SortOrder`] — query ordering by timestamp
//!
//! # Example
//!
//! ```
//! use sensetier_types::{DataPoint, DataType, TransmitState};
//!
//! let point = DataPoint::new("position", DataType::Json, 1_700_000_000_000, r#"{"lat":51.9}"#)
//!     .with_device_uuid("6e5f0001-aa10-4c2f-9e3b-000000000001");
//!
//! assert_eq!(point.transmit_state, TransmitState::NotSent);
//! ```

pub mod error;
pub mod types;

pub use error::{ParseError, ParseResult};
pub use types::{DataPoint, DataType, SortOrder, TransmitState};
