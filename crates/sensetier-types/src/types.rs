//! Core types for sensor data points.

use core::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ParseError;

/// The payload type of a data point's serialized value.
///
/// The value itself is always stored as a string; this tag tells consumers
/// how to interpret it. For [`DataType::Json`] the value is a JSON-encoded
/// document, for [`DataType::File`] it is a filesystem path.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new payload types
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[non_exhaustive]
pub enum DataType {
    /// Boolean value, serialized as `true`/`false`.
    Bool,
    /// Floating-point value.
    Float,
    /// Integer value.
    Int,
    /// JSON-encoded document.
    Json,
    /// Plain string value.
    String,
    /// Path to a file holding the payload.
    File,
}

impl DataType {
    /// The tag stored in the `data_type` column.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            DataType::Bool => "bool",
            DataType::Float => "float",
            DataType::Int => "int",
            DataType::Json => "json",
            DataType::String => "string",
            DataType::File => "file",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for DataType {
    type Error = ParseError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "bool" => Ok(DataType::Bool),
            "float" => Ok(DataType::Float),
            "int" => Ok(DataType::Int),
            "json" => Ok(DataType::Json),
            "string" => Ok(DataType::String),
            "file" => Ok(DataType::File),
            other => Err(ParseError::UnknownDataType(other.to_string())),
        }
    }
}

/// Whether a data point has been uploaded to the remote archive.
///
/// The storage engine never changes this state itself; only the uploader
/// flips it to [`TransmitState::Sent`] after a successful upload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransmitState {
    /// Not yet uploaded. The default for new data points.
    #[default]
    NotSent,
    /// Confirmed uploaded to the remote archive.
    Sent,
}

impl TransmitState {
    /// The integer code stored in the `transmit_state` column (`1` = sent).
    #[must_use]
    pub fn code(&self) -> i64 {
        match self {
            TransmitState::NotSent => 0,
            TransmitState::Sent => 1,
        }
    }

    /// Decode the stored integer code. Any value other than `1` means not sent.
    #[must_use]
    pub fn from_code(code: i64) -> Self {
        if code == 1 {
            TransmitState::Sent
        } else {
            TransmitState::NotSent
        }
    }
}

/// Query ordering by timestamp.
///
/// The default is newest first, matching the store's default query order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortOrder {
    /// Oldest first (non-decreasing timestamps).
    Ascending,
    /// Newest first (non-increasing timestamps). The default.
    #[default]
    Descending,
}

impl SortOrder {
    /// True for [`SortOrder::Descending`].
    #[must_use]
    pub fn is_descending(&self) -> bool {
        matches!(self, SortOrder::Descending)
    }

    /// The SQL `ORDER BY` direction keyword.
    #[must_use]
    pub fn sql_keyword(&self) -> &'static str {
        match self {
            SortOrder::Ascending => "ASC",
            SortOrder::Descending => "DESC",
        }
    }
}

impl TryFrom<&str> for SortOrder {
    type Error = ParseError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.to_ascii_lowercase().as_str() {
            "asc" | "ascending" => Ok(SortOrder::Ascending),
            "desc" | "descending" => Ok(SortOrder::Descending),
            other => Err(ParseError::UnknownSortOrder(other.to_string())),
        }
    }
}

/// A single sensor reading.
///
/// Timestamps are epoch milliseconds and form the primary ordering key.
/// A data point belongs to exactly one tier at a time; the tier-local row
/// id is not part of this type because it is meaningless across tiers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataPoint {
    /// Name of the sensor that produced this reading.
    pub sensor_name: String,
    /// Optional human-readable name for display purposes.
    pub display_name: Option<String>,
    /// Optional description disambiguating multiple physical sources
    /// of the same sensor name.
    pub sensor_description: Option<String>,
    /// Payload type of `value`.
    pub data_type: DataType,
    /// Capture time in epoch milliseconds.
    pub timestamp: i64,
    /// Serialized payload.
    pub value: String,
    /// UUID of the physical device owning the sensor, when it is not
    /// the host itself.
    pub device_uuid: Option<String>,
    /// Upload state. Mutated only by the uploader, never by the store.
    pub transmit_state: TransmitState,
}

impl DataPoint {
    /// Create a data point with the required fields; optional fields start
    /// empty and the transmit state starts as [`TransmitState::NotSent`].
    pub fn new(
        sensor_name: impl Into<String>,
        data_type: DataType,
        timestamp: i64,
        value: impl Into<String>,
    ) -> Self {
        Self {
            sensor_name: sensor_name.into(),
            display_name: None,
            sensor_description: None,
            data_type,
            timestamp,
            value: value.into(),
            device_uuid: None,
            transmit_state: TransmitState::NotSent,
        }
    }

    /// Set the display name.
    #[must_use]
    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = Some(display_name.into());
        self
    }

    /// Set the sensor description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.sensor_description = Some(description.into());
        self
    }

    /// Set the owning device UUID.
    #[must_use]
    pub fn with_device_uuid(mut self, device_uuid: impl Into<String>) -> Self {
        self.device_uuid = Some(device_uuid.into());
        self
    }

    /// Set the transmit state.
    #[must_use]
    pub fn with_transmit_state(mut self, state: TransmitState) -> Self {
        self.transmit_state = state;
        self
    }
}
