//! The remote archive: an external, read-only collaborator.
//!
//! The engine only depends on the query contract expressed by
//! [`RemoteArchive`]; transport lives behind the trait. A blocking HTTP
//! implementation is available behind the `remote-http` feature, and
//! [`MockArchive`] serves tests and offline development.

use thiserror::Error;

use sensetier_types::{DataPoint, SortOrder};

/// A query against the remote archive, already resolved to a single
/// sensor name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteQuery {
    /// The one sensor the query targets.
    pub sensor_name: String,
    /// Inclusive start of the time range, epoch ms.
    pub start_ms: i64,
    /// Inclusive end of the time range, epoch ms.
    pub end_ms: i64,
    /// Restrict to data points owned by this device.
    pub device_uuid: Option<String>,
    /// Result ordering by timestamp.
    pub order: SortOrder,
    /// Maximum number of data points to return.
    pub limit: usize,
}

/// Errors from a remote archive implementation.
///
/// These never propagate out of the engine: a failed remote query is
/// logged and degrades to an empty result, so local queries stay usable
/// without connectivity.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// The archive could not be reached.
    #[error("archive not reachable: {0}")]
    Transport(String),

    /// The archive answered with a non-success status.
    #[error("archive returned status {0}")]
    Status(u16),

    /// The response payload could not be decoded.
    #[error("malformed archive payload: {0}")]
    Payload(#[from] serde_json::Error),
}

/// Read-only query access to the remote archive.
pub trait RemoteArchive: Send + Sync {
    /// Fetch the archived data points for one sensor, ordered by
    /// timestamp in the requested direction.
    fn query(&self, query: &RemoteQuery) -> Result<Vec<DataPoint>, RemoteError>;
}

#[cfg(feature = "remote-http")]
pub use http::HttpArchive;

#[cfg(feature = "remote-http")]
mod http {
    use serde::Deserialize;

    use sensetier_types::{DataPoint, DataType, TransmitState};

    use super::{RemoteArchive, RemoteError, RemoteQuery};

    /// Blocking HTTP client for a remote archive.
    ///
    /// Decodes the archive's data array; timestamps arrive as fractional
    /// epoch seconds and values as strings. Fields the archive does not
    /// carry (display name, description) are left empty, and returned
    /// points are marked sent since the archive is the uploaded copy.
    pub struct HttpArchive {
        client: reqwest::blocking::Client,
        base_url: String,
    }

    #[derive(Deserialize)]
    struct DataEnvelope {
        data: Vec<RemotePoint>,
    }

    #[derive(Deserialize)]
    struct RemotePoint {
        date: f64,
        value: String,
    }

    impl HttpArchive {
        /// Create a client for the archive at `base_url`.
        pub fn new(base_url: impl Into<String>) -> Self {
            Self {
                client: reqwest::blocking::Client::new(),
                base_url: base_url.into().trim_end_matches('/').to_string(),
            }
        }
    }

    impl RemoteArchive for HttpArchive {
        fn query(&self, query: &RemoteQuery) -> Result<Vec<DataPoint>, RemoteError> {
            let mut url = format!(
                "{}/sensors/{}/data?start_date={}&end_date={}&sort={}&per_page={}",
                self.base_url,
                query.sensor_name,
                query.start_ms as f64 / 1000.0,
                query.end_ms as f64 / 1000.0,
                query.order.sql_keyword().to_lowercase(),
                query.limit,
            );
            if let Some(uuid) = &query.device_uuid {
                url.push_str(&format!("&device_uuid={uuid}"));
            }

            let response = self
                .client
                .get(&url)
                .send()
                .map_err(|e| RemoteError::Transport(e.to_string()))?;

            let status = response.status();
            if !status.is_success() {
                return Err(RemoteError::Status(status.as_u16()));
            }

            let body = response
                .text()
                .map_err(|e| RemoteError::Transport(e.to_string()))?;
            let envelope: DataEnvelope = serde_json::from_str(&body)?;

            let points = envelope
                .data
                .into_iter()
                .map(|p| {
                    DataPoint::new(
                        query.sensor_name.clone(),
                        DataType::String,
                        (p.date * 1000.0).round() as i64,
                        p.value,
                    )
                    .with_transmit_state(TransmitState::Sent)
                })
                .collect();

            Ok(points)
        }
    }
}

/// An in-memory remote archive for testing.
///
/// Holds a fixed set of data points and answers queries by filtering,
/// sorting, and truncating them; can be switched to fail every request
/// to exercise the engine's degraded path.
#[derive(Debug, Default)]
pub struct MockArchive {
    points: Vec<DataPoint>,
    unavailable: bool,
}

impl MockArchive {
    /// An archive holding the given data points.
    #[must_use]
    pub fn with_points(points: Vec<DataPoint>) -> Self {
        Self {
            points,
            unavailable: false,
        }
    }

    /// An archive that fails every query with a transport error.
    #[must_use]
    pub fn unavailable() -> Self {
        Self {
            points: Vec::new(),
            unavailable: true,
        }
    }
}

impl RemoteArchive for MockArchive {
    fn query(&self, query: &RemoteQuery) -> Result<Vec<DataPoint>, RemoteError> {
        if self.unavailable {
            return Err(RemoteError::Transport("mock archive is offline".into()));
        }

        let mut matches: Vec<DataPoint> = self
            .points
            .iter()
            .filter(|p| p.sensor_name == query.sensor_name)
            .filter(|p| p.timestamp >= query.start_ms && p.timestamp <= query.end_ms)
            .filter(|p| {
                query.device_uuid.is_none() || p.device_uuid == query.device_uuid
            })
            .cloned()
            .collect();

        if query.order.is_descending() {
            matches.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        } else {
            matches.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
        }
        matches.truncate(query.limit);

        Ok(matches)
    }
}
