//! The storage engine façade.
//!
//! Streamed sensor data lands in a bounded volatile tier; when that tier
//! fills up, data points that must not be lost are promoted into the
//! persistent tier and the volatile tier is emptied. Queries are parsed
//! from a selection string, routed to either the local tiers or the
//! remote archive, and answered as a single ordered sequence.

use std::path::Path;

use tracing::{info, warn};

use sensetier_types::{DataPoint, SortOrder};

use crate::config::StoreConfig;
use crate::error::{Error, Result};
use crate::merge::{MergeCursor, MergeSources};
use crate::predicate::{Predicate, PredicateError};
use crate::remote::{RemoteArchive, RemoteQuery};
use crate::retention::{RetentionPolicy, now_ms};
use crate::tier::{DataPointUpdate, InsertOutcome, Tier, VolatileLimits};

/// Where a query or mutation is directed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// The two local tiers, merged.
    Local,
    /// The remote archive (read-only).
    Remote,
}

/// The ordered result sequence of a query.
pub type QueryCursor = MergeSources<std::vec::IntoIter<DataPoint>, std::vec::IntoIter<DataPoint>>;

/// Tiered store for streamed sensor data.
///
/// Construct one engine at process start and hand out references; the
/// engine owns both tiers and serializes access per tier. All operations
/// block the calling thread until the row store answers, so invoke the
/// engine off any latency-sensitive thread.
pub struct StorageEngine {
    volatile: Tier,
    persistent: Tier,
    remote: Option<Box<dyn RemoteArchive>>,
    config: StoreConfig,
}

impl StorageEngine {
    /// Open an engine with its persistent tier at the given path.
    pub fn open<P: AsRef<Path>>(path: P, config: StoreConfig) -> Result<Self> {
        let persistent = Tier::persistent(path)?;
        Self::with_tiers(persistent, config)
    }

    /// Open an engine whose persistent tier also lives in memory
    /// (for testing).
    pub fn open_in_memory(config: StoreConfig) -> Result<Self> {
        let persistent = Tier::persistent_in_memory()?;
        Self::with_tiers(persistent, config)
    }

    fn with_tiers(persistent: Tier, config: StoreConfig) -> Result<Self> {
        let volatile = Tier::volatile(VolatileLimits {
            max_bytes: config.max_volatile_bytes,
            max_rows: config.max_volatile_rows,
        })?;

        Ok(Self {
            volatile,
            persistent,
            remote: None,
            config,
        })
    }

    /// Attach a remote archive for `Target::Remote` queries.
    #[must_use]
    pub fn with_remote(mut self, remote: Box<dyn RemoteArchive>) -> Self {
        self.remote = Some(remote);
        self
    }

    /// The retention policy derived from the configuration.
    #[must_use]
    pub fn retention_policy(&self) -> RetentionPolicy {
        RetentionPolicy {
            window: self.config.retention_window(),
            use_remote_archive: self.config.use_remote_archive,
        }
    }

    /// Insert a data point into the volatile tier.
    ///
    /// On overflow the engine runs the promotion protocol once (retention
    /// sweep, bulk-copy of unsent-or-recent rows into the persistent
    /// tier, volatile clear) and retries. A second overflow fails with
    /// [`Error::CapacityExceeded`].
    pub fn insert(&self, point: &DataPoint) -> Result<i64> {
        match self.volatile.insert(point)? {
            InsertOutcome::Inserted(id) => Ok(id),
            InsertOutcome::Overflow => {
                info!("Volatile tier full, promoting to persistent tier");
                self.flush()?;

                match self.volatile.insert(point)? {
                    InsertOutcome::Inserted(id) => Ok(id),
                    InsertOutcome::Overflow => Err(Error::CapacityExceeded),
                }
            }
        }
    }

    /// Run the retention sweep on the persistent tier, then move every
    /// volatile row that must not be lost (not yet sent, or still inside
    /// the retention window) into the persistent tier and empty the
    /// volatile tier. Returns the number of rows promoted.
    ///
    /// Tier locks are taken persistent-first, and the bulk copy is one
    /// transaction: a partial promotion is never observable.
    pub fn flush(&self) -> Result<usize> {
        let now = now_ms();
        let policy = self.retention_policy();

        let swept = self.persistent.apply_retention(&policy, now)?;
        let keep = self.volatile.unsent_or_recent(policy.horizon(now))?;
        self.persistent.bulk_insert(&keep)?;
        self.volatile.clear()?;

        info!(
            promoted = keep.len(),
            swept, "Promoted volatile data points"
        );
        Ok(keep.len())
    }

    /// Run only the retention sweep on the persistent tier; returns the
    /// number of rows reclaimed.
    pub fn sweep(&self) -> Result<usize> {
        self.persistent
            .apply_retention(&self.retention_policy(), now_ms())
    }

    /// Query data points.
    ///
    /// For [`Target::Local`] both tiers are queried with the parsed
    /// predicate and merged in timestamp order. For [`Target::Remote`]
    /// the predicate must resolve to exactly one sensor name; archive
    /// failures degrade to an empty result so local querying keeps
    /// working without connectivity.
    pub fn query(
        &self,
        target: Target,
        selection: Option<&str>,
        args: &[String],
        order: SortOrder,
        limit: Option<usize>,
    ) -> Result<QueryCursor> {
        let predicate = Predicate::parse(selection, args)?;
        let limit = self.config.effective_limit(limit);

        match target {
            Target::Local => {
                let volatile = self.volatile.query(&predicate, order, limit)?;
                let persistent = self.persistent.query(&predicate, order, limit)?;
                Ok(MergeCursor::new(
                    volatile.into_iter(),
                    persistent.into_iter(),
                    order,
                    limit,
                ))
            }
            Target::Remote => {
                let points = self.query_remote(&predicate, order, limit)?;
                Ok(MergeCursor::new(
                    points.into_iter(),
                    Vec::new().into_iter(),
                    order,
                    limit,
                ))
            }
        }
    }

    fn query_remote(
        &self,
        predicate: &Predicate,
        order: SortOrder,
        limit: usize,
    ) -> Result<Vec<DataPoint>> {
        let mut known = self.volatile.sensor_names()?;
        known.extend(self.persistent.sensor_names()?);

        let mut names = predicate.resolve_sensor_names(&known);
        if names.len() != 1 {
            return Err(PredicateError::SensorCount(names.len()).into());
        }

        let query = RemoteQuery {
            sensor_name: names.remove(0),
            start_ms: predicate.time_range.min,
            end_ms: predicate.time_range.max,
            device_uuid: predicate.device_uuid.clone(),
            order,
            limit,
        };

        let Some(remote) = &self.remote else {
            warn!("No remote archive configured, returning no data");
            return Ok(Vec::new());
        };

        // No tier lock is held here; the archive call can take a while.
        match remote.query(&query) {
            Ok(points) => Ok(points),
            Err(e) => {
                warn!(sensor = %query.sensor_name, error = %e, "Remote archive query failed");
                Ok(Vec::new())
            }
        }
    }

    /// Update matching data points in both local tiers; returns the number
    /// of rows changed.
    ///
    /// With `persist` set the call instead runs the retention sweep plus a
    /// forced promotion of the volatile tier and returns zero; this is the
    /// caller-facing flush hook.
    pub fn update(
        &self,
        target: Target,
        selection: Option<&str>,
        args: &[String],
        update: &DataPointUpdate,
        persist: bool,
    ) -> Result<usize> {
        if target == Target::Remote {
            return Err(Error::InvalidTarget(
                "cannot update data points in the remote archive".to_string(),
            ));
        }

        if persist {
            self.flush()?;
            return Ok(0);
        }

        let predicate = Predicate::parse(selection, args)?;
        let mut changed = self.volatile.update(&predicate, update)?;
        changed += self.persistent.update(&predicate, update)?;
        Ok(changed)
    }

    /// Delete matching data points from both local tiers; returns the
    /// number of rows removed. The remote archive is read-only.
    pub fn delete(&self, target: Target, selection: Option<&str>, args: &[String]) -> Result<usize> {
        if target == Target::Remote {
            return Err(Error::InvalidTarget(
                "cannot delete data points from the remote archive".to_string(),
            ));
        }

        let predicate = Predicate::parse(selection, args)?;
        let mut removed = self.volatile.delete(&predicate)?;
        removed += self.persistent.delete(&predicate)?;
        Ok(removed)
    }

    /// Number of rows currently held in (volatile, persistent) order.
    pub fn tier_row_counts(&self) -> Result<(u64, u64)> {
        Ok((self.volatile.row_count()?, self.persistent.row_count()?))
    }
}
