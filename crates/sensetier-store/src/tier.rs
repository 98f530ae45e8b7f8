//! Storage tiers wrapping the SQLite row store.
//!
//! Both tiers share one schema and one set of row operations; they differ
//! in backing (in-memory vs on-disk) and in bounds. The volatile tier
//! enforces two capacity ceilings and signals overflow *before* touching
//! the row store; the persistent tier is unbounded and instead governed by
//! [`RetentionPolicy`].

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use rusqlite::{Connection, ToSql, params};
use tracing::{debug, info};

use sensetier_types::{DataPoint, DataType, SortOrder, TransmitState};

use crate::error::{Error, Result};
use crate::predicate::Predicate;
use crate::retention::RetentionPolicy;
use crate::schema;

/// Fixed per-row overhead added to the byte estimate, covering the numeric
/// columns and row bookkeeping.
const ROW_OVERHEAD: u64 = 72;

const SELECT_COLUMNS: &str = "sensor_name, display_name, sensor_description, data_type, \
     timestamp, value, device_uuid, transmit_state";

const INSERT_SQL: &str = "INSERT INTO data_points (sensor_name, display_name, \
     sensor_description, data_type, timestamp, value, device_uuid, transmit_state) \
     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)";

/// Result of a tier insert: the tier-local row id, or an overflow signal
/// when a volatile ceiling would be exceeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// The row was written; the id is unique only within this tier.
    Inserted(i64),
    /// A capacity ceiling would be exceeded; nothing was written.
    Overflow,
}

/// Capacity ceilings for the volatile tier. Tripping either one raises an
/// overflow condition on insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VolatileLimits {
    pub max_bytes: u64,
    pub max_rows: u64,
}

/// Fields to change on matching rows; `None` fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct DataPointUpdate {
    /// Replacement payload.
    pub value: Option<String>,
    /// Replacement transmit state. This is how the uploader marks rows
    /// as sent.
    pub transmit_state: Option<TransmitState>,
}

impl DataPointUpdate {
    /// An update that marks matching rows as uploaded.
    #[must_use]
    pub fn mark_sent() -> Self {
        Self {
            value: None,
            transmit_state: Some(TransmitState::Sent),
        }
    }

    fn is_empty(&self) -> bool {
        self.value.is_none() && self.transmit_state.is_none()
    }
}

struct TierInner {
    conn: Connection,
    row_count: u64,
    byte_estimate: u64,
}

/// One storage tier: an ordered multiset of data points backed by SQLite.
///
/// Each tier exclusively owns its connection; all operations serialize on
/// the tier's own mutex.
pub struct Tier {
    limits: Option<VolatileLimits>,
    inner: Mutex<TierInner>,
}

impl Tier {
    /// Create the volatile tier: an in-memory database bounded by `limits`.
    pub fn volatile(limits: VolatileLimits) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        schema::initialize(&conn)?;

        Ok(Self {
            limits: Some(limits),
            inner: Mutex::new(TierInner {
                conn,
                row_count: 0,
                byte_estimate: 0,
            }),
        })
    }

    /// Open (or create) the persistent tier at the given path.
    pub fn persistent<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent).map_err(|e| Error::CreateDirectory {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        info!("Opening persistent tier at {}", path.display());
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;",
        )?;

        schema::initialize(&conn)?;

        Ok(Self {
            limits: None,
            inner: Mutex::new(TierInner {
                conn,
                row_count: 0,
                byte_estimate: 0,
            }),
        })
    }

    /// An in-memory, unbounded tier (for testing).
    pub fn persistent_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        schema::initialize(&conn)?;

        Ok(Self {
            limits: None,
            inner: Mutex::new(TierInner {
                conn,
                row_count: 0,
                byte_estimate: 0,
            }),
        })
    }

    fn lock(&self) -> MutexGuard<'_, TierInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert a single data point, checking the capacity ceilings first.
    pub fn insert(&self, point: &DataPoint) -> Result<InsertOutcome> {
        let mut inner = self.lock();

        if let Some(limits) = self.limits {
            let projected_rows = inner.row_count + 1;
            let projected_bytes = inner.byte_estimate + estimate_bytes(point);
            if projected_rows > limits.max_rows || projected_bytes > limits.max_bytes {
                debug!(
                    rows = inner.row_count,
                    bytes = inner.byte_estimate,
                    "Volatile tier ceiling reached"
                );
                return Ok(InsertOutcome::Overflow);
            }
        }

        inner.conn.execute(
            INSERT_SQL,
            params![
                point.sensor_name,
                point.display_name,
                point.sensor_description,
                point.data_type.as_str(),
                point.timestamp,
                point.value,
                point.device_uuid,
                point.transmit_state.code(),
            ],
        )?;
        let id = inner.conn.last_insert_rowid();

        inner.row_count += 1;
        inner.byte_estimate += estimate_bytes(point);

        Ok(InsertOutcome::Inserted(id))
    }

    /// Insert a batch of data points in a single transaction: all rows or
    /// none. Used by the promotion path.
    pub fn bulk_insert(&self, points: &[DataPoint]) -> Result<usize> {
        let inner = &mut *self.lock();

        let tx = inner.conn.transaction()?;
        {
            let mut stmt = tx.prepare(INSERT_SQL)?;
            for point in points {
                stmt.execute(params![
                    point.sensor_name,
                    point.display_name,
                    point.sensor_description,
                    point.data_type.as_str(),
                    point.timestamp,
                    point.value,
                    point.device_uuid,
                    point.transmit_state.code(),
                ])?;
            }
        }
        tx.commit()?;

        inner.row_count += points.len() as u64;
        inner.byte_estimate += points.iter().map(estimate_bytes).sum::<u64>();

        Ok(points.len())
    }

    /// Query data points matching the predicate, ordered by timestamp.
    ///
    /// Rows with equal timestamps are ordered by row id in the query
    /// direction, keeping ties deterministic.
    pub fn query(
        &self,
        predicate: &Predicate,
        order: SortOrder,
        limit: usize,
    ) -> Result<Vec<DataPoint>> {
        let (where_clause, params) = predicate.build_where();
        let dir = order.sql_keyword();
        let sql = format!(
            "SELECT {SELECT_COLUMNS} FROM data_points {where_clause} \
             ORDER BY timestamp {dir}, id {dir} LIMIT {limit}"
        );

        debug!("Executing query: {}", sql);

        let inner = self.lock();
        let params_ref: Vec<&dyn ToSql> = params.iter().map(|p| p.as_ref()).collect();

        let mut stmt = inner.conn.prepare(&sql)?;
        let points = stmt
            .query_map(params_ref.as_slice(), map_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(points)
    }

    /// Update matching rows; returns the number of rows changed.
    pub fn update(&self, predicate: &Predicate, update: &DataPointUpdate) -> Result<usize> {
        if update.is_empty() {
            return Ok(0);
        }

        let (where_clause, where_params) = predicate.build_where();

        let mut assignments: Vec<&str> = Vec::new();
        let mut params: Vec<Box<dyn ToSql>> = Vec::new();

        if let Some(value) = &update.value {
            assignments.push("value = ?");
            params.push(Box::new(value.clone()));
        }
        if let Some(state) = update.transmit_state {
            assignments.push("transmit_state = ?");
            params.push(Box::new(state.code()));
        }

        params.extend(where_params);

        let sql = format!(
            "UPDATE data_points SET {} {where_clause}",
            assignments.join(", ")
        );

        let mut inner = self.lock();
        let params_ref: Vec<&dyn ToSql> = params.iter().map(|p| p.as_ref()).collect();
        let changed = inner.conn.execute(&sql, params_ref.as_slice())?;

        if self.limits.is_some() {
            refresh_usage(&mut inner)?;
        }

        Ok(changed)
    }

    /// Delete matching rows; returns the number of rows removed.
    pub fn delete(&self, predicate: &Predicate) -> Result<usize> {
        let (where_clause, params) = predicate.build_where();
        let sql = format!("DELETE FROM data_points {where_clause}");

        let mut inner = self.lock();
        let params_ref: Vec<&dyn ToSql> = params.iter().map(|p| p.as_ref()).collect();
        let removed = inner.conn.execute(&sql, params_ref.as_slice())?;

        if self.limits.is_some() {
            refresh_usage(&mut inner)?;
        }

        Ok(removed)
    }

    /// Remove every row. Used to empty the volatile tier after promotion.
    pub fn clear(&self) -> Result<usize> {
        let mut inner = self.lock();
        let removed = inner.conn.execute("DELETE FROM data_points", [])?;
        inner.row_count = 0;
        inner.byte_estimate = 0;
        Ok(removed)
    }

    /// Delete rows eligible under the retention policy; returns the number
    /// removed. Only meaningful on the persistent tier.
    pub fn apply_retention(&self, policy: &RetentionPolicy, now_ms: i64) -> Result<usize> {
        let horizon = policy.horizon(now_ms);

        let mut inner = self.lock();
        let removed = if policy.use_remote_archive {
            inner.conn.execute(
                "DELETE FROM data_points WHERE timestamp < ?1 AND transmit_state = 1",
                params![horizon],
            )?
        } else {
            inner.conn.execute(
                "DELETE FROM data_points WHERE timestamp < ?1",
                params![horizon],
            )?
        };

        if self.limits.is_some() {
            refresh_usage(&mut inner)?;
        }

        debug!(removed, horizon, "Retention sweep finished");
        Ok(removed)
    }

    /// Rows that must not be lost on promotion: everything not yet sent,
    /// plus everything still inside the retention window.
    pub fn unsent_or_recent(&self, horizon: i64) -> Result<Vec<DataPoint>> {
        let inner = self.lock();

        let mut stmt = inner.conn.prepare(&format!(
            "SELECT {SELECT_COLUMNS} FROM data_points \
             WHERE transmit_state != 1 OR timestamp > ?1 \
             ORDER BY timestamp ASC, id ASC"
        ))?;
        let points = stmt
            .query_map(params![horizon], map_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(points)
    }

    /// The distinct sensor names currently present in this tier.
    pub fn sensor_names(&self) -> Result<BTreeSet<String>> {
        let inner = self.lock();

        let mut stmt = inner
            .conn
            .prepare("SELECT DISTINCT sensor_name FROM data_points")?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<BTreeSet<_>, _>>()?;

        Ok(names)
    }

    /// Number of rows in this tier.
    pub fn row_count(&self) -> Result<u64> {
        let inner = self.lock();
        let count: i64 = inner
            .conn
            .query_row("SELECT COUNT(*) FROM data_points", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}

fn map_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<DataPoint> {
    let data_type: String = row.get(3)?;
    let data_type = DataType::try_from(data_type.as_str()).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, Box::new(e))
    })?;

    Ok(DataPoint {
        sensor_name: row.get(0)?,
        display_name: row.get(1)?,
        sensor_description: row.get(2)?,
        data_type,
        timestamp: row.get(4)?,
        value: row.get(5)?,
        device_uuid: row.get(6)?,
        transmit_state: TransmitState::from_code(row.get(7)?),
    })
}

/// Approximate in-store footprint of a data point.
fn estimate_bytes(point: &DataPoint) -> u64 {
    let text_len = point.sensor_name.len()
        + point.display_name.as_deref().map_or(0, str::len)
        + point.sensor_description.as_deref().map_or(0, str::len)
        + point.value.len()
        + point.device_uuid.as_deref().map_or(0, str::len);
    text_len as u64 + ROW_OVERHEAD
}

/// Recompute the cached row count and byte estimate from the database,
/// after operations whose effect on size is not known up front.
fn refresh_usage(inner: &mut TierInner) -> Result<()> {
    let (rows, text_bytes): (i64, i64) = inner.conn.query_row(
        "SELECT COUNT(*), COALESCE(SUM(LENGTH(sensor_name) \
             + COALESCE(LENGTH(display_name), 0) \
             + COALESCE(LENGTH(sensor_description), 0) \
             + LENGTH(value) \
             + COALESCE(LENGTH(device_uuid), 0)), 0) \
         FROM data_points",
        [],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;

    inner.row_count = rows as u64;
    inner.byte_estimate = text_bytes as u64 + rows as u64 * ROW_OVERHEAD;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_volatile(max_rows: u64) -> Tier {
        Tier::volatile(VolatileLimits {
            max_bytes: 1_000_000,
            max_rows,
        })
        .unwrap()
    }

    fn point(name: &str, ts: i64) -> DataPoint {
        DataPoint::new(name, DataType::Int, ts, "1")
    }

    fn insert_ok(tier: &Tier, point: &DataPoint) -> i64 {
        match tier.insert(point).unwrap() {
            InsertOutcome::Inserted(id) => id,
            InsertOutcome::Overflow => panic!("unexpected overflow"),
        }
    }

    #[test]
    fn test_insert_and_query() {
        let tier = Tier::persistent_in_memory().unwrap();
        insert_ok(&tier, &point("noise", 10));
        insert_ok(&tier, &point("noise", 20));

        let points = tier
            .query(&Predicate::match_all(), SortOrder::Descending, 100)
            .unwrap();
        assert_eq!(points.len(), 2);
        assert_eq!(points[0].timestamp, 20);
        assert_eq!(points[1].timestamp, 10);
    }

    #[test]
    fn test_query_ascending_and_limit() {
        let tier = Tier::persistent_in_memory().unwrap();
        for ts in [30, 10, 20] {
            insert_ok(&tier, &point("s", ts));
        }

        let points = tier
            .query(&Predicate::match_all(), SortOrder::Ascending, 2)
            .unwrap();
        assert_eq!(points.len(), 2);
        assert_eq!(points[0].timestamp, 10);
        assert_eq!(points[1].timestamp, 20);
    }

    #[test]
    fn test_row_ceiling_signals_overflow_before_insert() {
        let tier = small_volatile(2);
        insert_ok(&tier, &point("s", 1));
        insert_ok(&tier, &point("s", 2));

        assert_eq!(tier.insert(&point("s", 3)).unwrap(), InsertOutcome::Overflow);
        // nothing was written
        assert_eq!(tier.row_count().unwrap(), 2);
    }

    #[test]
    fn test_byte_ceiling_signals_overflow() {
        let tier = Tier::volatile(VolatileLimits {
            max_bytes: 200,
            max_rows: 1_000,
        })
        .unwrap();

        let big = DataPoint::new("s", DataType::String, 1, "x".repeat(100));
        insert_ok(&tier, &big);
        assert_eq!(tier.insert(&big).unwrap(), InsertOutcome::Overflow);
    }

    #[test]
    fn test_clear_resets_capacity() {
        let tier = small_volatile(1);
        insert_ok(&tier, &point("s", 1));
        assert_eq!(tier.insert(&point("s", 2)).unwrap(), InsertOutcome::Overflow);

        assert_eq!(tier.clear().unwrap(), 1);
        insert_ok(&tier, &point("s", 2));
    }

    #[test]
    fn test_delete_frees_capacity() {
        let tier = small_volatile(2);
        insert_ok(&tier, &point("noise", 1));
        insert_ok(&tier, &point("position", 2));

        let pred = Predicate::parse(Some("sensor_name='noise'"), &[]).unwrap();
        assert_eq!(tier.delete(&pred).unwrap(), 1);

        insert_ok(&tier, &point("noise", 3));
    }

    #[test]
    fn test_bulk_insert() {
        let tier = Tier::persistent_in_memory().unwrap();
        let batch: Vec<DataPoint> = (0..5).map(|ts| point("s", ts)).collect();

        assert_eq!(tier.bulk_insert(&batch).unwrap(), 5);
        assert_eq!(tier.row_count().unwrap(), 5);
    }

    #[test]
    fn test_update_marks_sent() {
        let tier = Tier::persistent_in_memory().unwrap();
        insert_ok(&tier, &point("noise", 1));
        insert_ok(&tier, &point("position", 2));

        let pred = Predicate::parse(Some("sensor_name='noise'"), &[]).unwrap();
        assert_eq!(tier.update(&pred, &DataPointUpdate::mark_sent()).unwrap(), 1);

        let sent_pred = Predicate::parse(Some("transmit_state=1"), &[]).unwrap();
        let sent = tier.query(&sent_pred, SortOrder::Descending, 100).unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].sensor_name, "noise");
    }

    #[test]
    fn test_empty_update_is_a_no_op() {
        let tier = Tier::persistent_in_memory().unwrap();
        insert_ok(&tier, &point("s", 1));
        assert_eq!(
            tier.update(&Predicate::match_all(), &DataPointUpdate::default())
                .unwrap(),
            0
        );
    }

    #[test]
    fn test_apply_retention_with_archive() {
        let tier = Tier::persistent_in_memory().unwrap();
        let policy = RetentionPolicy::default();
        let now = 1_000_000_000;
        let old = now - 2 * policy.window.whole_milliseconds() as i64;

        insert_ok(&tier, &point("old_sent", old).with_transmit_state(TransmitState::Sent));
        insert_ok(&tier, &point("old_unsent", old));
        insert_ok(&tier, &point("fresh", now).with_transmit_state(TransmitState::Sent));

        assert_eq!(tier.apply_retention(&policy, now).unwrap(), 1);

        let names = tier.sensor_names().unwrap();
        assert!(!names.contains("old_sent"));
        assert!(names.contains("old_unsent"));
        assert!(names.contains("fresh"));
    }

    #[test]
    fn test_apply_retention_without_archive() {
        let tier = Tier::persistent_in_memory().unwrap();
        let policy = RetentionPolicy {
            use_remote_archive: false,
            ..RetentionPolicy::default()
        };
        let now = 1_000_000_000;
        let old = now - 2 * policy.window.whole_milliseconds() as i64;

        insert_ok(&tier, &point("old_unsent", old));
        insert_ok(&tier, &point("fresh", now));

        assert_eq!(tier.apply_retention(&policy, now).unwrap(), 1);
        assert_eq!(tier.row_count().unwrap(), 1);
    }

    #[test]
    fn test_unsent_or_recent_selection() {
        let tier = small_volatile(100);
        let horizon = 1_000;

        insert_ok(&tier, &point("old_unsent", 500));
        insert_ok(&tier, &point("old_sent", 500).with_transmit_state(TransmitState::Sent));
        insert_ok(&tier, &point("fresh_sent", 1_500).with_transmit_state(TransmitState::Sent));

        let keep = tier.unsent_or_recent(horizon).unwrap();
        let names: Vec<&str> = keep.iter().map(|p| p.sensor_name.as_str()).collect();
        assert_eq!(names, vec!["old_unsent", "fresh_sent"]);
    }

    #[test]
    fn test_round_trip_preserves_fields() {
        let tier = Tier::persistent_in_memory().unwrap();
        let original = DataPoint::new("position", DataType::Json, 77, r#"{"lat":51.9}"#)
            .with_display_name("Position")
            .with_description("GPS")
            .with_device_uuid("abc-123")
            .with_transmit_state(TransmitState::Sent);

        insert_ok(&tier, &original);

        let stored = tier
            .query(&Predicate::match_all(), SortOrder::Descending, 1)
            .unwrap();
        assert_eq!(stored[0], original);
    }
}
