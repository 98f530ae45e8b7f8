//! Age- and transmit-state-based retention for the persistent tier.

use time::{Duration, OffsetDateTime};

use sensetier_types::{DataPoint, TransmitState};

/// Eviction rule applied to the persistent tier.
///
/// A stateless function of "now": a persisted data point is eligible for
/// deletion once it is older than the retention window and, when a remote
/// archive is in use, has been confirmed uploaded. Without a remote
/// archive, age alone decides.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    /// Minimum time a persisted data point is guaranteed to survive.
    pub window: Duration,
    /// Whether uploads to a remote archive gate eligibility.
    pub use_remote_archive: bool,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            window: Duration::hours(24),
            use_remote_archive: true,
        }
    }
}

impl RetentionPolicy {
    /// The cut-off timestamp (epoch ms): data points strictly older than
    /// this have aged out of the window.
    #[must_use]
    pub fn horizon(&self, now_ms: i64) -> i64 {
        now_ms.saturating_sub(self.window.whole_milliseconds() as i64)
    }

    /// Whether a data point is eligible for deletion at `now_ms`.
    #[must_use]
    pub fn is_eligible(&self, point: &DataPoint, now_ms: i64) -> bool {
        point.timestamp < self.horizon(now_ms)
            && (!self.use_remote_archive || point.transmit_state == TransmitState::Sent)
    }
}

/// Current wall-clock time in epoch milliseconds.
pub(crate) fn now_ms() -> i64 {
    (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use sensetier_types::DataType;

    const HOUR_MS: i64 = 60 * 60 * 1000;

    fn point(age_hours: i64, state: TransmitState, now: i64) -> DataPoint {
        DataPoint::new("s", DataType::Int, now - age_hours * HOUR_MS, "1")
            .with_transmit_state(state)
    }

    #[test]
    fn test_horizon() {
        let policy = RetentionPolicy::default();
        let now = 100 * HOUR_MS;
        assert_eq!(policy.horizon(now), now - 24 * HOUR_MS);
    }

    #[test]
    fn test_recent_points_always_survive() {
        let policy = RetentionPolicy::default();
        let now = 100 * HOUR_MS;
        assert!(!policy.is_eligible(&point(1, TransmitState::Sent, now), now));
        assert!(!policy.is_eligible(&point(23, TransmitState::Sent, now), now));
    }

    #[test]
    fn test_old_sent_points_are_eligible_with_archive() {
        let policy = RetentionPolicy::default();
        let now = 100 * HOUR_MS;
        assert!(policy.is_eligible(&point(25, TransmitState::Sent, now), now));
        assert!(!policy.is_eligible(&point(25, TransmitState::NotSent, now), now));
    }

    #[test]
    fn test_without_archive_age_alone_decides() {
        let policy = RetentionPolicy {
            use_remote_archive: false,
            ..RetentionPolicy::default()
        };
        let now = 100 * HOUR_MS;
        assert!(policy.is_eligible(&point(25, TransmitState::NotSent, now), now));
        assert!(policy.is_eligible(&point(25, TransmitState::Sent, now), now));
        assert!(!policy.is_eligible(&point(23, TransmitState::NotSent, now), now));
    }

    #[test]
    fn test_boundary_is_exclusive() {
        // exactly at the window edge: not yet older than the window
        let policy = RetentionPolicy::default();
        let now = 100 * HOUR_MS;
        let edge = point(24, TransmitState::Sent, now);
        assert!(!policy.is_eligible(&edge, now));
    }
}
