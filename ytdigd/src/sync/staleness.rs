use time::{Duration, OffsetDateTime};

pub const DEFAULT_REFRESH_WINDOW: Duration = Duration::hours(24);

/// Decides whether a user's subscription snapshot must be pulled again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StalenessPolicy {
    window: Duration,
}

impl Default for StalenessPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_REFRESH_WINDOW)
    }
}

impl StalenessPolicy {
    pub fn new(window: Duration) -> Self {
        Self { window }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// True when `force` is set, when there is no snapshot yet, or when the
    /// snapshot taken at `last_updated` is older than the window at `now`.
    /// Timestamps are unix seconds.
    pub fn is_stale(&self, last_updated: Option<i64>, force: bool, now: i64) -> bool {
        if force {
            return true;
        }
        let Some(last_updated) = last_updated else {
            return true;
        };
        Duration::seconds(now.saturating_sub(last_updated)) > self.window
    }

    pub fn is_stale_now(&self, last_updated: Option<i64>, force: bool) -> bool {
        self.is_stale(last_updated, force, now_unix())
    }
}

pub fn now_unix() -> i64 {
    OffsetDateTime::now_utc().unix_timestamp()
}
