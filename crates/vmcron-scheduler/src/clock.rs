//! Wall-clock abstraction so timer behaviour can be tested under paused tokio time.

use chrono::{DateTime, Utc};

/// Source of "now" for the registry and the fire callback.
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> DateTime<Utc>;
}

/// Real system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// UTC anchor advanced by tokio's monotonic clock.
///
/// Under `#[tokio::test(start_paused = true)]` tokio auto-advances time when
/// the runtime is idle, so sleeps until a cron instant complete immediately
/// while `now()` still reports the instant the sleep was aiming for.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    anchor: DateTime<Utc>,
    started: tokio::time::Instant,
}

impl MonotonicClock {
    pub fn anchored_at(anchor: DateTime<Utc>) -> Self {
        Self {
            anchor,
            started: tokio::time::Instant::now(),
        }
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> DateTime<Utc> {
        let elapsed = self.started.elapsed();
        self.anchor + chrono::Duration::from_std(elapsed).unwrap_or(chrono::Duration::zero())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn monotonic_clock_follows_paused_time() {
        let anchor = Utc.with_ymd_and_hms(2026, 3, 2, 10, 7, 0).unwrap();
        let clock = MonotonicClock::anchored_at(anchor);
        assert_eq!(clock.now(), anchor);

        tokio::time::sleep(Duration::from_secs(480)).await;
        assert_eq!(clock.now(), Utc.with_ymd_and_hms(2026, 3, 2, 10, 15, 0).unwrap());
    }
}
