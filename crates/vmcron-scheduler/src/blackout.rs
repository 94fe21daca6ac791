use chrono::{DateTime, Datelike, NaiveTime, Timelike, Utc};
use vmcron_core::types::BlackoutWindow;

/// Result of checking an instant against the configured blackout windows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlackoutCheck {
    Clear,
    /// Suppressed by the named window (the first enabled match).
    Suppressed { window: String },
}

impl BlackoutCheck {
    pub fn is_suppressed(&self) -> bool {
        matches!(self, BlackoutCheck::Suppressed { .. })
    }

    /// Window name when suppressed, empty otherwise.
    pub fn reason(&self) -> &str {
        match self {
            BlackoutCheck::Clear => "",
            BlackoutCheck::Suppressed { window } => window,
        }
    }
}

/// Evaluate `now` against `windows`. Disabled windows are ignored; the first
/// enabled window containing `now` wins.
pub fn check(now: DateTime<Utc>, windows: &[BlackoutWindow]) -> BlackoutCheck {
    // Drop sub-second precision so an inclusive `end` of 06:00:00 still matches
    // anything within that second.
    let time = now.time().with_nanosecond(0).unwrap_or(now.time());
    let weekday = now.weekday().num_days_from_monday() as u8;

    windows
        .iter()
        .filter(|w| w.enabled)
        .find(|w| {
            time_in_range(time, w.start_time, w.end_time)
                && w
                    .days_of_week
                    .as_ref()
                    .is_none_or(|days| days.contains(&weekday))
        })
        .map_or(BlackoutCheck::Clear, |w| BlackoutCheck::Suppressed {
            window: w.name.clone(),
        })
}

/// Inclusive membership of `time` in `[start, end]`; `start > end` wraps past midnight.
pub fn time_in_range(time: NaiveTime, start: NaiveTime, end: NaiveTime) -> bool {
    if start <= end {
        start <= time && time <= end
    } else {
        time >= start || time <= end
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn hm(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn window(name: &str, start: NaiveTime, end: NaiveTime, days: Option<Vec<u8>>) -> BlackoutWindow {
        BlackoutWindow {
            id: 1,
            name: name.to_string(),
            description: None,
            start_time: start,
            end_time: end,
            days_of_week: days,
            enabled: true,
        }
    }

    // 2026-03-02 is a Monday.
    fn monday_at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, h, m, 0).unwrap()
    }

    #[test]
    fn overnight_window_suppresses_late_evening() {
        let windows = [window("nightly-backup", hm(22, 0), hm(6, 0), None)];
        let result = check(monday_at(23, 30), &windows);
        assert_eq!(
            result,
            BlackoutCheck::Suppressed {
                window: "nightly-backup".to_string()
            }
        );
        assert_eq!(result.reason(), "nightly-backup");
    }

    #[test]
    fn midnight_crossing_membership_matches_split_interval() {
        let (start, end) = (hm(22, 0), hm(6, 0));
        for minute in 0..(24 * 60) {
            let t = hm(minute / 60, minute % 60);
            let expected = t >= start || t <= end;
            assert_eq!(time_in_range(t, start, end), expected, "{t}");
        }
    }

    #[test]
    fn normal_range_is_inclusive() {
        assert!(time_in_range(hm(9, 0), hm(9, 0), hm(17, 0)));
        assert!(time_in_range(hm(17, 0), hm(9, 0), hm(17, 0)));
        assert!(!time_in_range(hm(17, 1), hm(9, 0), hm(17, 0)));
        assert!(!time_in_range(hm(8, 59), hm(9, 0), hm(17, 0)));
    }

    #[test]
    fn day_restriction_uses_monday_zero() {
        let monday_only = [window("patch-monday", hm(0, 0), hm(23, 59), Some(vec![0]))];
        assert!(check(monday_at(12, 0), &monday_only).is_suppressed());

        let tuesday = Utc.with_ymd_and_hms(2026, 3, 3, 12, 0, 0).unwrap();
        assert_eq!(check(tuesday, &monday_only), BlackoutCheck::Clear);
    }

    #[test]
    fn disabled_windows_are_ignored_and_first_match_wins() {
        let mut disabled = window("disabled", hm(0, 0), hm(23, 59), None);
        disabled.enabled = false;
        let windows = [
            disabled,
            window("first", hm(10, 0), hm(11, 0), None),
            window("second", hm(10, 0), hm(12, 0), None),
        ];
        assert_eq!(check(monday_at(10, 30), &windows).reason(), "first");
        assert_eq!(check(monday_at(11, 30), &windows).reason(), "second");
        assert_eq!(check(monday_at(13, 0), &windows), BlackoutCheck::Clear);
    }

    #[test]
    fn empty_window_set_is_clear() {
        let result = check(monday_at(3, 0), &[]);
        assert!(!result.is_suppressed());
        assert_eq!(result.reason(), "");
    }
}
