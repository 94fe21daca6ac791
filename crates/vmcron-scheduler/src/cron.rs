//! Five-field cron evaluation on top of the `cron` crate.
//!
//! The `cron` crate expects a leading seconds field, numbers Sunday as 1 and
//! ANDs day-of-month with day-of-week. Classic crontab syntax differs on all
//! three points, so expressions are translated here:
//!
//! * a `0` seconds field is prepended (minute granularity);
//! * the day-of-week field is expanded to weekday names (`0` and `7` = Sunday);
//! * when both day fields are restricted, a day matches if *either* matches,
//!   which is evaluated as the earliest of two schedules.

use std::str::FromStr;

use chrono::{DateTime, Utc};

use crate::error::{Result, SchedulerError};

const WEEKDAY_NAMES: [&str; 7] = ["Sun", "Mon", "Tue", "Wed", "Thu", "Fri", "Sat"];

/// A validated cron expression.
#[derive(Debug, Clone)]
pub struct CronExpr {
    source: String,
    /// One schedule, or two whose union gives day-of-month OR day-of-week.
    schedules: Vec<cron::Schedule>,
}

impl CronExpr {
    /// Parse a five-field expression (minute hour day-of-month month day-of-week).
    pub fn parse(expression: &str) -> Result<Self> {
        let invalid = |reason: String| SchedulerError::InvalidCron {
            expression: expression.to_string(),
            reason,
        };

        let fields: Vec<&str> = expression.split_whitespace().collect();
        let [minute, hour, dom, month, dow] = fields[..] else {
            return Err(invalid(format!(
                "expected 5 fields (minute hour day-of-month month day-of-week), got {}",
                fields.len()
            )));
        };

        let dom = if dom == "?" { "*" } else { dom };
        let weekdays = normalize_weekdays(dow).map_err(invalid)?;
        let dom_restricted = !dom.starts_with('*');
        let dow_restricted = !(dow.starts_with('*') || dow == "?");

        let build = |dom: &str, dow: &str| {
            cron::Schedule::from_str(&format!("0 {minute} {hour} {dom} {month} {dow}"))
                .map_err(|e| invalid(e.to_string()))
        };

        let schedules = if dom_restricted && dow_restricted {
            vec![build(dom, "*")?, build("*", &weekdays)?]
        } else {
            vec![build(dom, &weekdays)?]
        };

        Ok(Self {
            source: expression.trim().to_string(),
            schedules,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Smallest matching instant strictly after `reference`.
    ///
    /// `None` when the expression can never match (e.g. `0 0 30 2 *`).
    pub fn next_after(&self, reference: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.schedules
            .iter()
            .filter_map(|s| s.after(&reference).next())
            .min()
    }

    /// All fire instants in `(reference, until]`, in order.
    pub fn upcoming(&self, reference: DateTime<Utc>, until: DateTime<Utc>) -> Vec<DateTime<Utc>> {
        let mut out = Vec::new();
        let mut cursor = reference;
        while let Some(next) = self.next_after(cursor) {
            if next > until {
                break;
            }
            out.push(next);
            cursor = next;
        }
        out
    }
}

impl PartialEq for CronExpr {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

/// Reject malformed expressions up front, at schedule-write time.
pub fn validate(expression: &str) -> Result<()> {
    CronExpr::parse(expression).map(|_| ())
}

/// Next fire instant for `expression` strictly after `reference`.
pub fn next_fire(expression: &str, reference: DateTime<Utc>) -> Result<Option<DateTime<Utc>>> {
    Ok(CronExpr::parse(expression)?.next_after(reference))
}

/// Short human-readable label for the common patterns operators pick.
pub fn describe(expression: &str) -> String {
    let normalized = expression.split_whitespace().collect::<Vec<_>>().join(" ");
    let label = match normalized.as_str() {
        "* * * * *" => "Every minute",
        "*/5 * * * *" => "Every 5 minutes",
        "*/10 * * * *" => "Every 10 minutes",
        "*/15 * * * *" => "Every 15 minutes",
        "*/30 * * * *" => "Every 30 minutes",
        "0 * * * *" => "Every hour",
        "0 */2 * * *" => "Every 2 hours",
        "0 0 * * *" => "Daily at midnight",
        "0 2 * * *" => "Daily at 2:00 AM",
        "0 0 * * 0" => "Weekly on Sunday",
        "0 0 1 * *" => "Monthly on the 1st",
        _ => return format!("Custom: {normalized}"),
    };
    label.to_string()
}

/// Expand a crontab day-of-week field into the `cron` crate's name syntax.
fn normalize_weekdays(field: &str) -> std::result::Result<String, String> {
    if field == "*" || field == "?" {
        return Ok("*".to_string());
    }

    let mut days = [false; 7];
    for item in field.split(',') {
        let (base, step) = match item.split_once('/') {
            Some((base, step)) => {
                let step: usize = step
                    .parse()
                    .map_err(|_| format!("invalid day-of-week step '{step}'"))?;
                if step == 0 {
                    return Err("day-of-week step must be at least 1".to_string());
                }
                (base, Some(step))
            }
            None => (item, None),
        };

        let (start, end) = if base == "*" {
            (0, 6)
        } else if let Some((a, b)) = base.split_once('-') {
            (weekday_value(a)?, weekday_value(b)?)
        } else {
            let day = weekday_value(base)?;
            // `5/2` means "from Friday, every second day"
            (day, if step.is_some() { 6 } else { day })
        };
        if start > end {
            return Err(format!("day-of-week range '{base}' runs backwards"));
        }

        for day in (start..=end).step_by(step.unwrap_or(1)) {
            days[day % 7] = true;
        }
    }

    Ok(days
        .iter()
        .zip(WEEKDAY_NAMES)
        .filter(|(on, _)| **on)
        .map(|(_, name)| name)
        .collect::<Vec<_>>()
        .join(","))
}

/// 0–7 (both ends Sunday) or a three-letter English day name.
fn weekday_value(token: &str) -> std::result::Result<usize, String> {
    if let Ok(n) = token.parse::<usize>() {
        return if n <= 7 {
            Ok(n)
        } else {
            Err(format!("day-of-week {n} out of range 0-7"))
        };
    }
    WEEKDAY_NAMES
        .iter()
        .position(|name| name.eq_ignore_ascii_case(token))
        .ok_or_else(|| format!("invalid day-of-week '{token}'"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Duration, TimeZone, Timelike, Weekday};

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    #[test]
    fn every_fifteen_minutes() {
        let next = next_fire("*/15 * * * *", at(2026, 3, 2, 10, 7)).unwrap();
        assert_eq!(next, Some(at(2026, 3, 2, 10, 15)));
    }

    #[test]
    fn result_is_strictly_after_reference() {
        let expr = CronExpr::parse("*/15 * * * *").unwrap();
        assert_eq!(expr.next_after(at(2026, 3, 2, 10, 15)), Some(at(2026, 3, 2, 10, 30)));

        let mid_minute = at(2026, 3, 2, 10, 14) + Duration::seconds(59);
        assert_eq!(expr.next_after(mid_minute), Some(at(2026, 3, 2, 10, 15)));
    }

    #[test]
    fn next_is_after_reference_across_a_sweep() {
        let exprs = [
            "* * * * *",
            "*/7 * * * *",
            "0 2 * * *",
            "30 9-17/2 * * 1-5",
            "0 0 1,15 * *",
            "0 12 13 * 5",
            "45 23 * 12 0",
        ];
        for source in exprs {
            let expr = CronExpr::parse(source).unwrap();
            let mut reference = at(2026, 1, 1, 0, 0) + Duration::seconds(17);
            for _ in 0..200 {
                let next = expr.next_after(reference).unwrap();
                assert!(next > reference, "{source}: {next} not after {reference}");
                assert_eq!(next.second(), 0);
                reference += Duration::minutes(97);
            }
        }
    }

    #[test]
    fn ranges_lists_and_steps() {
        let expr = CronExpr::parse("0 9-17/4 * * *").unwrap();
        assert_eq!(expr.next_after(at(2026, 3, 2, 10, 0)), Some(at(2026, 3, 2, 13, 0)));

        let expr = CronExpr::parse("5,35 * * * *").unwrap();
        assert_eq!(expr.next_after(at(2026, 3, 2, 10, 6)), Some(at(2026, 3, 2, 10, 35)));
    }

    #[test]
    fn weekdays_use_crontab_numbering() {
        // 2026-03-07 is a Saturday.
        let saturday = at(2026, 3, 7, 12, 0);
        assert_eq!(saturday.weekday(), Weekday::Sat);

        let weekdays = CronExpr::parse("0 8 * * 1-5").unwrap();
        let next = weekdays.next_after(saturday).unwrap();
        assert_eq!(next, at(2026, 3, 9, 8, 0));
        assert_eq!(next.weekday(), Weekday::Mon);

        for sunday in ["0 0 * * 0", "0 0 * * 7", "0 0 * * sun"] {
            let next = CronExpr::parse(sunday).unwrap().next_after(saturday).unwrap();
            assert_eq!(next, at(2026, 3, 8, 0, 0), "{sunday}");
        }

        let wrapping = CronExpr::parse("0 0 * * 5-7").unwrap();
        let days: Vec<Weekday> = wrapping
            .upcoming(at(2026, 3, 2, 0, 0), at(2026, 3, 9, 0, 0))
            .iter()
            .map(|t| t.weekday())
            .collect();
        assert_eq!(days, vec![Weekday::Fri, Weekday::Sat, Weekday::Sun]);
    }

    #[test]
    fn restricted_day_fields_are_ored() {
        // Noon on the 13th or on any Friday. 2026-04-13 is a Monday.
        let expr = CronExpr::parse("0 12 13 * 5").unwrap();
        let fires = expr.upcoming(at(2026, 4, 1, 0, 0), at(2026, 4, 18, 0, 0));
        assert_eq!(
            fires,
            vec![
                at(2026, 4, 3, 12, 0),
                at(2026, 4, 10, 12, 0),
                at(2026, 4, 13, 12, 0),
                at(2026, 4, 17, 12, 0),
            ]
        );
    }

    #[test]
    fn malformed_expressions_are_rejected() {
        for bad in [
            "",
            "* * * *",
            "0 * * * * *",
            "61 * * * *",
            "* 24 * * *",
            "* * * 13 *",
            "* * * * 8",
            "* * * * 5-2",
            "every day",
        ] {
            let err = validate(bad).unwrap_err();
            assert!(err.is_validation(), "{bad:?} should be a validation error");
        }
    }

    #[test]
    fn upcoming_is_bounded() {
        let expr = CronExpr::parse("0 * * * *").unwrap();
        let fires = expr.upcoming(at(2026, 3, 2, 10, 0), at(2026, 3, 2, 13, 0));
        assert_eq!(fires.len(), 3);
        assert_eq!(fires.last().unwrap().hour(), 13);
    }

    #[test]
    fn describe_common_patterns() {
        assert_eq!(describe("*/15 * * * *"), "Every 15 minutes");
        assert_eq!(describe("0  2 * * *"), "Daily at 2:00 AM");
        assert_eq!(describe("17 3 * * 2"), "Custom: 17 3 * * 2");
    }
}
