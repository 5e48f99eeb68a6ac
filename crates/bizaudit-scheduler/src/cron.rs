//! Lightweight cron expression parser.
//! Supports: "MIN HOUR DOM MON DOW" (5-field, no seconds)
//! Per field: `*`, `N`, `a-b`, `*/n`, `a-b/n`, `N/n`, comma lists.
//! Month names JAN–DEC and weekday names SUN–SAT; `7` is also Sunday.
//! Example: "0 8 * * *" = every day at 8:00
//!
//! No cron crate dependency. The next-run search skips whole months, days and
//! hours that cannot match, so even yearly expressions resolve quickly.

use chrono::{DateTime, Datelike, Duration, NaiveDate, Timelike, Utc};

use bizaudit_core::error::{BizAuditError, Result};

const MONTH_NAMES: [&str; 12] = [
    "JAN", "FEB", "MAR", "APR", "MAY", "JUN", "JUL", "AUG", "SEP", "OCT", "NOV", "DEC",
];
const DAY_NAMES: [&str; 7] = ["SUN", "MON", "TUE", "WED", "THU", "FRI", "SAT"];

/// How far ahead `next_after` searches before giving up (covers leap days).
const SEARCH_YEARS: i64 = 5;

/// A parsed 5-field cron schedule. Each field is a bitmask of allowed values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronSchedule {
    expression: String,
    minutes: u64,
    hours: u32,
    days_of_month: u32,
    months: u16,
    days_of_week: u8,
    /// DOM/DOW given explicitly (not `*`); both restricted means either may match.
    dom_restricted: bool,
    dow_restricted: bool,
}

impl CronSchedule {
    /// Parse and validate an expression.
    pub fn parse(expression: &str) -> Result<Self> {
        let parts: Vec<&str> = expression.split_whitespace().collect();
        if parts.len() != 5 {
            return Err(BizAuditError::Scheduling(format!(
                "Invalid cron expression '{expression}' (need 5 fields: MIN HOUR DOM MON DOW)"
            )));
        }

        let field_err = |name: &str, field: &str| {
            BizAuditError::Scheduling(format!(
                "Invalid {name} field '{field}' in cron expression '{expression}'"
            ))
        };

        let minutes = parse_field(parts[0], 0, 59, &[]).ok_or_else(|| field_err("minute", parts[0]))?;
        let hours = parse_field(parts[1], 0, 23, &[]).ok_or_else(|| field_err("hour", parts[1]))?;
        let dom = parse_field(parts[2], 1, 31, &[]).ok_or_else(|| field_err("day-of-month", parts[2]))?;
        let months =
            parse_field(parts[3], 1, 12, &MONTH_NAMES).ok_or_else(|| field_err("month", parts[3]))?;
        let mut dow =
            parse_field(parts[4], 0, 7, &DAY_NAMES).ok_or_else(|| field_err("day-of-week", parts[4]))?;
        // 7 is an alias for Sunday.
        if dow & (1 << 7) != 0 {
            dow = (dow | 1) & !(1 << 7);
        }

        Ok(Self {
            expression: parts.join(" "),
            minutes,
            hours: hours as u32,
            days_of_month: dom as u32,
            months: months as u16,
            days_of_week: dow as u8,
            dom_restricted: !parts[2].starts_with('*'),
            dow_restricted: !parts[4].starts_with('*'),
        })
    }

    /// Normalised expression (single spaces).
    pub fn expression(&self) -> &str {
        &self.expression
    }

    fn minute_ok(&self, m: u32) -> bool {
        self.minutes & (1 << m) != 0
    }

    fn hour_ok(&self, h: u32) -> bool {
        self.hours & (1 << h) != 0
    }

    fn month_ok(&self, m: u32) -> bool {
        self.months & (1 << m) != 0
    }

    fn day_ok(&self, t: &DateTime<Utc>) -> bool {
        let dom = self.days_of_month & (1 << t.day()) != 0;
        let dow = self.days_of_week & (1 << t.weekday().num_days_from_sunday()) != 0;
        if self.dom_restricted && self.dow_restricted {
            dom || dow
        } else {
            dom && dow
        }
    }

    /// Whether the schedule fires in the minute containing `t`.
    pub fn matches(&self, t: DateTime<Utc>) -> bool {
        self.month_ok(t.month()) && self.day_ok(&t) && self.hour_ok(t.hour()) && self.minute_ok(t.minute())
    }

    /// First firing minute strictly after `after`.
    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let mut t = truncate_to_minute(after)? + Duration::minutes(1);
        let limit = after + Duration::days(366 * SEARCH_YEARS);

        while t <= limit {
            if !self.month_ok(t.month()) {
                t = start_of_next_month(t)?;
                continue;
            }
            if !self.day_ok(&t) {
                t = start_of_next_day(t)?;
                continue;
            }
            if !self.hour_ok(t.hour()) {
                t = truncate_to_minute(t)?.with_minute(0)? + Duration::hours(1);
                continue;
            }
            if !self.minute_ok(t.minute()) {
                t += Duration::minutes(1);
                continue;
            }
            return Some(t);
        }
        None
    }
}

/// Parse a simple cron expression and compute the next run time.
pub fn next_run_from_cron(expression: &str, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
    match CronSchedule::parse(expression) {
        Ok(schedule) => schedule.next_after(after),
        Err(e) => {
            tracing::warn!("{e}");
            None
        }
    }
}

/// Validate an expression without keeping the parsed form.
pub fn validate(expression: &str) -> Result<()> {
    CronSchedule::parse(expression).map(|_| ())
}

fn truncate_to_minute(t: DateTime<Utc>) -> Option<DateTime<Utc>> {
    t.with_second(0)?.with_nanosecond(0)
}

fn start_of_next_day(t: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let next = t.date_naive().succ_opt()?;
    Some(next.and_hms_opt(0, 0, 0)?.and_utc())
}

fn start_of_next_month(t: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let (year, month) = if t.month() == 12 {
        (t.year() + 1, 1)
    } else {
        (t.year(), t.month() + 1)
    };
    let date = NaiveDate::from_ymd_opt(year, month, 1)?;
    Some(date.and_hms_opt(0, 0, 0)?.and_utc())
}

/// Parse a cron field into a bitmask of matching values.
fn parse_field(field: &str, min: u32, max: u32, names: &[&str]) -> Option<u64> {
    let mut mask = 0u64;
    for part in field.split(',') {
        if part.is_empty() {
            return None;
        }
        let (base, step) = match part.split_once('/') {
            Some((base, step)) => {
                let n: u32 = step.parse().ok()?;
                if n == 0 {
                    return None;
                }
                (base, Some(n))
            }
            None => (part, None),
        };

        let (start, end) = if base == "*" {
            (min, max)
        } else if let Some((a, b)) = base.split_once('-') {
            (parse_value(a, min, names)?, parse_value(b, min, names)?)
        } else {
            let n = parse_value(base, min, names)?;
            // "N/n" runs from N to the end of the range.
            (n, if step.is_some() { max } else { n })
        };

        if start < min || end > max || start > end {
            return None;
        }
        for v in (start..=end).step_by(step.unwrap_or(1) as usize) {
            mask |= 1 << v;
        }
    }
    Some(mask)
}

/// A number, or a name from `names` (index offset by the field minimum).
fn parse_value(s: &str, min: u32, names: &[&str]) -> Option<u32> {
    if let Ok(n) = s.parse::<u32>() {
        return Some(n);
    }
    let upper = s.to_ascii_uppercase();
    names
        .iter()
        .position(|name| *name == upper)
        .map(|i| i as u32 + min)
}
