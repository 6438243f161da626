//! Schedule expressions
//!
//! The persisted `cron_spec` uses the classic five-field form (minute first).
//! The `cron` crate expects a leading seconds field, so five-field
//! expressions get `0` prepended. Their day-of-week field counts 0-6 from
//! Sunday (7 is Sunday too), while the crate counts 1-7 from Sunday, so
//! numeric weekdays are shifted on the way in. Six and seven field
//! expressions and the
//! `@hourly`-style shorthands are passed through unchanged. `@every <dur>`
//! (e.g. `@every 1h30m`) is handled here since the crate has no equivalent.

use chrono::{DateTime, Local, TimeZone};
use std::str::FromStr;
use std::time::Duration;

use crate::error::{Error, Result};

/// A parsed run schedule
#[derive(Debug, Clone)]
pub enum CronSchedule {
    /// Calendar expression
    Calendar(Box<cron::Schedule>),
    /// Fixed interval
    Every(Duration),
}

impl CronSchedule {
    /// Parse a schedule expression
    ///
    /// Returns `Ok(None)` for an empty expression (on-demand only).
    pub fn parse(expression: &str) -> Result<Option<Self>> {
        let expression = expression.trim();
        if expression.is_empty() {
            return Ok(None);
        }

        if let Some(interval) = expression.strip_prefix("@every") {
            let duration = parse_interval(interval.trim())
                .ok_or_else(|| Error::schedule(expression, "expected an interval like 30m or 1h30m"))?;
            return Ok(Some(CronSchedule::Every(duration)));
        }

        let fields: Vec<&str> = expression.split_whitespace().collect();
        let normalized = if let [minute, hour, day, month, weekday] = fields[..] {
            format!("0 {} {} {} {} {}", minute, hour, day, month, translate_weekdays(weekday))
        } else {
            expression.to_string()
        };

        cron::Schedule::from_str(&normalized)
            .map(|schedule| Some(CronSchedule::Calendar(Box::new(schedule))))
            .map_err(|e| Error::schedule(expression, e.to_string()))
    }

    /// Next fire time strictly after `now`
    pub fn next_after<Z: TimeZone>(&self, now: &DateTime<Z>) -> Option<DateTime<Z>> {
        match self {
            CronSchedule::Calendar(schedule) => schedule.after(now).next(),
            CronSchedule::Every(interval) => {
                let step = chrono::Duration::from_std(*interval).ok()?;
                now.clone().checked_add_signed(step)
            }
        }
    }

    /// Time to wait from now until the next fire
    pub fn until_next(&self) -> Option<Duration> {
        let now = Local::now();
        let next = self.next_after(&now)?;
        (next - now).to_std().ok()
    }
}

/// Shift a minute-first day-of-week field onto the crate's 1 = Sunday numbering
fn translate_weekdays(field: &str) -> String {
    field.split(',').map(translate_weekday_item).collect::<Vec<_>>().join(",")
}

fn translate_weekday_item(item: &str) -> String {
    let (base, step) = match item.split_once('/') {
        Some((base, step)) => (base, Some(step)),
        None => (item, None),
    };

    let translated = match base.split_once('-') {
        Some((start, end)) => match (weekday_number(start), weekday_number(end)) {
            // `5-7` runs Friday through Sunday, which wraps in the crate's numbering
            (Some(6), Some(7)) if step.is_none() => "7,1".to_string(),
            (Some(start), Some(7)) if start > 0 && step.is_none() => format!("{}-7,1", start + 1),
            (Some(start), Some(end)) => format!("{}-{}", start + 1, end.min(6) + 1),
            _ => base.to_string(),
        },
        None => match weekday_number(base) {
            Some(day) => (day % 7 + 1).to_string(),
            None => base.to_string(),
        },
    };

    match step {
        Some(step) => format!("{}/{}", translated, step),
        None => translated,
    }
}

fn weekday_number(token: &str) -> Option<u8> {
    token.parse::<u8>().ok().filter(|day| *day <= 7)
}

/// Parse `1h30m`, `45m`, `90s`
fn parse_interval(input: &str) -> Option<Duration> {
    if input.is_empty() {
        return None;
    }

    let mut total = 0u64;
    let mut digits = String::new();
    for c in input.chars() {
        if c.is_ascii_digit() {
            digits.push(c);
            continue;
        }
        let value: u64 = digits.parse().ok()?;
        digits.clear();
        let unit = match c {
            'h' => 3600,
            'm' => 60,
            's' => 1,
            _ => return None,
        };
        total = total.checked_add(value.checked_mul(unit)?)?;
    }

    if !digits.is_empty() || total == 0 {
        return None;
    }
    Some(Duration::from_secs(total))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike, Utc, Weekday};

    fn next_weekday(expression: &str) -> (u32, Weekday) {
        let schedule = CronSchedule::parse(expression).unwrap().unwrap();
        // Friday
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let next = schedule.next_after(&now).unwrap();
        assert_eq!((next.hour(), next.minute()), (4, 0));
        (next.day(), next.weekday())
    }

    #[test]
    fn test_empty_is_on_demand() {
        assert!(CronSchedule::parse("").unwrap().is_none());
        assert!(CronSchedule::parse("   ").unwrap().is_none());
    }

    #[test]
    fn test_five_field_expression() {
        let schedule = CronSchedule::parse("30 4 * * *").unwrap().unwrap();
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let next = schedule.next_after(&now).unwrap();
        assert_eq!((next.hour(), next.minute(), next.second()), (4, 30, 0));
        assert!(next > now);
    }

    #[test]
    fn test_weekday_numbers_count_from_sunday() {
        assert_eq!(next_weekday("0 4 * * 1"), (4, Weekday::Mon));
        assert_eq!(next_weekday("0 4 * * 0"), (3, Weekday::Sun));
        assert_eq!(next_weekday("0 4 * * 7"), (3, Weekday::Sun));
        assert_eq!(next_weekday("0 4 * * 6"), (2, Weekday::Sat));
    }

    #[test]
    fn test_weekday_ranges_and_lists() {
        assert_eq!(next_weekday("0 4 * * 1-5"), (4, Weekday::Mon));
        assert_eq!(next_weekday("0 4 * * 0-6"), (2, Weekday::Sat));
        assert_eq!(next_weekday("0 4 * * 5-7"), (2, Weekday::Sat));
        assert_eq!(next_weekday("0 4 * * 0,3"), (3, Weekday::Sun));
        assert_eq!(next_weekday("0 4 * * 3,1"), (4, Weekday::Mon));
        assert_eq!(next_weekday("0 4 * * 1-5/2"), (4, Weekday::Mon));
    }

    #[test]
    fn test_weekday_range_through_seven_wraps_to_sunday() {
        let schedule = CronSchedule::parse("0 4 * * 6-7").unwrap().unwrap();
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let days: Vec<Weekday> = (0..3)
            .scan(now, |at, _| {
                *at = schedule.next_after(at)?;
                Some(at.weekday())
            })
            .collect();
        assert_eq!(days, vec![Weekday::Sat, Weekday::Sun, Weekday::Sat]);
    }

    #[test]
    fn test_weekday_names_pass_through() {
        assert_eq!(next_weekday("0 4 * * Mon"), (4, Weekday::Mon));
        assert!(CronSchedule::parse("0 4 * * 8").is_err());
    }

    #[test]
    fn test_six_field_expression_passes_through() {
        let schedule = CronSchedule::parse("15 */10 * * * *").unwrap().unwrap();
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 12, 3, 0).unwrap();
        let next = schedule.next_after(&now).unwrap();
        assert_eq!((next.minute(), next.second()), (10, 15));
    }

    #[test]
    fn test_every_interval() {
        let schedule = CronSchedule::parse("@every 1h30m").unwrap().unwrap();
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let next = schedule.next_after(&now).unwrap();
        assert_eq!(next - now, chrono::Duration::minutes(90));
    }

    #[test]
    fn test_invalid_expressions() {
        assert!(CronSchedule::parse("not a schedule").is_err());
        assert!(CronSchedule::parse("@every").is_err());
        assert!(CronSchedule::parse("@every 10x").is_err());
        assert!(CronSchedule::parse("@every 0s").is_err());
    }

    #[test]
    fn test_until_next_is_bounded() {
        let schedule = CronSchedule::parse("@every 5m").unwrap().unwrap();
        let wait = schedule.until_next().unwrap();
        assert!(wait <= Duration::from_secs(300));
    }
}
