//! Recurrence rule parser (RFC-5545 subset).
//!
//! Accepted input, one component per line:
//! - `DTSTART:20240410T090000Z` / `DTSTART;TZID=Europe/Istanbul:20240410T090000` /
//!   `DTSTART:20240410T090000` (floating, read in the schedule's zone)
//! - `RRULE:FREQ=WEEKLY;INTERVAL=2;BYDAY=MO,WE` (the `RRULE:` prefix is optional)
//!
//! Supported parts: FREQ, INTERVAL, BYDAY (plain weekdays), BYMONTHDAY (1..=31),
//! UNTIL, COUNT (requires DTSTART) and WKST (only MO is honoured).

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc, Weekday};
use chrono_tz::Tz;

use crate::domain::RecurrenceError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frequency {
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

/// Where the series starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleStart {
    /// `...Z` form.
    Instant(DateTime<Utc>),
    /// `TZID=` form.
    Zoned(NaiveDateTime, Tz),
    /// No zone: wall-clock time in the schedule's zone.
    Floating(NaiveDateTime),
}

impl RuleStart {
    /// Wall-clock start in `tz`.
    pub fn local_in(&self, tz: Tz) -> NaiveDateTime {
        match *self {
            RuleStart::Instant(at) => at.with_timezone(&tz).naive_local(),
            RuleStart::Zoned(naive, zone) => {
                super::expander::resolve_local(zone, naive)
                    .with_timezone(&tz)
                    .naive_local()
            }
            RuleStart::Floating(naive) => naive,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Until {
    Instant(DateTime<Utc>),
    /// Floating or date-only bound, compared in the schedule's zone.
    Local(NaiveDateTime),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecurrenceRule {
    pub frequency: Frequency,
    pub interval: u32,
    /// Sorted Monday-first, deduplicated.
    pub by_day: Vec<Weekday>,
    /// Sorted, deduplicated, 1..=31.
    pub by_month_day: Vec<u32>,
    pub start: Option<RuleStart>,
    pub until: Option<Until>,
    pub count: Option<u32>,
}

impl RecurrenceRule {
    pub fn parse(input: &str) -> Result<Self, RecurrenceError> {
        let mut start = None;
        let mut body = None;

        for line in input.lines().map(str::trim).filter(|l| !l.is_empty()) {
            let upper = line.to_ascii_uppercase();
            if upper.starts_with("DTSTART") {
                if start.is_some() {
                    return Err(RecurrenceError::invalid(input, "duplicate DTSTART"));
                }
                start = Some(parse_dtstart(input, line)?);
            } else {
                if body.is_some() {
                    return Err(RecurrenceError::invalid(input, "more than one RRULE line"));
                }
                let rule = match upper.strip_prefix("RRULE:") {
                    Some(_) => &line["RRULE:".len()..],
                    None => line,
                };
                body = Some(rule);
            }
        }

        let body = body.ok_or_else(|| RecurrenceError::invalid(input, "missing RRULE"))?;
        Self::parse_body(input, body, start)
    }

    fn parse_body(
        input: &str,
        body: &str,
        start: Option<RuleStart>,
    ) -> Result<Self, RecurrenceError> {
        let mut frequency = None;
        let mut interval = None;
        let mut by_day = Vec::new();
        let mut by_month_day = Vec::new();
        let mut until = None;
        let mut count = None;

        for part in body.split(';').map(str::trim).filter(|p| !p.is_empty()) {
            let (key, value) = part
                .split_once('=')
                .ok_or_else(|| RecurrenceError::invalid(input, format!("malformed part '{part}'")))?;
            let key = key.trim().to_ascii_uppercase();
            let value = value.trim();

            match key.as_str() {
                "FREQ" => {
                    if frequency.is_some() {
                        return Err(RecurrenceError::invalid(input, "duplicate FREQ"));
                    }
                    frequency = Some(parse_frequency(input, value)?);
                }
                "INTERVAL" => {
                    let n: u32 = value
                        .parse()
                        .map_err(|_| RecurrenceError::invalid(input, "INTERVAL is not a number"))?;
                    if n == 0 {
                        return Err(RecurrenceError::invalid(input, "INTERVAL must be >= 1"));
                    }
                    interval = Some(n);
                }
                "BYDAY" => {
                    for day in value.split(',') {
                        by_day.push(parse_weekday(input, day.trim())?);
                    }
                }
                "BYMONTHDAY" => {
                    for day in value.split(',') {
                        let d: u32 = day.trim().parse().map_err(|_| {
                            RecurrenceError::invalid(input, format!("unsupported BYMONTHDAY '{day}'"))
                        })?;
                        if !(1..=31).contains(&d) {
                            return Err(RecurrenceError::invalid(
                                input,
                                format!("BYMONTHDAY out of range: {d}"),
                            ));
                        }
                        by_month_day.push(d);
                    }
                }
                "UNTIL" => until = Some(parse_until(input, value)?),
                "COUNT" => {
                    let n: u32 = value
                        .parse()
                        .map_err(|_| RecurrenceError::invalid(input, "COUNT is not a number"))?;
                    if n == 0 {
                        return Err(RecurrenceError::invalid(input, "COUNT must be >= 1"));
                    }
                    count = Some(n);
                }
                "WKST" => {
                    parse_weekday(input, value)?;
                }
                other => {
                    return Err(RecurrenceError::invalid(input, format!("unsupported part '{other}'")));
                }
            }
        }

        let frequency = frequency.ok_or_else(|| RecurrenceError::invalid(input, "missing FREQ"))?;
        if until.is_some() && count.is_some() {
            return Err(RecurrenceError::invalid(input, "UNTIL and COUNT are exclusive"));
        }
        if count.is_some() && start.is_none() {
            return Err(RecurrenceError::invalid(input, "COUNT requires DTSTART"));
        }
        if frequency == Frequency::Yearly && !by_day.is_empty() {
            return Err(RecurrenceError::invalid(input, "BYDAY with FREQ=YEARLY is not supported"));
        }

        by_day.sort_by_key(|d| d.num_days_from_monday());
        by_day.dedup();
        by_month_day.sort_unstable();
        by_month_day.dedup();

        Ok(Self {
            frequency,
            interval: interval.unwrap_or(1),
            by_day,
            by_month_day,
            start,
            until,
            count,
        })
    }
}

fn parse_frequency(input: &str, value: &str) -> Result<Frequency, RecurrenceError> {
    match value.to_ascii_uppercase().as_str() {
        "DAILY" => Ok(Frequency::Daily),
        "WEEKLY" => Ok(Frequency::Weekly),
        "MONTHLY" => Ok(Frequency::Monthly),
        "YEARLY" => Ok(Frequency::Yearly),
        other => Err(RecurrenceError::invalid(input, format!("unsupported FREQ '{other}'"))),
    }
}

fn parse_weekday(input: &str, value: &str) -> Result<Weekday, RecurrenceError> {
    match value.to_ascii_uppercase().as_str() {
        "MO" => Ok(Weekday::Mon),
        "TU" => Ok(Weekday::Tue),
        "WE" => Ok(Weekday::Wed),
        "TH" => Ok(Weekday::Thu),
        "FR" => Ok(Weekday::Fri),
        "SA" => Ok(Weekday::Sat),
        "SU" => Ok(Weekday::Sun),
        other => Err(RecurrenceError::invalid(input, format!("unsupported weekday '{other}'"))),
    }
}

/// `YYYYMMDDTHHMMSS` with optional trailing `Z`.
fn parse_date_time(value: &str) -> Option<(NaiveDateTime, bool)> {
    let (raw, utc) = match value.strip_suffix('Z') {
        Some(raw) => (raw, true),
        None => (value, false),
    };
    NaiveDateTime::parse_from_str(raw, "%Y%m%dT%H%M%S")
        .ok()
        .map(|naive| (naive, utc))
}

fn parse_dtstart(input: &str, line: &str) -> Result<RuleStart, RecurrenceError> {
    let (params, value) = line
        .split_once(':')
        .ok_or_else(|| RecurrenceError::invalid(input, "DTSTART without value"))?;

    let tzid = params
        .split(';')
        .skip(1)
        .find_map(|p| p.trim().strip_prefix("TZID="))
        .map(|zone| {
            zone.parse::<Tz>()
                .map_err(|_| RecurrenceError::invalid(input, format!("unknown TZID '{zone}'")))
        })
        .transpose()?;

    let (naive, utc) = parse_date_time(value.trim())
        .ok_or_else(|| RecurrenceError::invalid(input, format!("bad DTSTART '{value}'")))?;

    Ok(match (utc, tzid) {
        (true, _) => RuleStart::Instant(Utc.from_utc_datetime(&naive)),
        (false, Some(zone)) => RuleStart::Zoned(naive, zone),
        (false, None) => RuleStart::Floating(naive),
    })
}

fn parse_until(input: &str, value: &str) -> Result<Until, RecurrenceError> {
    if let Some((naive, utc)) = parse_date_time(value) {
        return Ok(if utc {
            Until::Instant(Utc.from_utc_datetime(&naive))
        } else {
            Until::Local(naive)
        });
    }
    let date = NaiveDate::parse_from_str(value, "%Y%m%d")
        .map_err(|_| RecurrenceError::invalid(input, format!("bad UNTIL '{value}'")))?;
    // Date-only bound includes the whole day.
    let end_of_day = NaiveTime::from_hms_opt(23, 59, 59).unwrap_or(NaiveTime::MIN);
    Ok(Until::Local(date.and_time(end_of_day)))
}
