//! RecurrenceExpander - 次回発生時刻の計算
//!
//! Every occurrence is rebuilt from the wall-clock time-of-day in the target
//! zone, never by adding a fixed duration, so DST changes keep the local time.

use chrono::{
    DateTime, Datelike, Duration, LocalResult, NaiveDate, NaiveDateTime, Offset, TimeZone, Utc,
};
use chrono_tz::Tz;

use super::rule::{Frequency, RecurrenceRule, Until};
use crate::domain::RecurrenceError;

/// Upper bound on the number of periods scanned for one lookup.
const MAX_PERIODS: i64 = 10_000;

/// Earliest occurrence of `rrule` strictly after `after`, in `timezone`.
///
/// Without a DTSTART the series is anchored at `after` itself.
pub fn next_occurrence(
    rrule: &str,
    timezone: Tz,
    after: DateTime<Utc>,
) -> Result<DateTime<Utc>, RecurrenceError> {
    RecurrenceRule::parse(rrule)?.next_after(timezone, after, after)
}

impl RecurrenceRule {
    /// Earliest occurrence strictly after `after`.
    ///
    /// `anchor` stands in for DTSTART when the rule has none; its local
    /// time-of-day becomes the time-of-day of every occurrence.
    pub fn next_after(
        &self,
        tz: Tz,
        anchor: DateTime<Utc>,
        after: DateTime<Utc>,
    ) -> Result<DateTime<Utc>, RecurrenceError> {
        let start = match &self.start {
            Some(start) => start.local_in(tz),
            None => anchor.with_timezone(&tz).naive_local(),
        };
        let until = self.until.map(|until| match until {
            Until::Instant(at) => at,
            Until::Local(naive) => resolve_local(tz, naive),
        });

        let first_period = self.skip_periods(start.date(), after.with_timezone(&tz).date_naive());
        // COUNT is relative to the first occurrence: skipped periods still count.
        let mut emitted = match self.count {
            Some(count) => self.count_before(start.date(), first_period, count),
            None => 0,
        };

        for period in first_period..first_period + MAX_PERIODS {
            for date in self.period_dates(start.date(), period) {
                let occurrence = resolve_local(tz, date.and_time(start.time()));
                if until.is_some_and(|until| occurrence > until) {
                    return Err(RecurrenceError::NoMoreOccurrences);
                }
                emitted += 1;
                if self.count.is_some_and(|count| emitted > count) {
                    return Err(RecurrenceError::NoMoreOccurrences);
                }
                if occurrence > after {
                    return Ok(occurrence);
                }
            }
        }
        Err(RecurrenceError::NoMoreOccurrences)
    }

    /// Occurrences in periods `0..periods`, saturating once `limit` is passed.
    fn count_before(&self, start: NaiveDate, periods: i64, limit: u32) -> u32 {
        let mut seen = 0u32;
        for period in 0..periods {
            let in_period = u32::try_from(self.period_dates(start, period).len()).unwrap_or(u32::MAX);
            seen = seen.saturating_add(in_period);
            if seen > limit {
                break;
            }
        }
        seen
    }

    /// Periods that certainly end before `after_date`; one period of slack
    /// absorbs zone shifts around midnight.
    fn skip_periods(&self, start: NaiveDate, after_date: NaiveDate) -> i64 {
        let interval = i64::from(self.interval);
        let elapsed = match self.frequency {
            Frequency::Daily => (after_date - start).num_days(),
            Frequency::Weekly => (week_start(after_date) - week_start(start)).num_days() / 7,
            Frequency::Monthly => month_index(after_date) - month_index(start),
            Frequency::Yearly => i64::from(after_date.year() - start.year()),
        };
        (elapsed / interval - 1).max(0)
    }

    /// Candidate dates of the `period`-th period, ascending, never before `start`.
    fn period_dates(&self, start: NaiveDate, period: i64) -> Vec<NaiveDate> {
        let step = period * i64::from(self.interval);
        let mut dates = match self.frequency {
            Frequency::Daily => vec![start + Duration::days(step)],
            Frequency::Weekly => {
                let monday = week_start(start) + Duration::weeks(step);
                let weekdays = if self.by_day.is_empty() {
                    vec![start.weekday()]
                } else {
                    self.by_day.clone()
                };
                weekdays
                    .into_iter()
                    .map(|day| monday + Duration::days(i64::from(day.num_days_from_monday())))
                    .collect()
            }
            Frequency::Monthly => {
                let index = month_index(start) + step;
                let (year, month) = (index.div_euclid(12) as i32, index.rem_euclid(12) as u32 + 1);
                if self.by_day.is_empty() {
                    let days = if self.by_month_day.is_empty() {
                        vec![start.day()]
                    } else {
                        self.by_month_day.clone()
                    };
                    days.into_iter()
                        .filter_map(|day| NaiveDate::from_ymd_opt(year, month, day))
                        .collect()
                } else {
                    (1..=31)
                        .filter_map(|day| NaiveDate::from_ymd_opt(year, month, day))
                        .filter(|date| self.by_day.contains(&date.weekday()))
                        .collect()
                }
            }
            Frequency::Yearly => {
                let year = start.year() + step as i32;
                let days = if self.by_month_day.is_empty() {
                    vec![start.day()]
                } else {
                    self.by_month_day.clone()
                };
                days.into_iter()
                    .filter_map(|day| NaiveDate::from_ymd_opt(year, start.month(), day))
                    .collect()
            }
        };

        dates.retain(|date| {
            *date >= start
                && (self.by_day.is_empty() || self.by_day.contains(&date.weekday()))
                && (self.by_month_day.is_empty() || self.by_month_day.contains(&date.day()))
        });
        dates
    }
}

/// Map a wall-clock time in `tz` to an instant.
///
/// Ambiguous times (DST fall-back) take the earlier instant; nonexistent
/// times (DST gap) are shifted forward by the length of the gap.
pub(crate) fn resolve_local(tz: Tz, naive: NaiveDateTime) -> DateTime<Utc> {
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(at) => at.with_timezone(&Utc),
        LocalResult::Ambiguous(earliest, _) => earliest.with_timezone(&Utc),
        LocalResult::None => {
            let before_gap = tz
                .offset_from_utc_datetime(&(naive - Duration::days(1)))
                .fix()
                .local_minus_utc();
            Utc.from_utc_datetime(&(naive - Duration::seconds(i64::from(before_gap))))
        }
    }
}

fn week_start(date: NaiveDate) -> NaiveDate {
    date - Duration::days(i64::from(date.weekday().num_days_from_monday()))
}

fn month_index(date: NaiveDate) -> i64 {
    i64::from(date.year()) * 12 + i64::from(date.month0())
}
