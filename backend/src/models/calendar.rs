//! Custom reporting weeks.
//!
//! A reporting week (a [`Period`]) starts on a configurable weekday and spans seven calendar
//! days in the organization's time zone. Boundaries are derived from the weekday and zone alone,
//! nothing is stored. All arithmetic is done on local calendar dates and only converted to
//! instants at the end, so a week that crosses a daylight-saving change is 167 or 169 hours long
//! but still starts at local midnight on the boundary weekday.

use chrono::{DateTime, Datelike, Days, NaiveDate, NaiveTime, TimeZone, Utc, Weekday};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Calendar days in one reporting period.
pub const DAYS_PER_PERIOD: u64 = 7;

/// Errors raised while reading calendar settings.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CalendarError {
    #[error("invalid boundary weekday '{0}'")]
    InvalidWeekday(String),
    #[error("unknown time zone '{0}'")]
    InvalidTimezone(String),
}

/// One reporting week, the half-open interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Period {
    /// First local calendar day of the week. Check-in records are keyed by it.
    pub start_date: NaiveDate,
    /// First instant of `start_date` in the calendar's zone.
    pub start: DateTime<Utc>,
    /// First instant of the day seven calendar days after `start_date`.
    pub end: DateTime<Utc>,
}

impl Period {
    /// Last local calendar day covered by the period.
    pub fn last_date(&self) -> NaiveDate {
        self.start_date
            .checked_add_days(Days::new(DAYS_PER_PERIOD - 1))
            .unwrap_or(NaiveDate::MAX)
    }

    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.start <= instant && instant < self.end
    }

    pub fn contains_date(&self, date: NaiveDate) -> bool {
        self.start_date <= date && date <= self.last_date()
    }

    /// Whether the inclusive local date range `[first, last]` shares at least one day with
    /// this period.
    pub fn overlaps_dates(&self, first: NaiveDate, last: NaiveDate) -> bool {
        first <= self.last_date() && last >= self.start_date
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "week of {}", self.start_date)
    }
}

/// Week boundary rules for one organization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeekCalendar {
    week_start: Weekday,
    timezone: Tz,
}

impl WeekCalendar {
    pub fn new(week_start: Weekday, timezone: Tz) -> Self {
        Self {
            week_start,
            timezone,
        }
    }

    /// Calendar evaluated in UTC.
    pub fn utc(week_start: Weekday) -> Self {
        Self::new(week_start, Tz::UTC)
    }

    pub fn week_start(&self) -> Weekday {
        self.week_start
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    /// The period whose `[start, end)` contains `instant`.
    pub fn period_containing(&self, instant: DateTime<Utc>) -> Period {
        let local_date = instant.with_timezone(&self.timezone).date_naive();
        self.period_containing_date(local_date)
    }

    /// The period covering the given local calendar day.
    pub fn period_containing_date(&self, date: NaiveDate) -> Period {
        let back = days_since(date.weekday(), self.week_start);
        let start_date = date.checked_sub_days(Days::new(back)).unwrap_or(date);
        self.period_starting(start_date)
    }

    /// Walks `n` periods forward (or backward when negative).
    ///
    /// Saturates at the edge of chrono's representable date range.
    pub fn offset(&self, period: &Period, n: i32) -> Period {
        let days = Days::new(u64::from(n.unsigned_abs()) * DAYS_PER_PERIOD);
        let shifted = if n >= 0 {
            period.start_date.checked_add_days(days)
        } else {
            period.start_date.checked_sub_days(days)
        };
        match shifted {
            Some(start_date) => self.period_starting(start_date),
            None => *period,
        }
    }

    /// The period containing `now`.
    pub fn current(&self, now: DateTime<Utc>) -> Period {
        self.period_containing(now)
    }

    /// The most recent period that has fully elapsed at `now`.
    pub fn last_completed(&self, now: DateTime<Utc>) -> Period {
        self.offset(&self.current(now), -1)
    }

    /// True once the period has started (the current period or any earlier one).
    pub fn is_same_or_before(&self, period: &Period, now: DateTime<Utc>) -> bool {
        period.start <= now
    }

    /// True once `now` has reached the end of the period.
    pub fn has_elapsed(&self, period: &Period, now: DateTime<Utc>) -> bool {
        now >= period.end
    }

    /// Every period from `first` through `last`, both inclusive. Empty when `first` is after
    /// `last`.
    pub fn periods_between(&self, first: &Period, last: &Period) -> Periods {
        Periods {
            calendar: *self,
            next: (first.start_date <= last.start_date).then(|| self.period_containing_date(first.start_date)),
            last_start: last.start_date,
        }
    }

    fn period_starting(&self, start_date: NaiveDate) -> Period {
        let end_date = start_date
            .checked_add_days(Days::new(DAYS_PER_PERIOD))
            .unwrap_or(NaiveDate::MAX);
        Period {
            start_date,
            start: self.first_instant_of(start_date),
            end: self.first_instant_of(end_date),
        }
    }

    /// Local midnight of `date`, or the first instant that exists on that day when midnight
    /// falls in a daylight-saving gap. A day skipped entirely by a zone change starts where the
    /// following day starts.
    fn first_instant_of(&self, date: NaiveDate) -> DateTime<Utc> {
        let mut day = date;
        for _ in 0..2 {
            let midnight = day.and_time(NaiveTime::MIN);
            for minute in 0..(24 * 60) {
                let candidate = midnight + chrono::Duration::minutes(minute);
                if let Some(local) = self.timezone.from_local_datetime(&candidate).earliest() {
                    return local.with_timezone(&Utc);
                }
            }
            match day.succ_opt() {
                Some(next) => day = next,
                None => break,
            }
        }
        Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN))
    }
}

/// Iterator returned by [`WeekCalendar::periods_between`].
#[derive(Debug, Clone)]
pub struct Periods {
    calendar: WeekCalendar,
    next: Option<Period>,
    last_start: NaiveDate,
}

impl Iterator for Periods {
    type Item = Period;

    fn next(&mut self) -> Option<Period> {
        let current = self.next.take()?;
        if current.start_date > self.last_start {
            return None;
        }
        let following = self.calendar.offset(&current, 1);
        if following.start_date > current.start_date {
            self.next = Some(following);
        }
        Some(current)
    }
}

fn days_since(day: Weekday, week_start: Weekday) -> u64 {
    u64::from((7 + day.num_days_from_monday() - week_start.num_days_from_monday()) % 7)
}

/// Parses a boundary weekday such as `"sat"` or `"Saturday"`.
pub fn parse_weekday(value: &str) -> Result<Weekday, CalendarError> {
    value
        .trim()
        .parse::<Weekday>()
        .map_err(|_| CalendarError::InvalidWeekday(value.to_string()))
}

/// Parses an IANA zone name such as `"Europe/Madrid"`.
pub fn parse_timezone(value: &str) -> Result<Tz, CalendarError> {
    value
        .trim()
        .parse::<Tz>()
        .map_err(|_| CalendarError::InvalidTimezone(value.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_saturday_boundary_wednesday_instant() {
        let calendar = WeekCalendar::utc(Weekday::Sat);
        // 2024-03-06 is a Wednesday.
        let instant = Utc.with_ymd_and_hms(2024, 3, 6, 15, 30, 0).unwrap();
        let period = calendar.period_containing(instant);

        assert_eq!(period.start_date, date(2024, 3, 2));
        assert_eq!(period.start, Utc.with_ymd_and_hms(2024, 3, 2, 0, 0, 0).unwrap());
        assert_eq!(period.end, Utc.with_ymd_and_hms(2024, 3, 9, 0, 0, 0).unwrap());
        assert!(period.contains(instant));
    }

    #[test]
    fn test_instant_on_boundary_starts_new_period() {
        let calendar = WeekCalendar::utc(Weekday::Mon);
        let monday = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let period = calendar.period_containing(monday);
        assert_eq!(period.start, monday);

        let just_before = monday - Duration::nanoseconds(1);
        let previous = calendar.period_containing(just_before);
        assert_eq!(previous.end, monday);
        assert_eq!(calendar.offset(&previous, 1), period);
    }

    #[test]
    fn test_period_crosses_year_boundary() {
        let calendar = WeekCalendar::utc(Weekday::Thu);
        let period = calendar.period_containing_date(date(2025, 1, 1));
        assert_eq!(period.start_date, date(2024, 12, 26));
        assert_eq!(period.last_date(), date(2025, 1, 1));
    }

    #[test]
    fn test_spring_forward_week_is_shorter() {
        let calendar = WeekCalendar::new(Weekday::Sat, chrono_tz::America::New_York);
        // DST starts 2024-03-10 in New York.
        let period = calendar.period_containing_date(date(2024, 3, 12));
        assert_eq!(period.start_date, date(2024, 3, 9));
        assert_eq!(period.start, Utc.with_ymd_and_hms(2024, 3, 9, 5, 0, 0).unwrap());
        assert_eq!(period.end, Utc.with_ymd_and_hms(2024, 3, 16, 4, 0, 0).unwrap());
        assert_eq!(period.end - period.start, Duration::hours(167));
    }

    #[test]
    fn test_fall_back_week_is_longer() {
        let calendar = WeekCalendar::new(Weekday::Sun, chrono_tz::Europe::Madrid);
        // DST ends 2024-10-27 in Madrid.
        let period = calendar.period_containing_date(date(2024, 10, 29));
        assert_eq!(period.start_date, date(2024, 10, 27));
        assert_eq!(period.end - period.start, Duration::hours(169));
    }

    #[test]
    fn test_midnight_gap_uses_first_existing_instant() {
        let tz = chrono_tz::America::Santiago;
        let calendar = WeekCalendar::new(Weekday::Sun, tz);
        let period = calendar.period_containing_date(date(2024, 9, 10));
        assert_eq!(period.start_date, date(2024, 9, 8));
        assert_eq!(period.start.with_timezone(&tz).date_naive(), date(2024, 9, 8));

        let inside = Utc.with_ymd_and_hms(2024, 9, 8, 12, 0, 0).unwrap();
        assert!(period.contains(inside));
    }

    #[test]
    fn test_skipped_day_starts_with_following_day() {
        // Samoa moved across the date line and never had a 2011-12-30.
        let calendar = WeekCalendar::new(Weekday::Fri, chrono_tz::Pacific::Apia);
        let period = calendar.period_containing_date(date(2011, 12, 31));
        assert_eq!(period.start_date, date(2011, 12, 30));
        assert_eq!(period.start, Utc.with_ymd_and_hms(2011, 12, 30, 10, 0, 0).unwrap());

        let previous = calendar.offset(&period, -1);
        assert_eq!(previous.end, period.start);
        let late_thursday = Utc.with_ymd_and_hms(2011, 12, 30, 9, 59, 0).unwrap();
        assert!(previous.contains(late_thursday));
    }

    #[test]
    fn test_offset_walks_both_directions() {
        let calendar = WeekCalendar::utc(Weekday::Fri);
        let period = calendar.period_containing_date(date(2024, 6, 5));
        let later = calendar.offset(&period, 3);
        assert_eq!(later.start_date, period.start_date + Days::new(21));
        assert_eq!(calendar.offset(&later, -3), period);
        assert_eq!(calendar.offset(&period, 0), period);
    }

    #[test]
    fn test_elapsed_and_started() {
        let calendar = WeekCalendar::utc(Weekday::Mon);
        let now = Utc.with_ymd_and_hms(2024, 5, 15, 9, 0, 0).unwrap();
        let current = calendar.current(now);
        let previous = calendar.last_completed(now);
        let next = calendar.offset(&current, 1);

        assert!(calendar.has_elapsed(&previous, now));
        assert!(!calendar.has_elapsed(&current, now));
        assert!(calendar.is_same_or_before(&current, now));
        assert!(calendar.is_same_or_before(&previous, now));
        assert!(!calendar.is_same_or_before(&next, now));
    }

    #[test]
    fn test_periods_between_is_inclusive() {
        let calendar = WeekCalendar::utc(Weekday::Mon);
        let first = calendar.period_containing_date(date(2024, 1, 3));
        let last = calendar.offset(&first, 4);
        let periods: Vec<Period> = calendar.periods_between(&first, &last).collect();
        assert_eq!(periods.len(), 5);
        assert_eq!(periods[0], first);
        assert_eq!(periods[4], last);

        assert_eq!(calendar.periods_between(&last, &first).count(), 0);
    }

    #[test]
    fn test_overlaps_dates() {
        let calendar = WeekCalendar::utc(Weekday::Sat);
        let period = calendar.period_containing_date(date(2024, 3, 6));
        assert!(period.overlaps_dates(date(2024, 3, 8), date(2024, 3, 20)));
        assert!(period.overlaps_dates(date(2024, 2, 20), date(2024, 3, 2)));
        assert!(!period.overlaps_dates(date(2024, 3, 9), date(2024, 3, 12)));
        assert!(!period.overlaps_dates(date(2024, 2, 1), date(2024, 3, 1)));
    }

    #[test]
    fn test_parse_weekday() {
        assert_eq!(parse_weekday("sat").unwrap(), Weekday::Sat);
        assert_eq!(parse_weekday(" Saturday ").unwrap(), Weekday::Sat);
        assert_eq!(parse_weekday("MONDAY").unwrap(), Weekday::Mon);
        assert_eq!(
            parse_weekday("funday"),
            Err(CalendarError::InvalidWeekday("funday".to_string()))
        );
    }

    #[test]
    fn test_parse_timezone() {
        assert_eq!(parse_timezone("UTC").unwrap(), Tz::UTC);
        assert_eq!(
            parse_timezone("Europe/Madrid").unwrap(),
            chrono_tz::Europe::Madrid
        );
        assert!(parse_timezone("Mars/Olympus").is_err());
    }
}
