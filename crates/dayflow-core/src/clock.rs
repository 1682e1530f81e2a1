//! Wall clock and working-day arithmetic.
//!
//! Every instant in the system is stored as UTC; all calendar-day reasoning
//! goes through a single [`DayWindow`] anchored to one IANA timezone.

use std::sync::Mutex;

use chrono::{DateTime, Days, Duration, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;

/// Source of the current instant.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Reads the system clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to. Used by tests and replays.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(|e| e.into_inner()) = now;
    }

    pub fn advance(&self, by: Duration) {
        let mut guard = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *guard += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Half-open UTC interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeRange {
    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.start <= instant && instant < self.end
    }
}

/// The working day: timezone plus the local times bounding it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayWindow {
    pub tz: Tz,
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl DayWindow {
    pub fn new(tz: Tz, start: NaiveTime, end: NaiveTime) -> Self {
        Self { tz, start, end }
    }

    /// Local calendar date of `instant`.
    pub fn local_date(&self, instant: DateTime<Utc>) -> NaiveDate {
        instant.with_timezone(&self.tz).date_naive()
    }

    /// UTC instant of a local date and time.
    ///
    /// Ambiguous local times (DST fall-back) resolve to the earlier instant;
    /// skipped local times (spring-forward) move one hour later.
    pub fn at(&self, date: NaiveDate, time: NaiveTime) -> DateTime<Utc> {
        resolve_local(self.tz, date.and_time(time))
    }

    pub fn range_for(&self, date: NaiveDate) -> TimeRange {
        TimeRange {
            start: self.at(date, self.start),
            end: self.at(date, self.end),
        }
    }

    /// `[dayStart, dayEnd)` of the local day containing `now`.
    pub fn today(&self, now: DateTime<Utc>) -> TimeRange {
        self.range_for(self.local_date(now))
    }

    /// `[dayStart, dayEnd)` of the following local day.
    pub fn tomorrow(&self, now: DateTime<Utc>) -> TimeRange {
        let date = self.local_date(now);
        self.range_for(date.checked_add_days(Days::new(1)).unwrap_or(date))
    }

    /// Next instant strictly after `now` whose local time is `time`.
    ///
    /// A time at or before the current local time rolls over to tomorrow.
    pub fn next_occurrence(&self, now: DateTime<Utc>, time: NaiveTime) -> DateTime<Utc> {
        let date = self.local_date(now);
        let today = self.at(date, time);
        if today > now {
            return today;
        }
        match date.checked_add_days(Days::new(1)) {
            Some(next) => self.at(next, time),
            None => today + Duration::days(1),
        }
    }

    /// `HH:MM` in the window's timezone.
    pub fn local_hhmm(&self, instant: DateTime<Utc>) -> String {
        instant.with_timezone(&self.tz).format("%H:%M").to_string()
    }

    /// Local time-of-day of `instant`.
    pub fn local_time(&self, instant: DateTime<Utc>) -> NaiveTime {
        instant.with_timezone(&self.tz).time()
    }
}

pub(crate) fn resolve_local(tz: Tz, naive: NaiveDateTime) -> DateTime<Utc> {
    let local = match tz.from_local_datetime(&naive) {
        LocalResult::Single(dt) => Some(dt),
        LocalResult::Ambiguous(earliest, _) => Some(earliest),
        LocalResult::None => tz.from_local_datetime(&(naive + Duration::hours(1))).earliest(),
    };
    local
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|| Utc.from_utc_datetime(&naive))
}

/// Parse a 24-hour `HHMM` string such as `1800`.
pub fn parse_hhmm(text: &str) -> Option<NaiveTime> {
    let digits = four_digits(text)?;
    NaiveTime::from_hms_opt(digits.0, digits.1, 0)
}

/// Parse an `MMDD` date, choosing this year or next if the date already passed.
pub fn parse_mmdd(text: &str, today: NaiveDate) -> Option<NaiveDate> {
    use chrono::Datelike;

    let (month, day) = four_digits(text)?;
    let this_year = NaiveDate::from_ymd_opt(today.year(), month, day);
    match this_year {
        Some(date) if date >= today => Some(date),
        // Feb 29 may only exist in one of the two years.
        _ => NaiveDate::from_ymd_opt(today.year() + 1, month, day).or(this_year),
    }
}

fn four_digits(text: &str) -> Option<(u32, u32)> {
    let t = text.trim();
    if t.len() != 4 || !t.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let high = t[..2].parse().ok()?;
    let low = t[2..].parse().ok()?;
    Some((high, low))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window() -> DayWindow {
        DayWindow::new(
            chrono_tz::America::New_York,
            NaiveTime::from_hms_opt(7, 0, 0).unwrap(),
            NaiveTime::from_hms_opt(22, 0, 0).unwrap(),
        )
    }

    fn ny(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        chrono_tz::America::New_York
            .with_ymd_and_hms(y, m, d, h, min, 0)
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn today_is_anchored_to_timezone() {
        // 02:00 UTC on the 16th is still the 15th in New York.
        let now = Utc.with_ymd_and_hms(2026, 10, 16, 2, 0, 0).unwrap();
        let range = window().today(now);
        assert_eq!(range.start, ny(2026, 10, 15, 7, 0));
        assert_eq!(range.end, ny(2026, 10, 15, 22, 0));
    }

    #[test]
    fn tomorrow_follows_today() {
        let now = ny(2026, 10, 15, 21, 30);
        let range = window().tomorrow(now);
        assert_eq!(range.start, ny(2026, 10, 16, 7, 0));
        assert_eq!(range.end, ny(2026, 10, 16, 22, 0));
        assert!(range.contains(ny(2026, 10, 16, 12, 0)));
        assert!(!range.contains(ny(2026, 10, 16, 22, 0)));
    }

    #[test]
    fn next_occurrence_later_today() {
        let now = ny(2026, 10, 15, 17, 59);
        let t = NaiveTime::from_hms_opt(18, 0, 0).unwrap();
        assert_eq!(window().next_occurrence(now, t), ny(2026, 10, 15, 18, 0));
    }

    #[test]
    fn next_occurrence_rolls_over_when_equal_or_past() {
        let t = NaiveTime::from_hms_opt(18, 0, 0).unwrap();
        assert_eq!(
            window().next_occurrence(ny(2026, 10, 15, 18, 0), t),
            ny(2026, 10, 16, 18, 0)
        );
        assert_eq!(
            window().next_occurrence(ny(2026, 10, 15, 19, 0), t),
            ny(2026, 10, 16, 18, 0)
        );
    }

    #[test]
    fn dst_gap_moves_forward() {
        // 2026-03-08 02:30 does not exist in New York.
        let date = NaiveDate::from_ymd_opt(2026, 3, 8).unwrap();
        let t = NaiveTime::from_hms_opt(2, 30, 0).unwrap();
        assert_eq!(window().at(date, t), ny(2026, 3, 8, 3, 30));
    }

    #[test]
    fn parse_hhmm_accepts_valid_times() {
        assert_eq!(parse_hhmm("1800"), NaiveTime::from_hms_opt(18, 0, 0));
        assert_eq!(parse_hhmm(" 0005 "), NaiveTime::from_hms_opt(0, 5, 0));
        assert_eq!(parse_hhmm("2359"), NaiveTime::from_hms_opt(23, 59, 0));
    }

    #[test]
    fn parse_hhmm_rejects_garbage() {
        for bad in ["2500", "abcd", "1260", "180", "18:00", "", "18000", "-100"] {
            assert!(parse_hhmm(bad).is_none(), "{bad} should not parse");
        }
    }

    #[test]
    fn parse_mmdd_rolls_into_next_year() {
        let today = NaiveDate::from_ymd_opt(2026, 10, 15).unwrap();
        assert_eq!(parse_mmdd("1020", today), NaiveDate::from_ymd_opt(2026, 10, 20));
        assert_eq!(parse_mmdd("1015", today), NaiveDate::from_ymd_opt(2026, 10, 15));
        assert_eq!(parse_mmdd("0105", today), NaiveDate::from_ymd_opt(2027, 1, 5));
        assert_eq!(parse_mmdd("1341", today), None);
    }

    #[test]
    fn manual_clock_advances() {
        let clock = ManualClock::new(ny(2026, 10, 15, 9, 0));
        clock.advance(Duration::minutes(90));
        assert_eq!(clock.now(), ny(2026, 10, 15, 10, 30));
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn any_valid_hhmm_parses(h in 0u32..24, m in 0u32..60) {
                let text = format!("{h:02}{m:02}");
                prop_assert_eq!(parse_hhmm(&text), NaiveTime::from_hms_opt(h, m, 0));
            }

            #[test]
            fn out_of_range_hours_never_parse(h in 24u32..100, m in 0u32..100) {
                let text = format!("{h:02}{m:02}");
                prop_assert!(parse_hhmm(&text).is_none());
            }
        }
    }
}
