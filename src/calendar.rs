//! Trading calendar providers
//!
//! Pipelines only need the ordered list of valid sessions for a market;
//! day-counting rules live behind the `SessionCalendar` trait.

use crate::error::{PipelineError, Result};
use crate::types::Session;
use chrono::{Datelike, Duration, NaiveDate, Weekday};
use chrono_tz::Tz;
use hashbrown::HashMap;
use std::fmt;
use std::sync::Arc;

/// Ordered sequence of valid trading sessions for one market
pub trait SessionCalendar: Send + Sync + fmt::Debug {
    /// Calendar name (e.g. "NYSE")
    fn name(&self) -> &str;

    /// Exchange timezone
    fn timezone(&self) -> Tz;

    /// All sessions, in ascending order
    fn sessions(&self) -> &[Session];

    /// Position of a session in the calendar, if it is a valid session
    fn index_of(&self, session: Session) -> Option<usize> {
        self.sessions().binary_search(&session).ok()
    }

    /// Sessions in `[start, end]`, inclusive on both ends
    fn sessions_between(&self, start: Session, end: Session) -> &[Session] {
        let all = self.sessions();
        let lo = all.partition_point(|s| *s < start);
        let hi = all.partition_point(|s| *s <= end);
        &all[lo..hi]
    }
}

/// Resolves calendar names (as carried by domains) to calendars
pub trait CalendarProvider: Send + Sync {
    fn get_calendar(&self, name: &str) -> Result<Arc<dyn SessionCalendar>>;
}

/// Calendar whose sessions are all weekdays in a fixed range, minus holidays
#[derive(Debug, Clone)]
pub struct WeekdayCalendar {
    name: String,
    timezone: Tz,
    sessions: Vec<Session>,
}

impl WeekdayCalendar {
    pub fn new(
        name: impl Into<String>,
        timezone: Tz,
        first: Session,
        last: Session,
        holidays: &[Session],
    ) -> Self {
        let mut sessions = Vec::new();
        let mut current = first;
        while current <= last {
            if !Self::is_weekend(current) && !holidays.contains(&current) {
                sessions.push(current);
            }
            current += Duration::days(1);
        }
        Self {
            name: name.into(),
            timezone,
            sessions,
        }
    }

    /// NYSE calendar over the given range, with a simplified holiday list
    pub fn nyse(first: Session, last: Session) -> Self {
        Self::new(
            "NYSE",
            chrono_tz::America::New_York,
            first,
            last,
            &Self::us_holidays(first.year(), last.year()),
        )
    }

    /// TSX calendar over the given range
    pub fn tsx(first: Session, last: Session) -> Self {
        Self::new(
            "TSX",
            chrono_tz::America::Toronto,
            first,
            last,
            &Self::us_holidays(first.year(), last.year()),
        )
    }

    /// LSE calendar over the given range
    pub fn lse(first: Session, last: Session) -> Self {
        Self::new(
            "LSE",
            chrono_tz::Europe::London,
            first,
            last,
            &Self::uk_holidays(first.year(), last.year()),
        )
    }

    fn is_weekend(date: NaiveDate) -> bool {
        matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
    }

    // Simplified fixed-date holiday lists. A production deployment would
    // plug in a full holiday calendar through the SessionCalendar trait.
    fn us_holidays(first_year: i32, last_year: i32) -> Vec<Session> {
        let mut holidays = Vec::new();
        for year in first_year..=last_year {
            for (month, day) in [(1, 1), (7, 4), (12, 25)] {
                if let Some(d) = NaiveDate::from_ymd_opt(year, month, day) {
                    holidays.push(d);
                }
            }
        }
        holidays
    }

    fn uk_holidays(first_year: i32, last_year: i32) -> Vec<Session> {
        let mut holidays = Vec::new();
        for year in first_year..=last_year {
            for (month, day) in [(1, 1), (12, 25), (12, 26)] {
                if let Some(d) = NaiveDate::from_ymd_opt(year, month, day) {
                    holidays.push(d);
                }
            }
        }
        holidays
    }
}

impl SessionCalendar for WeekdayCalendar {
    fn name(&self) -> &str {
        &self.name
    }

    fn timezone(&self) -> Tz {
        self.timezone
    }

    fn sessions(&self) -> &[Session] {
        &self.sessions
    }
}

/// Provider backed by a fixed set of registered calendars
#[derive(Default)]
pub struct StaticCalendarProvider {
    calendars: HashMap<String, Arc<dyn SessionCalendar>>,
}

impl StaticCalendarProvider {
    pub fn new() -> Self {
        Self {
            calendars: HashMap::new(),
        }
    }

    /// Provider with NYSE, TSX and LSE calendars covering `[first, last]`
    pub fn with_default_calendars(first: Session, last: Session) -> Self {
        let mut provider = Self::new();
        provider.register(Arc::new(WeekdayCalendar::nyse(first, last)));
        provider.register(Arc::new(WeekdayCalendar::tsx(first, last)));
        provider.register(Arc::new(WeekdayCalendar::lse(first, last)));
        provider
    }

    pub fn register(&mut self, calendar: Arc<dyn SessionCalendar>) {
        self.calendars
            .insert(calendar.name().to_string(), calendar);
    }
}

impl CalendarProvider for StaticCalendarProvider {
    fn get_calendar(&self, name: &str) -> Result<Arc<dyn SessionCalendar>> {
        self.calendars
            .get(name)
            .cloned()
            .ok_or_else(|| PipelineError::Calendar(format!("unknown calendar: {}", name)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> Session {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_weekday_calendar_skips_weekends() {
        // 2024-01-05 is a Friday, 2024-01-08 a Monday
        let cal = WeekdayCalendar::new(
            "TEST",
            chrono_tz::UTC,
            date(2024, 1, 5),
            date(2024, 1, 9),
            &[],
        );
        assert_eq!(
            cal.sessions(),
            &[date(2024, 1, 5), date(2024, 1, 8), date(2024, 1, 9)]
        );
    }

    #[test]
    fn test_weekday_calendar_skips_holidays() {
        let cal = WeekdayCalendar::nyse(date(2024, 1, 1), date(2024, 1, 5));
        // Jan 1 2024 is a holiday (and a Monday)
        assert_eq!(cal.index_of(date(2024, 1, 1)), None);
        assert_eq!(cal.index_of(date(2024, 1, 2)), Some(0));
    }

    #[test]
    fn test_sessions_between() {
        let cal = WeekdayCalendar::new(
            "TEST",
            chrono_tz::UTC,
            date(2024, 1, 1),
            date(2024, 1, 31),
            &[],
        );
        let slice = cal.sessions_between(date(2024, 1, 8), date(2024, 1, 12));
        assert_eq!(slice.len(), 5);
        assert_eq!(slice[0], date(2024, 1, 8));
        assert_eq!(slice[4], date(2024, 1, 12));
    }

    #[test]
    fn test_static_provider() {
        let provider =
            StaticCalendarProvider::with_default_calendars(date(2024, 1, 1), date(2024, 12, 31));
        assert!(provider.get_calendar("NYSE").is_ok());
        assert!(provider.get_calendar("LSE").is_ok());
        assert!(provider.get_calendar("XNAS").is_err());
    }
}
