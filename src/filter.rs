//! Window predicates applied to fetched candidates before they are pooled.

use chrono::{Datelike, Duration as ChronoDuration, NaiveDate, NaiveDateTime};

use crate::config::{FavoritesFilter, SelectionOptions};
use crate::events::PhotoRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CandidateFilter {
    pub recent_days: u32,
    pub memory_years: u32,
    pub favorites: FavoritesFilter,
}

impl From<&SelectionOptions> for CandidateFilter {
    fn from(options: &SelectionOptions) -> Self {
        Self {
            recent_days: options.recent_days,
            memory_years: options.memory_years,
            favorites: options.favorites,
        }
    }
}

impl CandidateFilter {
    /// Taken within the last `recent_days` days of `now` (inclusive), and
    /// never after `now`.
    pub fn accepts_recent(&self, record: &PhotoRecord, now: NaiveDateTime) -> bool {
        if !self.favorites.accepts(record.favorite) || record.taken_at > now {
            return false;
        }
        if self.recent_days == 0 {
            return true;
        }
        let cutoff = now - ChronoDuration::days(i64::from(self.recent_days));
        record.taken_at >= cutoff
    }

    /// Taken on today's month/day in an earlier year, within `memory_years`.
    pub fn accepts_memory(&self, record: &PhotoRecord, today: NaiveDate) -> bool {
        if !self.favorites.accepts(record.favorite) {
            return false;
        }
        let taken = record.taken_at.date();
        if !same_calendar_day(taken, today) {
            return false;
        }
        let years_ago = years_ago(record.memory_year.unwrap_or(taken.year()), today);
        if years_ago < 1 {
            return false;
        }
        self.memory_years == 0 || years_ago <= i64::from(self.memory_years)
    }
}

pub fn years_ago(year: i32, today: NaiveDate) -> i64 {
    i64::from(today.year()) - i64::from(year)
}

/// Month/day match; a 29 February photo counts as 28 February in non-leap years.
fn same_calendar_day(taken: NaiveDate, today: NaiveDate) -> bool {
    if taken.month() == today.month() && taken.day() == today.day() {
        return true;
    }
    let leap_day = taken.month() == 2 && taken.day() == 29;
    leap_day && today.month() == 2 && today.day() == 28 && !today.leap_year()
}
