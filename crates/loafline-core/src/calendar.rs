//! Planning horizon, day-of-week arithmetic, and the labor calendar.

use crate::error::{CoreError, CoreResult};
use chrono::{Datelike, Days, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Day of week for truck calendars and warm-start rotation.
///
/// Chrono's `Weekday` stays an implementation detail of date arithmetic;
/// schedules use this closed enum so serialized records are stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DayOfWeek {
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
    Sunday,
}

impl DayOfWeek {
    pub const ALL: [DayOfWeek; 7] = [
        DayOfWeek::Monday,
        DayOfWeek::Tuesday,
        DayOfWeek::Wednesday,
        DayOfWeek::Thursday,
        DayOfWeek::Friday,
        DayOfWeek::Saturday,
        DayOfWeek::Sunday,
    ];

    /// Day of week of a calendar date.
    pub fn of(date: NaiveDate) -> Self {
        Self::ALL[date.weekday().num_days_from_monday() as usize]
    }

    /// Index in Monday=0 .. Sunday=6 order.
    pub fn index(&self) -> usize {
        Self::ALL.iter().position(|d| d == self).unwrap_or(0)
    }

    /// The weekday `days` later (mod 7). Used when expanding intermediate
    /// truck stops: a leg reached after two transit days departs two
    /// weekdays after the truck's origin departure.
    pub fn offset(&self, days: u32) -> Self {
        Self::ALL[(self.index() + days as usize) % 7]
    }
}

/// Labor availability and productivity for one production date.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LaborDay {
    /// Hours available at the regular rate. Zero on non-fixed days.
    pub fixed_hours: f64,
    /// Overtime hours available beyond the fixed block. On non-fixed days
    /// this caps the callable crew hours.
    pub max_overtime_hours: f64,
    /// Whether this is a fixed (regular-roster) day. Non-fixed days carry a
    /// minimum charge and their own hourly rate.
    pub is_fixed_day: bool,
    /// Production rate in units per labor-hour.
    pub production_rate: f64,
    /// Minimum hours that must be paid once any non-fixed labor is used.
    #[serde(default)]
    pub min_nonfixed_hours: Option<f64>,
}

impl LaborDay {
    /// A regular weekday roster.
    pub fn fixed(fixed_hours: f64, max_overtime_hours: f64, production_rate: f64) -> Self {
        Self {
            fixed_hours,
            max_overtime_hours,
            is_fixed_day: true,
            production_rate,
            min_nonfixed_hours: None,
        }
    }

    /// A weekend or public-holiday roster: callable crew only.
    pub fn non_fixed(callable_hours: f64, production_rate: f64) -> Self {
        Self {
            fixed_hours: 0.0,
            max_overtime_hours: callable_hours,
            is_fixed_day: false,
            production_rate,
            min_nonfixed_hours: None,
        }
    }

    pub fn with_min_block(mut self, hours: f64) -> Self {
        self.min_nonfixed_hours = Some(hours);
        self
    }

    /// Total labor-hours obtainable on this date.
    pub fn max_hours(&self) -> f64 {
        if self.is_fixed_day {
            self.fixed_hours + self.max_overtime_hours
        } else {
            self.max_overtime_hours
        }
    }

    /// Maximum units producible on this date.
    pub fn max_units(&self) -> f64 {
        self.max_hours() * self.production_rate
    }
}

/// Per-date labor calendar. Dates without an entry cannot produce.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LaborCalendar {
    pub days: BTreeMap<NaiveDate, LaborDay>,
}

impl LaborCalendar {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, date: NaiveDate, day: LaborDay) {
        self.days.insert(date, day);
    }

    pub fn get(&self, date: NaiveDate) -> Option<&LaborDay> {
        self.days.get(&date)
    }

    /// Dates inside `horizon` missing a calendar entry.
    pub fn uncovered_dates(&self, horizon: &PlanningHorizon) -> Vec<NaiveDate> {
        horizon
            .dates()
            .filter(|d| !self.days.contains_key(d))
            .collect()
    }
}

/// A contiguous daily date range `[start, end]`, both inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanningHorizon {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl PlanningHorizon {
    pub fn new(start: NaiveDate, end: NaiveDate) -> CoreResult<Self> {
        if start > end {
            return Err(CoreError::InvalidDateRange { start, end });
        }
        Ok(Self { start, end })
    }

    /// Number of days in the horizon (inclusive of both ends).
    pub fn num_days(&self) -> usize {
        (self.end - self.start).num_days() as usize + 1
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }

    /// Iterate all dates in ascending order.
    pub fn dates(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        let end = self.end;
        self.start.iter_days().take_while(move |d| *d <= end)
    }

    /// The horizon with `days` extra days ahead of `start`.
    pub fn extended_back(&self, days: u32) -> Self {
        let start = self
            .start
            .checked_sub_days(Days::new(days as u64))
            .unwrap_or(self.start);
        Self {
            start,
            end: self.end,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_day_of_week_of_known_dates() {
        // 2025-01-06 is a Monday.
        assert_eq!(DayOfWeek::of(date(2025, 1, 6)), DayOfWeek::Monday);
        assert_eq!(DayOfWeek::of(date(2025, 1, 12)), DayOfWeek::Sunday);
    }

    #[test]
    fn test_day_of_week_offset_wraps() {
        assert_eq!(DayOfWeek::Saturday.offset(3), DayOfWeek::Tuesday);
        assert_eq!(DayOfWeek::Monday.offset(7), DayOfWeek::Monday);
    }

    #[test]
    fn test_horizon_dates_and_bounds() {
        let horizon = PlanningHorizon::new(date(2025, 1, 6), date(2025, 1, 8)).unwrap();
        let days: Vec<_> = horizon.dates().collect();
        assert_eq!(days.len(), 3);
        assert_eq!(horizon.num_days(), 3);
        assert!(horizon.contains(date(2025, 1, 7)));
        assert!(!horizon.contains(date(2025, 1, 9)));
    }

    #[test]
    fn test_horizon_rejects_inverted_range() {
        assert!(PlanningHorizon::new(date(2025, 1, 8), date(2025, 1, 6)).is_err());
    }

    #[test]
    fn test_extended_back() {
        let horizon = PlanningHorizon::new(date(2025, 1, 10), date(2025, 1, 20)).unwrap();
        let wider = horizon.extended_back(4);
        assert_eq!(wider.start, date(2025, 1, 6));
        assert_eq!(wider.end, date(2025, 1, 20));
    }

    #[test]
    fn test_labor_day_capacity() {
        let day = LaborDay::fixed(12.0, 2.0, 1400.0);
        assert_eq!(day.max_hours(), 14.0);
        assert_eq!(day.max_units(), 19_600.0);

        let weekend = LaborDay::non_fixed(8.0, 1400.0).with_min_block(4.0);
        assert_eq!(weekend.max_hours(), 8.0);
        assert_eq!(weekend.min_nonfixed_hours, Some(4.0));
    }

    #[test]
    fn test_calendar_uncovered_dates() {
        let mut cal = LaborCalendar::new();
        cal.insert(date(2025, 1, 6), LaborDay::fixed(12.0, 2.0, 1400.0));
        let horizon = PlanningHorizon::new(date(2025, 1, 6), date(2025, 1, 7)).unwrap();
        assert_eq!(cal.uncovered_dates(&horizon), vec![date(2025, 1, 7)]);
    }
}
