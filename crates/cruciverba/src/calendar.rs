//! Calendar aggregation.
//!
//! Turns a flat list of records into one grid per year. Each grid starts with
//! `None` placeholders so January 1 lands under its weekday (0 = Sunday),
//! followed by one [`DayCell`] per day. The grid of the current year stops at
//! today.

use chrono::{Datelike, NaiveDate};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

use crate::dates::{self, days_in_month, first_day_offset};
use crate::types::{DayCell, Record};

/// Grid columns taken by the weekday labels (grid lines are 1-based)
pub const GRID_COLUMN_OFFSET: usize = 2;

/// Grid rows taken by the month labels
pub const GRID_ROW_OFFSET: usize = 2;

pub const MONTH_ABBREVIATIONS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

pub const WEEKDAY_LABELS: [&str; 7] = ["Su", "M", "T", "W", "Th", "F", "S"];

/// All days of one year, preceded by weekday-alignment placeholders
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct YearGrid {
    pub year: i32,
    pub first_day_offset: usize,
    pub cells: Vec<Option<DayCell>>,
}

impl YearGrid {
    pub fn days(&self) -> impl Iterator<Item = &DayCell> {
        self.cells.iter().flatten()
    }

    pub fn find(&self, date: &str) -> Option<&DayCell> {
        self.days().find(|day| day.date == date)
    }

    pub fn record_count(&self) -> usize {
        self.days().map(|day| day.records.len()).sum()
    }
}

/// Position of a month label above a year grid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MonthLabel {
    /// 1-based month
    pub month: u32,
    pub name: &'static str,
    pub column: usize,
}

/// Output of one aggregation pass
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Calendar {
    /// The "today" the pass was computed against
    pub as_of: NaiveDate,
    years: BTreeMap<i32, YearGrid>,
}

impl Calendar {
    pub fn year(&self, year: i32) -> Option<&YearGrid> {
        self.years.get(&year)
    }

    pub fn years(&self) -> impl DoubleEndedIterator<Item = &YearGrid> {
        self.years.values()
    }

    /// Newest year first, the order the page shows them in
    pub fn years_descending(&self) -> impl Iterator<Item = &YearGrid> {
        self.years.values().rev()
    }

    pub fn days(&self) -> impl Iterator<Item = &DayCell> {
        self.years.values().flat_map(YearGrid::days)
    }

    /// Look up a day by its exact `YYYY-MM-DD` string. Missing years, days
    /// past the cutoff and impossible dates are all `None`.
    pub fn find_day(&self, year: i32, date: &str) -> Option<&DayCell> {
        self.years.get(&year)?.find(date)
    }

    /// Resolve a deep-link fragment such as `#2024-03-15`.
    ///
    /// Only days that have records resolve; anything else means "no details".
    pub fn resolve_fragment(&self, fragment: &str) -> Option<&DayCell> {
        let hash = fragment.strip_prefix('#').unwrap_or(fragment);
        let date = dates::parse_iso_strict(hash)?;
        self.find_day(date.year(), hash)
            .filter(|day| day.has_records())
    }

    pub fn month_labels(&self, year: i32) -> Vec<MonthLabel> {
        month_positions(year, self.as_of)
    }
}

/// Aggregate records into per-year grids as of `today`.
///
/// Years present in the data are emitted in full; the current year is always
/// emitted (even without records) and ends at `today`. Records dated after
/// `today` stay in the input but get no cell.
pub fn aggregate(records: &[Record], today: NaiveDate) -> Calendar {
    let current_year = today.year();

    let mut buckets: BTreeMap<i32, BTreeMap<String, Vec<Record>>> = BTreeMap::new();
    for record in records {
        buckets
            .entry(record.year())
            .or_default()
            .entry(record.iso_date())
            .or_default()
            .push(record.clone());
    }

    let mut years: BTreeSet<i32> = buckets.keys().copied().collect();
    years.insert(current_year);

    let grids = years
        .into_iter()
        .map(|year| {
            let dates = buckets.remove(&year).unwrap_or_default();
            (year, build_year(year, dates, today))
        })
        .collect::<BTreeMap<_, _>>();

    debug!(
        records = records.len(),
        years = grids.len(),
        as_of = %today,
        "Calendar aggregated"
    );

    Calendar {
        as_of: today,
        years: grids,
    }
}

fn build_year(year: i32, mut dates: BTreeMap<String, Vec<Record>>, today: NaiveDate) -> YearGrid {
    let offset = first_day_offset(year);
    let is_current = year == today.year();

    let mut cells: Vec<Option<DayCell>> = vec![None; offset];
    cells.reserve(dates::days_in_year(year) as usize);

    'months: for month in 1..=12 {
        for day in 1..=days_in_month(year, month) {
            let Some(date) = NaiveDate::from_ymd_opt(year, month, day) else {
                continue;
            };
            if is_current && date > today {
                break 'months;
            }

            let key = dates::to_iso(date);
            let records = dates.remove(&key).unwrap_or_default();
            cells.push(Some(DayCell { date: key, records }));
        }
    }

    if !dates.is_empty() {
        debug!(year, days = dates.len(), "Days after cutoff left out of grid");
    }

    YearGrid {
        year,
        first_day_offset: offset,
        cells,
    }
}

/// Column of each month label: days before the month (placeholders
/// included) divided by 7, plus [`GRID_COLUMN_OFFSET`]. In the current year
/// months that have not started yet get no label.
pub fn month_positions(year: i32, today: NaiveDate) -> Vec<MonthLabel> {
    let is_current = year == today.year();
    let mut day_count = first_day_offset(year);
    let mut labels = Vec::with_capacity(12);

    for month in 1..=12u32 {
        if is_current && month > today.month() {
            break;
        }
        labels.push(MonthLabel {
            month,
            name: MONTH_ABBREVIATIONS[month as usize - 1],
            column: day_count / 7 + GRID_COLUMN_OFFSET,
        });
        day_count += days_in_month(year, month) as usize;
    }

    labels
}

/// (row, column) of the grid entry at `index`; weeks run down the columns
pub fn grid_position(index: usize) -> (usize, usize) {
    (index % 7 + GRID_ROW_OFFSET, index / 7 + GRID_COLUMN_OFFSET)
}
