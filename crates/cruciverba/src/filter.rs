//! Multi-category record filtering.
//!
//! Selections are OR'd within a category and AND'ed across categories. Option
//! counts are faceted: each category is counted with every *other* category's
//! selection applied and its own ignored, so a count answers "how many items
//! would match if I also picked this".

use serde::{Serialize, Serializer};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

use chrono::NaiveDate;

use crate::calendar::Calendar;
use crate::error::{Error, Result};
use crate::types::{DayCell, Record, RecordField};

/// Wire form of [`FilterValue::Any`]
pub const ANY_FILTER_VALUE: &str = "__ANY__";

/// A selectable option within a filter category
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FilterValue {
    /// The field is present, whatever its value
    Any,
    Value(String),
}

impl FilterValue {
    pub fn value(value: impl Into<String>) -> Self {
        FilterValue::Value(value.into())
    }

    pub fn is_any(&self) -> bool {
        matches!(self, FilterValue::Any)
    }

    pub fn as_str(&self) -> &str {
        match self {
            FilterValue::Any => ANY_FILTER_VALUE,
            FilterValue::Value(v) => v,
        }
    }

    fn matches(&self, field: Option<&str>) -> bool {
        match self {
            FilterValue::Any => field.is_some(),
            FilterValue::Value(v) => field == Some(v.as_str()),
        }
    }
}

impl From<&str> for FilterValue {
    fn from(s: &str) -> Self {
        if s == ANY_FILTER_VALUE {
            FilterValue::Any
        } else {
            FilterValue::Value(s.to_string())
        }
    }
}

impl fmt::Display for FilterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for FilterValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// A named filtering axis over one record field
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FilterCategory {
    pub id: String,
    pub label: String,
    pub field: RecordField,
    /// Offer an "any value" option next to the concrete values
    pub include_any: bool,
}

impl FilterCategory {
    pub fn new(id: impl Into<String>, label: impl Into<String>, field: RecordField) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            field,
            include_any: false,
        }
    }

    pub fn with_any(mut self) -> Self {
        self.include_any = true;
        self
    }
}

/// Categories shown on the heatmap page
pub fn default_categories() -> Vec<FilterCategory> {
    vec![
        FilterCategory::new("publication", "Publication", RecordField::Publication),
        FilterCategory::new("size", "Size", RecordField::Size),
        FilterCategory::new("type", "Type", RecordField::Style),
        FilterCategory::new("collaborator", "Collaborator", RecordField::Collaborator).with_any(),
    ]
}

pub type CategoryCounts = BTreeMap<FilterValue, usize>;

/// Per-category, per-option faceted counts
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FilterCounts(BTreeMap<String, CategoryCounts>);

impl FilterCounts {
    pub fn category(&self, id: &str) -> Option<&CategoryCounts> {
        self.0.get(id)
    }

    /// Count for one option, zero when the option never occurs
    pub fn get(&self, id: &str, value: &FilterValue) -> usize {
        self.category(id)
            .and_then(|counts| counts.get(value))
            .copied()
            .unwrap_or(0)
    }
}

/// Active selections over a fixed list of categories
#[derive(Debug, Clone)]
pub struct FilterEngine {
    categories: Vec<FilterCategory>,
    active: BTreeMap<String, BTreeSet<FilterValue>>,
}

impl FilterEngine {
    pub fn new(categories: Vec<FilterCategory>) -> Self {
        Self {
            categories,
            active: BTreeMap::new(),
        }
    }

    /// Build an engine from `(category, value)` pairs such as URL query pairs
    pub fn from_pairs<'a, I>(categories: Vec<FilterCategory>, pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut engine = Self::new(categories);
        for (category, value) in pairs {
            engine.add_filter(category, FilterValue::from(value))?;
        }
        Ok(engine)
    }

    pub fn categories(&self) -> &[FilterCategory] {
        &self.categories
    }

    pub fn category(&self, id: &str) -> Result<&FilterCategory> {
        self.categories
            .iter()
            .find(|c| c.id == id)
            .ok_or_else(|| Error::Configuration(format!("unknown filter category {id:?}")))
    }

    /// Select `value` in `category`.
    ///
    /// `Any` and concrete values are mutually exclusive: selecting `Any`
    /// replaces the category's selection, selecting a value drops `Any`.
    pub fn add_filter(&mut self, category: &str, value: FilterValue) -> Result<()> {
        self.check_value(category, &value)?;

        let selected = self.active.entry(category.to_string()).or_default();
        if value.is_any() {
            selected.clear();
        } else {
            selected.remove(&FilterValue::Any);
        }
        selected.insert(value);
        Ok(())
    }

    pub fn remove_filter(&mut self, category: &str, value: &FilterValue) -> Result<()> {
        self.category(category)?;

        if let Some(selected) = self.active.get_mut(category) {
            selected.remove(value);
            if selected.is_empty() {
                self.active.remove(category);
            }
        }
        Ok(())
    }

    /// Replace the selection of `category`. A set containing `Any` collapses
    /// to just `Any`; an empty set clears the category.
    pub fn set_filter<I>(&mut self, category: &str, values: I) -> Result<()>
    where
        I: IntoIterator<Item = FilterValue>,
    {
        self.category(category)?;

        let mut selected: BTreeSet<FilterValue> = values.into_iter().collect();
        for value in &selected {
            self.check_value(category, value)?;
        }
        if selected.contains(&FilterValue::Any) {
            selected = BTreeSet::from([FilterValue::Any]);
        }

        if selected.is_empty() {
            self.active.remove(category);
        } else {
            self.active.insert(category.to_string(), selected);
        }
        Ok(())
    }

    pub fn clear_filter(&mut self, category: &str) -> Result<()> {
        self.category(category)?;
        self.active.remove(category);
        Ok(())
    }

    pub fn clear_all_filters(&mut self) {
        self.active.clear();
    }

    pub fn has_active_filters(&self) -> bool {
        self.active.values().any(|selected| !selected.is_empty())
    }

    pub fn selected(&self, category: &str) -> Option<&BTreeSet<FilterValue>> {
        self.active.get(category)
    }

    pub fn is_selected(&self, category: &str, value: &FilterValue) -> bool {
        self.active
            .get(category)
            .is_some_and(|selected| selected.contains(value))
    }

    /// Active selections as `(category, value)` pairs, e.g. for building links
    pub fn pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.active.iter().flat_map(|(category, selected)| {
            selected
                .iter()
                .map(move |value| (category.as_str(), value.as_str()))
        })
    }

    pub fn record_passes(&self, record: &Record) -> bool {
        self.passes_except(record, None)
    }

    /// A day passes when nothing is filtered or at least one record passes
    pub fn day_passes(&self, day: &DayCell) -> bool {
        !self.has_active_filters() || day.records.iter().any(|r| self.record_passes(r))
    }

    /// Days of `calendar` that pass the active filters
    pub fn included_days<'a>(&'a self, calendar: &'a Calendar) -> impl Iterator<Item = &'a DayCell> {
        calendar.days().filter(move |day| self.day_passes(day))
    }

    /// Faceted counts over records. Every value present in the dataset is
    /// listed, with zero when the other categories exclude all its records.
    pub fn filter_counts(&self, records: &[Record]) -> FilterCounts {
        let mut all = BTreeMap::new();

        for category in &self.categories {
            let mut counts = self.empty_counts(category, records.iter());

            for record in records
                .iter()
                .filter(|r| self.passes_except(r, Some(category.id.as_str())))
            {
                if let Some(value) = record.field(category.field) {
                    *counts.entry(FilterValue::value(value)).or_insert(0) += 1;
                    if category.include_any {
                        *counts.entry(FilterValue::Any).or_insert(0) += 1;
                    }
                }
            }

            all.insert(category.id.clone(), counts);
        }

        FilterCounts(all)
    }

    /// Faceted counts of distinct days instead of records
    pub fn day_filter_counts(&self, calendar: &Calendar) -> FilterCounts {
        let mut all = BTreeMap::new();

        for category in &self.categories {
            let mut counts =
                self.empty_counts(category, calendar.days().flat_map(|day| day.records.iter()));

            for day in calendar.days() {
                let values: BTreeSet<&str> = day
                    .records
                    .iter()
                    .filter(|r| self.passes_except(r, Some(category.id.as_str())))
                    .filter_map(|r| r.field(category.field))
                    .collect();

                for value in &values {
                    *counts.entry(FilterValue::value(*value)).or_insert(0) += 1;
                }
                if category.include_any && !values.is_empty() {
                    *counts.entry(FilterValue::Any).or_insert(0) += 1;
                }
            }

            all.insert(category.id.clone(), counts);
        }

        FilterCounts(all)
    }

    /// Short description of a category's selection, e.g. "Showing 2 sizes"
    pub fn summary(&self, category: &str) -> Result<String> {
        let label = self.category(category)?.label.to_lowercase();

        let Some(selected) = self.active.get(category).filter(|s| !s.is_empty()) else {
            return Ok("Showing all".to_string());
        };

        if selected.contains(&FilterValue::Any) {
            return Ok(format!("Showing any {label}"));
        }

        let n = selected.len();
        let noun = if n == 1 { label } else { format!("{label}s") };
        Ok(format!("Showing {n} {noun}"))
    }

    fn check_value(&self, category: &str, value: &FilterValue) -> Result<()> {
        let config = self.category(category)?;
        if value.is_any() && !config.include_any {
            return Err(Error::Configuration(format!(
                "filter category {category:?} has no \"any\" option"
            )));
        }
        Ok(())
    }

    fn passes_except(&self, record: &Record, skip: Option<&str>) -> bool {
        self.categories
            .iter()
            .filter(|category| Some(category.id.as_str()) != skip)
            .all(|category| match self.active.get(&category.id) {
                Some(selected) if !selected.is_empty() => {
                    let field = record.field(category.field);
                    selected.iter().any(|value| value.matches(field))
                }
                _ => true,
            })
    }

    fn empty_counts<'a, I>(&self, category: &FilterCategory, records: I) -> CategoryCounts
    where
        I: Iterator<Item = &'a Record>,
    {
        let mut counts: CategoryCounts = records
            .filter_map(|r| r.field(category.field))
            .map(|value| (FilterValue::value(value), 0))
            .collect();
        if category.include_any {
            counts.insert(FilterValue::Any, 0);
        }
        counts
    }
}

/// Values of every category in presentation order, computed once per dataset
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FilterOptions(BTreeMap<String, Vec<String>>);

impl FilterOptions {
    pub fn from_records(records: &[Record], categories: &[FilterCategory]) -> Self {
        let options = categories
            .iter()
            .map(|category| (category.id.clone(), option_values(records, category.field)))
            .collect();
        Self(options)
    }

    pub fn values(&self, category: &str) -> &[String] {
        self.0.get(category).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Distinct values of `field`, most frequent first; ties go to the value
/// seen most recently, then alphabetical order.
pub fn option_values(records: &[Record], field: RecordField) -> Vec<String> {
    let mut stats: HashMap<&str, (usize, NaiveDate)> = HashMap::new();
    for record in records {
        if let Some(value) = record.field(field) {
            let date = record.date();
            let entry = stats.entry(value).or_insert((0, date));
            entry.0 += 1;
            entry.1 = entry.1.max(date);
        }
    }

    let mut values: Vec<(&str, usize, NaiveDate)> = stats
        .into_iter()
        .map(|(value, (count, latest))| (value, count, latest))
        .collect();
    values.sort_by(|a, b| b.1.cmp(&a.1).then(b.2.cmp(&a.2)).then(a.0.cmp(b.0)));
    values.into_iter().map(|(value, _, _)| value.to_string()).collect()
}
