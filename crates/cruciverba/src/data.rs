use chrono::NaiveDate;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info};

use crate::calendar::{aggregate, Calendar};
use crate::error::{Error, Result};
use crate::filter::{FilterCategory, FilterEngine, FilterOptions};
use crate::types::{RawRecord, Record, RecordCategory};

/// Everything derived from one record document.
///
/// Built once per load and replaced wholesale when the document changes.
#[derive(Debug, Clone)]
pub struct Dataset {
    pub records: Vec<Record>,
    pub calendar: Calendar,
    pub options: FilterOptions,
    pub categories: Vec<FilterCategory>,
}

impl Dataset {
    pub fn build(records: Vec<Record>, categories: Vec<FilterCategory>, today: NaiveDate) -> Self {
        let calendar = aggregate(&records, today);
        let options = FilterOptions::from_records(&records, &categories);
        Self {
            records,
            calendar,
            options,
            categories,
        }
    }

    pub fn load(path: &Path, categories: Vec<FilterCategory>, today: NaiveDate) -> Result<Self> {
        let records = load_records(path)?;
        let dataset = Self::build(records, categories, today);
        info!(
            records = dataset.records.len(),
            years = dataset.calendar.years().count(),
            "Dataset loaded"
        );
        Ok(dataset)
    }

    /// The same records aggregated against another "today"
    pub fn as_of(&self, today: NaiveDate) -> Self {
        Self {
            records: self.records.clone(),
            calendar: aggregate(&self.records, today),
            options: self.options.clone(),
            categories: self.categories.clone(),
        }
    }

    /// A filter engine with nothing selected over this dataset's categories
    pub fn engine(&self) -> FilterEngine {
        FilterEngine::new(self.categories.clone())
    }

    pub fn engine_from_pairs<'a, I>(&self, pairs: I) -> Result<FilterEngine>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        FilterEngine::from_pairs(self.categories.clone(), pairs)
    }
}

/// Load and normalize records from a JSON document on disk
pub fn load_records(path: &Path) -> Result<Vec<Record>> {
    let content = std::fs::read_to_string(path)?;
    let records = parse_document(&content)?;
    debug!(count = records.len(), path = %path.display(), "Loaded records");
    Ok(records)
}

/// Parse a record document.
///
/// Three shapes are accepted: a bare array of records, `{"records": [...]}`,
/// and `{"puzzles": [...], "misc": [...]}` where list membership decides the
/// category. Every date is normalized; the first bad date fails the load.
pub fn parse_document(json: &str) -> Result<Vec<Record>> {
    let document: Value = serde_json::from_str(json)?;

    let raw = match document {
        Value::Array(items) => raw_list(Value::Array(items), None)?,
        Value::Object(mut map) => {
            if let Some(records) = map.remove("records") {
                raw_list(records, None)?
            } else if map.contains_key("puzzles") || map.contains_key("misc") {
                let mut raw = Vec::new();
                if let Some(puzzles) = map.remove("puzzles") {
                    raw.extend(raw_list(puzzles, Some(RecordCategory::Puzzle))?);
                }
                if let Some(misc) = map.remove("misc") {
                    raw.extend(raw_list(misc, Some(RecordCategory::Misc))?);
                }
                raw
            } else {
                return Err(Error::Load(
                    "expected `records`, `puzzles` or `misc` in document".to_string(),
                ));
            }
        }
        _ => {
            return Err(Error::Load(
                "document must be an array or an object".to_string(),
            ))
        }
    };

    if raw.is_empty() {
        return Err(Error::Load("document contains no records".to_string()));
    }

    raw.into_iter().map(Record::try_from).collect()
}

fn raw_list(value: Value, category: Option<RecordCategory>) -> Result<Vec<RawRecord>> {
    let mut raw: Vec<RawRecord> = serde_json::from_value(value)?;
    if let Some(category) = category {
        for record in &mut raw {
            record.category = Some(category.as_str().to_string());
        }
    }
    Ok(raw)
}

pub fn save_json<T: Serialize + ?Sized>(value: &T, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    std::fs::write(path, json)?;
    Ok(())
}

/// Per-publication totals split by record category
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublicationStats {
    pub name: String,
    pub puzzles: usize,
    pub misc: usize,
    pub total: usize,
}

/// Publications sorted by total records, largest first
pub fn publication_stats(records: &[Record]) -> Vec<PublicationStats> {
    let mut by_name: HashMap<&str, (usize, usize)> = HashMap::new();
    for record in records {
        let counts = by_name.entry(record.publication()).or_default();
        match record.category() {
            RecordCategory::Puzzle => counts.0 += 1,
            RecordCategory::Misc => counts.1 += 1,
        }
    }

    let mut stats: Vec<PublicationStats> = by_name
        .into_iter()
        .map(|(name, (puzzles, misc))| PublicationStats {
            name: name.to_string(),
            puzzles,
            misc,
            total: puzzles + misc,
        })
        .collect();
    stats.sort_by(|a, b| b.total.cmp(&a.total).then_with(|| a.name.cmp(&b.name)));
    stats
}
