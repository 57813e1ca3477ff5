use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Deserializer, Serialize};
use std::cmp::Ordering;

use crate::dates;
use crate::error::{Error, Result};

/// Puzzle sizes that get the "large" heatmap colorway
const LARGE_SIZES: &[&str] = &["full", "sunday"];

/// Kind of record, serialized as the `category` tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RecordCategory {
    Puzzle,
    Misc,
}

impl RecordCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            RecordCategory::Puzzle => "puzzle",
            RecordCategory::Misc => "misc",
        }
    }
}

/// Record fields a filter category can select on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordField {
    Publication,
    Size,
    Style,
    Collaborator,
}

/// A published puzzle
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PuzzleRecord {
    date: NaiveDate,
    pub publication: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
    /// Puzzle type, e.g. "themed" or "themeless"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collaborator: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub puz: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pdf: Option<String>,
}

impl PuzzleRecord {
    /// Create a puzzle record, normalizing `date` (ISO or `M/D/YYYY`)
    pub fn new(date: &str, publication: impl Into<String>) -> Result<Self> {
        Ok(Self {
            date: dates::parse_date(date)?,
            publication: publication.into(),
            size: None,
            style: None,
            collaborator: None,
            title: None,
            url: None,
            puz: None,
            pdf: None,
        })
    }

    pub fn with_size(mut self, size: impl Into<String>) -> Self {
        self.size = non_empty(size.into());
        self
    }

    pub fn with_style(mut self, style: impl Into<String>) -> Self {
        self.style = non_empty(style.into());
        self
    }

    pub fn with_collaborator(mut self, collaborator: impl Into<String>) -> Self {
        self.collaborator = non_empty(collaborator.into());
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = non_empty(title.into());
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = non_empty(url.into());
        self
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    fn is_large(&self) -> bool {
        self.size
            .as_deref()
            .is_some_and(|size| LARGE_SIZES.iter().any(|l| size.eq_ignore_ascii_case(l)))
    }
}

/// Anything that isn't a puzzle: articles, interviews, podcasts
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct MiscRecord {
    date: NaiveDate,
    pub publication: String,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub medium: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl MiscRecord {
    pub fn new(date: &str, publication: impl Into<String>) -> Result<Self> {
        Ok(Self {
            date: dates::parse_date(date)?,
            publication: publication.into(),
            medium: None,
            title: None,
            url: None,
        })
    }

    pub fn with_medium(mut self, medium: impl Into<String>) -> Self {
        self.medium = non_empty(medium.into());
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = non_empty(title.into());
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = non_empty(url.into());
        self
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }
}

/// One dated item of published content
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "category", rename_all = "lowercase", try_from = "RawRecord")]
pub enum Record {
    Puzzle(PuzzleRecord),
    Misc(MiscRecord),
}

impl Record {
    pub fn category(&self) -> RecordCategory {
        match self {
            Record::Puzzle(_) => RecordCategory::Puzzle,
            Record::Misc(_) => RecordCategory::Misc,
        }
    }

    pub fn date(&self) -> NaiveDate {
        match self {
            Record::Puzzle(p) => p.date,
            Record::Misc(m) => m.date,
        }
    }

    /// Normalized `YYYY-MM-DD` date
    pub fn iso_date(&self) -> String {
        dates::to_iso(self.date())
    }

    pub fn year(&self) -> i32 {
        self.date().year()
    }

    pub fn publication(&self) -> &str {
        match self {
            Record::Puzzle(p) => &p.publication,
            Record::Misc(m) => &m.publication,
        }
    }

    pub fn as_puzzle(&self) -> Option<&PuzzleRecord> {
        match self {
            Record::Puzzle(p) => Some(p),
            Record::Misc(_) => None,
        }
    }

    /// Value of a filterable field. Misc records only carry a publication.
    pub fn field(&self, field: RecordField) -> Option<&str> {
        let value = match (self, field) {
            (record, RecordField::Publication) => Some(record.publication()),
            (Record::Puzzle(p), RecordField::Size) => p.size.as_deref(),
            (Record::Puzzle(p), RecordField::Style) => p.style.as_deref(),
            (Record::Puzzle(p), RecordField::Collaborator) => p.collaborator.as_deref(),
            (Record::Misc(_), _) => None,
        };
        value.filter(|value| !value.is_empty())
    }

    /// Non-empty fields as `(name, value)` pairs, date excluded
    pub fn describe(&self) -> Vec<(&'static str, &str)> {
        let mut fields = vec![
            ("category", self.category().as_str()),
            ("publication", self.publication()),
        ];
        let optional: Vec<(&'static str, Option<&str>)> = match self {
            Record::Puzzle(p) => vec![
                ("title", p.title.as_deref()),
                ("size", p.size.as_deref()),
                ("type", p.style.as_deref()),
                ("collaborator", p.collaborator.as_deref()),
            ],
            Record::Misc(m) => vec![("title", m.title.as_deref()), ("type", m.medium.as_deref())],
        };
        fields.extend(
            optional
                .into_iter()
                .filter_map(|(name, value)| value.map(|v| (name, v))),
        );
        fields.retain(|(_, value)| !value.is_empty());
        fields
    }
}

impl From<PuzzleRecord> for Record {
    fn from(record: PuzzleRecord) -> Self {
        Record::Puzzle(record)
    }
}

impl From<MiscRecord> for Record {
    fn from(record: MiscRecord) -> Self {
        Record::Misc(record)
    }
}

/// Record as it appears in the JSON document, before date normalization.
///
/// Spreadsheet exports are loose: the date may live under `publish date`,
/// numeric cells arrive as numbers and blank cells as empty strings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawRecord {
    #[serde(alias = "publish date")]
    pub date: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub category: Option<String>,
    pub publication: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub size: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub style: Option<String>,
    /// Puzzle type for older puzzle rows, medium for misc rows
    #[serde(default, rename = "type", deserialize_with = "lenient_string")]
    pub kind: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub collaborator: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub url: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub puz: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub pdf: Option<String>,
}

impl TryFrom<RawRecord> for Record {
    type Error = Error;

    /// Rows tagged `misc` become [`MiscRecord`]s; everything else, including
    /// untagged rows, is a puzzle.
    fn try_from(raw: RawRecord) -> Result<Self> {
        let date = dates::parse_date(&raw.date)?;
        let is_misc = raw
            .category
            .as_deref()
            .is_some_and(|c| c.trim().eq_ignore_ascii_case("misc"));

        if is_misc {
            return Ok(Record::Misc(MiscRecord {
                date,
                publication: raw.publication,
                medium: raw.kind,
                title: raw.title,
                url: raw.url,
            }));
        }

        Ok(Record::Puzzle(PuzzleRecord {
            date,
            publication: raw.publication,
            size: raw.size,
            style: raw.style.or(raw.kind),
            collaborator: raw.collaborator,
            title: raw.title,
            url: raw.url,
            puz: raw.puz,
            pdf: raw.pdf,
        }))
    }
}

fn non_empty(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Accept strings, numbers and booleans; blank strings and null become `None`
fn lenient_string<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        None | Some(serde_json::Value::Null) => None,
        Some(serde_json::Value::String(s)) => non_empty(s),
        Some(other) => Some(other.to_string()),
    })
}

/// Heatmap color class of a day, a pure function of its records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Colorway {
    Empty,
    Misc,
    Puzzle,
    LargePuzzle,
}

impl Colorway {
    pub fn css_class(self) -> &'static str {
        match self {
            Colorway::Empty => "empty",
            Colorway::Misc => "misc",
            Colorway::Puzzle => "puzzle",
            Colorway::LargePuzzle => "large-puzzle",
        }
    }
}

/// One calendar day and the records published on it
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct DayCell {
    /// Day in `YYYY-MM-DD` format
    pub date: String,
    /// Records in input order
    pub records: Vec<Record>,
}

impl DayCell {
    pub fn empty(date: String) -> Self {
        Self {
            date,
            records: Vec::new(),
        }
    }

    pub fn has_records(&self) -> bool {
        !self.records.is_empty()
    }

    pub fn colorway(&self) -> Colorway {
        let puzzles = || self.records.iter().filter_map(Record::as_puzzle);
        if puzzles().any(PuzzleRecord::is_large) {
            Colorway::LargePuzzle
        } else if puzzles().next().is_some() {
            Colorway::Puzzle
        } else if self.has_records() {
            Colorway::Misc
        } else {
            Colorway::Empty
        }
    }

    /// Records in details-panel order: misc first, then by publication
    pub fn sorted_records(&self) -> Vec<&Record> {
        let mut sorted: Vec<&Record> = self.records.iter().collect();
        sorted.sort_by(|a, b| match (a.category(), b.category()) {
            (RecordCategory::Misc, RecordCategory::Puzzle) => Ordering::Less,
            (RecordCategory::Puzzle, RecordCategory::Misc) => Ordering::Greater,
            _ => a.publication().cmp(b.publication()),
        });
        sorted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn puzzle(date: &str, publication: &str) -> PuzzleRecord {
        PuzzleRecord::new(date, publication).unwrap()
    }

    fn misc(date: &str, publication: &str) -> MiscRecord {
        MiscRecord::new(date, publication).unwrap()
    }

    #[test]
    fn test_puzzle_record_normalizes_date() {
        let record = Record::from(puzzle("3/4/2024", "New York Times"));
        assert_eq!(record.iso_date(), "2024-03-04");
        assert_eq!(record.year(), 2024);
        assert_eq!(record.category(), RecordCategory::Puzzle);
    }

    #[test]
    fn test_record_rejects_bad_date() {
        let err = PuzzleRecord::new("March 4", "Vulture").unwrap_err();
        assert!(matches!(err, Error::DataFormat { .. }));
    }

    #[test]
    fn test_builder_drops_blank_values() {
        let record = puzzle("2024-03-04", "Vulture")
            .with_collaborator("  ")
            .with_size("mini");
        assert_eq!(record.collaborator, None);
        assert_eq!(record.size.as_deref(), Some("mini"));
    }

    #[test]
    fn test_field_mapping_for_puzzle() {
        let record = Record::from(
            puzzle("2024-03-04", "Vulture")
                .with_size("full")
                .with_style("themeless")
                .with_collaborator("Sam"),
        );
        assert_eq!(record.field(RecordField::Publication), Some("Vulture"));
        assert_eq!(record.field(RecordField::Size), Some("full"));
        assert_eq!(record.field(RecordField::Style), Some("themeless"));
        assert_eq!(record.field(RecordField::Collaborator), Some("Sam"));
    }

    #[test]
    fn test_misc_has_no_puzzle_fields() {
        let record = Record::from(misc("2024-03-04", "Slate").with_medium("interview"));
        assert_eq!(record.field(RecordField::Publication), Some("Slate"));
        assert_eq!(record.field(RecordField::Size), None);
        assert_eq!(record.field(RecordField::Style), None);
        assert_eq!(record.field(RecordField::Collaborator), None);
    }

    #[test]
    fn test_deserialize_untagged_row_is_puzzle() {
        let json = r#"{"publish date":"1/15/2025","publication":"Puzzmo","size":15,"type":"themed","collaborator":"","payment":100}"#;
        let record: Record = serde_json::from_str(json).unwrap();

        let puzzle = record.as_puzzle().unwrap();
        assert_eq!(record.iso_date(), "2025-01-15");
        assert_eq!(puzzle.size.as_deref(), Some("15"));
        assert_eq!(puzzle.style.as_deref(), Some("themed"));
        assert_eq!(puzzle.collaborator, None);
    }

    #[test]
    fn test_deserialize_misc_row() {
        let json = r#"{"date":"2025-01-20","category":"misc","publication":"Slate","type":"article","title":"On grids"}"#;
        let record: Record = serde_json::from_str(json).unwrap();

        match record {
            Record::Misc(m) => {
                assert_eq!(m.medium.as_deref(), Some("article"));
                assert_eq!(m.title.as_deref(), Some("On grids"));
            }
            Record::Puzzle(_) => panic!("expected misc record"),
        }
    }

    #[test]
    fn test_deserialize_bad_date_fails() {
        let json = r#"{"date":"20.01.2025","publication":"Slate"}"#;
        let result: std::result::Result<Record, _> = serde_json::from_str(json);
        let err = result.unwrap_err();
        assert!(err.to_string().contains("unrecognized date"));
    }

    #[test]
    fn test_serialization_roundtrip() {
        let original = Record::from(
            puzzle("2024-03-04", "Vulture")
                .with_style("themed")
                .with_title("Cross Words"),
        );
        let json = serde_json::to_string(&original).unwrap();
        assert!(json.contains("\"category\":\"puzzle\""));
        assert!(json.contains("\"date\":\"2024-03-04\""));

        let back: Record = serde_json::from_str(&json).unwrap();
        assert_eq!(original, back);

        let misc_original = Record::from(misc("2024-03-05", "Slate").with_medium("podcast"));
        let misc_json = serde_json::to_string(&misc_original).unwrap();
        let misc_back: Record = serde_json::from_str(&misc_json).unwrap();
        assert_eq!(misc_original, misc_back);
    }

    #[test]
    fn test_describe_skips_missing_fields() {
        let record = Record::from(puzzle("2024-03-04", "Vulture").with_size("mini"));
        assert_eq!(
            record.describe(),
            vec![
                ("category", "puzzle"),
                ("publication", "Vulture"),
                ("size", "mini")
            ]
        );
    }

    // ========== DayCell tests ==========

    #[test]
    fn test_colorway_priority() {
        let mut day = DayCell::empty("2024-03-04".to_string());
        assert_eq!(day.colorway(), Colorway::Empty);

        day.records.push(misc("2024-03-04", "Slate").into());
        assert_eq!(day.colorway(), Colorway::Misc);

        day.records.push(puzzle("2024-03-04", "Vulture").with_size("mini").into());
        assert_eq!(day.colorway(), Colorway::Puzzle);

        day.records.push(puzzle("2024-03-04", "NYT").with_size("Sunday").into());
        assert_eq!(day.colorway(), Colorway::LargePuzzle);
    }

    #[test]
    fn test_sorted_records_misc_first_then_publication() {
        let day = DayCell {
            date: "2024-03-04".to_string(),
            records: vec![
                puzzle("2024-03-04", "Vulture").into(),
                misc("2024-03-04", "Slate").into(),
                puzzle("2024-03-04", "Atlantic").into(),
            ],
        };

        let order: Vec<&str> = day.sorted_records().iter().map(|r| r.publication()).collect();
        assert_eq!(order, vec!["Slate", "Atlantic", "Vulture"]);
    }
}
