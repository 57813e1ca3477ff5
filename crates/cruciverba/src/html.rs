use anyhow::Result;
use maud::{html, Markup, PreEscaped, DOCTYPE};
use std::fs;
use std::path::Path;

use crate::calendar::{grid_position, YearGrid, GRID_ROW_OFFSET, WEEKDAY_LABELS};
use crate::data::{publication_stats, Dataset, PublicationStats};
use crate::dates;
use crate::filter::{FilterCategory, FilterCounts, FilterEngine, FilterValue};
use crate::types::{DayCell, Record};

/// Generate a static HTML page with nothing filtered
pub fn generate_html(dataset: &Dataset, path: &Path) -> Result<()> {
    let html = render_page(dataset, &dataset.engine(), None);
    fs::write(path, html.into_string())?;
    Ok(())
}

/// Render the heatmap page for the given filter selection.
///
/// `selected` is the day shown in the details panel, if any.
pub fn render_page(dataset: &Dataset, engine: &FilterEngine, selected: Option<&DayCell>) -> Markup {
    let counts = engine.filter_counts(&dataset.records);
    let stats = publication_stats(&dataset.records);
    let pairs: Vec<(&str, &str)> = engine.pairs().collect();
    let shown_days = engine
        .included_days(&dataset.calendar)
        .filter(|day| day.has_records())
        .count();

    html! {
        (DOCTYPE)
        html lang="en" {
            head {
                meta charset="UTF-8";
                meta name="viewport" content="width=device-width, initial-scale=1.0";
                title { "Cruciverba" }
                style { (PreEscaped(CSS)) }
            }
            body {
                div.container {
                    h1 { "Cruciverba" }
                    div.stats {
                        span #"total-count" { (dataset.records.len()) }
                        " records"
                        @if engine.has_active_filters() {
                            " · "
                            span #"shown-count" { (shown_days) }
                            " days match"
                        }
                    }
                    (render_publication_stats(&stats))
                    (render_filters(dataset, engine, &counts))
                    div #"chart-container" {
                        @for grid in dataset.calendar.years_descending() {
                            (render_year(dataset, grid, engine, &pairs))
                        }
                    }
                    @if let Some(day) = selected {
                        (render_details(day, &pairs))
                    }
                }
            }
        }
    }
}

fn render_publication_stats(stats: &[PublicationStats]) -> Markup {
    html! {
        div.publication-stats {
            @for stat in stats {
                span.pub-stat title={ (stat.puzzles) " puzzles, " (stat.misc) " misc" } {
                    (stat.name) " (" (stat.total) ")"
                }
            }
        }
    }
}

fn render_filters(dataset: &Dataset, engine: &FilterEngine, counts: &FilterCounts) -> Markup {
    html! {
        form.filter-wrapper method="get" action="" {
            div.clear-all-container {
                a.clear-all-link href="?" { "Clear all filters" }
            }
            div.filter-controls {
                @for category in engine.categories() {
                    fieldset.filter-column {
                        legend { (category.label) }
                        div.dropdown-button id={ "dropdown-button-" (category.id) } {
                            (engine.summary(&category.id).unwrap_or_default())
                        }
                        div.dropdown-content {
                            @if category.include_any {
                                (render_option(
                                    category,
                                    &FilterValue::Any,
                                    &format!("Any {}", category.label.to_lowercase()),
                                    engine,
                                    counts,
                                ))
                            }
                            @for value in dataset.options.values(&category.id) {
                                (render_option(category, &FilterValue::value(value.as_str()), value, engine, counts))
                            }
                        }
                    }
                }
            }
            button.apply-button type="submit" { "Apply" }
        }
    }
}

fn render_option(
    category: &FilterCategory,
    value: &FilterValue,
    label: &str,
    engine: &FilterEngine,
    counts: &FilterCounts,
) -> Markup {
    let checked = engine.is_selected(&category.id, value);
    let count = counts.get(&category.id, value);
    let id = option_id(&category.id, value.as_str());

    html! {
        div.dropdown-option.disabled[count == 0 && !checked] {
            input type="checkbox" id=(id) name=(category.id) value=(value.as_str()) checked[checked];
            label for=(id) { (label) " (" (count) ")" }
        }
    }
}

/// Element id for a filter checkbox, e.g. `filter-publication-New-York-Times`
fn option_id(category: &str, value: &str) -> String {
    let slug: String = value
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("-")
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-')
        .collect();
    format!("filter-{category}-{slug}")
}

fn render_year(dataset: &Dataset, grid: &YearGrid, engine: &FilterEngine, pairs: &[(&str, &str)]) -> Markup {
    html! {
        div.year-section {
            h2 { (grid.year) }
            div.year-count { (grid.record_count()) " records" }
            div.publication-grid {
                @for (i, label) in WEEKDAY_LABELS.iter().enumerate() {
                    div.label-cell style={ "grid-row: " (i + GRID_ROW_OFFSET) "; grid-column: 1" } { (label) }
                }
                @for month in dataset.calendar.month_labels(grid.year) {
                    div.month-label style={ "grid-column: " (month.column) } { (month.name) }
                }
                @for (index, cell) in grid.cells.iter().enumerate() {
                    (render_cell(index, cell.as_ref(), engine, pairs))
                }
            }
        }
    }
}

fn render_cell(index: usize, cell: Option<&DayCell>, engine: &FilterEngine, pairs: &[(&str, &str)]) -> Markup {
    let (row, column) = grid_position(index);
    let style = format!("grid-row: {row}; grid-column: {column}");

    let Some(day) = cell else {
        return html! { div.placeholder-cell style=(style) {} };
    };

    let class = cell_class(day, !engine.day_passes(day));
    html! {
        @if day.has_records() {
            a class=(class) style=(style) href=(day_link(&day.date, pairs))
                title=(tooltip_text(day)) data-date=(day.date) data-record-count=(day.records.len()) {}
        } @else {
            div class=(class) style=(style) data-date=(day.date) {}
        }
    }
}

fn cell_class(day: &DayCell, filtered: bool) -> String {
    let mut class = String::from("date-cell");
    if day.has_records() {
        class.push_str(" publication-cell contains-data-cell");
    }
    class.push(' ');
    class.push_str(day.colorway().css_class());
    if filtered {
        class.push_str(" filtered");
    }
    class
}

/// Link that opens the details panel for `date` and keeps the filters
fn day_link(date: &str, pairs: &[(&str, &str)]) -> String {
    let mut query: Vec<(&str, &str)> = pairs.to_vec();
    query.push(("date", date));
    // String pairs always serialize
    let encoded = serde_urlencoded::to_string(&query).unwrap_or_default();
    format!("?{encoded}#{date}")
}

/// Link that closes the details panel and keeps the filters
fn close_link(pairs: &[(&str, &str)]) -> String {
    // String pairs always serialize
    let encoded = serde_urlencoded::to_string(pairs).unwrap_or_default();
    format!("?{encoded}")
}

/// Hover text: the date, then one line per record listing its fields
pub fn tooltip_text(day: &DayCell) -> String {
    let mut lines = vec![day.date.clone()];
    lines.extend(day.records.iter().map(|record| {
        record
            .describe()
            .iter()
            .map(|(name, value)| format!("{name}: {value}"))
            .collect::<Vec<_>>()
            .join(", ")
    }));
    lines.join("\n")
}

fn render_details(day: &DayCell, pairs: &[(&str, &str)]) -> Markup {
    let header = dates::parse_iso_strict(&day.date)
        .map(dates::format_long_date)
        .unwrap_or_else(|| day.date.clone());

    html! {
        div.details-panel.visible #"details-panel" {
            div.details-panel-header { (header) }
            div.details-panel-content {
                @if day.records.is_empty() {
                    p { "No content on this date." }
                } @else {
                    @for record in day.sorted_records() {
                        (render_record(record))
                    }
                }
            }
            a.close-link href=(close_link(pairs)) { "Close" }
        }
    }
}

fn render_record(record: &Record) -> Markup {
    match record {
        Record::Puzzle(puzzle) => {
            let title = puzzle.title.as_deref().unwrap_or("Untitled");
            let meta: Vec<&str> = [puzzle.size.as_deref(), puzzle.style.as_deref()]
                .into_iter()
                .flatten()
                .collect();

            html! {
                div.publication-item {
                    strong { (puzzle.publication) }
                    br;
                    @if let Some(url) = &puzzle.url {
                        a href=(url) target="_blank" { (title) }
                    } @else {
                        (title)
                    }
                    @if let Some(collaborator) = &puzzle.collaborator {
                        " with " (collaborator)
                    }
                    @if !meta.is_empty() {
                        div.publication-meta { em { (meta.join(", ")) } }
                    }
                    @if puzzle.puz.is_some() || puzzle.pdf.is_some() {
                        div.download-links {
                            "Download: "
                            @if let Some(puz) = &puzzle.puz {
                                a href=(puz) target="_blank" { "puz" } " "
                            }
                            @if let Some(pdf) = &puzzle.pdf {
                                a href=(pdf) target="_blank" { "pdf" }
                            }
                        }
                    }
                }
            }
        }
        Record::Misc(misc) => {
            let title = misc
                .title
                .as_deref()
                .or(misc.url.as_deref())
                .unwrap_or("Untitled");

            html! {
                div.publication-item.misc-item {
                    strong { (misc.publication) }
                    br;
                    @if let Some(url) = &misc.url {
                        a href=(url) target="_blank" { (title) }
                    } @else {
                        (title)
                    }
                    @if let Some(medium) = &misc.medium {
                        div.publication-meta { em { (medium) } }
                    }
                }
            }
        }
    }
}

const CSS: &str = r#"
* {
    margin: 0;
    padding: 0;
    box-sizing: border-box;
}

body {
    font-family: -apple-system, BlinkMacSystemFont, 'Helvetica Neue', sans-serif;
    background: #fdfbf7;
    color: #222;
    line-height: 1.4;
}

.container {
    max-width: 1100px;
    margin: 0 auto;
    padding: 40px 24px 60px;
}

h1 {
    font-size: 3em;
    font-weight: 900;
    letter-spacing: -0.02em;
    margin-bottom: 4px;
}

.stats {
    color: #777;
    font-size: 0.85em;
    text-transform: uppercase;
    letter-spacing: 0.08em;
    margin-bottom: 16px;
}

.publication-stats {
    display: flex;
    flex-wrap: wrap;
    gap: 6px;
    margin-bottom: 24px;
}

.pub-stat {
    font-size: 0.8em;
    padding: 2px 8px;
    border: 1px solid #ddd;
    border-radius: 10px;
}

.filter-controls {
    display: flex;
    flex-wrap: wrap;
    gap: 16px;
    margin: 12px 0;
}

.filter-column {
    border: 1px solid #ddd;
    padding: 8px 12px;
    min-width: 180px;
}

.dropdown-button {
    font-size: 0.8em;
    color: #555;
    margin-bottom: 6px;
}

.dropdown-content {
    max-height: 220px;
    overflow-y: auto;
}

.dropdown-option.disabled {
    opacity: 0.4;
}

.clear-all-link {
    font-size: 0.85em;
}

.year-section {
    margin-top: 32px;
}

.year-count {
    color: #888;
    font-size: 0.8em;
}

.publication-grid {
    display: grid;
    grid-template-rows: repeat(8, 14px);
    grid-auto-columns: 14px;
    gap: 3px;
    margin-top: 8px;
}

.label-cell,
.month-label {
    font-size: 10px;
    color: #888;
    grid-row: 1;
}

.date-cell {
    display: block;
    width: 14px;
    height: 14px;
    border-radius: 2px;
    background: #ebedf0;
}

.date-cell.misc { background: #f6c177; }
.date-cell.puzzle { background: #7fb3d5; }
.date-cell.large-puzzle { background: #1f618d; }

.date-cell.filtered {
    opacity: 0.15;
}

.details-panel {
    position: fixed;
    right: 24px;
    top: 24px;
    width: 300px;
    max-height: 80vh;
    overflow-y: auto;
    background: #fff;
    border: 1px solid #ccc;
    padding: 16px;
    box-shadow: 0 4px 16px rgba(0, 0, 0, 0.1);
}

.details-panel-header {
    font-weight: 700;
    margin-bottom: 12px;
}

.publication-item {
    margin-bottom: 12px;
}

.publication-meta {
    color: #666;
    font-size: 0.85em;
}

@media (max-width: 768px) {
    .details-panel {
        left: 0;
        right: 0;
        top: auto;
        bottom: 0;
        width: auto;
    }
}
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::{default_categories, ANY_FILTER_VALUE};
    use crate::types::{MiscRecord, PuzzleRecord};
    use chrono::NaiveDate;
    use tempfile::TempDir;

    fn dataset() -> Dataset {
        let records: Vec<Record> = vec![
            PuzzleRecord::new("2024-03-15", "New York Times")
                .unwrap()
                .with_size("full")
                .with_style("themed")
                .with_collaborator("Sam")
                .with_title("Cross Words")
                .with_url("https://example.com/cw")
                .into(),
            MiscRecord::new("2024-03-15", "Slate")
                .unwrap()
                .with_medium("interview")
                .with_title("On grids")
                .into(),
            PuzzleRecord::new("2024-03-20", "Vulture")
                .unwrap()
                .with_size("mini")
                .into(),
        ];
        Dataset::build(
            records,
            default_categories(),
            NaiveDate::from_ymd_opt(2024, 12, 31).unwrap(),
        )
    }

    #[test]
    fn test_render_page_basic_structure() {
        let dataset = dataset();
        let html = render_page(&dataset, &dataset.engine(), None).into_string();

        assert!(html.contains("<!DOCTYPE html>"));
        assert!(html.contains("<title>Cruciverba</title>"));
        assert!(html.contains(r#"<span id="total-count">3</span>"#));
        assert!(html.contains("<h2>2024</h2>"));
        assert!(html.contains(r#"<div class="year-count">3 records</div>"#));
        assert!(html.contains("placeholder-cell"));
        assert!(html.contains("large-puzzle"));
        assert!(!html.contains(r#"id="details-panel""#));
        assert!(!html.contains(" filtered"));
    }

    #[test]
    fn test_filter_options_show_counts() {
        let dataset = dataset();
        let html = render_page(&dataset, &dataset.engine(), None).into_string();

        assert!(html.contains("New York Times (1)"));
        assert!(html.contains("Any collaborator (1)"));
        assert!(html.contains(&format!(r#"value="{ANY_FILTER_VALUE}""#)));
        assert!(html.contains("Showing all"));
    }

    #[test]
    fn test_active_filter_marks_cells_and_options() {
        let dataset = dataset();
        let mut engine = dataset.engine();
        engine
            .add_filter("publication", FilterValue::value("Vulture"))
            .unwrap();

        let html = render_page(&dataset, &engine, None).into_string();

        assert!(html.contains(" filtered"));
        assert!(html.contains("Showing 1 publication"));
        assert!(html.contains(r#"<span id="shown-count">1</span>"#));
        // "full" only occurs on a New York Times puzzle, so it is disabled
        assert!(html.contains(r#"class="dropdown-option disabled""#));
        assert!(html.contains("checked"));
        // Day links keep the selection
        assert!(html.contains("publication=Vulture&amp;date=2024-03-20#2024-03-20"));
    }

    #[test]
    fn test_details_panel() {
        let dataset = dataset();
        let day = dataset.calendar.find_day(2024, "2024-03-15").unwrap();
        let html = render_page(&dataset, &dataset.engine(), Some(day)).into_string();

        assert!(html.contains(r#"id="details-panel""#));
        assert!(html.contains("Friday, March 15, 2024"));
        assert!(html.contains(r#"<a href="https://example.com/cw" target="_blank">Cross Words</a>"#));
        assert!(html.contains(" with Sam"));
        assert!(html.contains("full, themed"));
        // Misc records are listed first
        let slate = html.find("<strong>Slate</strong>").unwrap();
        let nyt = html.find("<strong>New York Times</strong>").unwrap();
        assert!(slate < nyt);
    }

    #[test]
    fn test_details_panel_empty_day() {
        let dataset = dataset();
        let day = dataset.calendar.find_day(2024, "2024-03-16").unwrap();
        let html = render_page(&dataset, &dataset.engine(), Some(day)).into_string();
        assert!(html.contains("No content on this date."));
    }

    #[test]
    fn test_tooltip_text() {
        let dataset = dataset();
        let day = dataset.calendar.find_day(2024, "2024-03-20").unwrap();
        assert_eq!(
            tooltip_text(day),
            "2024-03-20\ncategory: puzzle, publication: Vulture, size: mini"
        );
    }

    #[test]
    fn test_day_link_encodes_values() {
        let link = day_link("2024-03-15", &[("publication", "New York Times")]);
        assert_eq!(link, "?publication=New+York+Times&date=2024-03-15#2024-03-15");
        assert_eq!(close_link(&[]), "?");
    }

    #[test]
    fn test_option_id_slug() {
        assert_eq!(
            option_id("publication", "Matt Gaffney's Weekly"),
            "filter-publication-Matt-Gaffneys-Weekly"
        );
    }

    #[test]
    fn test_generate_html_writes_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("index.html");

        generate_html(&dataset(), &path).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("chart-container"));
    }
}
