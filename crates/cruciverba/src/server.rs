use anyhow::Context;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Html,
    routing::get,
    Json, Router,
};
use chrono::Datelike;
use notify_debouncer_mini::{
    new_debouncer, notify::RecommendedWatcher, notify::RecursiveMode, DebounceEventResult,
    Debouncer,
};
use serde::Serialize;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, RwLock};
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

use crate::calendar::Calendar;
use crate::config::Settings;
use crate::data::Dataset;
use crate::dates;
use crate::filter::{default_categories, FilterCategory, FilterCounts, FilterEngine};
use crate::html;
use crate::types::{DayCell, Record};

/// Query key that selects the day shown in the details panel
const DATE_PARAM: &str = "date";

type ApiError = (StatusCode, String);

/// Application state shared across requests
pub struct AppState {
    dataset: RwLock<Arc<Dataset>>,
    /// Bumped every time a new dataset is swapped in
    generation: watch::Sender<u64>,
    pub settings: Settings,
}

impl AppState {
    pub fn new(dataset: Dataset, settings: Settings) -> Self {
        Self {
            dataset: RwLock::new(Arc::new(dataset)),
            generation: watch::Sender::new(0),
            settings,
        }
    }

    /// The current dataset. Requests keep their snapshot even if a reload
    /// swaps it out mid-request.
    ///
    /// When the date has moved on since the calendar was aggregated, the
    /// in-memory records are aggregated again against the new "today".
    pub async fn snapshot(&self) -> Arc<Dataset> {
        let today = self.settings.today();
        let current = self.dataset.read().await.clone();
        if current.calendar.as_of == today {
            return current;
        }

        let mut guard = self.dataset.write().await;
        // Another request may have rolled the calendar over already
        if guard.calendar.as_of != today {
            info!(from = %guard.calendar.as_of, to = %today, "Date changed, rebuilding calendar");
            let rebuilt = Arc::new(guard.as_of(today));
            *guard = rebuilt;
            self.generation.send_modify(|generation| *generation += 1);
        }
        guard.clone()
    }

    /// Receiver that changes whenever a new dataset is swapped in
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.generation.subscribe()
    }

    /// Rebuild the dataset from the data file and swap it in.
    ///
    /// On failure the previous dataset stays in place.
    pub async fn reload(&self) -> crate::Result<usize> {
        let categories = self.snapshot().await.categories.clone();
        let dataset = Dataset::load(&self.settings.data_path, categories, self.settings.today())?;
        let count = dataset.records.len();

        let mut current = self.dataset.write().await;
        let old_count = current.records.len();
        *current = Arc::new(dataset);
        drop(current);
        self.generation.send_modify(|generation| *generation += 1);

        if count != old_count {
            info!(
                records = count,
                delta = count as i64 - old_count as i64,
                "Dataset updated"
            );
        } else {
            info!(records = count, "Dataset reloaded, record count unchanged");
        }
        Ok(count)
    }
}

/// Start the web server with file watching
pub async fn serve(settings: Settings) -> anyhow::Result<()> {
    let dataset = Dataset::load(&settings.data_path, default_categories(), settings.today())
        .with_context(|| format!("failed to load {}", settings.data_path.display()))?;

    let port = settings.port;
    let state = Arc::new(AppState::new(dataset, settings));

    // Dropping the debouncer stops the watcher
    let _watcher = start_file_watcher(state.clone())?;

    let mut updates = state.subscribe();
    tokio::spawn(async move {
        while updates.changed().await.is_ok() {
            let generation = *updates.borrow_and_update();
            debug!(generation, "Serving new dataset");
        }
    });

    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    info!(url = %format!("http://{addr}"), "Server running");
    info!(path = %state.settings.data_path.display(), "Watching data file for changes");

    axum::serve(listener, app(state)).await?;

    Ok(())
}

pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/api/records", get(records_handler))
        .route("/api/calendar", get(calendar_handler))
        .route("/api/days/{date}", get(day_handler))
        .route("/api/counts", get(counts_handler))
        .route("/api/refresh", get(refresh_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Watch the data file's directory and reload when the data file changes
fn start_file_watcher(state: Arc<AppState>) -> anyhow::Result<Debouncer<RecommendedWatcher>> {
    let data_path = state.settings.data_path.clone();
    let watch_dir = match data_path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let file_name = data_path
        .file_name()
        .map(|name| name.to_os_string())
        .with_context(|| format!("{} is not a file path", data_path.display()))?;

    let (tx, mut rx) = tokio::sync::mpsc::channel(10);

    let mut debouncer = new_debouncer(
        Duration::from_secs(2),
        move |result: DebounceEventResult| match result {
            Ok(events) => {
                let touches_data = events
                    .iter()
                    .any(|e| e.path.file_name() == Some(file_name.as_os_str()));

                if touches_data {
                    let _ = tx.blocking_send(());
                }
            }
            Err(e) => warn!(error = %e, "File watcher error"),
        },
    )
    .context("failed to create file watcher")?;

    debouncer
        .watcher()
        .watch(&watch_dir, RecursiveMode::NonRecursive)
        .with_context(|| format!("failed to watch {}", watch_dir.display()))?;

    tokio::spawn(async move {
        while rx.recv().await.is_some() {
            info!("Detected changes in data file");
            if let Err(e) = state.reload().await {
                error!(error = %e, "Failed to refresh");
            }
        }
    });

    Ok(debouncer)
}

/// Split query pairs into the selected date and the filter pairs.
///
/// Keys that name no filter category (tracking parameters and the like) are
/// dropped.
fn split_query<'a>(
    params: &'a [(String, String)],
    categories: &[FilterCategory],
) -> (Option<&'a str>, Vec<(&'a str, &'a str)>) {
    let mut date = None;
    let mut filters = Vec::new();
    for (key, value) in params {
        if key == DATE_PARAM {
            date = Some(value.as_str());
        } else if categories.iter().any(|c| c.id == *key) {
            filters.push((key.as_str(), value.as_str()));
        } else {
            debug!(key = %key, "Ignoring unknown query parameter");
        }
    }
    (date, filters)
}

fn engine_for(dataset: &Dataset, filters: Vec<(&str, &str)>) -> Result<FilterEngine, ApiError> {
    dataset
        .engine_from_pairs(filters)
        .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))
}

/// Serve the heatmap page
async fn index_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<Vec<(String, String)>>,
) -> Result<Html<String>, ApiError> {
    let dataset = state.snapshot().await;
    let (date, filters) = split_query(&params, &dataset.categories);
    let engine = engine_for(&dataset, filters)?;

    let selected = date
        .and_then(dates::parse_iso_strict)
        .and_then(|d| dataset.calendar.find_day(d.year(), &dates::to_iso(d)));

    let markup = html::render_page(&dataset, &engine, selected);
    Ok(Html(markup.into_string()))
}

async fn records_handler(State(state): State<Arc<AppState>>) -> Json<Vec<Record>> {
    let dataset = state.snapshot().await;
    Json(dataset.records.clone())
}

async fn calendar_handler(State(state): State<Arc<AppState>>) -> Json<Calendar> {
    let dataset = state.snapshot().await;
    Json(dataset.calendar.clone())
}

async fn day_handler(
    State(state): State<Arc<AppState>>,
    Path(date): Path<String>,
) -> Result<Json<DayCell>, ApiError> {
    let dataset = state.snapshot().await;
    let not_found = || (StatusCode::NOT_FOUND, format!("no day {date}"));

    let parsed = dates::parse_iso_strict(&date).ok_or_else(not_found)?;
    let day = dataset
        .calendar
        .find_day(parsed.year(), &date)
        .ok_or_else(not_found)?;
    Ok(Json(day.clone()))
}

#[derive(Debug, Serialize)]
struct CountsResponse {
    counts: FilterCounts,
    included: Vec<String>,
}

async fn counts_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<Vec<(String, String)>>,
) -> Result<Json<CountsResponse>, ApiError> {
    let dataset = state.snapshot().await;
    let (_, filters) = split_query(&params, &dataset.categories);
    let engine = engine_for(&dataset, filters)?;

    let included = engine
        .included_days(&dataset.calendar)
        .filter(|day| day.has_records())
        .map(|day| day.date.clone())
        .collect();

    Ok(Json(CountsResponse {
        counts: engine.filter_counts(&dataset.records),
        included,
    }))
}

/// Refresh data from disk (manual trigger)
async fn refresh_handler(State(state): State<Arc<AppState>>) -> Result<String, ApiError> {
    info!("Manual refresh triggered");

    match state.reload().await {
        Ok(count) => Ok(format!("OK: {count} records")),
        Err(e) => {
            error!(error = %e, "Refresh failed");
            Err((StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{MiscRecord, PuzzleRecord};
    use axum::body::Body;
    use axum::http::Request;
    use chrono::NaiveDate;
    use http_body_util::BodyExt;
    use tempfile::TempDir;
    use tower::ServiceExt;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 12, 31).unwrap()
    }

    fn records() -> Vec<Record> {
        vec![
            PuzzleRecord::new("2024-03-15", "New York Times")
                .unwrap()
                .with_size("full")
                .with_collaborator("Sam")
                .into(),
            MiscRecord::new("2024-03-15", "Slate").unwrap().into(),
            PuzzleRecord::new("2024-03-20", "Vulture")
                .unwrap()
                .with_size("mini")
                .into(),
        ]
    }

    fn test_state(data_path: PathBuf) -> Arc<AppState> {
        let settings = Settings {
            data_path,
            today: Some(today()),
            ..Settings::default()
        };
        let dataset = Dataset::build(records(), default_categories(), today());
        Arc::new(AppState::new(dataset, settings))
    }

    async fn request(state: Arc<AppState>, uri: &str) -> (StatusCode, String) {
        let response = app(state)
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    // ========== split_query tests ==========

    #[test]
    fn test_split_query() {
        let params = vec![
            ("publication".to_string(), "Vulture".to_string()),
            ("date".to_string(), "2024-03-20".to_string()),
            ("utm_source".to_string(), "newsletter".to_string()),
            ("size".to_string(), "mini".to_string()),
        ];
        let (date, filters) = split_query(&params, &default_categories());
        assert_eq!(date, Some("2024-03-20"));
        assert_eq!(filters, vec![("publication", "Vulture"), ("size", "mini")]);
    }

    // ========== route tests ==========

    #[tokio::test]
    async fn test_index_renders_page() {
        let (status, body) = request(test_state(PathBuf::from("unused.json")), "/").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("<h2>2024</h2>"));
        assert!(!body.contains(r#"id="details-panel""#));
    }

    #[tokio::test]
    async fn test_index_with_filters_and_date() {
        let (status, body) = request(
            test_state(PathBuf::from("unused.json")),
            "/?publication=New+York+Times&date=2024-03-15",
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("Friday, March 15, 2024"));
        assert!(body.contains("Showing 1 publication"));
    }

    #[tokio::test]
    async fn test_index_ignores_unknown_query_keys() {
        let (status, body) = request(
            test_state(PathBuf::from("unused.json")),
            "/?utm_source=newsletter&fbclid=abc&publication=Vulture",
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("Showing 1 publication"));
        // Day links only carry the recognized filters
        assert!(body.contains("publication=Vulture&amp;date=2024-03-20#2024-03-20"));
        assert!(!body.contains("utm_source"));
    }

    #[tokio::test]
    async fn test_any_on_category_without_any_is_bad_request() {
        let (status, body) = request(
            test_state(PathBuf::from("unused.json")),
            "/?publication=__ANY__",
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body.contains("publication"));

        let (status, _) = request(
            test_state(PathBuf::from("unused.json")),
            "/api/counts?size=__ANY__",
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_counts_ignores_unknown_query_keys() {
        let (status, body) = request(
            test_state(PathBuf::from("unused.json")),
            "/api/counts?ref=home",
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["included"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_snapshot_rolls_calendar_over_to_new_day() {
        let settings = Settings {
            data_path: PathBuf::from("unused.json"),
            today: Some(NaiveDate::from_ymd_opt(2025, 1, 2).unwrap()),
            ..Settings::default()
        };
        let dataset = Dataset::build(records(), default_categories(), today());
        let state = Arc::new(AppState::new(dataset, settings));
        let mut updates = state.subscribe();

        let (status, body) = request(state.clone(), "/api/calendar").await;
        assert_eq!(status, StatusCode::OK);
        let calendar: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(calendar["as_of"], "2025-01-02");

        let dataset = state.snapshot().await;
        assert_eq!(dataset.calendar.year(2025).unwrap().days().count(), 2);
        assert_eq!(dataset.records.len(), 3);

        // One rebuild, not one per request
        assert!(updates.has_changed().unwrap());
        assert_eq!(*updates.borrow_and_update(), 1);
        let _ = state.snapshot().await;
        assert!(!updates.has_changed().unwrap());
    }

    #[tokio::test]
    async fn test_day_endpoint() {
        let state = test_state(PathBuf::from("unused.json"));

        let (status, body) = request(state.clone(), "/api/days/2024-03-15").await;
        assert_eq!(status, StatusCode::OK);
        let day: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(day["date"], "2024-03-15");
        assert_eq!(day["records"].as_array().unwrap().len(), 2);

        let (status, _) = request(state.clone(), "/api/days/2024-02-30").await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = request(state, "/api/days/2019-01-01").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_counts_endpoint() {
        let (status, body) = request(
            test_state(PathBuf::from("unused.json")),
            "/api/counts?size=mini",
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["included"], serde_json::json!(["2024-03-20"]));
        assert_eq!(json["counts"]["publication"]["Vulture"], 1);
        assert_eq!(json["counts"]["publication"]["New York Times"], 0);
        // Own category is not narrowed by its own selection
        assert_eq!(json["counts"]["size"]["full"], 1);
    }

    #[tokio::test]
    async fn test_records_and_calendar_endpoints() {
        let state = test_state(PathBuf::from("unused.json"));

        let (status, body) = request(state.clone(), "/api/records").await;
        assert_eq!(status, StatusCode::OK);
        let records: Vec<Record> = serde_json::from_str(&body).unwrap();
        assert_eq!(records.len(), 3);

        let (status, body) = request(state, "/api/calendar").await;
        assert_eq!(status, StatusCode::OK);
        let calendar: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(calendar["as_of"], "2024-12-31");
    }

    #[tokio::test]
    async fn test_refresh_reloads_data_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("data.json");
        std::fs::write(
            &path,
            r#"[{"date": "2024-05-01", "publication": "Puzzmo"}]"#,
        )
        .unwrap();
        let state = test_state(path);
        let mut updates = state.subscribe();

        let (status, body) = request(state.clone(), "/api/refresh").await;
        assert_eq!(status, StatusCode::OK);
        assert!(updates.has_changed().unwrap());
        assert_eq!(*updates.borrow_and_update(), 1);
        assert_eq!(body, "OK: 1 records");

        let dataset = state.snapshot().await;
        assert_eq!(dataset.records.len(), 1);
        assert_eq!(dataset.records[0].publication(), "Puzzmo");
    }

    #[tokio::test]
    async fn test_refresh_failure_keeps_dataset() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("data.json");
        std::fs::write(&path, r#"[{"date": "someday", "publication": "Puzzmo"}]"#).unwrap();
        let state = test_state(path);
        let updates = state.subscribe();

        let (status, body) = request(state.clone(), "/api/refresh").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!updates.has_changed().unwrap());
        assert!(body.contains("someday"));
        assert_eq!(state.snapshot().await.records.len(), 3);
    }
}
