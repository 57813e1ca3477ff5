use anyhow::{Context, Result};
use chrono::Datelike;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::{fmt, EnvFilter};

use cruciverba::config::Settings;
use cruciverba::data::{self, Dataset};
use cruciverba::dates;
use cruciverba::filter::default_categories;
use cruciverba::{html, server};

#[derive(Parser, Debug)]
#[command(name = "cruciverba")]
#[command(about = "Turn a puzzle publication history into a filterable calendar heatmap")]
struct Args {
    #[command(subcommand)]
    command: Option<Commands>,

    /// JSON record document (overrides CRUCIVERBA_DATA)
    #[arg(short, long, global = true)]
    data: Option<PathBuf>,

    /// Output directory for generated files (overrides CRUCIVERBA_OUTPUT)
    #[arg(short, long, global = true)]
    output: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the web server (default)
    Serve {
        /// Port to listen on (overrides CRUCIVERBA_PORT)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Generate index.html and calendar.json (no server)
    Build,

    /// Show the records published on one day
    Day {
        /// YYYY-MM-DD or M/D/YYYY
        date: String,
    },

    /// Print faceted filter counts as JSON
    Counts {
        /// Active filter as category=value, repeatable
        #[arg(short, long = "filter", value_parser = parse_filter)]
        filters: Vec<(String, String)>,
    },
}

fn parse_filter(s: &str) -> std::result::Result<(String, String), String> {
    let (category, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected category=value, got {s:?}"))?;
    Ok((category.trim().to_string(), value.trim().to_string()))
}

fn init_tracing(log_level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level))
        .add_directive("hyper=warn".parse()?)
        .add_directive("tower_http=warn".parse()?);

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_max_level(Level::TRACE)
        .init();
    Ok(())
}

fn load_dataset(settings: &Settings) -> Result<Dataset> {
    Dataset::load(&settings.data_path, default_categories(), settings.today())
        .with_context(|| format!("failed to load {}", settings.data_path.display()))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_tracing(&args.log_level)?;

    let mut settings = Settings::from_env()?;
    if let Some(data) = args.data {
        settings.data_path = data;
    }
    if let Some(output) = args.output {
        settings.output_dir = output;
    }

    match args.command {
        // Default to serve if no command specified
        None => {
            server::serve(settings).await?;
        }
        Some(Commands::Serve { port }) => {
            if let Some(port) = port {
                settings.port = port;
            }
            server::serve(settings).await?;
        }
        Some(Commands::Build) => {
            let dataset = load_dataset(&settings)?;
            std::fs::create_dir_all(&settings.output_dir)?;

            let html_path = settings.output_dir.join("index.html");
            html::generate_html(&dataset, &html_path)?;
            info!(path = %html_path.display(), "HTML saved");

            let json_path = settings.output_dir.join("calendar.json");
            data::save_json(&dataset.calendar, &json_path)?;
            info!(path = %json_path.display(), "Calendar saved");
        }
        Some(Commands::Day { date }) => {
            let date = dates::parse_date(&date)?;
            let dataset = load_dataset(&settings)?;
            let iso = dates::to_iso(date);

            let Some(day) = dataset.calendar.find_day(date.year(), &iso) else {
                info!(date = %iso, "Day is outside the calendar");
                return Ok(());
            };

            info!(date = %dates::format_long_date(date), count = day.records.len(), "Records");
            for record in day.sorted_records() {
                let fields: Vec<String> = record
                    .describe()
                    .iter()
                    .map(|(name, value)| format!("{name}: {value}"))
                    .collect();
                info!("{}", fields.join(", "));
            }
        }
        Some(Commands::Counts { filters }) => {
            let dataset = load_dataset(&settings)?;
            let engine = dataset
                .engine_from_pairs(filters.iter().map(|(c, v)| (c.as_str(), v.as_str())))?;
            let counts = engine.filter_counts(&dataset.records);
            println!("{}", serde_json::to_string_pretty(&counts)?);
        }
    }

    Ok(())
}
