mod config;
mod db;
mod error;
mod fetch;
mod index;
mod ingest;
mod parser;
mod record;
mod runner;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};

use crate::config::AppConfig;
use crate::db::{EventFilter, Store};
use crate::fetch::{HttpClient, PageSource};
use crate::ingest::{IngestSettings, Ingestor};
use crate::record::EventRecord;
use crate::runner::RunResult;

#[derive(Parser)]
#[command(name = "quake_scraper", about = "PHIVOLCS earthquake bulletin scraper")]
struct Cli {
    /// SQLite database path (overrides QUAKE_DB_PATH / quake.toml)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the event tables
    Init,
    /// Ingest every event linked from the bulletin index
    Run,
    /// Fetch and parse a single event page
    Scrape {
        url: String,
        /// Upsert the parsed record as well
        #[arg(long)]
        save: bool,
    },
    /// Parse saved event pages into a bulk-load JSON file
    Extract {
        #[arg(required = true)]
        files: Vec<PathBuf>,
        #[arg(short, long, default_value = "events.json")]
        output: PathBuf,
    },
    /// Load a JSON array of event records, keeping the newest bulletin per event
    BulkLoad { file: PathBuf },
    /// Filtered event listing (defaults to the current month)
    Query {
        #[arg(long)]
        from: Option<NaiveDate>,
        #[arg(long)]
        to: Option<NaiveDate>,
        #[arg(long)]
        min_mag: Option<f64>,
        #[arg(long)]
        max_mag: Option<f64>,
        /// Region code or name, e.g. "Region XIII" or "NCR"
        #[arg(long)]
        region: Option<String>,
        /// Substring of the origin, e.g. "tectonic"
        #[arg(long)]
        origin: Option<String>,
        #[arg(long, allow_hyphen_values = true)]
        lat_min: Option<f64>,
        #[arg(long, allow_hyphen_values = true)]
        lat_max: Option<f64>,
        #[arg(long, allow_hyphen_values = true)]
        lon_min: Option<f64>,
        #[arg(long, allow_hyphen_values = true)]
        lon_max: Option<f64>,
        /// Print the full result as JSON
        #[arg(long)]
        json: bool,
        /// Max rows to display
        #[arg(short = 'n', long, default_value = "50")]
        limit: usize,
    },
    /// Show store statistics and date coverage
    Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();
    let db_override = cli.db.as_deref();

    let result = match cli.command {
        Commands::Init => {
            let store = open_store(db_override)?;
            println!("Schema ready at {}", store.path().display());
            Ok(())
        }
        Commands::Run => {
            let cfg = AppConfig::load(db_override)?;
            let store = Store::new(&cfg.db_path);
            store.init_schema()?;
            store.ping()?;
            let client = Arc::new(HttpClient::new(&cfg)?);
            let worker = runner::spawn(Ingestor::new(client, store, IngestSettings::from(&cfg)));

            println!("Ingesting from {} ...", cfg.base_url);
            let outcome = worker.trigger()?.wait().await?;
            if let Some(line) = worker.status().progress {
                println!("{}", line);
            }
            match outcome {
                RunResult::Completed(s) => {
                    println!(
                        "Done: {} events ({} successful, {} skipped, {} failed) in {:.1}s",
                        s.total, s.successful, s.skipped, s.failed, s.elapsed_secs
                    );
                    Ok(())
                }
                RunResult::Aborted(reason) => Err(anyhow::anyhow!("Run aborted: {}", reason)),
            }
        }
        Commands::Scrape { url, save } => {
            let cfg = AppConfig::load(db_override)?;
            let client = HttpClient::new(&cfg)?;
            let html = client.fetch(&url).await?;
            let record = parser::parse_event_page(&html);
            println!("{}", serde_json::to_string_pretty(&record)?);

            let key = match record.business_key() {
                Ok(key) => key,
                Err(e) => {
                    println!("\nNo business key: {}", e);
                    return Ok(());
                }
            };
            println!("\nBusiness key: {}", key);
            if save {
                let store = Store::new(&cfg.db_path);
                store.init_schema()?;
                println!("Upsert: {:?}", store.upsert(&record));
                if let Some(stored) = store.fetch_event(&key)? {
                    println!(
                        "Stored EQ #{} (row {}, updated {})",
                        stored.record.sequence_number.unwrap_or_default(),
                        stored.id,
                        stored.updated_at
                    );
                }
            }
            Ok(())
        }
        Commands::Extract { files, output } => {
            println!("Extracting {} pages...", files.len());
            let (records, unreadable) = extract_files(&files);
            let valid = records.iter().filter(|r| r.is_valid()).count();
            let json = serde_json::to_string_pretty(&records)?;
            std::fs::write(&output, json)
                .with_context(|| format!("Failed to write {}", output.display()))?;
            println!(
                "Wrote {} records to {} ({} valid, {} unreadable files)",
                records.len(),
                output.display(),
                valid,
                unreadable
            );
            Ok(())
        }
        Commands::BulkLoad { file } => {
            let store = open_store(db_override)?;
            let raw = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let records: Vec<EventRecord> = serde_json::from_str(&raw)
                .with_context(|| format!("{} is not a JSON array of event records", file.display()))?;

            let r = store.bulk_load(records);
            println!("Loaded:      {}", r.total_loaded);
            println!("Duplicates:  {}", r.duplicates_removed);
            println!("No key:      {}", r.failed_business_keys);
            println!("Unique:      {}", r.processed_successfully);
            println!("Written:     {}", r.successful_inserts);
            println!("Skipped:     {}", r.skipped);
            println!("Failed:      {}", r.failed_inserts);
            Ok(())
        }
        Commands::Query {
            from,
            to,
            min_mag,
            max_mag,
            region,
            origin,
            lat_min,
            lat_max,
            lon_min,
            lon_max,
            json,
            limit,
        } => {
            let store = open_store(db_override)?;
            let filter = EventFilter {
                date_from: from,
                date_to: to,
                magnitude_min: min_mag,
                magnitude_max: max_mag,
                region,
                origin,
                lat_min,
                lat_max,
                lon_min,
                lon_max,
            };
            let result = store.query(&filter)?;

            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
                return Ok(());
            }
            if let Some(reason) = &result.override_reason {
                println!("{}", reason);
            }
            if result.events.is_empty() {
                println!("No earthquakes found ({}).", result.filter_description);
                return Ok(());
            }

            println!(
                "{:>3} | {:<16} | {:<8} | {:>5} | {:<9} | {:<10} | {:<32} | {:>4}",
                "#", "Date/Time", "Mag", "Depth", "Lat", "Lon", "Region", "Int"
            );
            println!("{}", "-".repeat(106));

            for (i, e) in result.events.iter().take(limit).enumerate() {
                let when = e
                    .occurred_at
                    .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                    .unwrap_or_else(|| "-".into());
                let intensity = e.max_reported_intensity.as_deref().unwrap_or("-");
                println!(
                    "{:>3} | {:<16} | {:<8} | {:>5} | {:<9} | {:<10} | {:<32} | {:>4}",
                    i + 1,
                    when,
                    truncate(&e.magnitude_str, 8),
                    e.depth_str,
                    e.latitude_str,
                    e.longitude_str,
                    truncate(&e.region, 32),
                    intensity
                );
            }

            println!(
                "\n{} earthquakes | {}",
                result.total_count, result.filter_description
            );
            Ok(())
        }
        Commands::Stats => {
            let store = open_store(db_override)?;
            let s = store.stats()?;
            let coverage = store.date_coverage()?;
            let date_or_dash =
                |d: Option<NaiveDate>| d.map(|d| d.to_string()).unwrap_or_else(|| "-".into());

            println!("Events:          {}", s.total_events);
            println!("This month:      {}", s.events_this_month);
            println!("With coords:     {}", s.with_coordinates);
            println!("With intensity:  {}", s.with_intensities);
            println!("Intensities:     {}", s.total_intensities);
            println!(
                "Coverage:        {} to {} ({} days with events)",
                date_or_dash(coverage.min),
                date_or_dash(coverage.max),
                coverage.dates.len()
            );
            if let Some(latest) = &s.latest_event {
                println!(
                    "Latest:          EQ #{} {} {} {}",
                    latest.sequence_number,
                    latest.occurred_at.format("%Y-%m-%d %H:%M"),
                    latest.magnitude_str,
                    truncate(&latest.region, 48)
                );
            }
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

fn open_store(db_override: Option<&Path>) -> anyhow::Result<Store> {
    let cfg = AppConfig::load(db_override)?;
    let store = Store::new(&cfg.db_path);
    store.init_schema()?;
    Ok(store)
}

/// Parse saved pages in parallel; unreadable files are counted and skipped.
fn extract_files(files: &[PathBuf]) -> (Vec<EventRecord>, usize) {
    use indicatif::{ProgressBar, ProgressStyle};
    use rayon::prelude::*;

    let pb = ProgressBar::new(files.len() as u64);
    if let Ok(style) = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec})")
    {
        pb.set_style(style.progress_chars("#>-"));
    }

    let mut records = Vec::with_capacity(files.len());
    let mut unreadable = 0usize;

    for chunk in files.chunks(500) {
        let results: Vec<_> = chunk
            .par_iter()
            .map(|path| {
                std::fs::read_to_string(path)
                    .map(|html| parser::parse_event_page(&html))
                    .map_err(|e| {
                        tracing::warn!("Failed to read {}: {}", path.display(), e);
                    })
            })
            .collect();

        for r in results {
            match r {
                Ok(record) => records.push(record),
                Err(()) => unreadable += 1,
            }
        }
        pb.inc(chunk.len() as u64);
    }

    pb.finish_and_clear();
    (records, unreadable)
}

/// Cut to `max` characters for table cells, marking the cut with `...`.
fn truncate(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((cut, _)) => format!("{}...", &s[..cut]),
        None => s.to_string(),
    }
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    let (h, m, s) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    match (h, m) {
        (0, 0) => format!("{:.1}s", d.as_secs_f64()),
        (0, _) => format!("{}m {}s", m, s),
        _ => format!("{}h {}m {}s", h, m, s),
    }
}
