use std::sync::Arc;
use std::time::{Duration, Instant};

use indicatif::{ProgressBar, ProgressStyle};
use reqwest::Url;
use serde::Serialize;
use tracing::{error, info, warn};

use crate::config::AppConfig;
use crate::db::{Store, UpsertOutcome};
use crate::error::RunAborted;
use crate::fetch::PageSource;
use crate::{index, parser};

/// Aggregate counts for one completed run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunStats {
    pub total: usize,
    pub successful: usize,
    pub skipped: usize,
    pub failed: usize,
    pub elapsed_secs: f64,
}

#[derive(Debug, Clone)]
pub struct IngestSettings {
    pub base_url: Url,
    pub request_delay: Duration,
    pub progress_every: usize,
}

impl From<&AppConfig> for IngestSettings {
    fn from(cfg: &AppConfig) -> Self {
        Self {
            base_url: cfg.base_url.clone(),
            request_delay: cfg.request_delay,
            progress_every: cfg.progress_every.max(1),
        }
    }
}

enum EventOutcome {
    Successful,
    Skipped,
    Failed,
}

/// Walks the bulletin index and pushes every event page through the store,
/// one page at a time.
pub struct Ingestor<S> {
    source: Arc<S>,
    store: Store,
    settings: IngestSettings,
}

impl<S: PageSource> Ingestor<S> {
    pub fn new(source: Arc<S>, store: Store, settings: IngestSettings) -> Self {
        Self {
            source,
            store,
            settings,
        }
    }

    pub async fn run<F>(&self, progress: F) -> Result<RunStats, RunAborted>
    where
        F: Fn(String) + Send + Sync,
    {
        let t0 = Instant::now();
        let index_url = self.settings.base_url.as_str();
        info!("Starting ingestion from {}", index_url);

        let html = self.source.fetch(index_url).await.map_err(|e| {
            error!("Failed to fetch index page: {}", e);
            RunAborted::IndexUnreachable(e.to_string())
        })?;

        let links = index::parse_index_page(&html);
        if links.is_empty() {
            error!("No event links found on {}", index_url);
            return Err(RunAborted::NoLinks);
        }

        let mut stats = RunStats {
            total: links.len(),
            ..Default::default()
        };
        info!("Processing {} earthquake events", stats.total);

        let pb = ProgressBar::new(links.len() as u64);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len} ({per_sec}, eta {eta})")
        {
            pb.set_style(style.progress_chars("=> "));
        }

        for (i, link) in links.iter().enumerate() {
            match self.ingest_one(link).await {
                EventOutcome::Successful => stats.successful += 1,
                EventOutcome::Skipped => stats.skipped += 1,
                EventOutcome::Failed => stats.failed += 1,
            }
            pb.inc(1);

            let done = i + 1;
            if done % self.settings.progress_every == 0 {
                let line = format!(
                    "Progress: {}/{} processed ({} successful, {} skipped, {} failed)",
                    done, stats.total, stats.successful, stats.skipped, stats.failed
                );
                info!("{}", line);
                progress(line);
            }

            if !self.settings.request_delay.is_zero() {
                tokio::time::sleep(self.settings.request_delay).await;
            }
        }

        pb.finish_and_clear();
        stats.elapsed_secs = t0.elapsed().as_secs_f64();
        info!(
            "Ingestion complete: {} successful, {} skipped, {} failed of {} in {:.1}s",
            stats.successful, stats.skipped, stats.failed, stats.total, stats.elapsed_secs
        );
        Ok(stats)
    }

    async fn ingest_one(&self, link: &str) -> EventOutcome {
        let url = match resolve(&self.settings.base_url, link) {
            Ok(url) => url,
            Err(e) => {
                warn!("Skipping unresolvable link {}: {}", link, e);
                return EventOutcome::Failed;
            }
        };

        let html = match self.source.fetch(url.as_str()).await {
            Ok(html) => html,
            Err(e) => {
                warn!("Failed to fetch {}: {}", url, e);
                return EventOutcome::Failed;
            }
        };

        let record = parser::parse_event_page(&html);
        if !record.is_valid() {
            warn!("Missing sequence number or date/time in {}", url);
            return EventOutcome::Failed;
        }

        match self.store.upsert(&record) {
            UpsertOutcome::Inserted | UpsertOutcome::Updated => EventOutcome::Successful,
            UpsertOutcome::Skipped => EventOutcome::Skipped,
            UpsertOutcome::Failed(_) => EventOutcome::Failed,
        }
    }
}

/// Index links use Windows separators; normalise before joining.
fn resolve(base: &Url, link: &str) -> anyhow::Result<Url> {
    Ok(base.join(&link.trim().replace('\\', "/"))?)
}
