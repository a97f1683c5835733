//! Single background worker that owns ingestion runs.
//!
//! Triggers claim the shared status before enqueueing, so at most one run is
//! ever queued or in flight. Status is published on a `watch` channel and
//! can be read at any time without blocking the worker.

use std::sync::Arc;

use chrono::{DateTime, Local};
use serde::Serialize;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{info, warn};

use crate::error::{RunAborted, TriggerError};
use crate::fetch::PageSource;
use crate::ingest::{Ingestor, RunStats};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum Phase {
    #[default]
    Idle,
    Queued,
    Running,
    Finished,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum RunResult {
    Completed(RunStats),
    Aborted(RunAborted),
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RunStatus {
    pub phase: Phase,
    pub last_run: Option<DateTime<Local>>,
    pub last_result: Option<RunResult>,
    pub progress: Option<String>,
}

type Request = oneshot::Sender<RunResult>;

pub struct Runner {
    status: Arc<watch::Sender<RunStatus>>,
    requests: mpsc::Sender<Request>,
}

/// Resolves once the triggered run has finished.
#[derive(Debug)]
pub struct RunHandle {
    reply: oneshot::Receiver<RunResult>,
}

impl RunHandle {
    pub async fn wait(self) -> Result<RunResult, TriggerError> {
        self.reply.await.map_err(|_| TriggerError::WorkerGone)
    }
}

/// Start the worker task. It lives until the returned [`Runner`] is dropped.
pub fn spawn<S>(ingestor: Ingestor<S>) -> Runner
where
    S: PageSource + 'static,
{
    let (status_tx, _) = watch::channel(RunStatus::default());
    let status = Arc::new(status_tx);
    let (requests, mut inbox) = mpsc::channel::<Request>(1);

    let worker_status = Arc::clone(&status);
    tokio::spawn(async move {
        while let Some(reply) = inbox.recv().await {
            worker_status.send_modify(|s| {
                s.phase = Phase::Running;
                s.last_run = Some(Local::now());
                s.progress = None;
            });
            info!("Ingestion run started");

            let progress_status = Arc::clone(&worker_status);
            let result = match ingestor
                .run(move |line| progress_status.send_modify(|s| s.progress = Some(line)))
                .await
            {
                Ok(stats) => RunResult::Completed(stats),
                Err(reason) => {
                    warn!("Ingestion run aborted: {}", reason);
                    RunResult::Aborted(reason)
                }
            };

            worker_status.send_modify(|s| {
                s.phase = Phase::Finished;
                s.last_result = Some(result.clone());
            });
            // The caller may have stopped waiting.
            let _ = reply.send(result);
        }
        info!("Run worker stopped");
    });

    Runner { status, requests }
}

impl Runner {
    /// Queue a run unless one is already queued or running.
    pub fn trigger(&self) -> Result<RunHandle, TriggerError> {
        let mut previous = Phase::Idle;
        let claimed = self.status.send_if_modified(|s| match s.phase {
            Phase::Idle | Phase::Finished => {
                previous = s.phase;
                s.phase = Phase::Queued;
                s.progress = None;
                true
            }
            Phase::Queued | Phase::Running => false,
        });
        if !claimed {
            return Err(TriggerError::AlreadyRunning);
        }

        let (reply, rx) = oneshot::channel();
        if self.requests.try_send(reply).is_err() {
            self.status.send_modify(|s| s.phase = previous);
            return Err(TriggerError::WorkerGone);
        }
        Ok(RunHandle { reply: rx })
    }

    pub fn status(&self) -> RunStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<RunStatus> {
        self.status.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use reqwest::Url;
    use tokio::sync::Notify;

    use crate::db::testing::temp_store;
    use crate::error::FetchError;
    use crate::ingest::IngestSettings;

    const BASE: &str = "http://bulletins.test/";

    /// Serves one event; the index request blocks until the gate opens.
    struct GatedSite {
        gate: Arc<Notify>,
        event: String,
    }

    impl PageSource for GatedSite {
        async fn fetch(&self, url: &str) -> Result<String, FetchError> {
            if url == BASE {
                self.gate.notified().await;
                return Ok(r#"<html><body><!-- enter new event below -->
                    <a href="2025_Earthquake_Information\August\2025_0803_0147_B2.html">a</a>
                    <!-- end of last event --></body></html>"#
                    .to_string());
            }
            if url.ends_with("2025_0803_0147_B2.html") {
                return Ok(self.event.clone());
            }
            Err(FetchError::Status {
                url: url.to_string(),
                status: 404,
            })
        }
    }

    struct DeadSite;

    impl PageSource for DeadSite {
        async fn fetch(&self, url: &str) -> Result<String, FetchError> {
            Err(FetchError::Status {
                url: url.to_string(),
                status: 503,
            })
        }
    }

    fn settings() -> IngestSettings {
        IngestSettings {
            base_url: Url::parse(BASE).unwrap(),
            request_delay: Duration::ZERO,
            progress_every: 1,
        }
    }

    async fn wait_for(runner: &Runner, phase: Phase) {
        let mut rx = runner.subscribe();
        rx.wait_for(|s| s.phase == phase).await.unwrap();
    }

    #[tokio::test]
    async fn second_trigger_conflicts_while_running() {
        let gate = Arc::new(Notify::new());
        let source = Arc::new(GatedSite {
            gate: Arc::clone(&gate),
            event: std::fs::read_to_string("tests/fixtures/event_markers.html").unwrap(),
        });
        let runner = spawn(Ingestor::new(source, temp_store(), settings()));
        assert_eq!(runner.status().phase, Phase::Idle);

        let handle = runner.trigger().unwrap();
        assert_eq!(runner.trigger().unwrap_err(), TriggerError::AlreadyRunning);

        wait_for(&runner, Phase::Running).await;
        assert!(runner.status().last_run.is_some());
        assert_eq!(runner.trigger().unwrap_err(), TriggerError::AlreadyRunning);

        gate.notify_one();
        let result = handle.wait().await.unwrap();
        match &result {
            RunResult::Completed(stats) => {
                assert_eq!(stats.total, 1);
                assert_eq!(stats.successful, 1);
            }
            other => panic!("expected a completed run, got {other:?}"),
        }

        let status = runner.status();
        assert_eq!(status.phase, Phase::Finished);
        assert_eq!(status.last_result, Some(result));
        assert!(status.progress.unwrap().starts_with("Progress: 1/1"));

        // Finished runs can be followed by another.
        let again = runner.trigger().unwrap();
        gate.notify_one();
        match again.wait().await.unwrap() {
            RunResult::Completed(stats) => assert_eq!(stats.skipped, 1),
            other => panic!("expected a completed run, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn aborted_run_is_retained_in_status() {
        let runner = spawn(Ingestor::new(Arc::new(DeadSite), temp_store(), settings()));
        let result = runner.trigger().unwrap().wait().await.unwrap();
        assert!(matches!(result, RunResult::Aborted(RunAborted::IndexUnreachable(_))));

        let status = runner.status();
        assert_eq!(status.phase, Phase::Finished);
        assert!(matches!(
            status.last_result,
            Some(RunResult::Aborted(RunAborted::IndexUnreachable(_)))
        ));
    }
}
