use reqwest::StatusCode;
use serde_json::Value;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::client::BackendClient;
use crate::error::PerfError;
use crate::normalize::{normalize, ResultViewModel};
use crate::state::RunPhase;

/// Outcome of one `GET /ai-analysis/{run_id}`.
#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisFetch {
    Ready(Value),
    /// 404: the analysis pipeline hasn't finished yet.
    NotReady,
    Failed(String),
}

impl AnalysisFetch {
    pub fn value(&self) -> Option<&Value> {
        match self {
            AnalysisFetch::Ready(value) => Some(value),
            _ => None,
        }
    }
}

pub async fn fetch_run_details(client: &BackendClient, run_id: &str) -> Result<Value, PerfError> {
    let resp = client
        .get(&["run-details", run_id])
        .await
        .map_err(|e| PerfError::EnrichmentUnavailable(format!("run details: {}", e)))?;

    let status = resp.status();
    if !status.is_success() {
        return Err(PerfError::EnrichmentUnavailable(format!(
            "run details: {} {}",
            status.as_u16(),
            status.canonical_reason().unwrap_or("")
        )));
    }

    resp.json::<Value>()
        .await
        .map_err(|e| PerfError::EnrichmentUnavailable(format!("run details body: {}", e)))
}

pub async fn fetch_ai_analysis(client: &BackendClient, run_id: &str) -> AnalysisFetch {
    let resp = match client.get(&["ai-analysis", run_id]).await {
        Ok(resp) => resp,
        Err(e) => return AnalysisFetch::Failed(e.to_string()),
    };

    match resp.status() {
        StatusCode::NOT_FOUND => AnalysisFetch::NotReady,
        status if status.is_success() => match resp.json::<Value>().await {
            Ok(value) => AnalysisFetch::Ready(value),
            Err(e) => AnalysisFetch::Failed(format!("unparseable analysis: {}", e)),
        },
        status => AnalysisFetch::Failed(format!("status {}", status.as_u16())),
    }
}

async fn fetch_details_logged(client: &BackendClient, run_id: &str) -> Option<Value> {
    match fetch_run_details(client, run_id).await {
        Ok(details) => {
            debug!("Run details received for {}", run_id);
            Some(details)
        }
        Err(e) => {
            warn!("Could not fetch time series data for {}: {}", run_id, e);
            None
        }
    }
}

async fn fetch_analysis_logged(client: &BackendClient, run_id: &str) -> AnalysisFetch {
    let analysis = fetch_ai_analysis(client, run_id).await;
    match &analysis {
        AnalysisFetch::Ready(_) => info!("AI analysis available for {}", run_id),
        AnalysisFetch::NotReady => info!("AI analysis not available yet for {}", run_id),
        AnalysisFetch::Failed(reason) => warn!("AI analysis fetch failed for {}: {}", run_id, reason),
    }
    analysis
}

/// Background enrichment of one dispatched run: time series first, then the
/// AI analysis after the configured delay. Neither step can fail the run;
/// problems come back as absent data.
///
/// The task runs to completion whether or not anyone holds the handle;
/// dropping the handle only discards the results. Every step republishes
/// the full view model, so subscribers always see a consistent snapshot.
pub struct EnrichmentHandle {
    updates: watch::Receiver<ResultViewModel>,
    phase: watch::Receiver<RunPhase>,
    task: Option<JoinHandle<ResultViewModel>>,
}

impl EnrichmentHandle {
    /// Spawn enrichment for a run whose phase is `Dispatched`.
    pub fn spawn(
        client: BackendClient,
        run_id: String,
        summary: Value,
        initial: ResultViewModel,
        mut phase: RunPhase,
    ) -> Result<Self, PerfError> {
        phase.advance(RunPhase::Enriching)?;
        let (updates_tx, updates) = watch::channel(initial);
        let (phase_tx, phase_rx) = watch::channel(phase);
        let analysis_delay = client.config().analysis_delay;

        let task = tokio::spawn(async move {
            let details = fetch_details_logged(&client, &run_id).await;
            updates_tx.send_replace(normalize(&summary, details.as_ref(), None));

            sleep(analysis_delay).await;
            let analysis = fetch_analysis_logged(&client, &run_id).await;
            let view = normalize(&summary, details.as_ref(), analysis.value());
            updates_tx.send_replace(view.clone());

            phase_tx.send_modify(|p| {
                if let Err(e) = p.advance(RunPhase::Enriched) {
                    warn!("Enrichment for {}: {}", run_id, e);
                }
            });
            info!("Enrichment finished for {}", run_id);
            view
        });

        Ok(Self {
            updates,
            phase: phase_rx,
            task: Some(task),
        })
    }

    /// A handle with nothing to fetch, e.g. when the backend gave no run id.
    pub fn skipped(view: ResultViewModel, mut phase: RunPhase) -> Result<Self, PerfError> {
        phase.advance(RunPhase::Enriching)?;
        phase.advance(RunPhase::Enriched)?;
        let (_, updates) = watch::channel(view);
        let (_, phase_rx) = watch::channel(phase);
        Ok(Self {
            updates,
            phase: phase_rx,
            task: None,
        })
    }

    pub fn current(&self) -> ResultViewModel {
        self.updates.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ResultViewModel> {
        self.updates.clone()
    }

    pub fn phase(&self) -> RunPhase {
        *self.phase.borrow()
    }

    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, |t| t.is_finished())
    }

    /// Wait for enrichment to finish and return the final view model. If
    /// the task died, the last published snapshot is returned instead.
    pub async fn wait(mut self) -> ResultViewModel {
        match self.task.take() {
            Some(task) => match task.await {
                Ok(view) => view,
                Err(e) => {
                    warn!("Enrichment task ended abnormally: {}", e);
                    self.current()
                }
            },
            None => self.current(),
        }
    }
}
