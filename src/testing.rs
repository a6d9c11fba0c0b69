use chrono::Utc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::client::BackendClient;
use crate::config::ClientConfig;
use crate::dispatch::{self, Dispatched};
use crate::enrichment::{self, AnalysisFetch, EnrichmentHandle};
use crate::error::PerfError;
use crate::health::{self, HealthProberHandle};
use crate::history::ExecutionHistory;
use crate::models::{
    AiAnalysis, AnalysisRequestAck, ExecutionRecord, HealthStatus, HistoryRecord, TestRunConfig,
};
use crate::normalize::{decode_ai_analysis, extract_run_id, normalize};
use crate::state::{DebugInfo, RunPhase, SharedState, TestingState};
use crate::store::SharedStore;

/// Entry point for callers: runs tests, probes health and exposes the
/// observable execution/debug state.
pub struct PerfTesting {
    client: BackendClient,
    state: SharedState,
    history: ExecutionHistory,
}

impl PerfTesting {
    pub fn new(config: ClientConfig, store: SharedStore) -> Result<Self, PerfError> {
        let history = ExecutionHistory::new(store.clone(), config.history_capacity);
        let client = BackendClient::new(config, store)?;
        Ok(Self {
            client,
            state: TestingState::shared(),
            history,
        })
    }

    pub fn client(&self) -> &BackendClient {
        &self.client
    }

    pub fn state(&self) -> &SharedState {
        &self.state
    }

    pub fn is_executing(&self) -> bool {
        self.state.is_executing()
    }

    pub fn subscribe_executing(&self) -> watch::Receiver<bool> {
        self.state.subscribe_executing()
    }

    pub fn debug_info(&self) -> Option<DebugInfo> {
        self.state.debug_info()
    }

    pub fn subscribe_debug(&self) -> watch::Receiver<Option<DebugInfo>> {
        self.state.subscribe_debug()
    }

    pub async fn check_health(&self) -> HealthStatus {
        let status = health::check_health(&self.client).await;
        self.state.record_health(status.clone());
        status
    }

    /// Start probing health on the configured interval.
    pub fn spawn_health_prober(&self) -> HealthProberHandle {
        self.spawn_health_prober_every(self.client.config().health_interval)
    }

    pub fn spawn_health_prober_every(&self, period: Duration) -> HealthProberHandle {
        health::spawn_health_prober(self.client.clone(), self.state.clone(), period)
    }

    /// Validate, dispatch and start enrichment for one run.
    ///
    /// Returns as soon as the backend summary is in; the returned
    /// [`Dispatched::enrichment`] keeps refining the view model in the
    /// background. Each call is an independent lifecycle.
    pub async fn execute_test(&self, config: &TestRunConfig) -> Result<Dispatched, PerfError> {
        config.validate()?;

        let _executing = self.state.begin_execution();
        self.state.clear_dispatch();

        let mut phase = RunPhase::Idle;
        phase.advance(RunPhase::Dispatching)?;

        let record = ExecutionRecord::start(config);
        let record_id = record.id.clone();
        if let Err(e) = self.history.record(record) {
            warn!("Failed to record execution {}: {}", record_id, e);
        }

        info!(
            "Starting performance test '{}' against {} ({} users, {}s)",
            config.test_name, config.url, config.concurrent_users, config.duration_seconds
        );

        let summary = match dispatch::submit(&self.client, &self.state, config).await {
            Ok(summary) => summary,
            Err(e) => {
                phase.advance(RunPhase::Failed)?;
                error!("Performance test error: {}", e);
                self.update_record(&record_id, |r| r.fail(e.to_string()));
                return Err(e);
            }
        };
        phase.advance(RunPhase::Dispatched)?;

        let mut view = normalize(&summary, None, None);
        let run_id = summary.as_object().and_then(extract_run_id);
        let enrichment = match run_id {
            Some(run_id) => {
                self.update_record(&record_id, |r| r.complete(&run_id));
                EnrichmentHandle::spawn(
                    self.client.clone(),
                    run_id,
                    summary,
                    view.clone(),
                    phase,
                )?
            }
            None => {
                view.run_id = format!("temp-{}", Utc::now().timestamp_millis());
                warn!("Backend returned no run_id; using {} and skipping enrichment", view.run_id);
                let temp_id = view.run_id.clone();
                self.update_record(&record_id, |r| r.complete(&temp_id));
                EnrichmentHandle::skipped(view.clone(), phase)?
            }
        };

        info!(
            "Performance test completed: avg response time {}ms with {} req/min throughput",
            view.metrics.page_load_time, view.metrics.network_requests
        );

        Ok(Dispatched { view, enrichment })
    }

    /// Re-fetch the AI analysis for a run. `Ok(None)` means the backend
    /// hasn't produced it yet.
    pub async fn fetch_ai_analysis(&self, run_id: &str) -> Result<Option<AiAnalysis>, PerfError> {
        match enrichment::fetch_ai_analysis(&self.client, run_id).await {
            AnalysisFetch::Ready(value) => decode_ai_analysis(&value).map(Some).ok_or_else(|| {
                PerfError::ResponseParse("AI analysis body is not an object".to_string())
            }),
            AnalysisFetch::NotReady => Ok(None),
            AnalysisFetch::Failed(reason) => Err(PerfError::EnrichmentUnavailable(reason)),
        }
    }

    /// Ask the backend to run the AI analysis again for an existing run.
    pub async fn request_ai_analysis(&self, run_id: &str) -> Result<AnalysisRequestAck, PerfError> {
        let body = serde_json::json!({ "run_id": run_id });
        let resp = self.client.post_json(&["request-ai-analysis"], &body).await?;
        let status = resp.status();
        if !status.is_success() {
            let bytes = resp.bytes().await?;
            let (detail, _) = dispatch::error_detail(status, &bytes);
            return Err(PerfError::TestExecution(detail));
        }
        resp.json::<AnalysisRequestAck>()
            .await
            .map_err(|e| PerfError::ResponseParse(e.to_string()))
    }

    pub async fn fetch_history(&self) -> Result<Vec<HistoryRecord>, PerfError> {
        let resp = self.client.get(&["performance-history"]).await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(PerfError::TestExecution(format!(
                "Failed to fetch history: {}",
                status.as_u16()
            )));
        }
        resp.json::<Vec<HistoryRecord>>()
            .await
            .map_err(|e| PerfError::ResponseParse(e.to_string()))
    }

    pub fn execution_history(&self) -> Vec<ExecutionRecord> {
        self.history.entries()
    }

    pub fn clear_execution_history(&self) -> Result<(), PerfError> {
        self.history.clear()
    }

    fn update_record<F>(&self, id: &str, f: F)
    where
        F: FnOnce(&mut ExecutionRecord),
    {
        if let Err(e) = self.history.update(id, f) {
            warn!("Failed to update execution {}: {}", id, e);
        }
    }
}
