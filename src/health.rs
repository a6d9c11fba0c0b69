use std::sync::Arc;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::client::BackendClient;
use crate::models::HealthStatus;
use crate::state::SharedState;

/// Shortest period the recurring prober accepts; `interval` rejects zero.
pub const MIN_PROBE_PERIOD: Duration = Duration::from_millis(100);

/// Probe `GET /health` once. Never fails: an unreachable or misbehaving
/// backend yields [`HealthStatus::unavailable`] with the reason in `error`.
pub async fn check_health(client: &BackendClient) -> HealthStatus {
    match probe(client).await {
        Ok(status) => {
            debug!(
                "Health: status={}, java={}, engine_available={}, engine_running={}",
                status.status,
                status.java_installed,
                status.engine_available(),
                status.engine_running()
            );
            status
        }
        Err(reason) => {
            warn!("Health check failed: {}", reason);
            HealthStatus::unavailable(reason)
        }
    }
}

async fn probe(client: &BackendClient) -> Result<HealthStatus, String> {
    let timeout = client.config().health_timeout;
    let resp = client
        .get_with_timeout(&["health"], timeout)
        .await
        .map_err(|e| format!("Failed to connect to server: {}", e))?;

    if !resp.status().is_success() {
        return Err(format!("Failed to check server health: {}", resp.status().as_u16()));
    }

    resp.json::<HealthStatus>()
        .await
        .map_err(|e| format!("Failed to parse health response: {}", e))
}

/// Handle to a running health prober. Dropping it stops the prober.
pub struct HealthProberHandle {
    status_rx: watch::Receiver<Option<HealthStatus>>,
    refresh: Arc<Notify>,
    stop_tx: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl HealthProberHandle {
    /// Latest probe result, `None` until the first probe lands.
    pub fn latest(&self) -> Option<HealthStatus> {
        self.status_rx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<HealthStatus>> {
        self.status_rx.clone()
    }

    /// Probe now instead of waiting for the next tick.
    pub fn refresh(&self) {
        self.refresh.notify_one();
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Stop probing. An in-flight probe is abandoned; no request is issued
    /// after this returns.
    pub fn stop(&mut self) {
        let _ = self.stop_tx.send(true);
        if let Some(task) = self.task.take() {
            task.abort();
            info!("Health prober stopped");
        }
    }
}

impl Drop for HealthProberHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Spawn the recurring health probe. The first probe runs immediately, then
/// once per `period` (raised to [`MIN_PROBE_PERIOD`] if shorter). Each result
/// is published on the handle and recorded in the shared debug info.
pub fn spawn_health_prober(
    client: BackendClient,
    state: SharedState,
    period: Duration,
) -> HealthProberHandle {
    if period < MIN_PROBE_PERIOD {
        warn!(
            "Health probe period {:?} is below {:?}; using the minimum",
            period, MIN_PROBE_PERIOD
        );
    }
    let period = period.max(MIN_PROBE_PERIOD);
    let (status_tx, status_rx) = watch::channel(None);
    let (stop_tx, mut stop_rx) = watch::channel(false);
    let refresh = Arc::new(Notify::new());
    let refresh_rx = refresh.clone();

    let task = tokio::spawn(async move {
        info!("Health prober started (every {:?})", period);
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {},
                _ = refresh_rx.notified() => {
                    ticker.reset();
                },
                changed = stop_rx.changed() => {
                    if changed.is_err() || *stop_rx.borrow() {
                        break;
                    }
                    continue;
                },
            }

            let status = check_health(&client).await;
            state.record_health(status.clone());
            status_tx.send_replace(Some(status));
        }
        debug!("Health prober loop exited");
    });

    HealthProberHandle {
        status_rx,
        refresh,
        stop_tx,
        task: Some(task),
    }
}
