use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::watch;

use crate::error::PerfError;
use crate::models::HealthStatus;

pub type SharedState = Arc<TestingState>;

// --- Run lifecycle ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    Idle,
    Dispatching,
    Dispatched,
    Enriching,
    Enriched,
    Failed,
}

impl RunPhase {
    pub fn can_advance_to(self, next: RunPhase) -> bool {
        matches!(
            (self, next),
            (RunPhase::Idle, RunPhase::Dispatching)
                | (RunPhase::Dispatching, RunPhase::Dispatched)
                | (RunPhase::Dispatching, RunPhase::Failed)
                | (RunPhase::Dispatched, RunPhase::Enriching)
                | (RunPhase::Enriching, RunPhase::Enriched)
        )
    }

    pub fn advance(&mut self, next: RunPhase) -> Result<(), PerfError> {
        if !self.can_advance_to(next) {
            return Err(PerfError::InvalidTransition { from: *self, to: next });
        }
        *self = next;
        Ok(())
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, RunPhase::Enriched | RunPhase::Failed)
    }
}

// --- Debug info ---

/// Which parts of a dispatch response had the expected structure.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StructureCheck {
    pub has_data: bool,
    pub has_summary_metrics: bool,
    pub has_detailed_reports: bool,
    pub structure: String,
}

impl StructureCheck {
    pub fn inspect(body: &Value) -> Self {
        match body.as_object() {
            Some(obj) => StructureCheck {
                has_data: true,
                has_summary_metrics: obj.get("summary_metrics").is_some_and(|v| !v.is_null()),
                has_detailed_reports: obj.get("detailed_reports").is_some_and(|v| !v.is_null()),
                structure: obj.keys().cloned().collect::<Vec<_>>().join(", "),
            },
            None => StructureCheck {
                has_data: !body.is_null(),
                has_summary_metrics: false,
                has_detailed_reports: false,
                structure: "empty response".to_string(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DispatchDebug {
    Success {
        endpoint: String,
        request_body: Value,
        response_status: u16,
        response_headers: BTreeMap<String, String>,
        structure_check: StructureCheck,
    },
    Failure {
        endpoint: String,
        status: Option<u16>,
        status_text: Option<String>,
        error: String,
        error_data: Option<Value>,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DebugInfo {
    pub health_check: Option<HealthStatus>,
    pub last_dispatch: Option<DispatchDebug>,
}

// --- Shared observable state ---

/// Observable state behind the testing facade. Every field is a watch
/// channel so callers can either read the current value or await changes.
pub struct TestingState {
    executing: watch::Sender<bool>,
    in_flight: AtomicUsize,
    debug: watch::Sender<Option<DebugInfo>>,
}

impl TestingState {
    pub fn new() -> Self {
        let (executing, _) = watch::channel(false);
        let (debug, _) = watch::channel(None);
        Self {
            executing,
            in_flight: AtomicUsize::new(0),
            debug,
        }
    }

    pub fn shared() -> SharedState {
        Arc::new(Self::new())
    }

    /// Mark a dispatch as in flight until the guard drops. Overlapping
    /// dispatches are counted, so `is_executing` stays true until the last
    /// one finishes.
    pub fn begin_execution(self: &Arc<Self>) -> ExecutionGuard {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        self.executing.send_replace(true);
        ExecutionGuard {
            state: Arc::clone(self),
        }
    }

    pub fn is_executing(&self) -> bool {
        *self.executing.borrow()
    }

    pub fn subscribe_executing(&self) -> watch::Receiver<bool> {
        self.executing.subscribe()
    }

    pub fn debug_info(&self) -> Option<DebugInfo> {
        self.debug.borrow().clone()
    }

    pub fn subscribe_debug(&self) -> watch::Receiver<Option<DebugInfo>> {
        self.debug.subscribe()
    }

    pub fn record_health(&self, status: HealthStatus) {
        self.debug.send_modify(|info| {
            info.get_or_insert_with(DebugInfo::default).health_check = Some(status);
        });
    }

    pub fn record_dispatch(&self, dispatch: DispatchDebug) {
        self.debug.send_modify(|info| {
            info.get_or_insert_with(DebugInfo::default).last_dispatch = Some(dispatch);
        });
    }

    /// Forget the previous dispatch before a new one starts. Health stays.
    pub fn clear_dispatch(&self) {
        self.debug.send_modify(|info| {
            if let Some(info) = info {
                info.last_dispatch = None;
            }
        });
    }
}

impl Default for TestingState {
    fn default() -> Self {
        Self::new()
    }
}

pub struct ExecutionGuard {
    state: SharedState,
}

impl Drop for ExecutionGuard {
    fn drop(&mut self) {
        if self.state.in_flight.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.state.executing.send_replace(false);
        }
    }
}
