#![allow(dead_code)]

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use perf_orchestrator::config::ClientConfig;
use perf_orchestrator::store::{MemoryStore, SharedStore};
use perf_orchestrator::testing::PerfTesting;

/// Canned reply: status code plus raw body text.
#[derive(Clone)]
pub struct Reply {
    pub status: u16,
    pub body: String,
    pub delay: Duration,
}

impl Reply {
    pub fn json(status: u16, body: Value) -> Self {
        Reply {
            status,
            body: body.to_string(),
            delay: Duration::ZERO,
        }
    }

    pub fn raw(status: u16, body: &str) -> Self {
        Reply {
            status,
            body: body.to_string(),
            delay: Duration::ZERO,
        }
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    async fn respond(&self) -> Response {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let status = StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (
            status,
            [(header::CONTENT_TYPE, "application/json")],
            self.body.clone(),
        )
            .into_response()
    }
}

#[derive(Default)]
pub struct Hits {
    pub run: AtomicUsize,
    pub details: AtomicUsize,
    pub analysis: AtomicUsize,
    pub request_analysis: AtomicUsize,
    pub history: AtomicUsize,
    pub health: AtomicUsize,
}

impl Hits {
    pub fn get(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

pub struct MockState {
    pub run: Reply,
    pub details: Reply,
    pub analysis: Reply,
    pub request_analysis: Reply,
    pub history: Reply,
    pub health: Reply,
    pub hits: Hits,
    pub last_run_body: Mutex<Option<Value>>,
    pub last_authorization: Mutex<Option<String>>,
    pub last_details_run_id: Mutex<Option<String>>,
}

impl Default for MockState {
    fn default() -> Self {
        MockState {
            run: Reply::json(200, smoke_summary()),
            details: Reply::json(200, run_details("r1", 3)),
            analysis: Reply::json(200, analysis_body("r1")),
            request_analysis: Reply::json(
                200,
                json!({"status": "success", "message": "AI analysis started", "run_id": "r1"}),
            ),
            history: Reply::json(200, json!([])),
            health: Reply::json(200, healthy_body()),
            hits: Hits::default(),
            last_run_body: Mutex::new(None),
            last_authorization: Mutex::new(None),
            last_details_run_id: Mutex::new(None),
        }
    }
}

pub struct MockBackend {
    pub base_url: String,
    pub state: Arc<MockState>,
    _server: tokio::task::JoinHandle<()>,
}

impl MockBackend {
    pub async fn start(state: MockState) -> Self {
        let state = Arc::new(state);
        let router = Router::new()
            .route("/run-performance-test", post(run_test))
            .route("/run-details/{run_id}", get(run_details_handler))
            .route("/ai-analysis/{run_id}", get(ai_analysis))
            .route("/request-ai-analysis", post(request_analysis))
            .route("/performance-history", get(history))
            .route("/health", get(health))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind mock backend");
        let addr = listener.local_addr().expect("mock backend addr");
        let server = tokio::spawn(async move {
            let _ = axum::serve(listener, router).await;
        });

        MockBackend {
            base_url: format!("http://{}", addr),
            state,
            _server: server,
        }
    }

    /// Facade pointed at this backend with short delays for tests.
    pub fn testing(&self) -> PerfTesting {
        self.testing_with_store(MemoryStore::shared())
    }

    pub fn testing_with_store(&self, store: SharedStore) -> PerfTesting {
        PerfTesting::new(self.config(), store).expect("build facade")
    }

    pub fn config(&self) -> ClientConfig {
        let mut config = ClientConfig::new(&self.base_url).expect("mock url");
        config.analysis_delay = Duration::from_millis(20);
        config.request_timeout = Duration::from_secs(5);
        config.health_timeout = Duration::from_secs(2);
        config
    }

    pub fn last_run_body(&self) -> Option<Value> {
        self.state.last_run_body.lock().clone()
    }

    pub fn last_authorization(&self) -> Option<String> {
        self.state.last_authorization.lock().clone()
    }
}

async fn run_test(State(state): State<Arc<MockState>>, headers: HeaderMap, body: Bytes) -> Response {
    state.hits.run.fetch_add(1, Ordering::SeqCst);
    *state.last_run_body.lock() = serde_json::from_slice(&body).ok();
    *state.last_authorization.lock() = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    state.run.respond().await
}

async fn run_details_handler(State(state): State<Arc<MockState>>, Path(run_id): Path<String>) -> Response {
    state.hits.details.fetch_add(1, Ordering::SeqCst);
    *state.last_details_run_id.lock() = Some(run_id);
    state.details.respond().await
}

async fn ai_analysis(State(state): State<Arc<MockState>>, Path(_run_id): Path<String>) -> Response {
    state.hits.analysis.fetch_add(1, Ordering::SeqCst);
    state.analysis.respond().await
}

async fn request_analysis(State(state): State<Arc<MockState>>) -> Response {
    state.hits.request_analysis.fetch_add(1, Ordering::SeqCst);
    state.request_analysis.respond().await
}

async fn history(State(state): State<Arc<MockState>>) -> Response {
    state.hits.history.fetch_add(1, Ordering::SeqCst);
    state.history.respond().await
}

async fn health(State(state): State<Arc<MockState>>) -> Response {
    state.hits.health.fetch_add(1, Ordering::SeqCst);
    state.health.respond().await
}

// --- Fixtures ---

pub fn smoke_summary() -> Value {
    json!({
        "run_id": "r1",
        "summary_metrics": {
            "avg_response_time": 250,
            "p95_response_time": 400,
            "error_rate": 0.5,
            "throughput": 50
        },
        "detailed_reports": {
            "executive_html": "/reports/r1/report/index.html",
            "dashboard_html": "/reports/r1/report/dashboard.html"
        }
    })
}

pub fn run_details(run_id: &str, points: usize) -> Value {
    json!({
        "run_id": run_id,
        "test_name": "smoke",
        "time_series": {
            "timestamps": (0..points).map(|i| format!("2024-05-01T10:00:{:02}", i)).collect::<Vec<_>>(),
            "response_times": (0..points).map(|i| 200.0 + i as f64).collect::<Vec<_>>(),
            "error_rate_series": vec![0.0; points],
            "throughput_series": vec![50.0; points],
        }
    })
}

pub fn analysis_body(run_id: &str) -> Value {
    json!({
        "run_id": run_id,
        "test_name": "smoke",
        "full_report": "Response times are stable.",
        "bottlenecks": ["Database connection pool"],
        "recommendations": ["Increase pool size"],
        "next_tests": ["Stress test at 50 users"]
    })
}

pub fn healthy_body() -> Value {
    json!({
        "status": "healthy",
        "timestamp": "2024-05-01T10:00:00",
        "jmeter_in_path": true,
        "custom_jmeter_exists": false,
        "jmeter_server_running": false,
        "jmeter_port_active": true,
        "jmeter_alt_port_active": false,
        "jmeter_version": "5.6.3",
        "java_installed": true,
        "java_version": "openjdk 17",
        "server_directories": {"jmx_templates": true, "results": true, "uploads": true}
    })
}

/// An address nothing listens on.
pub async fn dead_backend_url() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind probe socket");
    let addr = listener.local_addr().expect("probe addr");
    drop(listener);
    format!("http://{}", addr)
}
