use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::config::{
    DEFAULT_CONCURRENT_USERS, DEFAULT_DURATION_SECS, DEFAULT_ERROR_RATE_PCT, DEFAULT_RAMP_UP_SECS,
    DEFAULT_RESPONSE_TIME_MS, DEFAULT_THROUGHPUT,
};
use crate::error::PerfError;

// --- Run configuration ---

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum TestType {
    #[default]
    Load,
    Stress,
    Spike,
    Endurance,
}

/// Caller-supplied pass/fail thresholds. Unset fields fall back to the
/// backend defaults when the request is built.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Thresholds {
    #[serde(default)]
    pub response_time_ms: Option<f64>,
    #[serde(default)]
    pub error_rate_pct: Option<f64>,
    #[serde(default)]
    pub throughput: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestRunConfig {
    pub test_name: String,
    #[serde(default)]
    pub test_type: TestType,
    pub url: String,
    pub concurrent_users: u32,
    pub duration_seconds: u32,
    pub ramp_up_seconds: u32,
    #[serde(default)]
    pub thresholds: Thresholds,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_parameters: Option<Map<String, Value>>,
}

impl TestRunConfig {
    pub fn new(test_name: impl Into<String>, url: impl Into<String>) -> Self {
        TestRunConfig {
            test_name: test_name.into(),
            test_type: TestType::default(),
            url: url.into(),
            concurrent_users: DEFAULT_CONCURRENT_USERS,
            duration_seconds: DEFAULT_DURATION_SECS,
            ramp_up_seconds: DEFAULT_RAMP_UP_SECS,
            thresholds: Thresholds::default(),
            custom_parameters: None,
        }
    }

    pub fn with_test_type(mut self, test_type: TestType) -> Self {
        self.test_type = test_type;
        self
    }

    pub fn with_load(mut self, concurrent_users: u32, duration_seconds: u32, ramp_up_seconds: u32) -> Self {
        self.concurrent_users = concurrent_users;
        self.duration_seconds = duration_seconds;
        self.ramp_up_seconds = ramp_up_seconds;
        self
    }

    pub fn with_thresholds(mut self, thresholds: Thresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    pub fn validate(&self) -> Result<(), PerfError> {
        if self.test_name.trim().is_empty() {
            return Err(PerfError::Validation("test_name is required".to_string()));
        }
        if self.url.trim().is_empty() {
            return Err(PerfError::Validation("url is required".to_string()));
        }
        if self.concurrent_users == 0 {
            return Err(PerfError::Validation(
                "concurrent_users must be at least 1".to_string(),
            ));
        }
        if self.duration_seconds == 0 {
            return Err(PerfError::Validation(
                "duration must be at least 1 second".to_string(),
            ));
        }
        Ok(())
    }

    /// The exact body `POST /run-performance-test` expects.
    pub fn to_request_body(&self) -> RunRequestBody {
        RunRequestBody {
            test_name: self.test_name.clone(),
            test_type: self.test_type,
            url: self.url.clone(),
            concurrent_users: self.concurrent_users,
            duration: self.duration_seconds,
            ramp_up_time: self.ramp_up_seconds,
            thresholds: WireThresholds {
                response_time: self.thresholds.response_time_ms.unwrap_or(DEFAULT_RESPONSE_TIME_MS),
                error_rate: self.thresholds.error_rate_pct.unwrap_or(DEFAULT_ERROR_RATE_PCT),
                throughput: self.thresholds.throughput.unwrap_or(DEFAULT_THROUGHPUT),
            },
            custom_parameters: self.custom_parameters.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunRequestBody {
    pub test_name: String,
    pub test_type: TestType,
    pub url: String,
    pub concurrent_users: u32,
    pub duration: u32,
    pub ramp_up_time: u32,
    pub thresholds: WireThresholds,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_parameters: Option<Map<String, Value>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct WireThresholds {
    pub response_time: f64,
    pub error_rate: f64,
    pub throughput: f64,
}

// --- Backend result shapes ---

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SummaryMetrics {
    pub avg_response_time: f64,
    pub p95_response_time: f64,
    pub error_rate: f64,
    pub throughput: f64,
}

/// Index-aligned samples for one run. All four series always have the
/// same length; no data is four empty vectors.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TimeSeries {
    pub timestamps: Vec<String>,
    pub response_times: Vec<f64>,
    pub error_rate_series: Vec<f64>,
    pub throughput_series: Vec<f64>,
}

impl TimeSeries {
    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn is_aligned(&self) -> bool {
        let n = self.timestamps.len();
        self.response_times.len() == n
            && self.error_rate_series.len() == n
            && self.throughput_series.len() == n
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DetailedReports {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub executive_html: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dashboard_html: Option<String>,
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AiAnalysis {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_name: Option<String>,
    #[serde(default)]
    pub bottlenecks: Vec<String>,
    #[serde(default)]
    pub recommendations: Vec<String>,
    #[serde(default)]
    pub next_tests: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_report: Option<String>,
}

/// Row of `GET /performance-history`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub run_id: String,
    #[serde(default)]
    pub test_name: String,
    #[serde(default)]
    pub test_type: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub concurrent_users: Option<u32>,
    #[serde(default)]
    pub duration: Option<u32>,
    #[serde(default)]
    pub avg_response_time: Option<f64>,
    #[serde(default)]
    pub p95_response_time: Option<f64>,
    #[serde(default)]
    pub error_rate: Option<f64>,
    #[serde(default)]
    pub throughput: Option<f64>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub has_ai_analysis: bool,
}

/// Reply to `POST /request-ai-analysis`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRequestAck {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub message: String,
    pub run_id: String,
}

// --- Health ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthStatus {
    #[serde(default = "unknown_status")]
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub java_installed: bool,
    #[serde(default)]
    pub java_version: Option<String>,
    #[serde(default)]
    pub jmeter_in_path: bool,
    #[serde(default)]
    pub jmeter_version: Option<String>,
    #[serde(default)]
    pub custom_jmeter_exists: bool,
    #[serde(default)]
    pub jmeter_server_running: bool,
    #[serde(default)]
    pub jmeter_port_active: bool,
    #[serde(default)]
    pub jmeter_alt_port_active: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn unknown_status() -> String {
    "unknown".to_string()
}

impl HealthStatus {
    /// Status reported when the backend can't be reached or answers badly.
    pub fn unavailable(reason: impl Into<String>) -> Self {
        HealthStatus {
            status: "error".to_string(),
            error: Some(reason.into()),
            timestamp: Some(Utc::now().to_rfc3339()),
            java_installed: false,
            java_version: None,
            jmeter_in_path: false,
            jmeter_version: None,
            custom_jmeter_exists: false,
            jmeter_server_running: false,
            jmeter_port_active: false,
            jmeter_alt_port_active: false,
            extra: Map::new(),
        }
    }

    pub fn engine_available(&self) -> bool {
        self.jmeter_in_path || self.custom_jmeter_exists
    }

    pub fn engine_running(&self) -> bool {
        self.jmeter_server_running || self.jmeter_port_active
    }

    pub fn runtime_available(&self) -> bool {
        self.java_installed
    }

    /// Everything a run needs is in place.
    pub fn ready(&self) -> bool {
        self.error.is_none() && self.runtime_available() && self.engine_available()
    }
}

// --- Local execution history ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub id: String,
    #[serde(default)]
    pub run_id: Option<String>,
    pub test_name: String,
    pub url: String,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
    pub status: ExecutionStatus,
    #[serde(default)]
    pub error_message: Option<String>,
}

impl ExecutionRecord {
    pub fn start(config: &TestRunConfig) -> Self {
        let now = Utc::now();
        let suffix: String = uuid::Uuid::new_v4().simple().to_string().chars().take(5).collect();
        ExecutionRecord {
            id: format!("exec-{}-{}", now.timestamp_millis(), suffix),
            run_id: None,
            test_name: config.test_name.clone(),
            url: config.url.clone(),
            started_at: now,
            finished_at: None,
            status: ExecutionStatus::Running,
            error_message: None,
        }
    }

    pub fn complete(&mut self, run_id: &str) {
        self.run_id = Some(run_id.to_string());
        self.status = ExecutionStatus::Completed;
        self.finished_at = Some(Utc::now());
    }

    pub fn fail(&mut self, message: impl Into<String>) {
        self.status = ExecutionStatus::Failed;
        self.error_message = Some(message.into());
        self.finished_at = Some(Utc::now());
    }
}
