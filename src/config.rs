use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

use crate::error::PerfError;
use crate::models::TestType;

/// perf-orchestrator: runs performance tests against the AI perf-test backend.
#[derive(Parser, Debug, Clone)]
#[command(name = "perf-orchestrator", version)]
pub struct CliArgs {
    /// Base URL of the performance-test backend
    #[arg(short = 'b', long = "backend-url", default_value = DEFAULT_BACKEND_URL, global = true)]
    pub backend_url: String,

    /// Session store file (access token + local execution history)
    #[arg(short = 's', long = "store", global = true)]
    pub store: Option<PathBuf>,

    /// Keep the session in memory only
    #[arg(long = "ephemeral", global = true)]
    pub ephemeral: bool,

    /// Per-request timeout against the backend
    #[arg(long = "timeout-secs", default_value_t = REQUEST_TIMEOUT_SECS, global = true)]
    pub timeout_secs: u64,

    /// Also write logs to this file
    #[arg(short = 'l', long = "log-file", global = true)]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Dispatch a performance run and print the resulting view model
    Run(RunArgs),
    /// Probe backend health once
    Health,
    /// Probe backend health on an interval until interrupted
    WatchHealth {
        #[arg(long = "interval-secs", default_value_t = HEALTH_POLL_INTERVAL_SECS)]
        interval_secs: u64,
        /// Stop after this many probes
        #[arg(long = "count")]
        count: Option<u32>,
    },
    /// List past runs recorded by the backend
    History,
    /// Fetch AI analysis for a run
    Analysis { run_id: String },
    /// Ask the backend to (re)generate AI analysis for a run
    RequestAnalysis { run_id: String },
    /// Show the locally recorded execution history
    LocalHistory,
    /// Forget the locally recorded execution history
    ClearHistory,
    /// Store a bearer token for subsequent requests
    Login { token: String },
    /// Remove the stored bearer token
    Logout,
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    #[arg(short = 'n', long = "name")]
    pub test_name: String,

    #[arg(short = 'u', long = "url")]
    pub url: String,

    #[arg(short = 't', long = "type", value_enum, default_value_t = TestType::Load)]
    pub test_type: TestType,

    #[arg(short = 'c', long = "users", default_value_t = DEFAULT_CONCURRENT_USERS)]
    pub concurrent_users: u32,

    #[arg(short = 'd', long = "duration", default_value_t = DEFAULT_DURATION_SECS)]
    pub duration_secs: u32,

    #[arg(short = 'r', long = "ramp-up", default_value_t = DEFAULT_RAMP_UP_SECS)]
    pub ramp_up_secs: u32,

    /// Response time threshold in ms
    #[arg(long = "max-response-time")]
    pub max_response_time: Option<f64>,

    /// Error rate threshold in percent
    #[arg(long = "max-error-rate")]
    pub max_error_rate: Option<f64>,

    /// Throughput threshold in requests per second
    #[arg(long = "min-throughput")]
    pub min_throughput: Option<f64>,

    /// Print the primary result without waiting for enrichment
    #[arg(long = "no-wait")]
    pub no_wait: bool,
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub backend_url: Url,
    pub request_timeout: Duration,
    pub health_timeout: Duration,
    pub health_interval: Duration,
    pub analysis_delay: Duration,
    pub history_capacity: usize,
    pub store_path: Option<PathBuf>,
}

// Backend
pub const DEFAULT_BACKEND_URL: &str = "http://127.0.0.1:8002";
pub const REQUEST_TIMEOUT_SECS: u64 = 30;
pub const HEALTH_TIMEOUT_SECS: u64 = 10;

// Polling
pub const HEALTH_POLL_INTERVAL_SECS: u64 = 30;
pub const AI_ANALYSIS_DELAY_SECS: u64 = 2;

// Session store
pub const HISTORY_CAPACITY: usize = 10;
pub const ACCESS_TOKEN_KEY: &str = "access_token";
pub const EXECUTIONS_KEY: &str = "test_executions";

// Run defaults
pub const DEFAULT_CONCURRENT_USERS: u32 = 10;
pub const DEFAULT_DURATION_SECS: u32 = 60;
pub const DEFAULT_RAMP_UP_SECS: u32 = 10;
pub const DEFAULT_RESPONSE_TIME_MS: f64 = 1000.0;
pub const DEFAULT_ERROR_RATE_PCT: f64 = 1.0;
pub const DEFAULT_THROUGHPUT: f64 = 10.0;

impl ClientConfig {
    pub fn new(backend_url: &str) -> Result<Self, PerfError> {
        Ok(ClientConfig {
            backend_url: parse_backend_url(backend_url)?,
            request_timeout: Duration::from_secs(REQUEST_TIMEOUT_SECS),
            health_timeout: Duration::from_secs(HEALTH_TIMEOUT_SECS),
            health_interval: Duration::from_secs(HEALTH_POLL_INTERVAL_SECS),
            analysis_delay: Duration::from_secs(AI_ANALYSIS_DELAY_SECS),
            history_capacity: HISTORY_CAPACITY,
            store_path: None,
        })
    }

    pub fn from_args(args: &CliArgs) -> Result<Self, PerfError> {
        let mut config = ClientConfig::new(&args.backend_url)?;
        config.request_timeout = Duration::from_secs(args.timeout_secs.max(1));
        config.store_path = if args.ephemeral {
            None
        } else {
            args.store.clone().or_else(default_store_path)
        };
        Ok(config)
    }

    /// Build an endpoint URL under the backend base. Segments are
    /// percent-encoded, so run ids can't escape their path slot.
    pub fn endpoint(&self, segments: &[&str]) -> Result<Url, PerfError> {
        let mut url = self.backend_url.clone();
        url.path_segments_mut()
            .map_err(|_| PerfError::Config(format!("Backend URL cannot be a base: {}", self.backend_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }
}

fn parse_backend_url(raw: &str) -> Result<Url, PerfError> {
    let url = Url::parse(raw.trim())?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(PerfError::Config(format!(
            "Unsupported backend scheme '{}' (expected http or https)",
            other
        ))),
    }
}

/// `<data dir>/perf-orchestrator/session.json`, if the platform has a data dir.
pub fn default_store_path() -> Option<PathBuf> {
    dirs::data_dir().map(|dir| dir.join("perf-orchestrator").join("session.json"))
}
