//! Decoder that folds the dispatch summary, the run details and the AI
//! analysis into one fully-populated [`ResultViewModel`].
//!
//! Every function here is pure. Shape problems never fail the decode: the
//! field falls back to its default (zero, empty, absent) and a
//! [`NormalizeWarning`] is recorded on the view model instead.

use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::models::{AiAnalysis, DetailedReports, SummaryMetrics, TimeSeries};

/// Placeholder run id when the backend omits one.
pub const UNASSIGNED_RUN_ID: &str = "temp-unassigned";
pub const COMPLETED_DETAILS: &str = "Performance test completed";
pub const DOM_ELEMENTS_PLACEHOLDER: u32 = 100;
pub const TOTAL_BYTES_PLACEHOLDER: u32 = 1;

/// Top-level summary keys that get a typed slot in [`TestDetails`].
const KNOWN_SUMMARY_KEYS: &[&str] = &[
    "run_id",
    "summary_metrics",
    "time_series",
    "time_series_data",
    "detailed_reports",
    "enhanced_workflow",
    "workflow_status",
    "ai_insights",
    "next_actions",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NormalizeWarning {
    SummaryNotAnObject,
    MissingRunId,
    MissingSummaryMetrics,
    MalformedMetric { field: &'static str },
    MissingTimeSeries,
    MalformedSeries { field: &'static str },
    RaggedTimeSeries { shortest: usize, longest: usize },
    MalformedAnalysis,
}

/// Chart-facing metric slots. The names are what downstream charts key on;
/// see [`DisplayMetrics::from_summary`] for the mapping.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct DisplayMetrics {
    pub page_load_time: f64,
    pub first_contentful_paint: f64,
    pub largest_contentful_paint: f64,
    pub time_to_interactive: f64,
    pub cumulative_layout_shift: f64,
    pub network_requests: f64,
    pub dom_elements: u32,
    pub total_bytes: u32,
}

impl DisplayMetrics {
    pub fn from_summary(summary: &SummaryMetrics) -> Self {
        DisplayMetrics {
            page_load_time: summary.avg_response_time,
            first_contentful_paint: summary.avg_response_time,
            largest_contentful_paint: summary.p95_response_time,
            time_to_interactive: summary.avg_response_time,
            cumulative_layout_shift: summary.error_rate / 100.0,
            network_requests: summary.throughput,
            dom_elements: DOM_ELEMENTS_PLACEHOLDER,
            total_bytes: TOTAL_BYTES_PLACEHOLDER,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunOutcome {
    pub success: bool,
    pub details: String,
}

impl RunOutcome {
    pub fn from_summary(summary: &SummaryMetrics) -> Self {
        RunOutcome {
            success: summary.error_rate < 1.0,
            details: COMPLETED_DETAILS.to_string(),
        }
    }
}

/// Serialized with the series under both `time_series` and the older
/// `time_series_data` key, so readers of either shape find it.
#[derive(Debug, Clone, PartialEq)]
pub struct TestDetails {
    pub summary_metrics: SummaryMetrics,
    pub time_series: TimeSeries,
    pub detailed_reports: Option<DetailedReports>,
    pub enhanced_workflow: bool,
    pub workflow_status: Option<Value>,
    pub ai_insights: Option<Value>,
    pub next_actions: Option<Value>,
    /// Summary fields this decoder has no slot for, passed through as-is.
    pub extra: Map<String, Value>,
}

impl Serialize for TestDetails {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("summary_metrics", &self.summary_metrics)?;
        map.serialize_entry("time_series", &self.time_series)?;
        map.serialize_entry("time_series_data", &self.time_series)?;
        if let Some(reports) = &self.detailed_reports {
            map.serialize_entry("detailed_reports", reports)?;
        }
        map.serialize_entry("enhanced_workflow", &self.enhanced_workflow)?;
        map.serialize_entry("workflow_status", &self.workflow_status)?;
        map.serialize_entry("ai_insights", &self.ai_insights)?;
        map.serialize_entry("next_actions", &self.next_actions)?;
        for (key, value) in &self.extra {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultViewModel {
    pub run_id: String,
    pub metrics: DisplayMetrics,
    pub result: RunOutcome,
    pub test_details: TestDetails,
    pub ai_analysis: Option<AiAnalysis>,
    pub warnings: Vec<NormalizeWarning>,
}

impl ResultViewModel {
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    pub fn time_series(&self) -> &TimeSeries {
        &self.test_details.time_series
    }
}

pub fn normalize(
    raw_summary: &Value,
    raw_details: Option<&Value>,
    raw_analysis: Option<&Value>,
) -> ResultViewModel {
    let mut warnings = Vec::new();

    let summary = raw_summary.as_object();
    if summary.is_none() {
        warnings.push(NormalizeWarning::SummaryNotAnObject);
    }

    let run_id = match summary.and_then(extract_run_id) {
        Some(id) => id,
        None => {
            warnings.push(NormalizeWarning::MissingRunId);
            UNASSIGNED_RUN_ID.to_string()
        }
    };

    let summary_metrics =
        decode_summary_metrics(summary.and_then(|s| s.get("summary_metrics")), &mut warnings);

    let time_series = match locate_time_series(summary, raw_details) {
        Some(series) => decode_time_series(series, &mut warnings),
        None => {
            warnings.push(NormalizeWarning::MissingTimeSeries);
            TimeSeries::default()
        }
    };

    let ai_analysis = raw_analysis.and_then(|value| {
        let decoded = decode_ai_analysis(value);
        if decoded.is_none() {
            warnings.push(NormalizeWarning::MalformedAnalysis);
        }
        decoded
    });

    let test_details = TestDetails {
        summary_metrics,
        time_series,
        detailed_reports: summary
            .and_then(|s| present(s.get("detailed_reports")))
            .and_then(|v| serde_json::from_value(v.clone()).ok()),
        enhanced_workflow: summary
            .and_then(|s| s.get("enhanced_workflow"))
            .and_then(Value::as_bool)
            .unwrap_or(false),
        workflow_status: summary.and_then(|s| present(s.get("workflow_status"))).cloned(),
        ai_insights: summary.and_then(|s| present(s.get("ai_insights"))).cloned(),
        next_actions: summary.and_then(|s| present(s.get("next_actions"))).cloned(),
        extra: summary.map(passthrough_fields).unwrap_or_default(),
    };

    ResultViewModel {
        run_id,
        metrics: DisplayMetrics::from_summary(&summary_metrics),
        result: RunOutcome::from_summary(&summary_metrics),
        test_details,
        ai_analysis,
        warnings,
    }
}

/// Run id from a summary body. Numeric ids are accepted and stringified.
pub fn extract_run_id(summary: &Map<String, Value>) -> Option<String> {
    match summary.get("run_id")? {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

pub fn decode_summary_metrics(
    value: Option<&Value>,
    warnings: &mut Vec<NormalizeWarning>,
) -> SummaryMetrics {
    let Some(metrics) = value.and_then(Value::as_object) else {
        warnings.push(NormalizeWarning::MissingSummaryMetrics);
        return SummaryMetrics::default();
    };

    SummaryMetrics {
        avg_response_time: metric_or_zero(metrics, "avg_response_time", warnings),
        p95_response_time: metric_or_zero(metrics, "p95_response_time", warnings),
        error_rate: metric_or_zero(metrics, "error_rate", warnings),
        throughput: metric_or_zero(metrics, "throughput", warnings),
    }
}

/// Missing or null reads as zero; anything non-numeric also reads as zero
/// but is flagged.
fn metric_or_zero(
    metrics: &Map<String, Value>,
    field: &'static str,
    warnings: &mut Vec<NormalizeWarning>,
) -> f64 {
    match metrics.get(field) {
        None | Some(Value::Null) => 0.0,
        Some(value) => value.as_f64().unwrap_or_else(|| {
            warnings.push(NormalizeWarning::MalformedMetric { field });
            0.0
        }),
    }
}

/// First time-series object found, in order: details `time_series`,
/// details `time_series_data`, then the same two keys on the summary.
fn locate_time_series<'a>(
    summary: Option<&'a Map<String, Value>>,
    details: Option<&'a Value>,
) -> Option<&'a Map<String, Value>> {
    let details = details.and_then(Value::as_object);
    [details, summary]
        .into_iter()
        .flatten()
        .flat_map(|obj| [obj.get("time_series"), obj.get("time_series_data")])
        .flatten()
        .find_map(Value::as_object)
}

pub fn decode_time_series(
    series: &Map<String, Value>,
    warnings: &mut Vec<NormalizeWarning>,
) -> TimeSeries {
    let mut timestamps = string_series(series.get("timestamps"), "timestamps", warnings);
    let mut response_times = number_series(series.get("response_times"), "response_times", warnings);
    let mut error_rate_series =
        number_series(series.get("error_rate_series"), "error_rate_series", warnings);
    let mut throughput_series =
        number_series(series.get("throughput_series"), "throughput_series", warnings);

    let lengths = [
        timestamps.len(),
        response_times.len(),
        error_rate_series.len(),
        throughput_series.len(),
    ];
    let shortest = lengths.iter().copied().min().unwrap_or(0);
    let longest = lengths.iter().copied().max().unwrap_or(0);
    if shortest != longest {
        warnings.push(NormalizeWarning::RaggedTimeSeries { shortest, longest });
        timestamps.truncate(shortest);
        response_times.truncate(shortest);
        error_rate_series.truncate(shortest);
        throughput_series.truncate(shortest);
    }

    TimeSeries {
        timestamps,
        response_times,
        error_rate_series,
        throughput_series,
    }
}

fn string_series(
    value: Option<&Value>,
    field: &'static str,
    warnings: &mut Vec<NormalizeWarning>,
) -> Vec<String> {
    let items = match value {
        None | Some(Value::Null) => return Vec::new(),
        Some(Value::Array(items)) => items,
        Some(_) => {
            warnings.push(NormalizeWarning::MalformedSeries { field });
            return Vec::new();
        }
    };

    let decoded: Option<Vec<String>> = items.iter().map(|v| v.as_str().map(str::to_string)).collect();
    decoded.unwrap_or_else(|| {
        warnings.push(NormalizeWarning::MalformedSeries { field });
        Vec::new()
    })
}

/// Null samples read as zero. Any other non-number voids the series.
fn number_series(
    value: Option<&Value>,
    field: &'static str,
    warnings: &mut Vec<NormalizeWarning>,
) -> Vec<f64> {
    let items = match value {
        None | Some(Value::Null) => return Vec::new(),
        Some(Value::Array(items)) => items,
        Some(_) => {
            warnings.push(NormalizeWarning::MalformedSeries { field });
            return Vec::new();
        }
    };

    let decoded: Option<Vec<f64>> = items
        .iter()
        .map(|v| match v {
            Value::Null => Some(0.0),
            other => other.as_f64(),
        })
        .collect();
    decoded.unwrap_or_else(|| {
        warnings.push(NormalizeWarning::MalformedSeries { field });
        Vec::new()
    })
}

/// `None` unless the body is an object. List entries that aren't strings
/// are dropped.
pub fn decode_ai_analysis(value: &Value) -> Option<AiAnalysis> {
    let obj = value.as_object()?;
    let string_list = |key: &str| -> Vec<String> {
        obj.get(key)
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
            .unwrap_or_default()
    };
    let optional_string =
        |key: &str| -> Option<String> { obj.get(key).and_then(Value::as_str).map(str::to_string) };

    Some(AiAnalysis {
        run_id: optional_string("run_id"),
        test_name: optional_string("test_name"),
        bottlenecks: string_list("bottlenecks"),
        recommendations: string_list("recommendations"),
        next_tests: string_list("next_tests"),
        full_report: optional_string("full_report"),
    })
}

fn present(value: Option<&Value>) -> Option<&Value> {
    value.filter(|v| !v.is_null())
}

fn passthrough_fields(summary: &Map<String, Value>) -> Map<String, Value> {
    summary
        .iter()
        .filter(|(key, _)| !KNOWN_SUMMARY_KEYS.contains(&key.as_str()))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}
