use reqwest::StatusCode;
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{debug, error, info};

use crate::client::BackendClient;
use crate::enrichment::EnrichmentHandle;
use crate::error::PerfError;
use crate::models::TestRunConfig;
use crate::normalize::ResultViewModel;
use crate::state::{DispatchDebug, StructureCheck, TestingState};

const RUN_ENDPOINT: &str = "run-performance-test";
const GENERIC_FAILURE: &str = "Performance test failed";

/// A dispatched run: the primary view model, available immediately, and
/// the background enrichment that keeps refining it.
pub struct Dispatched {
    pub view: ResultViewModel,
    pub enrichment: EnrichmentHandle,
}

/// Submit one run and return the summary body. Assumes `config` was
/// validated by the caller.
///
/// Transport failures and non-2xx fail with [`PerfError::TestExecution`],
/// the latter carrying the backend's `detail`/`message`, or
/// `HTTP <status>: <reason>` when the error body isn't JSON. A 2xx body that
/// isn't JSON fails with [`PerfError::ResponseParse`]. Every outcome is
/// recorded in the shared debug info.
pub async fn submit(
    client: &BackendClient,
    state: &TestingState,
    config: &TestRunConfig,
) -> Result<Value, PerfError> {
    let endpoint = client.endpoint(&[RUN_ENDPOINT])?.to_string();
    let request_body = serde_json::to_value(config.to_request_body())
        .map_err(|e| PerfError::Validation(format!("Unserializable config: {}", e)))?;
    debug!("Request body: {}", request_body);

    let resp = match client.post_json(&[RUN_ENDPOINT], &request_body).await {
        Ok(resp) => resp,
        Err(e) => {
            error!("Failed to reach {}: {}", endpoint, e);
            state.record_dispatch(DispatchDebug::Failure {
                endpoint,
                status: None,
                status_text: None,
                error: e.to_string(),
                error_data: None,
            });
            return Err(PerfError::TestExecution(e.to_string()));
        }
    };

    let status = resp.status();
    let headers = header_map(resp.headers());
    info!("Response status: {}", status.as_u16());
    let bytes = match resp.bytes().await {
        Ok(bytes) => bytes,
        Err(e) => {
            error!("Failed to read response from {}: {}", endpoint, e);
            let error = format!("Failed to read response body: {}", e);
            state.record_dispatch(DispatchDebug::Failure {
                endpoint,
                status: Some(status.as_u16()),
                status_text: status.canonical_reason().map(str::to_string),
                error: error.clone(),
                error_data: None,
            });
            return Err(PerfError::TestExecution(error));
        }
    };

    if !status.is_success() {
        let (detail, error_data) = error_detail(status, &bytes);
        error!("Performance test failed ({}): {}", status.as_u16(), detail);
        state.record_dispatch(DispatchDebug::Failure {
            endpoint,
            status: Some(status.as_u16()),
            status_text: status.canonical_reason().map(str::to_string),
            error: detail.clone(),
            error_data,
        });
        return Err(PerfError::TestExecution(detail));
    }

    let body: Value = match serde_json::from_slice(&bytes) {
        Ok(body) => body,
        Err(e) => {
            error!("Error parsing success response: {}", e);
            state.record_dispatch(DispatchDebug::Failure {
                endpoint,
                status: Some(status.as_u16()),
                status_text: status.canonical_reason().map(str::to_string),
                error: format!("Failed to parse response data: {}", e),
                error_data: None,
            });
            return Err(PerfError::ResponseParse(e.to_string()));
        }
    };

    let structure_check = StructureCheck::inspect(&body);
    debug!("Data structure check: {:?}", structure_check);
    state.record_dispatch(DispatchDebug::Success {
        endpoint,
        request_body,
        response_status: status.as_u16(),
        response_headers: headers,
        structure_check,
    });

    Ok(body)
}

/// Human-readable failure detail plus the parsed error body, if any.
pub fn error_detail(status: StatusCode, body: &[u8]) -> (String, Option<Value>) {
    match serde_json::from_slice::<Value>(body) {
        Ok(data) => {
            let detail = ["detail", "message"]
                .iter()
                .find_map(|key| data.get(*key).and_then(detail_text))
                .unwrap_or_else(|| GENERIC_FAILURE.to_string());
            (detail, Some(data))
        }
        Err(_) => (
            format!(
                "HTTP {}: {}",
                status.as_u16(),
                status.canonical_reason().unwrap_or("")
            ),
            None,
        ),
    }
}

// FastAPI puts validation errors in `detail` as a list of objects.
fn detail_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn header_map(headers: &reqwest::header::HeaderMap) -> BTreeMap<String, String> {
    headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_error_detail_prefers_detail() {
        let body = br#"{"detail": "Failed to run performance test: jmeter missing", "message": "ignored"}"#;
        let (detail, data) = error_detail(StatusCode::INTERNAL_SERVER_ERROR, body);
        assert_eq!(detail, "Failed to run performance test: jmeter missing");
        assert_eq!(data.unwrap()["message"], "ignored");
    }

    #[test]
    fn test_error_detail_falls_back_to_message() {
        let (detail, _) = error_detail(StatusCode::BAD_REQUEST, br#"{"message": "bad url"}"#);
        assert_eq!(detail, "bad url");
    }

    #[test]
    fn test_error_detail_generic_when_json_has_neither() {
        let (detail, data) = error_detail(StatusCode::BAD_REQUEST, br#"{"code": 7}"#);
        assert_eq!(detail, "Performance test failed");
        assert_eq!(data, Some(json!({"code": 7})));
    }

    #[test]
    fn test_error_detail_non_json_uses_status_line() {
        let (detail, data) = error_detail(StatusCode::BAD_GATEWAY, b"<html>upstream down</html>");
        assert_eq!(detail, "HTTP 502: Bad Gateway");
        assert!(data.is_none());
    }

    #[test]
    fn test_validation_detail_list_is_stringified() {
        let body = br#"{"detail": [{"loc": ["body", "url"], "msg": "field required"}]}"#;
        let (detail, _) = error_detail(StatusCode::UNPROCESSABLE_ENTITY, body);
        assert!(detail.contains("field required"));
    }
}
