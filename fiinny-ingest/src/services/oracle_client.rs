//! Classification oracle client
//!
//! POSTs one JSON request per job to the configured endpoint under a hard
//! deadline. JSON replies are read as a structured result; any other content
//! type is handed to the plain-text parser. An uninformative reply is filled
//! from the keyword table without overwriting what the oracle did say.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::{Duration, Instant};

use super::classifier::{Classifier, ClassifyError};
use crate::heuristics;
use crate::models::classification::{DEFAULT_ORACLE_SOURCE, ORACLE_TEXT_SOURCE};
use crate::models::{ClassificationResult, OracleRequest};

const USER_AGENT: &str = concat!("fiinny-ingest/", env!("CARGO_PKG_VERSION"));

/// Structured oracle reply
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OracleOut {
    pub category: Option<String>,
    pub subcategory: Option<String>,
    pub merchant: Option<String>,
    pub confidence: Option<f64>,
    pub model: Option<OracleModel>,
}

/// Model metadata reported by the oracle
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OracleModel {
    pub name: Option<String>,
    /// May be fractional (`performance.now()` timings)
    pub latency_ms: Option<f64>,
}

/// HTTP oracle client
pub struct OracleClient {
    http_client: reqwest::Client,
    endpoint: String,
    timeout: Duration,
    degrade_on_unreachable: bool,
}

impl OracleClient {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, ClassifyError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| ClassifyError::Client(e.to_string()))?;

        Ok(Self {
            http_client,
            endpoint: endpoint.into(),
            timeout,
            degrade_on_unreachable: false,
        })
    }

    /// Answer from the keyword table instead of failing when the oracle
    /// cannot be reached (timeout or transport error)
    pub fn with_degrade_on_unreachable(mut self, enabled: bool) -> Self {
        self.degrade_on_unreachable = enabled;
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// One request/response exchange, body read included
    async fn exchange(&self, request: &OracleRequest) -> Result<ClassificationResult, ClassifyError> {
        let response = self
            .http_client
            .post(&self.endpoint)
            .json(request)
            .send()
            .await
            .map_err(|e| ClassifyError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(ClassifyError::status(status.as_u16(), &error_text));
        }

        let is_json = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_ascii_lowercase().contains("application/json"))
            .unwrap_or(false);

        let body = response
            .text()
            .await
            .map_err(|e| ClassifyError::Network(e.to_string()))?;

        if is_json {
            let out: OracleOut = serde_json::from_str(&body)
                .map_err(|e| ClassifyError::MalformedPayload(e.to_string()))?;
            Ok(normalize_structured(out))
        } else {
            Ok(normalize_text(&body, request.amount))
        }
    }
}

#[async_trait]
impl Classifier for OracleClient {
    fn name(&self) -> &str {
        "oracle"
    }

    async fn classify(&self, request: &OracleRequest) -> Result<ClassificationResult, ClassifyError> {
        tracing::debug!(
            tx_key = %request.tx_key,
            endpoint = %self.endpoint,
            "Querying classification oracle"
        );

        let started = Instant::now();
        let outcome = match tokio::time::timeout(self.timeout, self.exchange(request)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(ClassifyError::Timeout(self.timeout)),
        };
        let elapsed_ms = started.elapsed().as_millis() as u64;

        let mut result = match outcome {
            Ok(result) => result,
            Err(e) if self.degrade_on_unreachable && e.is_unreachable() => {
                tracing::warn!(
                    tx_key = %request.tx_key,
                    error = %e,
                    "Oracle unreachable, degrading to keyword fallback"
                );
                heuristics::keyword_fallback(&request.text)
            }
            Err(e) => return Err(e),
        };

        heuristics::apply_keyword_fallback(&mut result, &request.text);
        if result.latency_ms.is_none() {
            result.latency_ms = Some(elapsed_ms);
        }

        tracing::info!(
            tx_key = %request.tx_key,
            category = ?result.category,
            merchant = ?result.merchant,
            source = %result.source,
            elapsed_ms,
            "Classification complete"
        );

        Ok(result)
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Normalize a structured oracle reply
pub fn normalize_structured(out: OracleOut) -> ClassificationResult {
    let model = out.model.unwrap_or_default();
    let source = non_blank(model.name).unwrap_or_else(|| DEFAULT_ORACLE_SOURCE.to_string());

    let mut result = ClassificationResult::new(source).with_confidence(out.confidence);
    result.category = non_blank(out.category).map(|c| heuristics::normalize_category(&c));
    result.subcategory = non_blank(out.subcategory).map(|s| heuristics::title_case(&s));
    result.merchant = non_blank(out.merchant);
    result.latency_ms = model
        .latency_ms
        .filter(|ms| ms.is_finite() && *ms >= 0.0)
        .map(|ms| ms.round() as u64);
    result
}

/// Normalize a plain-text oracle reply
pub fn normalize_text(body: &str, amount: f64) -> ClassificationResult {
    let mut result = ClassificationResult::new(ORACLE_TEXT_SOURCE);
    result.category = heuristics::parse_plain_text(body, Some(amount));
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Provenance;

    #[test]
    fn test_normalize_structured() {
        let out: OracleOut = serde_json::from_str(
            r#"{
                "category": "dining",
                "subcategory": "quick   BITES",
                "merchant": " Swiggy ",
                "confidence": 0.92,
                "model": { "name": "llama-3.1-8b", "latencyMs": 412 }
            }"#,
        )
        .unwrap();

        let result = normalize_structured(out);
        assert_eq!(result.category.as_deref(), Some("Food & Dining"));
        assert_eq!(result.subcategory.as_deref(), Some("Quick Bites"));
        assert_eq!(result.merchant.as_deref(), Some("Swiggy"));
        assert_eq!(result.source, "llama-3.1-8b");
        assert_eq!(result.latency_ms, Some(412));
        assert_eq!(result.provenance, Provenance::Oracle);
        assert!((result.confidence.unwrap() - 0.92).abs() < 1e-6);
    }

    #[test]
    fn test_fractional_latency_is_rounded() {
        let out: OracleOut = serde_json::from_str(
            r#"{"category":"food","merchant":"Swiggy","model":{"name":"groq","latencyMs":412.7}}"#,
        )
        .unwrap();
        let result = normalize_structured(out);
        assert_eq!(result.latency_ms, Some(413));
        assert_eq!(result.merchant.as_deref(), Some("Swiggy"));

        let out: OracleOut =
            serde_json::from_str(r#"{"category":"food","model":{"latencyMs":-3}}"#).unwrap();
        assert_eq!(normalize_structured(out).latency_ms, None);
    }

    #[test]
    fn test_normalize_structured_blank_fields_are_absent() {
        let out: OracleOut =
            serde_json::from_str(r#"{ "category": "  ", "merchant": "" }"#).unwrap();
        let result = normalize_structured(out);
        assert!(result.is_uninformative());
        assert_eq!(result.source, DEFAULT_ORACLE_SOURCE);
    }

    #[test]
    fn test_normalize_text() {
        let result = normalize_text("Sure!\nINR 250 UBER - transport\n", 250.0);
        assert_eq!(result.category.as_deref(), Some("Transport"));
        assert_eq!(result.source, ORACLE_TEXT_SOURCE);
        assert!(result.merchant.is_none());
    }

    #[test]
    fn test_client_creation() {
        let client = OracleClient::new("http://127.0.0.1:9/classify", Duration::from_secs(10));
        assert!(client.is_ok());
    }
}
