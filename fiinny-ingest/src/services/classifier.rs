//! Classifier capability
//!
//! The orchestrator asks a [`Classifier`] for a [`ClassificationResult`]. The
//! HTTP oracle client and the keyword heuristic both implement it.

use async_trait::async_trait;
use std::time::{Duration, Instant};
use thiserror::Error;

use crate::heuristics;
use crate::models::{ClassificationResult, OracleRequest};

/// Longest oracle body excerpt carried in a status error
pub const BODY_SNIPPET_CHARS: usize = 200;

/// Classification failures
///
/// Every variant is recoverable from the pipeline's point of view.
#[derive(Debug, Error)]
pub enum ClassifyError {
    #[error("Oracle timed out after {0:?}")]
    Timeout(Duration),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Oracle returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Malformed oracle payload: {0}")]
    MalformedPayload(String),

    /// Client could not be built or the request could not be encoded
    #[error("Client error: {0}")]
    Client(String),
}

impl ClassifyError {
    /// Timeout or transport failure: the oracle was never heard from
    pub fn is_unreachable(&self) -> bool {
        matches!(self, ClassifyError::Timeout(_) | ClassifyError::Network(_))
    }

    pub fn status(status: u16, body: &str) -> Self {
        ClassifyError::Status {
            status,
            body: snippet(body),
        }
    }
}

/// Truncate an oracle body for error messages
pub fn snippet(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.chars().count() <= BODY_SNIPPET_CHARS {
        return trimmed.to_string();
    }
    let mut out: String = trimmed.chars().take(BODY_SNIPPET_CHARS).collect();
    out.push('…');
    out
}

#[async_trait]
pub trait Classifier: Send + Sync {
    /// Short label for logs and health output
    fn name(&self) -> &str;

    async fn classify(&self, request: &OracleRequest) -> Result<ClassificationResult, ClassifyError>;
}

/// Keyword-table classifier used when no oracle endpoint is configured
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicClassifier;

#[async_trait]
impl Classifier for HeuristicClassifier {
    fn name(&self) -> &str {
        "heuristic"
    }

    async fn classify(&self, request: &OracleRequest) -> Result<ClassificationResult, ClassifyError> {
        let started = Instant::now();
        let mut result = heuristics::keyword_fallback(&request.text);
        result.latency_ms = Some(started.elapsed().as_millis() as u64);
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::classification::KEYWORD_FALLBACK_SOURCE;
    use crate::models::{OracleHints, Provenance};

    fn request(text: &str) -> OracleRequest {
        OracleRequest {
            tx_key: "k".into(),
            text: text.into(),
            amount: 250.0,
            currency: "INR".into(),
            timestamp: "2024-06-01T10:15:00.000Z".into(),
            channel: "sms".into(),
            locale: "en-IN".into(),
            hints: OracleHints {
                known_merchants: vec![],
            },
        }
    }

    #[tokio::test]
    async fn test_heuristic_classifier() {
        let result = HeuristicClassifier
            .classify(&request("Agoda booking 4521"))
            .await
            .unwrap();
        assert_eq!(result.category.as_deref(), Some("Travel"));
        assert_eq!(result.subcategory.as_deref(), Some("Hotel"));
        assert_eq!(result.source, KEYWORD_FALLBACK_SOURCE);
        assert_eq!(result.provenance, Provenance::Heuristic);
        assert!(result.latency_ms.is_some());
    }

    #[tokio::test]
    async fn test_heuristic_classifier_no_match_is_ok() {
        let result = HeuristicClassifier
            .classify(&request("IMPS to savings"))
            .await
            .unwrap();
        assert!(result.is_uninformative());
    }

    #[test]
    fn test_snippet_truncates() {
        let long = "x".repeat(500);
        let s = snippet(&long);
        assert_eq!(s.chars().count(), BODY_SNIPPET_CHARS + 1);
        assert!(s.ends_with('…'));
        assert_eq!(snippet("  short  "), "short");
    }

    #[test]
    fn test_unreachable_classification() {
        assert!(ClassifyError::Timeout(Duration::from_secs(10)).is_unreachable());
        assert!(ClassifyError::Network("refused".into()).is_unreachable());
        assert!(!ClassifyError::status(502, "bad gateway").is_unreachable());
        assert!(!ClassifyError::MalformedPayload("eof".into()).is_unreachable());
    }

    #[test]
    fn test_status_error_message() {
        let err = ClassifyError::status(503, "unavailable");
        assert_eq!(err.to_string(), "Oracle returned HTTP 503: unavailable");
    }
}
