//! Classification request/result types and the record patch built from them

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};

use crate::db::Document;

/// Source label used when the oracle does not name its model
pub const DEFAULT_ORACLE_SOURCE: &str = "oracle";
/// Source label for plain-text oracle replies
pub const ORACLE_TEXT_SOURCE: &str = "oracle-text";
/// Source label for results produced by keyword heuristics
pub const KEYWORD_FALLBACK_SOURCE: &str = "keyword-fallback";

/// Which path supplied the usable signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Provenance {
    #[default]
    Oracle,
    Heuristic,
}

impl Provenance {
    /// `categorySource` marker written with forced fields
    pub fn marker(&self) -> &'static str {
        match self {
            Provenance::Oracle => "oracle-auto",
            Provenance::Heuristic => "heuristic-auto",
        }
    }
}

/// Normalized classification output
///
/// Never persisted on its own; projected into record patch fields and job
/// diagnostics.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClassificationResult {
    pub category: Option<String>,
    pub subcategory: Option<String>,
    pub merchant: Option<String>,
    /// Confidence score (0.0-1.0)
    pub confidence: Option<f32>,
    /// Model or path that produced the result
    pub source: String,
    pub latency_ms: Option<u64>,
    pub provenance: Provenance,
}

impl ClassificationResult {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            ..Default::default()
        }
    }

    /// Set confidence, clamped to 0.0-1.0 (non-finite values are dropped)
    pub fn with_confidence(mut self, confidence: Option<f64>) -> Self {
        self.confidence = confidence
            .filter(|c| c.is_finite())
            .map(|c| c.clamp(0.0, 1.0) as f32);
        self
    }

    /// Neither category nor merchant: the oracle told us nothing usable
    pub fn is_uninformative(&self) -> bool {
        self.category.is_none() && self.merchant.is_none()
    }

    /// Fill fields this result lacks from `fallback`, never overwriting
    ///
    /// Returns true when the fallback contributed anything; the result's
    /// source and provenance then name the fallback.
    pub fn fill_from(&mut self, fallback: ClassificationResult) -> bool {
        let mut filled = false;
        if self.category.is_none() && fallback.category.is_some() {
            self.category = fallback.category;
            filled = true;
        }
        if self.subcategory.is_none() && fallback.subcategory.is_some() {
            self.subcategory = fallback.subcategory;
            filled = true;
        }
        if self.merchant.is_none() && fallback.merchant.is_some() {
            self.merchant = fallback.merchant;
            filled = true;
        }
        if filled {
            self.source = fallback.source;
            self.provenance = Provenance::Heuristic;
        }
        filled
    }
}

/// Merchant hints sent with each oracle request
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OracleHints {
    pub known_merchants: Vec<String>,
}

/// Outbound oracle request body
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OracleRequest {
    pub tx_key: String,
    pub text: String,
    pub amount: f64,
    pub currency: String,
    /// ISO-8601 instant
    pub timestamp: String,
    pub channel: String,
    pub locale: String,
    pub hints: OracleHints,
}

/// Fields written onto the target record
///
/// `suggested` is always written and never authoritative. `forced` carries
/// the values that override the record's own category/merchant and is empty
/// when the classification has neither.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordPatch {
    pub suggested: Document,
    pub forced: Document,
}

impl RecordPatch {
    pub fn from_result(result: &ClassificationResult, at: DateTime<Utc>) -> Self {
        let mut suggested = Document::new();
        suggested.insert("suggestedCategory".into(), opt_str(&result.category));
        suggested.insert("suggestedSubcategory".into(), opt_str(&result.subcategory));
        suggested.insert("suggestedMerchant".into(), opt_str(&result.merchant));
        suggested.insert(
            "suggestedConfidence".into(),
            result
                .confidence
                .map(|c| json!(f64::from(c)))
                .unwrap_or(Value::Null),
        );
        suggested.insert("suggestedBy".into(), json!(result.source));
        suggested.insert(
            "suggestedLatencyMs".into(),
            result.latency_ms.map(|l| json!(l)).unwrap_or(Value::Null),
        );
        suggested.insert(
            "suggestedAt".into(),
            json!(fiinny_common::time::to_rfc3339(at)),
        );

        let mut forced = Document::new();
        if let Some(category) = &result.category {
            forced.insert("category".into(), json!(category));
            forced.insert("categorySource".into(), json!(result.provenance.marker()));
        }
        if let Some(merchant) = &result.merchant {
            forced.insert("merchant".into(), json!(merchant));
        }

        Self { suggested, forced }
    }

    /// Both field sets as one partial update
    pub fn into_fields(self) -> Document {
        let mut fields = self.suggested;
        fields.extend(self.forced);
        fields
    }
}

fn opt_str(value: &Option<String>) -> Value {
    value.as_ref().map(|v| json!(v)).unwrap_or(Value::Null)
}
