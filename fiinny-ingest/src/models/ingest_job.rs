//! Ingest job documents
//!
//! A job document is written by the client app, one per raw transaction
//! signal, under `users/{owner}/ingest_jobs/{txKey}`. The pipeline only reads
//! it as untrusted JSON and mutates its lifecycle fields.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::db::Document;
use crate::models::RecordCollection;

/// Job lifecycle status
///
/// A freshly created job has no `status` field, which reads as `Pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Done,
    Retrying,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Done => "done",
            JobStatus::Retrying => "retrying",
            JobStatus::Failed => "failed",
        }
    }

    /// Parse a stored status value. Unknown values read as `Pending`.
    pub fn parse(value: &str) -> Self {
        match value {
            "processing" => JobStatus::Processing,
            "done" => JobStatus::Done,
            "retrying" => JobStatus::Retrying,
            "failed" => JobStatus::Failed,
            _ => JobStatus::Pending,
        }
    }

    /// Read the status field of a job document
    pub fn from_document(doc: &Document) -> Self {
        doc.get("status")
            .and_then(Value::as_str)
            .map(Self::parse)
            .unwrap_or(JobStatus::Pending)
    }

    /// `done` and `failed` jobs are never processed again
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Failed)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Transaction direction hint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Debit,
    Credit,
}

/// Optional, advisory routing hints carried by a job
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RoutingHints {
    /// `userId`: owner override
    pub owner: Option<String>,
    /// `direction`: debit or credit
    pub direction: Option<Direction>,
    /// `docId`: explicit record identifier
    pub doc_id: Option<String>,
    /// `docCollection`: preferred record collection
    pub doc_collection: Option<RecordCollection>,
    /// `docCollection` value that named no known collection
    pub unknown_collection: Option<String>,
    /// `docPath`: fully-qualified record address
    pub doc_path: Option<String>,
}

/// Structurally invalid job payload
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Bad job payload (txKey/text/amount required): {problems}")]
pub struct ValidationError {
    pub problems: String,
}

/// Validated job payload
#[derive(Debug, Clone, PartialEq)]
pub struct IngestJob {
    pub tx_key: String,
    pub text: String,
    pub amount: f64,
    pub currency: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
    pub channel: Option<String>,
    pub hints: RoutingHints,
}

impl IngestJob {
    /// Validate a raw job document
    ///
    /// `txKey` and `text` must be non-blank strings and `amount` a finite
    /// JSON number. All other fields are optional and read permissively.
    pub fn from_document(doc: &Document) -> Result<Self, ValidationError> {
        let mut problems = Vec::new();

        let tx_key = non_blank(doc, "txKey");
        if tx_key.is_none() {
            problems.push("missing txKey");
        }
        let text = non_blank(doc, "text");
        if text.is_none() {
            problems.push("missing text");
        }
        let amount = doc
            .get("amount")
            .and_then(Value::as_f64)
            .filter(|a| a.is_finite());
        if amount.is_none() {
            problems.push("amount is not a number");
        }

        let (Some(tx_key), Some(text), Some(amount)) = (tx_key, text, amount) else {
            return Err(ValidationError {
                problems: problems.join(", "),
            });
        };

        let (doc_collection, unknown_collection) = match non_blank(doc, "docCollection") {
            Some(name) => match RecordCollection::parse(&name) {
                Some(collection) => (Some(collection), None),
                None => (None, Some(name)),
            },
            None => (None, None),
        };

        let hints = RoutingHints {
            owner: non_blank(doc, "userId"),
            direction: non_blank(doc, "direction").and_then(|d| match d.as_str() {
                "debit" => Some(Direction::Debit),
                "credit" => Some(Direction::Credit),
                _ => None,
            }),
            doc_id: non_blank(doc, "docId"),
            doc_collection,
            unknown_collection,
            doc_path: non_blank(doc, "docPath"),
        };

        Ok(Self {
            tx_key,
            text,
            amount,
            currency: non_blank(doc, "currency"),
            timestamp: doc.get("timestamp").and_then(parse_timestamp),
            // Producers historically wrote the channel as `source`
            channel: non_blank(doc, "channel").or_else(|| non_blank(doc, "source")),
            hints,
        })
    }
}

/// Failed-attempt count stored on a job document (absent reads as 0)
pub fn retries_of(doc: &Document) -> u32 {
    doc.get("retries")
        .and_then(Value::as_u64)
        .map(|r| u32::try_from(r).unwrap_or(u32::MAX))
        .unwrap_or(0)
}

fn non_blank(doc: &Document, key: &str) -> Option<String> {
    doc.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Epoch milliseconds or an RFC 3339 string
fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f as i64))
            .and_then(fiinny_common::time::from_epoch_millis),
        Value::String(s) => fiinny_common::time::parse_rfc3339(s),
        _ => None,
    }
}
