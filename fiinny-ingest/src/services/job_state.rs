//! Job lifecycle state machine
//!
//! pending → processing → done, with failures going to retrying (while
//! attempts remain) or failed. Validation and resolution failures go straight
//! to failed. Transitions are pure: each returns a [`JobUpdate`] that the
//! orchestrator writes onto the job document as a partial update.

use chrono::{DateTime, Utc};
use serde_json::json;

use crate::db::Document;
use crate::models::JobStatus;

/// Attempts before a job is given up as failed
pub const MAX_RETRIES: u32 = 5;

/// What to do with a delivered job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerDecision {
    /// Already terminal; no writes at all
    Skip(JobStatus),
    Proceed,
}

/// Status write produced by a transition
#[derive(Debug, Clone, PartialEq)]
pub struct JobUpdate {
    pub status: JobStatus,
    pub retries: Option<u32>,
    pub last_error: Option<String>,
    /// Lifecycle timestamp field this transition stamps
    pub timestamp_field: &'static str,
    pub at: DateTime<Utc>,
    /// Extra diagnostic fields
    pub extra: Document,
}

impl JobUpdate {
    fn new(status: JobStatus, timestamp_field: &'static str, at: DateTime<Utc>) -> Self {
        Self {
            status,
            retries: None,
            last_error: None,
            timestamp_field,
            at,
            extra: Document::new(),
        }
    }

    /// Partial-update fields for the job document
    pub fn into_fields(self) -> Document {
        let mut fields = Document::new();
        fields.insert("status".into(), json!(self.status.as_str()));
        if let Some(retries) = self.retries {
            fields.insert("retries".into(), json!(retries));
        }
        if let Some(last_error) = self.last_error {
            fields.insert("lastError".into(), json!(last_error));
        }
        fields.insert(
            self.timestamp_field.into(),
            json!(fiinny_common::time::to_rfc3339(self.at)),
        );
        fields.extend(self.extra);
        fields
    }
}

#[derive(Debug, Clone, Copy)]
pub struct JobStateMachine {
    max_retries: u32,
}

impl Default for JobStateMachine {
    fn default() -> Self {
        Self::new(MAX_RETRIES)
    }
}

impl JobStateMachine {
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries: max_retries.max(1),
        }
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Redelivery guard
    pub fn on_trigger(&self, status: JobStatus) -> TriggerDecision {
        if status.is_terminal() {
            TriggerDecision::Skip(status)
        } else {
            TriggerDecision::Proceed
        }
    }

    /// Structurally invalid payload: failed, never retried
    pub fn invalid(&self, error: &str, at: DateTime<Utc>) -> JobUpdate {
        let mut update = JobUpdate::new(JobStatus::Failed, "checkedAt", at);
        update.last_error = Some(error.to_string());
        update
    }

    /// Target record cannot be located: failed, never retried
    pub fn unresolved(&self, error: &str, at: DateTime<Utc>) -> JobUpdate {
        let mut update = JobUpdate::new(JobStatus::Failed, "checkedAt", at);
        update.last_error = Some(error.to_string());
        update
    }

    pub fn start(&self, at: DateTime<Utc>) -> JobUpdate {
        JobUpdate::new(JobStatus::Processing, "startedAt", at)
    }

    pub fn complete(&self, target_path: &str, classified_by: &str, at: DateTime<Utc>) -> JobUpdate {
        let mut update = JobUpdate::new(JobStatus::Done, "completedAt", at);
        update.extra.insert("targetPath".into(), json!(target_path));
        update.extra.insert("classifiedBy".into(), json!(classified_by));
        update
    }

    /// Recoverable failure after `previous_retries` earlier failures
    ///
    /// The attempt count always grows; the job is `failed` once it reaches
    /// the bound and `retrying` before that.
    pub fn record_failure(&self, previous_retries: u32, error: &str, at: DateTime<Utc>) -> JobUpdate {
        let retries = previous_retries.saturating_add(1);
        let status = if retries >= self.max_retries {
            JobStatus::Failed
        } else {
            JobStatus::Retrying
        };

        let mut update = JobUpdate::new(status, "lastTriedAt", at);
        update.retries = Some(retries);
        update.last_error = Some(error.to_string());
        update
    }
}
