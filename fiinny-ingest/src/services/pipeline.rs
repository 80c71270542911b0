//! Ingest pipeline orchestrator
//!
//! One invocation per delivered job: validate → resolve target → mark
//! processing → classify → patch record → mark done. Every failure is caught
//! here and recorded on the job document; nothing past this boundary sees a
//! pipeline error.

use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::Instrument;
use uuid::Uuid;

use fiinny_common::config::TomlConfig;
use fiinny_common::time;

use super::classifier::{Classifier, ClassifyError};
use super::job_state::{JobStateMachine, JobUpdate, TriggerDecision, MAX_RETRIES};
use super::target_resolver::{ResolveError, RoutingHint, TargetResolver};
use crate::db::{DocPath, Document, DocumentStore, StoreError};
use crate::models::ingest_job::retries_of;
use crate::models::{
    IngestJob, JobStatus, OracleHints, OracleRequest, RecordPatch, ValidationError,
};

/// Failure inside one pipeline run
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Structurally invalid payload
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Target record cannot be located
    #[error(transparent)]
    Resolution(ResolveError),

    /// Oracle or store failure worth another attempt
    #[error(transparent)]
    Transient(#[from] TransientError),
}

#[derive(Debug, Error)]
pub enum TransientError {
    #[error(transparent)]
    Classify(#[from] ClassifyError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl From<ResolveError> for PipelineError {
    fn from(err: ResolveError) -> Self {
        match err {
            ResolveError::Store(e) => PipelineError::Transient(TransientError::Store(e)),
            other => PipelineError::Resolution(other),
        }
    }
}

impl From<ClassifyError> for PipelineError {
    fn from(err: ClassifyError) -> Self {
        PipelineError::Transient(err.into())
    }
}

impl From<StoreError> for PipelineError {
    fn from(err: StoreError) -> Self {
        PipelineError::Transient(err.into())
    }
}

/// Failure to handle a delivery at all
///
/// Raised only when the job document cannot be read or its status cannot be
/// recorded.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("Job document not found: {0}")]
    JobNotFound(String),

    #[error("Failed to record job status: {0}")]
    Store(#[from] StoreError),
}

/// Static request defaults and retry bound
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineSettings {
    pub max_retries: u32,
    pub default_currency: String,
    pub default_channel: String,
    pub locale: String,
    pub known_merchants: Vec<String>,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self::from_config(&TomlConfig::default())
    }
}

impl PipelineSettings {
    pub fn from_config(config: &TomlConfig) -> Self {
        Self {
            max_retries: config.pipeline.max_retries,
            default_currency: config.pipeline.default_currency.clone(),
            default_channel: config.pipeline.default_channel.clone(),
            locale: config.oracle.locale.clone(),
            known_merchants: config.pipeline.known_merchants.clone(),
        }
    }
}

/// A delivered "job created" event
#[derive(Debug, Clone)]
pub struct IngestEvent {
    pub job_path: DocPath,
    /// Owning identity the job was created under
    pub owner: String,
    /// Job document as of creation, used only if the stored copy is gone
    pub snapshot: Option<Document>,
}

impl IngestEvent {
    /// Event for `users/{owner}/ingest_jobs/{job_id}`
    pub fn new(owner: &str, job_id: &str, snapshot: Option<Document>) -> Result<Self, StoreError> {
        Ok(Self {
            job_path: DocPath::ingest_job(owner, job_id)?,
            owner: owner.to_string(),
            snapshot,
        })
    }

    /// Event for an existing job path; the owner is read from the path
    pub fn from_path(job_path: DocPath, snapshot: Option<Document>) -> Result<Self, StoreError> {
        let owner = job_path
            .owner()
            .ok_or_else(|| StoreError::InvalidPath(job_path.to_string()))?
            .to_string();
        Ok(Self {
            job_path,
            owner,
            snapshot,
        })
    }
}

/// Result of one delivery
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    /// Terminal job redelivered; nothing written
    Skipped,
    Done,
    Retrying,
    Failed,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Skipped => "skipped",
            Outcome::Done => "done",
            Outcome::Retrying => "retrying",
            Outcome::Failed => "failed",
        }
    }
}

/// Outcome plus the job status it left behind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Delivery {
    pub outcome: Outcome,
    pub status: JobStatus,
}

pub struct IngestPipeline {
    store: Arc<dyn DocumentStore>,
    classifier: Arc<dyn Classifier>,
    resolver: TargetResolver,
    state_machine: JobStateMachine,
    settings: PipelineSettings,
}

impl IngestPipeline {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        classifier: Arc<dyn Classifier>,
        settings: PipelineSettings,
    ) -> Self {
        let max_retries = if settings.max_retries == 0 {
            MAX_RETRIES
        } else {
            settings.max_retries
        };
        Self {
            resolver: TargetResolver::new(Arc::clone(&store)),
            store,
            classifier,
            state_machine: JobStateMachine::new(max_retries),
            settings,
        }
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    pub fn classifier_name(&self) -> &str {
        self.classifier.name()
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Handle one delivery inside its own tracing span
    pub async fn handle(&self, event: IngestEvent) -> Result<Delivery, DeliveryError> {
        let span = tracing::info_span!(
            "ingest_job",
            invocation_id = %Uuid::new_v4(),
            job_path = %event.job_path
        );
        self.run(event).instrument(span).await
    }

    async fn run(&self, event: IngestEvent) -> Result<Delivery, DeliveryError> {
        let started = Instant::now();

        let document = match self.store.get(&event.job_path).await? {
            Some(document) => document,
            None => {
                tracing::debug!("Job document not stored, using event snapshot");
                event
                    .snapshot
                    .clone()
                    .ok_or_else(|| DeliveryError::JobNotFound(event.job_path.to_string()))?
            }
        };

        let status = JobStatus::from_document(&document);
        if let TriggerDecision::Skip(status) = self.state_machine.on_trigger(status) {
            tracing::info!(status = %status, "Job already terminal, skipping");
            return Ok(Delivery {
                outcome: Outcome::Skipped,
                status,
            });
        }

        let previous_retries = retries_of(&document);
        let delivery = match self.process(&event, &document).await {
            Ok(()) => Delivery {
                outcome: Outcome::Done,
                status: JobStatus::Done,
            },
            Err(e) => self.record_error(&event.job_path, previous_retries, e).await?,
        };

        tracing::info!(
            outcome = delivery.outcome.as_str(),
            status = %delivery.status,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Ingest job handled"
        );
        Ok(delivery)
    }

    async fn process(&self, event: &IngestEvent, document: &Document) -> Result<(), PipelineError> {
        let job = IngestJob::from_document(document)?;
        let hint = RoutingHint::from_job(&job, &event.owner)?;
        let target = self.resolver.resolve(&hint).await?;

        tracing::debug!(tx_key = %job.tx_key, target = %target.path, "Target resolved");

        self.write_job(&event.job_path, self.state_machine.start(time::now()))
            .await?;

        let request = self.build_request(&job);
        let result = self.classifier.classify(&request).await?;

        let patch = RecordPatch::from_result(&result, time::now());
        self.store
            .apply_partial_update(&target.path, patch.into_fields())
            .await?;

        let done = self
            .state_machine
            .complete(target.path.as_str(), &result.source, time::now());
        self.write_job(&event.job_path, done).await?;

        tracing::info!(
            tx_key = %job.tx_key,
            target = %target.path,
            category = ?result.category,
            merchant = ?result.merchant,
            source = %result.source,
            "Transaction categorized"
        );
        Ok(())
    }

    /// Oracle request with defaults applied
    pub fn build_request(&self, job: &IngestJob) -> OracleRequest {
        let timestamp = job.timestamp.unwrap_or_else(time::now);
        OracleRequest {
            tx_key: job.tx_key.clone(),
            text: job.text.clone(),
            amount: job.amount,
            currency: job
                .currency
                .clone()
                .unwrap_or_else(|| self.settings.default_currency.clone()),
            timestamp: time::to_rfc3339(timestamp),
            channel: job
                .channel
                .clone()
                .unwrap_or_else(|| self.settings.default_channel.clone()),
            locale: self.settings.locale.clone(),
            hints: OracleHints {
                known_merchants: self.settings.known_merchants.clone(),
            },
        }
    }

    async fn record_error(
        &self,
        job_path: &DocPath,
        previous_retries: u32,
        error: PipelineError,
    ) -> Result<Delivery, DeliveryError> {
        let message = error.to_string();
        let now = time::now();

        let update = match &error {
            PipelineError::Validation(_) => {
                tracing::warn!(error = %message, "Invalid job payload");
                self.state_machine.invalid(&message, now)
            }
            PipelineError::Resolution(_) => {
                tracing::warn!(error = %message, "Target record not resolved");
                self.state_machine.unresolved(&message, now)
            }
            PipelineError::Transient(_) => {
                let update = self
                    .state_machine
                    .record_failure(previous_retries, &message, now);
                tracing::error!(
                    error = %message,
                    retries = update.retries.unwrap_or_default(),
                    status = %update.status,
                    "Ingest attempt failed"
                );
                update
            }
        };

        let status = update.status;
        self.write_job(job_path, update).await?;

        let outcome = match status {
            JobStatus::Retrying => Outcome::Retrying,
            _ => Outcome::Failed,
        };
        Ok(Delivery { outcome, status })
    }

    async fn write_job(&self, job_path: &DocPath, update: JobUpdate) -> Result<(), StoreError> {
        self.store
            .apply_partial_update(job_path, update.into_fields())
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryDocumentStore;
    use crate::services::classifier::HeuristicClassifier;
    use chrono::TimeZone;
    use serde_json::json;

    fn pipeline() -> IngestPipeline {
        IngestPipeline::new(
            Arc::new(MemoryDocumentStore::new()),
            Arc::new(HeuristicClassifier),
            PipelineSettings::default(),
        )
    }

    fn job(value: serde_json::Value) -> IngestJob {
        IngestJob::from_document(value.as_object().unwrap()).unwrap()
    }

    #[test]
    fn test_build_request_defaults() {
        let request = pipeline().build_request(&job(json!({
            "txKey": "abc", "text": "UBER TRIP 250", "amount": 250,
            "timestamp": 1_717_236_900_000_i64
        })));
        assert_eq!(request.currency, "INR");
        assert_eq!(request.channel, "sms");
        assert_eq!(request.locale, "en-IN");
        assert_eq!(request.timestamp, "2024-06-01T10:15:00.000Z");
        assert_eq!(request.hints.known_merchants.len(), 6);
    }

    #[test]
    fn test_build_request_keeps_job_values() {
        let request = pipeline().build_request(&job(json!({
            "txKey": "abc", "text": "t", "amount": 1,
            "currency": "USD", "channel": "email"
        })));
        assert_eq!(request.currency, "USD");
        assert_eq!(request.channel, "email");
        // No timestamp: processing time
        let ts = time::parse_rfc3339(&request.timestamp).unwrap();
        assert!(ts > chrono::Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_error_taxonomy() {
        let validation: PipelineError = ValidationError {
            problems: "missing txKey".into(),
        }
        .into();
        assert!(matches!(validation, PipelineError::Validation(_)));

        let missing: PipelineError = ResolveError::NotFound {
            owner: "u".into(),
            tried: vec![],
        }
        .into();
        assert!(matches!(missing, PipelineError::Resolution(_)));

        let probe: PipelineError = ResolveError::Store(StoreError::Backend("down".into())).into();
        assert!(matches!(probe, PipelineError::Transient(TransientError::Store(_))));

        let timeout: PipelineError =
            ClassifyError::Timeout(std::time::Duration::from_secs(10)).into();
        assert!(matches!(timeout, PipelineError::Transient(TransientError::Classify(_))));
    }

    #[test]
    fn test_event_from_path_reads_owner() {
        let event =
            IngestEvent::from_path(DocPath::parse("users/u7/ingest_jobs/k").unwrap(), None).unwrap();
        assert_eq!(event.owner, "u7");
        assert!(IngestEvent::from_path(DocPath::parse("jobs/k").unwrap(), None).is_err());
    }

    #[tokio::test]
    async fn test_missing_job_without_snapshot() {
        let event = IngestEvent::new("u1", "nope", None).unwrap();
        let err = pipeline().handle(event).await.unwrap_err();
        assert!(matches!(err, DeliveryError::JobNotFound(_)));
    }
}
