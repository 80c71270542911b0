//! Job-created event endpoint
//!
//! Adapter for whatever transport delivers "ingest job created" events. The
//! handler runs the pipeline to completion; pipeline failures are recorded on
//! the job and still answer 200. Only a malformed envelope is rejected.

use axum::{
    extract::{rejection::JsonRejection, State},
    routing::post,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::Ordering;

use crate::db::DocPath;
use crate::error::{ApiError, ApiResult};
use crate::services::{IngestEvent, Outcome};
use crate::AppState;

/// POST /events/ingest-job-created request body
///
/// Either `jobPath`, or `owner` plus `jobId`, must be present.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobCreatedEnvelope {
    pub owner: Option<String>,
    pub job_id: Option<String>,
    pub job_path: Option<String>,
    /// Job document snapshot at creation time
    pub job: Option<Value>,
}

impl JobCreatedEnvelope {
    pub fn into_event(self) -> ApiResult<IngestEvent> {
        let snapshot = match self.job {
            None | Some(Value::Null) => None,
            Some(Value::Object(map)) => Some(map),
            Some(_) => {
                return Err(ApiError::BadRequest(
                    "job snapshot must be a JSON object".to_string(),
                ))
            }
        };

        let owner = self.owner.filter(|o| !o.trim().is_empty());

        if let Some(raw) = self.job_path {
            let job_path = DocPath::parse(&raw)?;
            let owner = owner
                .or_else(|| job_path.owner().map(str::to_string))
                .ok_or_else(|| {
                    ApiError::BadRequest(format!("cannot determine owner of {}", job_path))
                })?;
            return Ok(IngestEvent {
                job_path,
                owner,
                snapshot,
            });
        }

        match (owner, self.job_id.filter(|j| !j.trim().is_empty())) {
            (Some(owner), Some(job_id)) => Ok(IngestEvent::new(&owner, &job_id, snapshot)?),
            _ => Err(ApiError::BadRequest(
                "either jobPath or owner and jobId are required".to_string(),
            )),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestResponse {
    pub job_path: String,
    pub outcome: Outcome,
    pub status: String,
}

/// POST /events/ingest-job-created
pub async fn ingest_job_created(
    State(state): State<AppState>,
    payload: Result<Json<JobCreatedEnvelope>, JsonRejection>,
) -> ApiResult<Json<IngestResponse>> {
    let Json(envelope) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let event = envelope.into_event()?;
    let job_path = event.job_path.to_string();

    let delivery = match state.pipeline.handle(event).await {
        Ok(delivery) => delivery,
        Err(e) => {
            tracing::error!(job_path = %job_path, error = %e, "Delivery not handled");
            *state.last_error.write().await = Some(e.to_string());
            return Err(e.into());
        }
    };

    state.jobs_processed.fetch_add(1, Ordering::Relaxed);

    Ok(Json(IngestResponse {
        job_path,
        outcome: delivery.outcome,
        status: delivery.status.as_str().to_string(),
    }))
}

/// Build event routes
pub fn event_routes() -> Router<AppState> {
    Router::new().route("/events/ingest-job-created", post(ingest_job_created))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn envelope(value: Value) -> JobCreatedEnvelope {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_owner_and_job_id() {
        let event = envelope(json!({ "owner": "u1", "jobId": "k1", "job": { "txKey": "k1" } }))
            .into_event()
            .unwrap();
        assert_eq!(event.job_path.as_str(), "users/u1/ingest_jobs/k1");
        assert_eq!(event.owner, "u1");
        assert!(event.snapshot.is_some());
    }

    #[test]
    fn test_job_path_supplies_owner() {
        let event = envelope(json!({ "jobPath": "users/u2/ingest_jobs/k2" }))
            .into_event()
            .unwrap();
        assert_eq!(event.owner, "u2");
        assert!(event.snapshot.is_none());
    }

    #[test]
    fn test_missing_address_is_bad_request() {
        let err = envelope(json!({ "owner": "u1" })).into_event().unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));
    }

    #[test]
    fn test_non_object_snapshot_is_bad_request() {
        let err = envelope(json!({ "owner": "u1", "jobId": "k", "job": [1] }))
            .into_event()
            .unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));
    }

    #[test]
    fn test_invalid_job_path_is_bad_request() {
        let err = envelope(json!({ "jobPath": "users/u1/ingest_jobs" }))
            .into_event()
            .unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));
    }
}
