//! Data models for the ingestion pipeline

pub mod classification;
pub mod ingest_job;
pub mod record;

pub use classification::{
    ClassificationResult, OracleHints, OracleRequest, Provenance, RecordPatch,
};
pub use ingest_job::{Direction, IngestJob, JobStatus, RoutingHints, ValidationError};
pub use record::{RecordCollection, RecordRef};
