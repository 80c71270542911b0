//! Pipeline services
//!
//! Classification (oracle client and keyword heuristic), target resolution,
//! job lifecycle transitions, and the orchestrator that ties them together.

pub mod classifier;
pub mod job_state;
pub mod oracle_client;
pub mod pipeline;
pub mod target_resolver;

pub use classifier::{Classifier, ClassifyError, HeuristicClassifier};
pub use job_state::{JobStateMachine, JobUpdate, TriggerDecision, MAX_RETRIES};
pub use oracle_client::OracleClient;
pub use pipeline::{
    Delivery, DeliveryError, IngestEvent, IngestPipeline, Outcome, PipelineError,
    PipelineSettings, TransientError,
};
pub use target_resolver::{select_target, ResolveError, RoutingHint, TargetResolver};
