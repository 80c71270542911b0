//! Target record resolution
//!
//! Maps a job to the one transaction record it annotates. The job's routing
//! fields are folded into a [`RoutingHint`] first; the hint then yields an
//! ordered candidate list, and [`select_target`] picks the first candidate
//! that exists.

use futures::future::join_all;
use std::sync::Arc;
use thiserror::Error;

use crate::db::{DocPath, DocumentStore, StoreError};
use crate::models::{Direction, IngestJob, RecordCollection, RecordRef};

#[derive(Debug, Error)]
pub enum ResolveError {
    /// No candidate record exists
    #[error("Target tx doc not found (uid={owner}, tried: {})", .tried.join(", "))]
    NotFound { owner: String, tried: Vec<String> },

    /// Routing fields cannot form a document address
    #[error("Invalid target address: {0}")]
    InvalidAddress(String),

    /// Store failed while probing candidates
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// How a job addresses its record, strongest hint first
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoutingHint {
    /// `docPath`: used as given, no lookup
    Explicit(DocPath),
    /// `docCollection`: one candidate
    Typed {
        owner: String,
        collection: RecordCollection,
        id: String,
    },
    /// Probe every collection in `preference` order
    Unqualified {
        owner: String,
        id: String,
        preference: [RecordCollection; 2],
    },
}

impl RoutingHint {
    /// Fold a validated job's routing fields into a hint
    ///
    /// `userId` on the job overrides the owner the event was scoped to. The
    /// record id is `docId` when given, else derived from `txKey`.
    pub fn from_job(job: &IngestJob, event_owner: &str) -> Result<Self, ResolveError> {
        let hints = &job.hints;

        if let Some(raw) = &hints.doc_path {
            return match DocPath::parse(raw) {
                Ok(path) if path.is_record() => Ok(RoutingHint::Explicit(path)),
                _ => Err(ResolveError::InvalidAddress(raw.clone())),
            };
        }

        let owner = hints
            .owner
            .clone()
            .unwrap_or_else(|| event_owner.to_string());
        let id = hints
            .doc_id
            .clone()
            .unwrap_or_else(|| fiinny_common::record_id_from_tx_key(&job.tx_key));

        if let Some(collection) = hints.doc_collection {
            return Ok(RoutingHint::Typed {
                owner,
                collection,
                id,
            });
        }

        if let Some(unknown) = &hints.unknown_collection {
            tracing::warn!(
                tx_key = %job.tx_key,
                doc_collection = %unknown,
                "Ignoring unknown docCollection hint"
            );
        }

        let preference = match hints.direction {
            Some(Direction::Credit) => [RecordCollection::Incomes, RecordCollection::Expenses],
            Some(Direction::Debit) | None => RecordCollection::PREFERENCE,
        };

        Ok(RoutingHint::Unqualified {
            owner,
            id,
            preference,
        })
    }

    /// Owner the candidates live under, if the hint names one
    pub fn owner(&self) -> Option<&str> {
        match self {
            RoutingHint::Explicit(path) => path.owner(),
            RoutingHint::Typed { owner, .. } | RoutingHint::Unqualified { owner, .. } => {
                Some(owner)
            }
        }
    }

    /// Candidate records in preference order
    pub fn candidates(&self) -> Result<Vec<RecordRef>, ResolveError> {
        match self {
            RoutingHint::Explicit(path) => Ok(vec![RecordRef::explicit(path.clone())]),
            RoutingHint::Typed {
                owner,
                collection,
                id,
            } => Ok(vec![record_ref(owner, *collection, id)?]),
            RoutingHint::Unqualified {
                owner,
                id,
                preference,
            } => preference
                .iter()
                .map(|collection| record_ref(owner, *collection, id))
                .collect(),
        }
    }
}

fn record_ref(owner: &str, collection: RecordCollection, id: &str) -> Result<RecordRef, ResolveError> {
    DocPath::from_segments(&["users", owner, collection.as_str(), id])
        .map(|path| RecordRef::in_collection(path, collection))
        .map_err(|_| ResolveError::InvalidAddress(format!("users/{}/{}/{}", owner, collection, id)))
}

/// Pick the first candidate that exists
///
/// `exists[i]` answers for `candidates[i]`; candidates are already in
/// preference order, so when several exist the earliest wins.
pub fn select_target(
    owner: &str,
    candidates: Vec<RecordRef>,
    exists: &[bool],
) -> Result<RecordRef, ResolveError> {
    let tried: Vec<String> = candidates.iter().map(|c| c.path.to_string()).collect();
    candidates
        .into_iter()
        .zip(exists.iter().copied())
        .find_map(|(candidate, found)| found.then_some(candidate))
        .ok_or_else(|| ResolveError::NotFound {
            owner: owner.to_string(),
            tried,
        })
}

/// Resolves routing hints against a document store
pub struct TargetResolver {
    store: Arc<dyn DocumentStore>,
}

impl TargetResolver {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    pub async fn resolve(&self, hint: &RoutingHint) -> Result<RecordRef, ResolveError> {
        if let RoutingHint::Explicit(path) = hint {
            tracing::debug!(target_path = %path, "Using explicit target path");
            return Ok(RecordRef::explicit(path.clone()));
        }

        let candidates = hint.candidates()?;

        // Probe all candidates concurrently
        let probes = join_all(candidates.iter().map(|c| self.store.exists(&c.path))).await;

        let mut exists = Vec::with_capacity(probes.len());
        for probe in probes {
            exists.push(probe?);
        }

        let owner = hint.owner().unwrap_or_default();
        let target = select_target(owner, candidates, &exists)?;

        if exists.iter().filter(|found| **found).count() > 1 {
            tracing::warn!(
                target_path = %target.path,
                "Record exists in more than one collection, using preferred"
            );
        }

        Ok(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{Document, MemoryDocumentStore};
    use serde_json::{json, Value};

    fn job(value: Value) -> IngestJob {
        match value {
            Value::Object(map) => IngestJob::from_document(&map).unwrap(),
            _ => panic!("job must be an object"),
        }
    }

    fn path(raw: &str) -> DocPath {
        DocPath::parse(raw).unwrap()
    }

    #[test]
    fn test_hint_explicit_path() {
        let hint = RoutingHint::from_job(
            &job(json!({
                "txKey": "abc", "text": "t", "amount": 1,
                "docPath": "users/u9/incomes/custom",
                "docCollection": "expenses"
            })),
            "u1",
        )
        .unwrap();
        assert_eq!(hint, RoutingHint::Explicit(path("users/u9/incomes/custom")));
    }

    #[test]
    fn test_hint_invalid_explicit_path() {
        for raw in [
            "users/u9",
            "users/u1/ingest_jobs/abc",
            "users/u1/expenses",
            "users/u1/expenses/x/notes/n",
        ] {
            let err = RoutingHint::from_job(
                &job(json!({ "txKey": "abc", "text": "t", "amount": 1, "docPath": raw })),
                "u1",
            )
            .unwrap_err();
            assert!(
                matches!(&err, ResolveError::InvalidAddress(addr) if addr == raw),
                "{} should be rejected, got {:?}",
                raw,
                err
            );
        }
    }

    #[test]
    fn test_hint_typed_uses_derived_id() {
        let hint = RoutingHint::from_job(
            &job(json!({ "txKey": "abc", "text": "t", "amount": 1, "docCollection": "incomes" })),
            "u1",
        )
        .unwrap();
        assert_eq!(
            hint,
            RoutingHint::Typed {
                owner: "u1".into(),
                collection: RecordCollection::Incomes,
                id: "ing_b885c8b".into(),
            }
        );
    }

    #[test]
    fn test_hint_owner_override_and_doc_id() {
        let hint = RoutingHint::from_job(
            &job(json!({
                "txKey": "abc", "text": "t", "amount": 1,
                "userId": "u2", "docId": "ing_custom"
            })),
            "u1",
        )
        .unwrap();
        let candidates = hint.candidates().unwrap();
        assert_eq!(candidates[0].path.as_str(), "users/u2/expenses/ing_custom");
        assert_eq!(candidates[1].path.as_str(), "users/u2/incomes/ing_custom");
    }

    #[test]
    fn test_credit_direction_probes_incomes_first() {
        let hint = RoutingHint::from_job(
            &job(json!({ "txKey": "abc", "text": "t", "amount": 1, "direction": "credit" })),
            "u1",
        )
        .unwrap();
        let candidates = hint.candidates().unwrap();
        assert_eq!(candidates[0].collection, Some(RecordCollection::Incomes));
    }

    #[test]
    fn test_unknown_collection_falls_back_to_unqualified() {
        let hint = RoutingHint::from_job(
            &job(json!({ "txKey": "abc", "text": "t", "amount": 1, "docCollection": "loans" })),
            "u1",
        )
        .unwrap();
        assert!(matches!(hint, RoutingHint::Unqualified { .. }));
    }

    #[test]
    fn test_owner_with_slash_is_invalid_address() {
        let hint = RoutingHint::from_job(
            &job(json!({ "txKey": "abc", "text": "t", "amount": 1 })),
            "u1/expenses",
        )
        .unwrap();
        assert!(matches!(
            hint.candidates(),
            Err(ResolveError::InvalidAddress(_))
        ));
    }

    #[test]
    fn test_select_target_prefers_first_existing() {
        let candidates = vec![
            RecordRef::in_collection(path("users/u/expenses/x"), RecordCollection::Expenses),
            RecordRef::in_collection(path("users/u/incomes/x"), RecordCollection::Incomes),
        ];
        let both = select_target("u", candidates.clone(), &[true, true]).unwrap();
        assert_eq!(both.collection, Some(RecordCollection::Expenses));

        let second = select_target("u", candidates.clone(), &[false, true]).unwrap();
        assert_eq!(second.collection, Some(RecordCollection::Incomes));

        let err = select_target("u", candidates, &[false, false]).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Target tx doc not found (uid=u, tried: users/u/expenses/x, users/u/incomes/x)"
        );
    }

    #[tokio::test]
    async fn test_resolve_both_exist_picks_expenses() {
        let store = Arc::new(MemoryDocumentStore::new());
        let id = fiinny_common::record_id_from_tx_key("abc");
        for collection in ["expenses", "incomes"] {
            store
                .put(
                    &path(&format!("users/u1/{}/{}", collection, id)),
                    Document::new(),
                )
                .await
                .unwrap();
        }

        let resolver = TargetResolver::new(store);
        let hint = RoutingHint::from_job(&job(json!({ "txKey": "abc", "text": "t", "amount": 1 })), "u1")
            .unwrap();
        let target = resolver.resolve(&hint).await.unwrap();
        assert_eq!(target.path.as_str(), "users/u1/expenses/ing_b885c8b");
    }

    #[tokio::test]
    async fn test_resolve_typed_missing_is_not_found() {
        let store = Arc::new(MemoryDocumentStore::new());
        store
            .put(&path("users/u1/expenses/ing_b885c8b"), Document::new())
            .await
            .unwrap();

        let resolver = TargetResolver::new(store);
        let hint = RoutingHint::Typed {
            owner: "u1".into(),
            collection: RecordCollection::Incomes,
            id: "ing_b885c8b".into(),
        };
        let err = resolver.resolve(&hint).await.unwrap_err();
        assert!(matches!(err, ResolveError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_resolve_explicit_skips_lookup() {
        let store = Arc::new(MemoryDocumentStore::new());
        let resolver = TargetResolver::new(store);
        let hint = RoutingHint::Explicit(path("users/u1/expenses/anything"));
        let target = resolver.resolve(&hint).await.unwrap();
        assert_eq!(target.collection, None);
        assert_eq!(target.path.as_str(), "users/u1/expenses/anything");
    }
}
