//! In-process store backed by `parking_lot` locks.

use super::{Claim, ClaimDecision, ClaimOutcome, JobStore, RouterStore};
use crate::jobs::{JobError, JobId, JobRecord, JobResult, TaskDescriptor, TrackingId};
use crate::router::StoredRouter;
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Default)]
struct Tables {
    jobs: HashMap<JobId, JobRecord>,
    keys: HashMap<String, JobId>,
    routers: HashMap<String, StoredRouter>,
}

/// In-memory job and router store.
///
/// Clones share the same tables. Every mutation happens under one write lock,
/// which makes `claim` and `finish` atomic with respect to each other.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    tables: Arc<RwLock<Tables>>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of job records.
    #[must_use]
    pub fn job_count(&self) -> usize {
        self.tables.read().jobs.len()
    }

    /// Snapshot of every job record.
    #[must_use]
    pub fn jobs(&self) -> Vec<JobRecord> {
        self.tables.read().jobs.values().cloned().collect()
    }

    fn update<F>(&self, id: JobId, f: F) -> JobResult<JobRecord>
    where
        F: FnOnce(&mut JobRecord),
    {
        let mut tables = self.tables.write();
        let record = tables
            .jobs
            .get_mut(&id)
            .ok_or_else(|| JobError::NotFound(id.to_string()))?;
        f(record);
        Ok(record.clone())
    }
}

#[async_trait]
impl JobStore for MemoryStore {
    async fn get(&self, id: JobId) -> JobResult<Option<JobRecord>> {
        Ok(self.tables.read().jobs.get(&id).cloned())
    }

    async fn find_by_key(&self, key: &str) -> JobResult<Option<JobRecord>> {
        let tables = self.tables.read();
        Ok(tables
            .keys
            .get(key)
            .and_then(|id| tables.jobs.get(id))
            .cloned())
    }

    async fn get_or_create(&self, key: &str, payload: &TaskDescriptor) -> JobResult<JobRecord> {
        let mut tables = self.tables.write();
        if let Some(record) = tables.keys.get(key).and_then(|id| tables.jobs.get(id)) {
            return Ok(record.clone());
        }

        let record = JobRecord::new(key, payload.clone());
        debug!(job_id = %record.id, key, "created job record");
        tables.keys.insert(key.to_string(), record.id);
        tables.jobs.insert(record.id, record.clone());
        Ok(record)
    }

    async fn claim(&self, id: JobId, claim: &Claim) -> JobResult<ClaimOutcome> {
        let mut tables = self.tables.write();
        let record = tables
            .jobs
            .get_mut(&id)
            .ok_or_else(|| JobError::NotFound(id.to_string()))?;

        Ok(match claim.decide(record) {
            ClaimDecision::Claim => {
                let prior = record.clone();
                claim.apply(record);
                ClaimOutcome::Claimed {
                    prior,
                    record: record.clone(),
                }
            }
            ClaimDecision::AlreadyQueued => ClaimOutcome::AlreadyQueued(record.clone()),
            ClaimDecision::Finished => ClaimOutcome::Finished(record.clone()),
        })
    }

    async fn release(&self, prior: &JobRecord, tracking_id: &TrackingId) -> JobResult<bool> {
        let mut tables = self.tables.write();
        match tables.jobs.get_mut(&prior.id) {
            Some(record) if record.is_queued_as(tracking_id) => {
                *record = prior.clone();
                record.updated_at = Utc::now();
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Err(JobError::NotFound(prior.id.to_string())),
        }
    }

    async fn finish(
        &self,
        id: JobId,
        tracking_id: &TrackingId,
        result: Value,
    ) -> JobResult<Option<JobRecord>> {
        let mut tables = self.tables.write();
        let record = tables
            .jobs
            .get_mut(&id)
            .ok_or_else(|| JobError::NotFound(id.to_string()))?;

        if !record.is_queued_as(tracking_id) {
            return Ok(None);
        }
        record.mark_finished(result);
        Ok(Some(record.clone()))
    }

    async fn reset(&self, id: JobId) -> JobResult<JobRecord> {
        self.update(id, JobRecord::reset)
    }

    async fn set_callback(&self, id: JobId, callback: Option<String>) -> JobResult<JobRecord> {
        self.update(id, |record| {
            record.callback_target = callback;
            record.updated_at = Utc::now();
        })
    }

    async fn set_payload(&self, id: JobId, payload: &TaskDescriptor) -> JobResult<JobRecord> {
        self.update(id, |record| {
            if record.is_idle() {
                record.payload = payload.clone();
                record.updated_at = Utc::now();
            }
        })
    }
}

#[async_trait]
impl RouterStore for MemoryStore {
    async fn load(&self, key: &str) -> JobResult<Option<StoredRouter>> {
        Ok(self.tables.read().routers.get(key).cloned())
    }

    async fn save(&self, router: &StoredRouter) -> JobResult<()> {
        let mut router = router.clone();
        router.updated_at = Utc::now();
        self.tables.write().routers.insert(router.key.clone(), router);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn seeded() -> (MemoryStore, JobRecord) {
        let store = MemoryStore::new();
        let record = store
            .get_or_create("add", &TaskDescriptor::new("add").arg(2).arg(3))
            .await
            .unwrap();
        (store, record)
    }

    #[tokio::test]
    async fn test_get_or_create_is_keyed() {
        let (store, first) = seeded().await;
        let second = store
            .get_or_create("add", &TaskDescriptor::new("other"))
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.payload.task, "add");
        assert_eq!(store.job_count(), 1);
        assert_eq!(store.find_by_key("add").await.unwrap().unwrap().id, first.id);
    }

    #[tokio::test]
    async fn test_claim_then_already_queued() {
        let (store, record) = seeded().await;

        let first = store
            .claim(record.id, &Claim::new(TrackingId::generate()))
            .await
            .unwrap();
        assert!(matches!(first, ClaimOutcome::Claimed { .. }));

        let second = store
            .claim(record.id, &Claim::new(TrackingId::generate()))
            .await
            .unwrap();
        assert!(matches!(second, ClaimOutcome::AlreadyQueued(_)));
    }

    #[tokio::test]
    async fn test_release_restores_prior_state() {
        let (store, record) = seeded().await;
        let tracking = TrackingId::generate();

        let ClaimOutcome::Claimed { prior, .. } = store
            .claim(record.id, &Claim::new(tracking.clone()))
            .await
            .unwrap()
        else {
            panic!("expected claim");
        };

        assert!(store.release(&prior, &tracking).await.unwrap());
        let stored = store.get(record.id).await.unwrap().unwrap();
        assert!(stored.is_idle());
        assert!(stored.external_job_id.is_none());
    }

    #[tokio::test]
    async fn test_finish_requires_current_submission() {
        let (store, record) = seeded().await;
        let tracking = TrackingId::generate();
        store
            .claim(record.id, &Claim::new(tracking.clone()))
            .await
            .unwrap();

        let stale = store
            .finish(record.id, &TrackingId::generate(), json!(0))
            .await
            .unwrap();
        assert!(stale.is_none());

        let finished = store.finish(record.id, &tracking, json!(5)).await.unwrap().unwrap();
        assert!(finished.is_finished());
        assert_eq!(finished.result, Some(json!(5)));
    }

    #[tokio::test]
    async fn test_finish_after_reset_is_discarded() {
        let (store, record) = seeded().await;
        let tracking = TrackingId::generate();
        store
            .claim(record.id, &Claim::new(tracking.clone()))
            .await
            .unwrap();
        store.reset(record.id).await.unwrap();

        assert!(store.finish(record.id, &tracking, json!(5)).await.unwrap().is_none());
        assert!(store.get(record.id).await.unwrap().unwrap().is_idle());
    }

    #[tokio::test]
    async fn test_set_payload_only_while_idle() {
        let (store, record) = seeded().await;
        let replaced = store
            .set_payload(record.id, &TaskDescriptor::new("add").arg(4))
            .await
            .unwrap();
        assert_eq!(replaced.payload.args, vec![json!(4)]);

        store
            .claim(record.id, &Claim::new(TrackingId::generate()))
            .await
            .unwrap();
        let kept = store
            .set_payload(record.id, &TaskDescriptor::new("sleep"))
            .await
            .unwrap();
        assert_eq!(kept.payload.task, "add");
    }

    #[tokio::test]
    async fn test_missing_record_is_not_found() {
        let store = MemoryStore::new();
        let err = store.reset(JobId::new()).await.unwrap_err();
        assert!(matches!(err, JobError::NotFound(_)));
    }
}
