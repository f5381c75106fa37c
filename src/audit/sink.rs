//! Result persistence

use super::Transcript;
use crate::models::Decision;
use crate::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Destination for completed deliberations. The orchestrator never waits on it.
#[async_trait]
pub trait ResultSink: Send + Sync {
    async fn persist(&self, request_id: Uuid, decision: &Decision, transcript: &Transcript) -> Result<()>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitteeRecord {
    pub request_id: Uuid,
    pub decision: Decision,
    pub transcript: Arc<Transcript>,
    pub transcript_hash: String,
    pub stored_at: DateTime<Utc>,
}

/// In-memory record store
#[derive(Clone, Default)]
pub struct InMemoryResultSink {
    records: Arc<RwLock<HashMap<Uuid, CommitteeRecord>>>,
}

impl InMemoryResultSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, request_id: Uuid) -> Option<CommitteeRecord> {
        let records = self.records.read().await;
        records.get(&request_id).cloned()
    }

    /// All stored request ids, oldest first
    pub async fn list(&self) -> Vec<Uuid> {
        let records = self.records.read().await;

        let mut items: Vec<_> = records
            .values()
            .map(|r| (r.request_id, r.stored_at))
            .collect();
        items.sort_by_key(|(_, stored_at)| *stored_at);

        items.into_iter().map(|(id, _)| id).collect()
    }

    /// Recompute the transcript hash and compare with the stored one.
    pub async fn verify_integrity(&self, request_id: Uuid) -> bool {
        let records = self.records.read().await;
        records
            .get(&request_id)
            .map(|r| r.transcript.integrity_hash() == r.transcript_hash)
            .unwrap_or(false)
    }
}

#[async_trait]
impl ResultSink for InMemoryResultSink {
    async fn persist(&self, request_id: Uuid, decision: &Decision, transcript: &Transcript) -> Result<()> {
        let record = CommitteeRecord {
            request_id,
            decision: decision.clone(),
            transcript_hash: transcript.integrity_hash(),
            transcript: Arc::new(transcript.clone()),
            stored_at: Utc::now(),
        };

        let mut records = self.records.write().await;
        records.insert(request_id, record);
        Ok(())
    }
}
