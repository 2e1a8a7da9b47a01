//! Dead-letter sink
//!
//! Append-only record of events that exceeded their retry budget: the event
//! name, a snapshot of the payload that was in play, and the final error.
//! Records live at `event_dlq:<id>` with their ids collected in the
//! `event_dlq` set; UUID v7 ids keep the stream readable in arrival order.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};
use uuid::Uuid;

use conductor_cache::{keys, Cache, PipelineCommand};

use crate::error::CoreError;

/// One terminally-failed event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadLetterRecord {
    pub id: Uuid,
    pub event_type: String,
    pub payload: Value,
    pub error: String,
    pub recorded_at: DateTime<Utc>,
}

impl DeadLetterRecord {
    /// Stamp a fresh record
    pub fn new(event_type: impl Into<String>, payload: Value, error: impl Into<String>) -> Self {
        Self {
            id: Uuid::now_v7(),
            event_type: event_type.into(),
            payload,
            error: error.into(),
            recorded_at: Utc::now(),
        }
    }
}

/// Append-only failure stream over the shared cache
pub struct DeadLetterSink {
    cache: Arc<dyn Cache>,
}

impl DeadLetterSink {
    /// Create a sink over the shared cache
    pub fn new(cache: Arc<dyn Cache>) -> Self {
        Self { cache }
    }

    /// Append one record; record body and index update ride one pipeline.
    pub async fn append(&self, record: DeadLetterRecord) -> Result<(), CoreError> {
        let id = record.id.to_string();
        let doc = serde_json::to_value(&record)
            .map_err(|e| CoreError::Internal(format!("encode dead letter: {e}")))?;

        self.cache
            .pipeline(vec![
                PipelineCommand::Set {
                    key: keys::event_dlq_entry(&id),
                    field: String::new(),
                    value: doc,
                    ttl: None,
                },
                PipelineCommand::SetAdd {
                    key: keys::event_dlq(),
                    members: vec![id.clone()],
                },
            ])
            .await
            .map_err(|e| CoreError::Internal(format!("append dead letter {id}: {e}")))?;

        debug!(event_type = %record.event_type, "dead-lettered event");
        Ok(())
    }

    /// All records in arrival order
    pub async fn entries(&self) -> Result<Vec<DeadLetterRecord>, CoreError> {
        let mut ids = self
            .cache
            .set_members(&keys::event_dlq())
            .await
            .map_err(|e| CoreError::Internal(format!("list dead letters: {e}")))?;
        ids.sort();

        if ids.is_empty() {
            return Ok(vec![]);
        }

        let commands = ids
            .iter()
            .map(|id| PipelineCommand::Get {
                key: keys::event_dlq_entry(id),
                field: String::new(),
            })
            .collect();
        let replies = self
            .cache
            .pipeline(commands)
            .await
            .map_err(|e| CoreError::Internal(format!("fetch dead letters: {e}")))?;

        let mut records = Vec::with_capacity(replies.len());
        for (id, reply) in ids.iter().zip(replies) {
            match reply.into_document() {
                Some(doc) => match serde_json::from_value(doc) {
                    Ok(record) => records.push(record),
                    Err(err) => warn!(record_id = %id, "skipping undecodable dead letter: {err}"),
                },
                None => warn!(record_id = %id, "indexed dead letter body missing"),
            }
        }
        Ok(records)
    }

    /// Number of recorded dead letters
    pub async fn len(&self) -> Result<usize, CoreError> {
        Ok(self
            .cache
            .set_members(&keys::event_dlq())
            .await
            .map_err(|e| CoreError::Internal(format!("count dead letters: {e}")))?
            .len())
    }

    /// Whether the stream is empty
    pub async fn is_empty(&self) -> Result<bool, CoreError> {
        Ok(self.len().await? == 0)
    }
}
