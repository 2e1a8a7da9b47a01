//! Cache-backed pattern store
//!
//! Owns pattern records and their four index sets (`pattern:all`, by
//! category, by origin, by author). Writes go through a single pipelined
//! batch so record and indexes stay consistent; listing intersects the
//! relevant sets in the cache.

use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use conductor_cache::{keys, Cache, PipelineCommand};

use super::{validate, Pattern, PatternOrigin};
use crate::error::CoreError;

/// Filter for listing patterns; unset fields don't constrain.
#[derive(Debug, Clone, Default)]
pub struct PatternFilter {
    pub category: Option<String>,
    pub origin: Option<PatternOrigin>,
    pub created_by: Option<String>,
}

impl PatternFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_category(mut self, category: &str) -> Self {
        self.category = Some(category.to_string());
        self
    }

    pub fn with_origin(mut self, origin: PatternOrigin) -> Self {
        self.origin = Some(origin);
        self
    }

    pub fn with_author(mut self, author: &str) -> Self {
        self.created_by = Some(author.to_string());
        self
    }

    fn index_keys(&self) -> Vec<String> {
        let mut index_keys = Vec::new();
        if let Some(category) = &self.category {
            index_keys.push(keys::pattern_category(category));
        }
        if let Some(origin) = &self.origin {
            index_keys.push(keys::pattern_origin(origin.as_str()));
        }
        if let Some(author) = &self.created_by {
            index_keys.push(keys::pattern_author(author));
        }
        index_keys
    }
}

/// Store for pattern records and their indexes
pub struct PatternStore {
    cache: Arc<dyn Cache>,
}

impl PatternStore {
    /// Create a store over the shared cache
    pub fn new(cache: Arc<dyn Cache>) -> Self {
        Self { cache }
    }

    /// Validate and persist a pattern, updating every index set in one
    /// pipelined batch. Creation time, usage statistics and version history
    /// are preserved across updates; the version is bumped on each one.
    #[instrument(skip(self, pattern), fields(pattern_name = %pattern.name))]
    pub async fn store(&self, mut pattern: Pattern) -> Result<Pattern, CoreError> {
        validate(&pattern)?;

        if pattern.id.is_empty() {
            pattern.id = Uuid::now_v7().to_string();
        }

        let record_key = keys::pattern(&pattern.id);
        let existing = match self.cache.get(&record_key, "").await {
            Ok(doc) => match serde_json::from_value::<Pattern>(doc) {
                Ok(prev) => Some(prev),
                Err(err) => {
                    warn!(pattern_id = %pattern.id, "existing record undecodable, overwriting: {err}");
                    None
                }
            },
            Err(err) if err.is_not_found() => None,
            Err(err) => return Err(CoreError::from_cache(err, &record_key)),
        };

        let now = Utc::now();
        let mut commands = Vec::new();

        if let Some(prev) = &existing {
            pattern.created_at = prev.created_at;
            pattern.version = prev.version + 1;
            pattern.usage_count = prev.usage_count;
            pattern.success_rate = prev.success_rate;

            // Retract stale index memberships before re-adding below.
            if prev.category != pattern.category && !prev.category.is_empty() {
                commands.push(PipelineCommand::SetRemove {
                    key: keys::pattern_category(&prev.category),
                    members: vec![pattern.id.clone()],
                });
            }
            if prev.origin != pattern.origin {
                commands.push(PipelineCommand::SetRemove {
                    key: keys::pattern_origin(prev.origin.as_str()),
                    members: vec![pattern.id.clone()],
                });
            }
            let prev_authored = prev.origin == PatternOrigin::User && !prev.created_by.is_empty();
            let still_authored =
                pattern.origin == PatternOrigin::User && pattern.created_by == prev.created_by;
            if prev_authored && !still_authored {
                commands.push(PipelineCommand::SetRemove {
                    key: keys::pattern_author(&prev.created_by),
                    members: vec![pattern.id.clone()],
                });
            }
        } else {
            pattern.created_at = now;
        }
        pattern.updated_at = now;

        let doc = serde_json::to_value(&pattern)
            .map_err(|e| CoreError::Internal(format!("encode pattern: {e}")))?;

        commands.push(PipelineCommand::Set {
            key: record_key,
            field: String::new(),
            value: doc,
            ttl: None,
        });
        commands.push(PipelineCommand::SetAdd {
            key: keys::pattern_all(),
            members: vec![pattern.id.clone()],
        });
        if !pattern.category.is_empty() {
            commands.push(PipelineCommand::SetAdd {
                key: keys::pattern_category(&pattern.category),
                members: vec![pattern.id.clone()],
            });
        }
        commands.push(PipelineCommand::SetAdd {
            key: keys::pattern_origin(pattern.origin.as_str()),
            members: vec![pattern.id.clone()],
        });
        if pattern.origin == PatternOrigin::User && !pattern.created_by.is_empty() {
            commands.push(PipelineCommand::SetAdd {
                key: keys::pattern_author(&pattern.created_by),
                members: vec![pattern.id.clone()],
            });
        }

        self.cache
            .pipeline(commands)
            .await
            .map_err(|e| CoreError::Internal(format!("persist pattern {}: {e}", pattern.id)))?;

        debug!(pattern_id = %pattern.id, version = pattern.version, "stored pattern");
        Ok(pattern)
    }

    /// Fetch one pattern record
    pub async fn get(&self, id: &str) -> Result<Pattern, CoreError> {
        let doc = self
            .cache
            .get(&keys::pattern(id), "")
            .await
            .map_err(|e| CoreError::from_cache(e, &format!("pattern {id}")))?;

        serde_json::from_value(doc)
            .map_err(|e| CoreError::Internal(format!("decode pattern {id}: {e}")))
    }

    /// Remove a pattern record and retract all its index memberships
    pub async fn delete(&self, id: &str) -> Result<(), CoreError> {
        let pattern = self.get(id).await?;
        let members = vec![pattern.id.clone()];

        let mut commands = vec![
            PipelineCommand::Delete {
                key: keys::pattern(id),
                field: String::new(),
            },
            PipelineCommand::SetRemove {
                key: keys::pattern_all(),
                members: members.clone(),
            },
            PipelineCommand::SetRemove {
                key: keys::pattern_origin(pattern.origin.as_str()),
                members: members.clone(),
            },
        ];
        if !pattern.category.is_empty() {
            commands.push(PipelineCommand::SetRemove {
                key: keys::pattern_category(&pattern.category),
                members: members.clone(),
            });
        }
        if pattern.origin == PatternOrigin::User && !pattern.created_by.is_empty() {
            commands.push(PipelineCommand::SetRemove {
                key: keys::pattern_author(&pattern.created_by),
                members,
            });
        }

        self.cache
            .pipeline(commands)
            .await
            .map_err(|e| CoreError::Internal(format!("delete pattern {id}: {e}")))?;
        Ok(())
    }

    /// List patterns matching every set filter.
    ///
    /// Zero filters reads the all-patterns set, one filter reads that index,
    /// several intersect in the cache. Bodies come back in one pipelined
    /// batch; a record that fails to decode is logged and skipped.
    #[instrument(skip(self))]
    pub async fn list(&self, filter: &PatternFilter) -> Result<Vec<Pattern>, CoreError> {
        let index_keys = filter.index_keys();

        let mut ids = match index_keys.len() {
            0 => self.cache.set_members(&keys::pattern_all()).await,
            1 => self.cache.set_members(&index_keys[0]).await,
            _ => self.cache.set_intersect(&index_keys).await,
        }
        .map_err(|e| CoreError::Internal(format!("list patterns: {e}")))?;

        // UUID v7 ids sort by creation time.
        ids.sort();
        if ids.is_empty() {
            return Ok(vec![]);
        }

        let commands = ids
            .iter()
            .map(|id| PipelineCommand::Get {
                key: keys::pattern(id),
                field: String::new(),
            })
            .collect();
        let replies = self
            .cache
            .pipeline(commands)
            .await
            .map_err(|e| CoreError::Internal(format!("fetch pattern bodies: {e}")))?;

        let mut patterns = Vec::with_capacity(replies.len());
        for (id, reply) in ids.iter().zip(replies) {
            match reply.into_document() {
                Some(doc) => match serde_json::from_value::<Pattern>(doc) {
                    Ok(pattern) => patterns.push(pattern),
                    Err(err) => warn!(pattern_id = %id, "skipping undecodable pattern: {err}"),
                },
                None => warn!(pattern_id = %id, "indexed pattern body missing"),
            }
        }

        Ok(patterns)
    }

    /// Fold one execution outcome into the pattern's statistics.
    ///
    /// `usage_count` grows by one and `success_rate` is updated as a
    /// streaming mean over all recorded outcomes.
    pub async fn record_outcome(&self, id: &str, success: bool) -> Result<(), CoreError> {
        let mut pattern = self.get(id).await?;

        let n = pattern.usage_count + 1;
        let sample = if success { 1.0 } else { 0.0 };
        pattern.success_rate =
            (pattern.success_rate * (n as f64 - 1.0) + sample) / n as f64;
        pattern.usage_count = n;
        pattern.updated_at = Utc::now();

        let doc: Value = serde_json::to_value(&pattern)
            .map_err(|e| CoreError::Internal(format!("encode pattern {id}: {e}")))?;
        self.cache
            .set(&keys::pattern(id), "", &doc, None)
            .await
            .map_err(|e| CoreError::Internal(format!("persist statistics for {id}: {e}")))
    }
}
