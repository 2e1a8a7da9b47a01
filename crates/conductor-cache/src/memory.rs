//! In-memory implementation of the cache contract
//!
//! Lock-free keyspace over a concurrent map, with lazy TTL expiry on access.
//! This is the backend used by tests and single-process deployments; it
//! mirrors the semantics networked backends must provide.

use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::mapref::entry::Entry as MapEntry;
use dashmap::DashMap;
use serde_json::Value;

use crate::store::{Cache, CacheError, PipelineCommand, PipelineReply};

/// What a single key holds
enum Payload {
    Document(Value),
    Hash(HashMap<String, Value>),
    Set(HashSet<String>),
}

impl Payload {
    fn kind_name(&self) -> &'static str {
        match self {
            Self::Document(_) => "document",
            Self::Hash(_) => "hash",
            Self::Set(_) => "set",
        }
    }
}

struct Entry {
    payload: Payload,
    expires_at: Option<Instant>,
}

impl Entry {
    fn expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Instant::now() >= at)
    }
}

/// In-memory [`Cache`] implementation
///
/// # Example
///
/// ```
/// use conductor_cache::MemoryCache;
///
/// let cache = MemoryCache::new();
/// ```
pub struct MemoryCache {
    entries: DashMap<String, Entry>,
}

impl MemoryCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Number of live keys (expired keys are swept on the way)
    pub fn len(&self) -> usize {
        self.entries.retain(|_, e| !e.expired());
        self.entries.len()
    }

    /// Whether no live keys remain
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop everything (for tests)
    pub fn clear(&self) {
        self.entries.clear();
    }

    fn wrong_kind(key: &str, payload: &Payload, wanted: &str) -> CacheError {
        CacheError::WrongKind {
            key: key.to_string(),
            detail: format!("holds a {}, operation needs a {wanted}", payload.kind_name()),
        }
    }

    /// Remove the entry if its TTL has lapsed, making the slot look absent.
    fn sweep(&self, key: &str) {
        if let Some(entry) = self.entries.get(key) {
            if entry.expired() {
                drop(entry);
                self.entries.remove(key);
            }
        }
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Cache for MemoryCache {
    async fn set(
        &self,
        key: &str,
        field: &str,
        value: &Value,
        ttl: Option<Duration>,
    ) -> Result<(), CacheError> {
        self.sweep(key);
        let expires_at = ttl.map(|d| Instant::now() + d);

        if field.is_empty() {
            // Plain write replaces whatever was there, TTL included.
            self.entries.insert(
                key.to_string(),
                Entry {
                    payload: Payload::Document(value.clone()),
                    expires_at,
                },
            );
            return Ok(());
        }

        match self.entries.entry(key.to_string()) {
            MapEntry::Occupied(mut occ) => {
                let entry = occ.get_mut();
                match &mut entry.payload {
                    Payload::Hash(fields) => {
                        fields.insert(field.to_string(), value.clone());
                        if expires_at.is_some() {
                            entry.expires_at = expires_at;
                        }
                        Ok(())
                    }
                    other => Err(Self::wrong_kind(key, other, "hash")),
                }
            }
            MapEntry::Vacant(vac) => {
                let mut fields = HashMap::new();
                fields.insert(field.to_string(), value.clone());
                vac.insert(Entry {
                    payload: Payload::Hash(fields),
                    expires_at,
                });
                Ok(())
            }
        }
    }

    async fn get(&self, key: &str, field: &str) -> Result<Value, CacheError> {
        self.sweep(key);
        let entry = self
            .entries
            .get(key)
            .ok_or_else(|| CacheError::KeyNotFound(key.to_string()))?;

        match (&entry.payload, field.is_empty()) {
            (Payload::Document(value), true) => Ok(value.clone()),
            (Payload::Hash(fields), false) => fields
                .get(field)
                .cloned()
                .ok_or_else(|| CacheError::KeyNotFound(format!("{key}:{field}"))),
            (payload, wants_plain) => Err(Self::wrong_kind(
                key,
                payload,
                if wants_plain { "document" } else { "hash" },
            )),
        }
    }

    async fn delete(&self, key: &str, field: &str) -> Result<(), CacheError> {
        self.sweep(key);
        if field.is_empty() {
            self.entries.remove(key);
            return Ok(());
        }

        if let Some(mut entry) = self.entries.get_mut(key) {
            if let Payload::Hash(fields) = &mut entry.payload {
                fields.remove(field);
                let empty = fields.is_empty();
                drop(entry);
                if empty {
                    self.entries.remove(key);
                }
            }
        }
        Ok(())
    }

    async fn set_add(&self, key: &str, members: &[String]) -> Result<(), CacheError> {
        self.sweep(key);
        match self.entries.entry(key.to_string()) {
            MapEntry::Occupied(mut occ) => {
                let entry = occ.get_mut();
                match &mut entry.payload {
                    Payload::Set(set) => {
                        set.extend(members.iter().cloned());
                        Ok(())
                    }
                    other => Err(Self::wrong_kind(key, other, "set")),
                }
            }
            MapEntry::Vacant(vac) => {
                vac.insert(Entry {
                    payload: Payload::Set(members.iter().cloned().collect()),
                    expires_at: None,
                });
                Ok(())
            }
        }
    }

    async fn set_remove(&self, key: &str, members: &[String]) -> Result<(), CacheError> {
        self.sweep(key);
        if let Some(mut entry) = self.entries.get_mut(key) {
            if let Payload::Set(set) = &mut entry.payload {
                for member in members {
                    set.remove(member);
                }
            }
        }
        Ok(())
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>, CacheError> {
        self.sweep(key);
        match self.entries.get(key) {
            Some(entry) => match &entry.payload {
                Payload::Set(set) => Ok(set.iter().cloned().collect()),
                other => Err(Self::wrong_kind(key, other, "set")),
            },
            None => Ok(vec![]),
        }
    }

    async fn set_intersect(&self, keys: &[String]) -> Result<Vec<String>, CacheError> {
        let mut result: Option<HashSet<String>> = None;

        for key in keys {
            let members: HashSet<String> = self.set_members(key).await?.into_iter().collect();
            result = Some(match result {
                None => members,
                Some(acc) => acc.intersection(&members).cloned().collect(),
            });
            if result.as_ref().is_some_and(HashSet::is_empty) {
                break;
            }
        }

        Ok(result.unwrap_or_default().into_iter().collect())
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: &Value,
        ttl: Option<Duration>,
    ) -> Result<bool, CacheError> {
        self.sweep(key);
        match self.entries.entry(key.to_string()) {
            MapEntry::Occupied(_) => Ok(false),
            MapEntry::Vacant(vac) => {
                vac.insert(Entry {
                    payload: Payload::Document(value.clone()),
                    expires_at: ttl.map(|d| Instant::now() + d),
                });
                Ok(true)
            }
        }
    }

    async fn pipeline(
        &self,
        commands: Vec<PipelineCommand>,
    ) -> Result<Vec<PipelineReply>, CacheError> {
        let mut replies = Vec::with_capacity(commands.len());

        for command in commands {
            let reply = match command {
                PipelineCommand::Set {
                    key,
                    field,
                    value,
                    ttl,
                } => {
                    self.set(&key, &field, &value, ttl).await?;
                    PipelineReply::Done
                }
                PipelineCommand::Get { key, field } => match self.get(&key, &field).await {
                    Ok(value) => PipelineReply::Document(Some(value)),
                    Err(err) if err.is_not_found() => PipelineReply::Document(None),
                    Err(err) => return Err(err),
                },
                PipelineCommand::Delete { key, field } => {
                    self.delete(&key, &field).await?;
                    PipelineReply::Done
                }
                PipelineCommand::SetAdd { key, members } => {
                    self.set_add(&key, &members).await?;
                    PipelineReply::Done
                }
                PipelineCommand::SetRemove { key, members } => {
                    self.set_remove(&key, &members).await?;
                    PipelineReply::Done
                }
            };
            replies.push(reply);
        }

        Ok(replies)
    }
}
