//! Service registrar and canonical event naming
//!
//! Capability providers register a name plus handlers keyed by action name.
//! Event types follow `<service>:<action>:<version>:<state>`; the parser
//! requires at least four segments and tolerates extras. The catalog is
//! parsed once at startup from a registry file of canonical strings, and
//! handlers fire only for the `requested` lifecycle state.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::action::{ActionEntry, ActionRegistry};
use crate::dlq::{DeadLetterRecord, DeadLetterSink};
use crate::error::CoreError;

/// Lifecycle state segment of an event type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventState {
    Requested,
    Started,
    Completed,
    Failed,
}

impl EventState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Requested => "requested",
            Self::Started => "started",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for EventState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventState {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "requested" => Ok(Self::Requested),
            "started" => Ok(Self::Started),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(CoreError::InvalidArgument(format!(
                "unknown event state \"{other}\""
            ))),
        }
    }
}

/// A parsed `<service>:<action>:<version>:<state>[:extra...]` event type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventName {
    pub service: String,
    pub action: String,
    pub version: String,
    pub state: EventState,
    /// Trailing segments beyond the required four
    pub extra: Vec<String>,
}

impl EventName {
    /// Parse a canonical event string. At least four segments are required;
    /// extra trailing segments are kept verbatim.
    pub fn parse(raw: &str) -> Result<Self, CoreError> {
        let segments: Vec<&str> = raw.split(':').collect();
        if segments.len() < 4 {
            return Err(CoreError::InvalidArgument(format!(
                "malformed event name \"{raw}\": need <service>:<action>:<version>:<state>"
            )));
        }
        if segments[..4].iter().any(|s| s.is_empty()) {
            return Err(CoreError::InvalidArgument(format!(
                "malformed event name \"{raw}\": empty segment"
            )));
        }

        Ok(Self {
            service: segments[0].to_string(),
            action: segments[1].to_string(),
            version: segments[2].to_string(),
            state: segments[3].parse()?,
            extra: segments[4..].iter().map(|s| s.to_string()).collect(),
        })
    }

    /// The canonical string form
    pub fn canonical(&self) -> String {
        let mut out = format!(
            "{}:{}:{}:{}",
            self.service, self.action, self.version, self.state
        );
        for segment in &self.extra {
            out.push(':');
            out.push_str(segment);
        }
        out
    }

    /// Build a canonical event string for one lifecycle state
    pub fn format(service: &str, action: &str, version: &str, state: EventState) -> String {
        format!("{service}:{action}:{version}:{state}")
    }
}

/// Catalog of canonical event types, keyed by `(action, state)`
#[derive(Debug, Default)]
pub struct EventCatalog {
    entries: HashMap<(String, EventState), String>,
}

impl EventCatalog {
    /// Parse a registry file: one canonical event string per line, with
    /// blank lines and `#` comments skipped.
    pub fn parse(contents: &str) -> Result<Self, CoreError> {
        let mut entries = HashMap::new();

        for line in contents.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let name = EventName::parse(line)?;
            entries.insert((name.action.clone(), name.state), line.to_string());
        }

        Ok(Self { entries })
    }

    /// The canonical event string for an action/state pair, if registered
    pub fn event_type_for(&self, action: &str, state: EventState) -> Option<&str> {
        self.entries
            .get(&(action.to_string(), state))
            .map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Configuration for event dispatch
#[derive(Debug, Clone)]
pub struct RegistrarConfig {
    /// Retries per handled event before dead-lettering
    pub retry_budget: u32,

    /// Pause between retry attempts
    pub retry_delay: Duration,
}

impl Default for RegistrarConfig {
    fn default() -> Self {
        Self {
            retry_budget: 2,
            retry_delay: Duration::from_millis(100),
        }
    }
}

/// Registers capability providers and routes requested events to them
pub struct ServiceRegistrar {
    registry: Arc<ActionRegistry>,
    catalog: EventCatalog,
    dead_letters: Option<Arc<DeadLetterSink>>,
    config: RegistrarConfig,
    providers: parking_lot::RwLock<HashMap<String, Vec<String>>>,
}

impl ServiceRegistrar {
    /// Create a registrar over the shared action registry and a parsed
    /// event catalog
    pub fn new(registry: Arc<ActionRegistry>, catalog: EventCatalog) -> Self {
        Self {
            registry,
            catalog,
            dead_letters: None,
            config: RegistrarConfig::default(),
            providers: parking_lot::RwLock::new(HashMap::new()),
        }
    }

    /// Attach the dead-letter sink for events that exhaust their retries
    pub fn with_dead_letters(mut self, sink: Arc<DeadLetterSink>) -> Self {
        self.dead_letters = Some(sink);
        self
    }

    /// Use a custom dispatch configuration
    pub fn with_config(mut self, config: RegistrarConfig) -> Self {
        self.config = config;
        self
    }

    /// Register a capability provider: its handlers become an action bucket
    /// named after the provider.
    pub fn register_provider(
        &self,
        name: &str,
        handlers: impl IntoIterator<Item = (String, ActionEntry)>,
    ) {
        let mut actions = Vec::new();
        for (action, entry) in handlers {
            self.registry.register(name, &action, entry);
            actions.push(action);
        }
        info!(provider = name, actions = actions.len(), "registered capability provider");
        self.providers.write().insert(name.to_string(), actions);
    }

    /// Action names a provider registered
    pub fn provider_actions(&self, name: &str) -> Vec<String> {
        self.providers.read().get(name).cloned().unwrap_or_default()
    }

    /// Canonical event string for an action/state pair
    pub fn event_type_for(&self, action: &str, state: EventState) -> Option<&str> {
        self.catalog.event_type_for(action, state)
    }

    /// Route one event to its provider handler.
    ///
    /// Only `requested` events invoke handlers; other lifecycle states are
    /// acknowledged without dispatch. Handler failures retry up to the
    /// configured budget, then dead-letter with the payload snapshot and
    /// final error.
    pub async fn handle_event(
        &self,
        event_type: &str,
        payload: &Map<String, Value>,
    ) -> Result<Option<Value>, CoreError> {
        let name = EventName::parse(event_type)?;

        if name.state != EventState::Requested {
            debug!(%event_type, "lifecycle event, nothing to dispatch");
            return Ok(None);
        }

        let entry = self.registry.lookup(&name.service, &name.action)?;
        let max_attempts = self.config.retry_budget + 1;
        let mut last_error = String::new();

        for attempt in 1..=max_attempts {
            // Event payloads feed both parameter sources.
            let params = entry.resolve(payload, payload)?;

            match entry.invoke(params).await {
                Ok(value) => return Ok(Some(value)),
                Err(err) => {
                    debug!(%event_type, attempt, "event handler failed: {}", err.message);
                    last_error = err.message.clone();
                    if !err.retryable {
                        break;
                    }
                }
            }

            if attempt < max_attempts {
                tokio::time::sleep(self.config.retry_delay).await;
            }
        }

        if let Some(sink) = &self.dead_letters {
            let record = DeadLetterRecord::new(
                event_type,
                Value::Object(payload.clone()),
                last_error.clone(),
            );
            if let Err(err) = sink.append(record).await {
                warn!(%event_type, "failed to dead-letter event: {err}");
            }
        }

        Err(CoreError::HandlerFailed(format!(
            "event {event_type}: {last_error}"
        )))
    }
}
