//! Event and Batch - the unit of delivery
//!
//! Events are immutable JSON records. A `Batch` is an ordered, cheap-to-clone
//! sequence of events; `EventId` is an event's position in that batch.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;

use crate::ContractError;

/// Field holding the logstash-style tag list
const TAGS_FIELD: &str = "tags";

/// A single structured record.
///
/// Keeps the serialized bytes it was created from so the raw payload can be
/// shipped without re-encoding.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    payload: Bytes,
    fields: Map<String, Value>,
    tags: Vec<String>,
}

impl Event {
    /// Create an event from a JSON object
    pub fn from_json(value: Value) -> Result<Self, ContractError> {
        let Value::Object(fields) = value else {
            return Err(ContractError::invalid_event("event must be a JSON object"));
        };
        let payload = serde_json::to_vec(&fields)
            .map_err(|e| ContractError::invalid_event(format!("serialize error: {e}")))?;
        Ok(Self::assemble(Bytes::from(payload), fields))
    }

    /// Parse an event from raw JSON bytes, keeping the bytes as payload
    pub fn from_slice(raw: &[u8]) -> Result<Self, ContractError> {
        let value: Value = serde_json::from_slice(raw)
            .map_err(|e| ContractError::invalid_event(format!("JSON parse error: {e}")))?;
        let Value::Object(fields) = value else {
            return Err(ContractError::invalid_event("event must be a JSON object"));
        };
        Ok(Self::assemble(Bytes::copy_from_slice(raw), fields))
    }

    fn assemble(payload: Bytes, fields: Map<String, Value>) -> Self {
        let tags = fields
            .get(TAGS_FIELD)
            .and_then(Value::as_array)
            .map(|tags| {
                tags.iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        Self {
            payload,
            fields,
            tags,
        }
    }

    /// Raw payload bytes
    pub fn raw(&self) -> &Bytes {
        &self.payload
    }

    /// Look up a top-level field
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Whether a non-null field with this name exists
    pub fn has(&self, name: &str) -> bool {
        self.field(name).is_some_and(|v| !v.is_null())
    }

    /// Field value rendered as a string.
    ///
    /// Strings are returned verbatim, scalars via their JSON text and
    /// containers as compact JSON. `null` counts as missing.
    pub fn value_as_string(&self, name: &str) -> Option<String> {
        match self.field(name)? {
            Value::Null => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Tags attached to this event
    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    /// Whether the event carries the given tag
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }
}

/// Position of an event within the batch it was submitted with
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(usize);

impl EventId {
    /// Create an id for the given batch position
    #[inline]
    pub fn new(index: usize) -> Self {
        Self(index)
    }

    /// Position in the original batch
    #[inline]
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Ordered, immutable group of events delivered together.
///
/// Cloning only bumps a reference count.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Batch {
    events: Arc<[Event]>,
}

impl Batch {
    /// Create a batch from events in submission order
    pub fn new(events: Vec<Event>) -> Self {
        Self {
            events: events.into(),
        }
    }

    /// Number of events
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Whether the batch has no events
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Event at the given identity
    pub fn get(&self, id: EventId) -> Option<&Event> {
        self.events.get(id.index())
    }

    /// All events in submission order
    pub fn events(&self) -> &[Event] {
        &self.events
    }

    /// Identities of every event, in order
    pub fn ids(&self) -> Vec<EventId> {
        (0..self.events.len()).map(EventId::new).collect()
    }

    /// Iterate over (identity, event) pairs
    pub fn iter(&self) -> impl Iterator<Item = (EventId, &Event)> {
        self.events
            .iter()
            .enumerate()
            .map(|(i, event)| (EventId::new(i), event))
    }
}

impl From<Vec<Event>> for Batch {
    fn from(events: Vec<Event>) -> Self {
        Self::new(events)
    }
}

impl FromIterator<Event> for Batch {
    fn from_iter<I: IntoIterator<Item = Event>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}
