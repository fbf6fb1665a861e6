//! Bidirectional codec between externally-defined domain events and the
//! store's `(type, data, tags)` triple (spec §4.5). The store itself never
//! interprets `data`; encoding is entirely this module's concern.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::errors::StoreError;
use crate::query::DcbEvent;

/// A domain event a [`Mapper`] knows how to place on the wire: a stable
/// type identifier (the mapper's `topic_of`) plus the tags it was recorded
/// under.
pub trait DomainEvent {
    /// Stable class identifier used as `DcbEvent::type`. Mirrors
    /// `get_topic` in the Python original: a name that survives
    /// refactors better than `std::any::type_name`, so implementors
    /// should return a fixed string rather than deriving one.
    fn event_type(&self) -> &str;

    /// Tags this event should be recorded under.
    fn tags(&self) -> Vec<String>;
}

/// Pure function pair over `DomainEvent <-> (type, data, tags)`. A mapper
/// must round-trip every value it accepts: `to_domain(to_store(e)) == e`.
pub trait Mapper<E>: Send + Sync {
    fn to_store(&self, event: &E) -> Result<DcbEvent, StoreError>;
    fn to_domain(&self, record: &DcbEvent) -> Result<E, StoreError>;
}

/// Reference [`Mapper`] encoding `data` as JSON via `serde`. Encoding choice
/// is orthogonal to the store (spec §4.5); this is one admissible choice,
/// not the only one — any `serde`-compatible format plugs in the same way.
#[derive(Default)]
pub struct JsonMapper<E> {
    _marker: std::marker::PhantomData<fn() -> E>,
}

impl<E> JsonMapper<E> {
    pub fn new() -> Self {
        Self {
            _marker: std::marker::PhantomData,
        }
    }
}

impl<E> Mapper<E> for JsonMapper<E>
where
    E: DomainEvent + Serialize + DeserializeOwned + Send + Sync,
{
    fn to_store(&self, event: &E) -> Result<DcbEvent, StoreError> {
        let data = serde_json::to_vec(event)
            .map_err(|e| StoreError::Data(format!("failed to encode event: {e}")))?;
        Ok(DcbEvent::new(event.event_type(), data, event.tags()))
    }

    fn to_domain(&self, record: &DcbEvent) -> Result<E, StoreError> {
        serde_json::from_slice(&record.data)
            .map_err(|e| StoreError::Data(format!("failed to decode event: {e}")))
    }
}
