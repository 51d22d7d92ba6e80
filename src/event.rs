//! Canonical stored representation of a domain event.

use serde::Serialize;

use crate::kv::{Item, Value};
use crate::repository::{required_str, SchemaError};

/// A fact emitted by an aggregate, liftable into a store envelope.
///
/// Identity is assigned when the event is created, not when it is persisted,
/// so that re-emitting the same event is detectable at write time.
pub trait DomainEvent: Serialize {
    /// Globally-unique event identity.
    fn id(&self) -> &str;

    /// Event-type tag, unique among all event types of the application.
    fn name(&self) -> &'static str;
}

/// The envelope an event is persisted in: identity, name, a reference to the
/// emitting aggregate, and the serialized payload.
///
/// Envelopes are write-mostly: aggregates only ever lift events into them;
/// reading one back serves downstream pollers and tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventEnvelope {
    pub id: String,
    pub name: String,
    pub aggregate_id: String,
    pub aggregate_name: String,
    /// The event serialized to a JSON string. Opaque at this level.
    pub payload: String,
}

impl EventEnvelope {
    /// Lifts a domain event into its envelope.
    pub fn lift<E>(
        aggregate_name: &str,
        aggregate_id: &str,
        event: &E,
    ) -> Result<Self, serde_json::Error>
    where
        E: DomainEvent,
    {
        Ok(Self {
            id: event.id().to_owned(),
            name: event.name().to_owned(),
            aggregate_id: aggregate_id.to_owned(),
            aggregate_name: aggregate_name.to_owned(),
            payload: serde_json::to_string(event)?,
        })
    }

    pub(crate) fn to_item(&self) -> Item {
        Item::from([
            ("Id".to_owned(), Value::S(self.id.clone())),
            ("Name".to_owned(), Value::S(self.name.clone())),
            ("AggregateId".to_owned(), Value::S(self.aggregate_id.clone())),
            (
                "AggregateName".to_owned(),
                Value::S(self.aggregate_name.clone()),
            ),
            ("Payload".to_owned(), Value::S(self.payload.clone())),
        ])
    }

    pub(crate) fn from_item(item: &Item) -> Result<Self, SchemaError> {
        Ok(Self {
            id: required_str(item, "Id")?.to_owned(),
            name: required_str(item, "Name")?.to_owned(),
            aggregate_id: required_str(item, "AggregateId")?.to_owned(),
            aggregate_name: required_str(item, "AggregateName")?.to_owned(),
            payload: required_str(item, "Payload")?.to_owned(),
        })
    }
}
