//! Optimistic, versioned aggregate repository.
//!
//! An aggregate record and the events it emitted since load are persisted in
//! one atomic transaction. Concurrent mutators are detected by a conditional
//! check on the `Version` attribute and rejected with
//! [`RepositoryError::OptimisticLock`]; retry policy belongs to callers.

use std::marker::PhantomData;

use crate::event::EventEnvelope;
use crate::kv::{
    Assignment, CancellationCode, Condition, Item, Key, KvError, KvStore, Put, TransactItem,
    Update, Value,
};
use crate::Version;

/// Failure to map between an aggregate and its stored record.
#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("missing attribute {0}")]
    MissingAttribute(&'static str),
    #[error("attribute {0} has an unexpected type")]
    UnexpectedType(&'static str),
    #[error("invalid attribute value: {0}")]
    Invalid(String),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    /// `create` found a record under the same `Id`.
    #[error("aggregate {0} already exists")]
    IdentifierCollision(String),
    /// `update` found no record at all.
    #[error("aggregate {0} not found")]
    NotFound(String),
    /// The stored `Version` no longer matches the in-memory aggregate's.
    #[error("aggregate {0} was concurrently modified")]
    OptimisticLock(String),
    /// An event with the same id is already recorded under this aggregate.
    #[error("event {0} is already recorded for its aggregate")]
    EventCollision(String),
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error(transparent)]
    Store(#[from] KvError),
}

/// How one aggregate type maps onto its store records.
///
/// The aggregate record lives at `PK = "<KEY_TAG>#<id>", SK = "<KEY_TAG>"`;
/// each event envelope is a sibling item under the same partition at
/// `SK = "EVENT#<event_id>"`, so that the aggregate and its events land in
/// one transaction scope.
pub trait AggregateSchema {
    type Aggregate: Send + Sync;

    /// Aggregate-type tag recorded on event envelopes.
    const NAME: &'static str;
    /// Discriminator embedded in the partition key.
    const KEY_TAG: &'static str;

    fn id(aggregate: &Self::Aggregate) -> &str;

    /// The version the aggregate was loaded at (0 for a fresh aggregate).
    /// Never mutated by the repository; callers observe a successful update
    /// by reloading.
    fn version(aggregate: &Self::Aggregate) -> Version;

    /// Non-key attributes of the full record, written at create time.
    fn to_item(aggregate: &Self::Aggregate) -> Result<Item, SchemaError>;

    fn from_item(item: &Item) -> Result<Self::Aggregate, SchemaError>;

    /// The attributes an update rewrites, excluding `Version` (owned by the
    /// repository).
    fn update_assignments(aggregate: &Self::Aggregate) -> Result<Vec<Assignment>, SchemaError>;

    /// Envelopes for the events emitted since the aggregate was loaded.
    fn pending_events(aggregate: &Self::Aggregate) -> Result<Vec<EventEnvelope>, SchemaError>;

    fn key(aggregate_id: &str) -> Key {
        Key::partition("PK", format!("{}#{}", Self::KEY_TAG, aggregate_id)).and("SK", Self::KEY_TAG)
    }

    fn event_key(aggregate_id: &str, event_id: &str) -> Key {
        Key::partition("PK", format!("{}#{}", Self::KEY_TAG, aggregate_id))
            .and("SK", format!("EVENT#{event_id}"))
    }
}

/// Repository for one aggregate type over any [`KvStore`].
pub struct OccRepository<S, R> {
    store: S,
    table: String,
    _schema: PhantomData<R>,
}

impl<S, R> Clone for OccRepository<S, R>
where
    S: Clone,
{
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            table: self.table.clone(),
            _schema: PhantomData,
        }
    }
}

impl<S, R> OccRepository<S, R>
where
    S: KvStore,
    R: AggregateSchema,
{
    pub fn new(store: S, table: impl Into<String>) -> Self {
        Self {
            store,
            table: table.into(),
            _schema: PhantomData,
        }
    }

    /// Loads the aggregate at its current version, with no pending events.
    ///
    /// Always a strongly-consistent read: stale reads feed stale versions
    /// into the next update and turn every save into a conflict.
    pub async fn get(&self, aggregate_id: &str) -> Result<Option<R::Aggregate>, RepositoryError> {
        let item = self.store.get(&self.table, &R::key(aggregate_id), true).await?;
        item.as_ref().map(R::from_item).transpose().map_err(Into::into)
    }

    /// Writes the full record, conditional on no record existing under the
    /// same `Id`.
    #[tracing::instrument(skip_all, fields(aggregate_id = %R::id(aggregate)), err)]
    pub async fn create(&self, aggregate: &R::Aggregate) -> Result<(), RepositoryError> {
        let put = Put {
            key: R::key(R::id(aggregate)),
            item: R::to_item(aggregate)?,
            condition: Some(Condition::AttributeNotExists("Id".to_owned())),
        };

        match self.store.put(&self.table, put).await {
            Ok(()) => Ok(()),
            Err(KvError::ConditionFailed) => {
                Err(RepositoryError::IdentifierCollision(R::id(aggregate).to_owned()))
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Atomically advances the record from the aggregate's loaded version to
    /// the next one, rewriting the changed attributes and appending every
    /// pending event.
    ///
    /// The aggregate update is the first operation of the transaction; event
    /// inserts follow in emission order. On cancellation, the reason at
    /// position 0 distinguishes a missing record ([`RepositoryError::NotFound`])
    /// from a version conflict ([`RepositoryError::OptimisticLock`]) by
    /// whether the store saw a prior item; a failed event insert maps to
    /// [`RepositoryError::EventCollision`] for that event.
    #[tracing::instrument(skip_all, fields(aggregate_id = %R::id(aggregate)), err)]
    pub async fn update(&self, aggregate: &R::Aggregate) -> Result<(), RepositoryError> {
        let aggregate_id = R::id(aggregate);
        let version = R::version(aggregate);

        let mut assignments = R::update_assignments(aggregate)?;
        assignments.push(Assignment::Set("Version".to_owned(), Value::N(version + 1)));

        let mut items = vec![TransactItem::Update(Update {
            key: R::key(aggregate_id),
            assignments,
            condition: Some(
                Condition::AttributeExists("Id".to_owned())
                    .and(Condition::Equals("Version".to_owned(), Value::N(version))),
            ),
        })];

        let envelopes = R::pending_events(aggregate)?;
        for envelope in &envelopes {
            items.push(TransactItem::Put(Put {
                key: R::event_key(aggregate_id, &envelope.id),
                item: envelope.to_item(),
                condition: Some(Condition::AttributeNotExists("Id".to_owned())),
            }));
        }

        match self.store.transact_write(&self.table, items).await {
            Ok(()) => Ok(()),
            Err(KvError::TransactionCancelled(reasons)) => {
                Err(self.cancellation_error(aggregate_id, &envelopes, reasons))
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Reads one event envelope back. Serves downstream pollers and tests;
    /// aggregates themselves never read events.
    pub async fn get_event(
        &self,
        aggregate_id: &str,
        event_id: &str,
    ) -> Result<Option<EventEnvelope>, RepositoryError> {
        let item = self
            .store
            .get(&self.table, &R::event_key(aggregate_id, event_id), true)
            .await?;
        item.as_ref()
            .map(EventEnvelope::from_item)
            .transpose()
            .map_err(Into::into)
    }

    fn cancellation_error(
        &self,
        aggregate_id: &str,
        envelopes: &[EventEnvelope],
        reasons: Vec<crate::kv::CancellationReason>,
    ) -> RepositoryError {
        if let Some(first) = reasons.first() {
            if first.code == CancellationCode::ConditionFailed {
                return if first.item.is_none() {
                    RepositoryError::NotFound(aggregate_id.to_owned())
                } else {
                    RepositoryError::OptimisticLock(aggregate_id.to_owned())
                };
            }
        }

        for (envelope, reason) in envelopes.iter().zip(reasons.iter().skip(1)) {
            if reason.code == CancellationCode::ConditionFailed {
                return RepositoryError::EventCollision(envelope.id.clone());
            }
        }

        RepositoryError::Store(KvError::TransactionCancelled(reasons))
    }
}

pub fn required_str<'a>(item: &'a Item, attribute: &'static str) -> Result<&'a str, SchemaError> {
    item.get(attribute)
        .ok_or(SchemaError::MissingAttribute(attribute))?
        .as_s()
        .ok_or(SchemaError::UnexpectedType(attribute))
}

pub fn required_i64(item: &Item, attribute: &'static str) -> Result<i64, SchemaError> {
    item.get(attribute)
        .ok_or(SchemaError::MissingAttribute(attribute))?
        .as_n()
        .ok_or(SchemaError::UnexpectedType(attribute))
}
