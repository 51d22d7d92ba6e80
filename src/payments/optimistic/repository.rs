use async_trait::async_trait;

use crate::event::EventEnvelope;
use crate::kv::{Assignment, Item, KvStore, Value};
use crate::payments::Charge;
use crate::repository::{
    required_i64, required_str, AggregateSchema, OccRepository, RepositoryError, SchemaError,
};
use crate::Version;

use super::intent::{PaymentIntent, PaymentIntentState};

/// Mapping of the optimistic payment intent onto its store records.
pub struct PaymentIntentSchema;

impl AggregateSchema for PaymentIntentSchema {
    type Aggregate = PaymentIntent;

    const NAME: &'static str = "PaymentIntent";
    const KEY_TAG: &'static str = "PAYMENT_INTENT";

    fn id(aggregate: &PaymentIntent) -> &str {
        aggregate.id()
    }

    fn version(aggregate: &PaymentIntent) -> Version {
        aggregate.version()
    }

    fn to_item(aggregate: &PaymentIntent) -> Result<Item, SchemaError> {
        Ok(Item::from([
            ("Id".to_owned(), Value::S(aggregate.id().to_owned())),
            (
                "State".to_owned(),
                Value::S(aggregate.state().as_str().to_owned()),
            ),
            (
                "CustomerId".to_owned(),
                Value::S(aggregate.customer_id().to_owned()),
            ),
            ("Amount".to_owned(), Value::N(aggregate.amount())),
            (
                "Currency".to_owned(),
                Value::S(aggregate.currency().to_owned()),
            ),
            (
                "Charge".to_owned(),
                Charge::to_value(aggregate.charge_outcome())?,
            ),
            ("Version".to_owned(), Value::N(aggregate.version())),
        ]))
    }

    fn from_item(item: &Item) -> Result<PaymentIntent, SchemaError> {
        Ok(PaymentIntent::from_parts(
            required_str(item, "Id")?.to_owned(),
            PaymentIntentState::parse(required_str(item, "State")?)?,
            required_str(item, "CustomerId")?.to_owned(),
            required_i64(item, "Amount")?,
            required_str(item, "Currency")?.to_owned(),
            Charge::from_value(item.get("Charge"))?,
            required_i64(item, "Version")?,
        ))
    }

    fn update_assignments(aggregate: &PaymentIntent) -> Result<Vec<Assignment>, SchemaError> {
        Ok(vec![
            Assignment::Set(
                "State".to_owned(),
                Value::S(aggregate.state().as_str().to_owned()),
            ),
            Assignment::Set("Amount".to_owned(), Value::N(aggregate.amount())),
            Assignment::Set(
                "Charge".to_owned(),
                Charge::to_value(aggregate.charge_outcome())?,
            ),
        ])
    }

    fn pending_events(aggregate: &PaymentIntent) -> Result<Vec<EventEnvelope>, SchemaError> {
        aggregate
            .events()
            .iter()
            .map(|event| {
                EventEnvelope::lift(Self::NAME, aggregate.id(), event).map_err(SchemaError::from)
            })
            .collect()
    }
}

/// The optimistic payment intent repository over any [`KvStore`].
pub type KvPaymentIntentRepository<S> = OccRepository<S, PaymentIntentSchema>;

/// Storage capability for the optimistic payment intent.
#[async_trait]
pub trait PaymentIntentRepository: Send + Sync {
    async fn get(&self, payment_intent_id: &str) -> Result<Option<PaymentIntent>, RepositoryError>;

    async fn create(&self, payment_intent: &PaymentIntent) -> Result<(), RepositoryError>;

    async fn update(&self, payment_intent: &PaymentIntent) -> Result<(), RepositoryError>;
}

#[async_trait]
impl<S> PaymentIntentRepository for KvPaymentIntentRepository<S>
where
    S: KvStore,
{
    async fn get(&self, payment_intent_id: &str) -> Result<Option<PaymentIntent>, RepositoryError> {
        OccRepository::get(self, payment_intent_id).await
    }

    async fn create(&self, payment_intent: &PaymentIntent) -> Result<(), RepositoryError> {
        OccRepository::create(self, payment_intent).await
    }

    async fn update(&self, payment_intent: &PaymentIntent) -> Result<(), RepositoryError> {
        OccRepository::update(self, payment_intent).await
    }
}
