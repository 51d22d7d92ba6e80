use async_trait::async_trait;

use crate::kv::{Assignment, Condition, Item, Key, KvError, KvStore, Put, Update, Value};
use crate::lock::PessimisticLock;
use crate::payments::Charge;
use crate::repository::{required_i64, required_str, RepositoryError, SchemaError};

use super::intent::{PaymentIntent, PaymentIntentState};

const KEY_TAG: &str = "PAYMENT_INTENT";

/// Storage capability for the pessimistic payment intent.
#[async_trait]
pub trait PaymentIntentRepository: Send + Sync {
    async fn get(&self, payment_intent_id: &str) -> Result<Option<PaymentIntent>, RepositoryError>;

    async fn create(&self, payment_intent: &PaymentIntent) -> Result<(), RepositoryError>;

    async fn update(&self, payment_intent: &PaymentIntent) -> Result<(), RepositoryError>;
}

/// [`PaymentIntentRepository`] over any [`KvStore`], carrying the item lock
/// that serializes the charge path.
///
/// The record has no `Version`: writers are expected to hold the lock, so
/// updates are plain conditional writes gated on record existence.
pub struct KvPaymentIntentRepository<S> {
    store: S,
    table: String,
    lock: PessimisticLock<S>,
}

impl<S> KvPaymentIntentRepository<S>
where
    S: KvStore + Clone,
{
    pub fn new(store: S, table: impl Into<String>) -> Self {
        let table = table.into();
        Self {
            lock: PessimisticLock::new(store.clone(), table.clone()),
            store,
            table,
        }
    }

    /// Replaces the lock configuration (attribute name, timeout, clock).
    #[must_use]
    pub fn with_lock(mut self, lock: PessimisticLock<S>) -> Self {
        self.lock = lock;
        self
    }

    /// The lock scoping critical sections over payment intents. Use
    /// [`Self::key`] to address one.
    pub fn lock(&self) -> &PessimisticLock<S> {
        &self.lock
    }

    pub fn key(payment_intent_id: &str) -> Key {
        Key::partition("PK", format!("{KEY_TAG}#{payment_intent_id}")).and("SK", KEY_TAG)
    }
}

fn to_item(payment_intent: &PaymentIntent) -> Result<Item, SchemaError> {
    Ok(Item::from([
        ("Id".to_owned(), Value::S(payment_intent.id().to_owned())),
        (
            "State".to_owned(),
            Value::S(payment_intent.state().as_str().to_owned()),
        ),
        (
            "CustomerId".to_owned(),
            Value::S(payment_intent.customer_id().to_owned()),
        ),
        ("Amount".to_owned(), Value::N(payment_intent.amount())),
        (
            "Currency".to_owned(),
            Value::S(payment_intent.currency().to_owned()),
        ),
        (
            "Charge".to_owned(),
            Charge::to_value(payment_intent.charge_outcome())?,
        ),
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
    ))
}

#[async_trait]
impl<S> PaymentIntentRepository for KvPaymentIntentRepository<S>
where
    S: KvStore + Clone,
{
    async fn get(&self, payment_intent_id: &str) -> Result<Option<PaymentIntent>, RepositoryError> {
        let item = self
            .store
            .get(&self.table, &Self::key(payment_intent_id), true)
            .await?;
        item.as_ref().map(from_item).transpose().map_err(Into::into)
    }

    #[tracing::instrument(skip_all, fields(payment_intent_id = %payment_intent.id()), err)]
    async fn create(&self, payment_intent: &PaymentIntent) -> Result<(), RepositoryError> {
        let put = Put {
            key: Self::key(payment_intent.id()),
            item: to_item(payment_intent)?,
            condition: Some(Condition::AttributeNotExists("Id".to_owned())),
        };

        match self.store.put(&self.table, put).await {
            Ok(()) => Ok(()),
            Err(KvError::ConditionFailed) => Err(RepositoryError::IdentifierCollision(
                payment_intent.id().to_owned(),
            )),
            Err(err) => Err(err.into()),
        }
    }

    #[tracing::instrument(skip_all, fields(payment_intent_id = %payment_intent.id()), err)]
    async fn update(&self, payment_intent: &PaymentIntent) -> Result<(), RepositoryError> {
        let update = Update {
            key: Self::key(payment_intent.id()),
            assignments: vec![
                Assignment::Set(
                    "State".to_owned(),
                    Value::S(payment_intent.state().as_str().to_owned()),
                ),
                Assignment::Set("Amount".to_owned(), Value::N(payment_intent.amount())),
                Assignment::Set(
                    "Charge".to_owned(),
                    Charge::to_value(payment_intent.charge_outcome())?,
                ),
            ],
            condition: Some(Condition::AttributeExists("Id".to_owned())),
        };

        match self.store.update(&self.table, update).await {
            Ok(()) => Ok(()),
            Err(KvError::ConditionFailed) => {
                Err(RepositoryError::NotFound(payment_intent.id().to_owned()))
            }
            Err(err) => Err(err.into()),
        }
    }
}
