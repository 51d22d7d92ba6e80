//! Typed facade over a DynamoDB-class key-value store.
//!
//! This module is the only place the crate talks to a store. Everything
//! above it (lock, repositories) is written against the [`KvStore`] trait
//! and the typed operation vocabulary below; concrete backends translate
//! that vocabulary into their own wire format.

use std::collections::HashMap;
use std::fmt;
use std::ops::Deref;

use async_trait::async_trait;

#[cfg(feature = "dynamodb")]
pub mod dynamodb;
pub mod memory;

/// Upper bound on the number of operations in one transactional batch,
/// matching the service-side limit of DynamoDB-class stores.
pub const MAX_TRANSACT_ITEMS: usize = 100;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// A single scalar attribute value.
///
/// The subset of store types this toolkit persists. Numbers are signed
/// 64-bit integers; stores that transport numbers as strings convert at the
/// boundary.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Value {
    S(String),
    N(i64),
    Bool(bool),
    Null,
}

impl Value {
    pub fn as_s(&self) -> Option<&str> {
        match self {
            Value::S(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_n(&self) -> Option<i64> {
        match self {
            Value::N(n) => Some(*n),
            _ => None,
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::S(value.to_owned())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::S(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::N(value)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::S(s) => write!(f, "{s}"),
            Value::N(n) => write!(f, "{n}"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Null => write!(f, "null"),
        }
    }
}

/// A full record: attribute name to value.
pub type Item = HashMap<String, Value>;

/// The primary key of an item: an ordered list of key components
/// (partition key first, then the optional sort key).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Key(Vec<(String, Value)>);

impl Key {
    /// Starts a key with its partition component.
    pub fn partition(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self(vec![(name.into(), value.into())])
    }

    /// Appends a further key component (the sort key).
    #[must_use]
    pub fn and(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.push((name.into(), value.into()));
        self
    }

    pub fn components(&self) -> &[(String, Value)] {
        &self.0
    }

    /// A condition asserting that every key attribute is present, i.e. that
    /// the item itself exists.
    pub fn exists_condition(&self) -> Condition {
        let mut components = self.0.iter();
        let (first, _) = components.next().expect("a key has at least one component");
        components.fold(Condition::AttributeExists(first.clone()), |cond, (name, _)| {
            cond.and(Condition::AttributeExists(name.clone()))
        })
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut components = self.0.iter();
        if let Some((name, value)) = components.next() {
            write!(f, "{name}={value}")?;
        }
        for (name, value) in components {
            write!(f, ", {name}={value}")?;
        }
        Ok(())
    }
}

/// A predicate over the current attributes of the target item, evaluated by
/// the store before committing a write.
///
/// Comparisons follow store semantics: strings compare lexicographically,
/// numbers numerically; a comparison against an absent attribute or a value
/// of a different type is false.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    AttributeExists(String),
    AttributeNotExists(String),
    /// The stored attribute equals the supplied value.
    Equals(String, Value),
    /// The stored attribute is strictly less than the supplied value.
    LessThan(String, Value),
    And(Box<Condition>, Box<Condition>),
    Or(Box<Condition>, Box<Condition>),
}

impl Condition {
    #[must_use]
    pub fn and(self, other: Condition) -> Condition {
        Condition::And(Box::new(self), Box::new(other))
    }

    #[must_use]
    pub fn or(self, other: Condition) -> Condition {
        Condition::Or(Box::new(self), Box::new(other))
    }
}

/// A single attribute-level mutation within an [`Update`].
#[derive(Debug, Clone)]
pub enum Assignment {
    Set(String, Value),
    Remove(String),
}

/// A whole-item write. `item` holds the non-key attributes; backends merge
/// the key components in.
#[derive(Debug, Clone)]
pub struct Put {
    pub key: Key,
    pub item: Item,
    pub condition: Option<Condition>,
}

/// A partial, attribute-level mutation of an existing or new item.
///
/// Store semantics apply: when the condition passes against an absent item,
/// the store creates the item from the key plus the assignments. Callers
/// that must not create anything gate the update on
/// [`Key::exists_condition`].
#[derive(Debug, Clone)]
pub struct Update {
    pub key: Key,
    pub assignments: Vec<Assignment>,
    pub condition: Option<Condition>,
}

/// A no-write operation asserting a condition within a transaction.
#[derive(Debug, Clone)]
pub struct ConditionCheck {
    pub key: Key,
    pub condition: Condition,
}

/// One operation of a transactional batch.
#[derive(Debug, Clone)]
pub enum TransactItem {
    Put(Put),
    Update(Update),
    ConditionCheck(ConditionCheck),
}

impl TransactItem {
    pub fn key(&self) -> &Key {
        match self {
            TransactItem::Put(put) => &put.key,
            TransactItem::Update(update) => &update.key,
            TransactItem::ConditionCheck(check) => &check.key,
        }
    }
}

/// Why one operation of a cancelled transaction was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CancellationCode {
    /// The operation itself was fine; the transaction failed elsewhere.
    None,
    ConditionFailed,
    Other(String),
}

/// Per-operation cancellation outcome, in the order the operations were
/// submitted.
#[derive(Debug, Clone)]
pub struct CancellationReason {
    pub code: CancellationCode,
    /// Snapshot of the item at cancellation time, when the store returns it.
    pub item: Option<Item>,
}

#[derive(Debug, thiserror::Error)]
pub enum KvError {
    /// A conditional put or update did not pass its condition.
    #[error("conditional check failed")]
    ConditionFailed,
    /// The transactional batch was cancelled; one reason per submitted
    /// operation, in submission order.
    #[error("transaction cancelled")]
    TransactionCancelled(Vec<CancellationReason>),
    /// The batch exceeds [`MAX_TRANSACT_ITEMS`].
    #[error("transaction of {0} operations exceeds the store limit of {MAX_TRANSACT_ITEMS}")]
    TransactionTooLarge(usize),
    /// Transport or store-side failure outside the conditional protocol.
    #[error("store error: {0}")]
    Backend(#[source] BoxError),
}

/// A DynamoDB-class store: point reads, conditional single-item writes, and
/// bounded multi-item transactions with ordered cancellation reasons.
///
/// Implementations must be safe for concurrent use; the toolkit shares one
/// store handle across tasks.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Point read. `consistent_read` requests a strongly-consistent read;
    /// repositories always do.
    async fn get(&self, table: &str, key: &Key, consistent_read: bool)
        -> Result<Option<Item>, KvError>;

    /// Whole-item write, optionally condition-gated.
    async fn put(&self, table: &str, put: Put) -> Result<(), KvError>;

    /// Attribute-level mutation, optionally condition-gated.
    async fn update(&self, table: &str, update: Update) -> Result<(), KvError>;

    /// Atomic batch: either every operation commits or none does. On
    /// cancellation the error carries one reason per operation, in
    /// submission order.
    async fn transact_write(&self, table: &str, items: Vec<TransactItem>) -> Result<(), KvError>;
}

/// Blanket implementation making a [`KvStore`] out of every (smart) pointer
/// to a [`KvStore`], e.g. `&S`, `Box<S>`, `Arc<S>`. Useful to share one
/// client between a lock and a repository.
#[async_trait]
impl<S, T> KvStore for T
where
    S: KvStore + ?Sized,
    T: Deref<Target = S> + Send + Sync,
{
    async fn get(
        &self,
        table: &str,
        key: &Key,
        consistent_read: bool,
    ) -> Result<Option<Item>, KvError> {
        self.deref().get(table, key, consistent_read).await
    }

    async fn put(&self, table: &str, put: Put) -> Result<(), KvError> {
        self.deref().put(table, put).await
    }

    async fn update(&self, table: &str, update: Update) -> Result<(), KvError> {
        self.deref().update(table, update).await
    }

    async fn transact_write(&self, table: &str, items: Vec<TransactItem>) -> Result<(), KvError> {
        self.deref().transact_write(table, items).await
    }
}
