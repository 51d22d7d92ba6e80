//! In-memory [`KvStore`] with the conditional and transactional semantics of
//! a DynamoDB-class service.
//!
//! Intended for tests and local development. Tables materialize on first
//! write; item-level semantics (conditional upserts, all-or-nothing
//! transactions with ordered cancellation reasons) match the real store.

use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::{
    Assignment, CancellationCode, CancellationReason, Condition, Item, Key, KvError, KvStore, Put,
    TransactItem, Update, Value, MAX_TRANSACT_ITEMS,
};

type Table = HashMap<Key, Item>;

/// Shared, thread-safe in-memory store. Clones share the same tables.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<HashMap<String, Table>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn get(
        &self,
        table: &str,
        key: &Key,
        _consistent_read: bool,
    ) -> Result<Option<Item>, KvError> {
        let tables = self.tables.lock().expect("store mutex poisoned");
        Ok(tables.get(table).and_then(|t| t.get(key)).cloned())
    }

    async fn put(&self, table: &str, put: Put) -> Result<(), KvError> {
        let mut tables = self.tables.lock().expect("store mutex poisoned");
        let table = tables.entry(table.to_owned()).or_default();

        let current = table.get(&put.key);
        if !check(put.condition.as_ref(), current) {
            return Err(KvError::ConditionFailed);
        }

        table.insert(put.key.clone(), materialize_put(&put));
        Ok(())
    }

    async fn update(&self, table: &str, update: Update) -> Result<(), KvError> {
        let mut tables = self.tables.lock().expect("store mutex poisoned");
        let table = tables.entry(table.to_owned()).or_default();

        let current = table.get(&update.key);
        if !check(update.condition.as_ref(), current) {
            return Err(KvError::ConditionFailed);
        }

        // Upsert: a passing condition against an absent item creates the
        // item from its key components plus the assignments.
        let item = match table.entry(update.key.clone()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => entry.insert(key_attributes(&update.key)),
        };
        apply_assignments(item, &update.assignments);
        Ok(())
    }

    async fn transact_write(&self, table: &str, items: Vec<TransactItem>) -> Result<(), KvError> {
        if items.len() > MAX_TRANSACT_ITEMS {
            return Err(KvError::TransactionTooLarge(items.len()));
        }

        let mut seen: HashSet<&Key> = HashSet::new();
        for item in &items {
            if !seen.insert(item.key()) {
                return Err(KvError::Backend(
                    format!("transaction contains conflicting operations on item [{}]", item.key())
                        .into(),
                ));
            }
        }

        let mut tables = self.tables.lock().expect("store mutex poisoned");
        let table = tables.entry(table.to_owned()).or_default();

        // First pass: evaluate every condition against the current state.
        // Nothing is applied unless all of them hold.
        let mut cancelled = false;
        let mut reasons: Vec<CancellationReason> = Vec::with_capacity(items.len());
        for item in &items {
            let current = table.get(item.key());
            let condition = match item {
                TransactItem::Put(put) => put.condition.as_ref(),
                TransactItem::Update(update) => update.condition.as_ref(),
                TransactItem::ConditionCheck(check) => Some(&check.condition),
            };
            if check(condition, current) {
                reasons.push(CancellationReason {
                    code: CancellationCode::None,
                    item: None,
                });
            } else {
                cancelled = true;
                reasons.push(CancellationReason {
                    code: CancellationCode::ConditionFailed,
                    item: current.cloned(),
                });
            }
        }
        if cancelled {
            return Err(KvError::TransactionCancelled(reasons));
        }

        // Second pass: commit.
        for item in items {
            match item {
                TransactItem::Put(put) => {
                    table.insert(put.key.clone(), materialize_put(&put));
                }
                TransactItem::Update(update) => {
                    let item = match table.entry(update.key.clone()) {
                        Entry::Occupied(entry) => entry.into_mut(),
                        Entry::Vacant(entry) => entry.insert(key_attributes(&update.key)),
                    };
                    apply_assignments(item, &update.assignments);
                }
                TransactItem::ConditionCheck(_) => {}
            }
        }
        Ok(())
    }
}

fn key_attributes(key: &Key) -> Item {
    key.components()
        .iter()
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect()
}

fn materialize_put(put: &Put) -> Item {
    let mut item = key_attributes(&put.key);
    item.extend(put.item.iter().map(|(k, v)| (k.clone(), v.clone())));
    item
}

fn apply_assignments(item: &mut Item, assignments: &[Assignment]) {
    for assignment in assignments {
        match assignment {
            Assignment::Set(name, value) => {
                item.insert(name.clone(), value.clone());
            }
            Assignment::Remove(name) => {
                item.remove(name);
            }
        }
    }
}

fn check(condition: Option<&Condition>, item: Option<&Item>) -> bool {
    condition.map_or(true, |c| eval(c, item))
}

fn eval(condition: &Condition, item: Option<&Item>) -> bool {
    match condition {
        Condition::AttributeExists(name) => item.is_some_and(|i| i.contains_key(name)),
        Condition::AttributeNotExists(name) => !item.is_some_and(|i| i.contains_key(name)),
        Condition::Equals(name, value) => item.and_then(|i| i.get(name)) == Some(value),
        Condition::LessThan(name, value) => match (item.and_then(|i| i.get(name)), value) {
            (Some(Value::S(stored)), Value::S(supplied)) => stored < supplied,
            (Some(Value::N(stored)), Value::N(supplied)) => stored < supplied,
            _ => false,
        },
        Condition::And(a, b) => eval(a, item) && eval(b, item),
        Condition::Or(a, b) => eval(a, item) || eval(b, item),
    }
}
