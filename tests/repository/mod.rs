use serde::{Deserialize, Serialize};
use uuid::Uuid;

use dynocc::event::{DomainEvent, EventEnvelope};
use dynocc::kv::memory::MemoryStore;
use dynocc::kv::{Assignment, Item, KvStore, Value};
use dynocc::repository::{
    required_i64, required_str, AggregateSchema, OccRepository, RepositoryError, SchemaError,
};
use dynocc::Version;

use crate::support::TABLE;

/// Minimal counting aggregate driving the repository contract.
#[derive(Debug, Clone, PartialEq, Eq)]
struct TestAggregate {
    id: String,
    count: i64,
    version: Version,
    events: Vec<TestEvent>,
}

impl TestAggregate {
    fn new() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            count: 0,
            version: 0,
            events: vec![],
        }
    }

    fn add(&mut self, value: i64) {
        self.count += value;
        self.events.push(TestEvent {
            id: Uuid::new_v4().to_string(),
            value,
        });
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct TestEvent {
    id: String,
    value: i64,
}

impl DomainEvent for TestEvent {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &'static str {
        "TestCounterAdded"
    }
}

struct TestSchema;

impl AggregateSchema for TestSchema {
    type Aggregate = TestAggregate;

    const NAME: &'static str = "TestCounter";
    const KEY_TAG: &'static str = "TEST_COUNTER";

    fn id(aggregate: &TestAggregate) -> &str {
        &aggregate.id
    }

    fn version(aggregate: &TestAggregate) -> Version {
        aggregate.version
    }

    fn to_item(aggregate: &TestAggregate) -> Result<Item, SchemaError> {
        Ok(Item::from([
            ("Id".to_owned(), Value::S(aggregate.id.clone())),
            ("Count".to_owned(), Value::N(aggregate.count)),
            ("Version".to_owned(), Value::N(aggregate.version)),
        ]))
    }

    fn from_item(item: &Item) -> Result<TestAggregate, SchemaError> {
        Ok(TestAggregate {
            id: required_str(item, "Id")?.to_owned(),
            count: required_i64(item, "Count")?,
            version: required_i64(item, "Version")?,
            events: vec![],
        })
    }

    fn update_assignments(aggregate: &TestAggregate) -> Result<Vec<Assignment>, SchemaError> {
        Ok(vec![Assignment::Set(
            "Count".to_owned(),
            Value::N(aggregate.count),
        )])
    }

    fn pending_events(aggregate: &TestAggregate) -> Result<Vec<EventEnvelope>, SchemaError> {
        aggregate
            .events
            .iter()
            .map(|event| EventEnvelope::lift(Self::NAME, &aggregate.id, event).map_err(Into::into))
            .collect()
    }
}

fn repository(store: &MemoryStore) -> OccRepository<MemoryStore, TestSchema> {
    OccRepository::new(store.clone(), TABLE)
}

#[tokio::test]
async fn get_returns_none_for_an_unknown_aggregate() {
    let repository = repository(&MemoryStore::new());
    assert!(repository.get("unknown").await.unwrap().is_none());
}

#[tokio::test]
async fn create_then_get_roundtrips_at_version_zero() {
    let repository = repository(&MemoryStore::new());
    let aggregate = TestAggregate::new();

    repository.create(&aggregate).await.unwrap();

    let loaded = repository.get(&aggregate.id).await.unwrap().unwrap();
    assert_eq!(loaded, aggregate);
    assert_eq!(loaded.version, 0);
}

#[tokio::test]
async fn create_rejects_an_existing_identifier() {
    let repository = repository(&MemoryStore::new());
    let aggregate = TestAggregate::new();
    repository.create(&aggregate).await.unwrap();

    let err = repository.create(&aggregate).await.unwrap_err();
    assert!(matches!(err, RepositoryError::IdentifierCollision(id) if id == aggregate.id));
}

#[tokio::test]
async fn version_advances_by_one_per_successful_update() {
    let repository = repository(&MemoryStore::new());
    let aggregate = TestAggregate::new();
    repository.create(&aggregate).await.unwrap();

    for expected_version in 1..=3 {
        let mut loaded = repository.get(&aggregate.id).await.unwrap().unwrap();
        loaded.add(1);
        repository.update(&loaded).await.unwrap();

        let stored = repository.get(&aggregate.id).await.unwrap().unwrap();
        assert_eq!(stored.version, expected_version);
        assert_eq!(stored.count, expected_version);
    }
}

#[tokio::test]
async fn concurrent_updates_from_the_same_version_admit_exactly_one_winner() {
    let repository = repository(&MemoryStore::new());
    let aggregate = TestAggregate::new();
    repository.create(&aggregate).await.unwrap();

    let mut winner = repository.get(&aggregate.id).await.unwrap().unwrap();
    let mut loser = repository.get(&aggregate.id).await.unwrap().unwrap();

    winner.add(10);
    repository.update(&winner).await.unwrap();

    loser.add(7);
    let err = repository.update(&loser).await.unwrap_err();
    assert!(matches!(err, RepositoryError::OptimisticLock(id) if id == aggregate.id));

    // The record is exactly the winner's result.
    let stored = repository.get(&aggregate.id).await.unwrap().unwrap();
    assert_eq!(stored.count, 10);
    assert_eq!(stored.version, 1);
    // The loser's event never landed.
    assert!(repository
        .get_event(&aggregate.id, &loser.events[0].id)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn update_of_a_missing_aggregate_is_not_found() {
    let repository = repository(&MemoryStore::new());
    let mut aggregate = TestAggregate::new();
    aggregate.add(1);

    let err = repository.update(&aggregate).await.unwrap_err();
    assert!(matches!(err, RepositoryError::NotFound(id) if id == aggregate.id));
}

#[tokio::test]
async fn events_are_persisted_atomically_with_the_aggregate() {
    let store = MemoryStore::new();
    let repository = repository(&store);
    let aggregate = TestAggregate::new();
    repository.create(&aggregate).await.unwrap();

    let mut loaded = repository.get(&aggregate.id).await.unwrap().unwrap();
    loaded.add(1);
    loaded.add(2);
    repository.update(&loaded).await.unwrap();

    for event in &loaded.events {
        let envelope = repository
            .get_event(&aggregate.id, &event.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(envelope.name, "TestCounterAdded");
        assert_eq!(envelope.aggregate_id, aggregate.id);
        assert_eq!(envelope.aggregate_name, "TestCounter");

        let payload: serde_json::Value = serde_json::from_str(&envelope.payload).unwrap();
        assert_eq!(payload["id"], event.id.as_str());
    }

    // Envelopes live under the aggregate's partition.
    let stored = store
        .get(TABLE, &TestSchema::event_key(&aggregate.id, &loaded.events[0].id), true)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        stored.get("PK"),
        Some(&Value::S(format!("TEST_COUNTER#{}", aggregate.id)))
    );
}

#[tokio::test]
async fn re_emitting_an_event_id_is_rejected_and_keeps_the_original_envelope() {
    let repository = repository(&MemoryStore::new());
    let aggregate = TestAggregate::new();
    repository.create(&aggregate).await.unwrap();

    let event_id = Uuid::new_v4().to_string();

    let mut first = repository.get(&aggregate.id).await.unwrap().unwrap();
    first.count += 1;
    first.events.push(TestEvent {
        id: event_id.clone(),
        value: 1,
    });
    repository.update(&first).await.unwrap();

    let mut second = repository.get(&aggregate.id).await.unwrap().unwrap();
    second.count += 5;
    second.events.push(TestEvent {
        id: event_id.clone(),
        value: 5,
    });
    let err = repository.update(&second).await.unwrap_err();
    assert!(matches!(err, RepositoryError::EventCollision(id) if id == event_id));

    // The original envelope is intact; nothing of the losing transaction
    // took effect.
    let envelope = repository
        .get_event(&aggregate.id, &event_id)
        .await
        .unwrap()
        .unwrap();
    let payload: serde_json::Value = serde_json::from_str(&envelope.payload).unwrap();
    assert_eq!(payload["value"], 1);

    let stored = repository.get(&aggregate.id).await.unwrap().unwrap();
    assert_eq!(stored.count, 1);
    assert_eq!(stored.version, 1);
}
