use uuid::Uuid;

use dynocc::kv::memory::MemoryStore;
use dynocc::kv::KvStore;
use dynocc::lock::{LockError, DEFAULT_LOCK_ATTRIBUTE};
use dynocc::payments::pessimistic::use_cases::{
    change_payment_intent_amount, charge_payment_intent, create_payment_intent,
    get_payment_intent, UseCaseError,
};
use dynocc::payments::pessimistic::{
    KvPaymentIntentRepository, PaymentIntentError, PaymentIntentRepository, PaymentIntentState,
};
use dynocc::repository::RepositoryError;

use crate::support::{StubPaymentGateway, TABLE};

fn repository(store: &MemoryStore) -> KvPaymentIntentRepository<MemoryStore> {
    KvPaymentIntentRepository::new(store.clone(), TABLE)
}

async fn lock_is_released(store: &MemoryStore, payment_intent_id: &str) -> bool {
    let item = store
        .get(
            TABLE,
            &KvPaymentIntentRepository::<MemoryStore>::key(payment_intent_id),
            true,
        )
        .await
        .unwrap();
    item.is_some_and(|item| !item.contains_key(DEFAULT_LOCK_ATTRIBUTE))
}

#[tokio::test]
async fn creates_and_reads_back_a_payment_intent() {
    let repository = repository(&MemoryStore::new());

    let intent = create_payment_intent(&repository, "cust_123456", 100, "USD")
        .await
        .unwrap();

    assert_eq!(intent.state(), PaymentIntentState::Created);
    assert!(intent.charge_outcome().is_none());

    let loaded = get_payment_intent(&repository, intent.id()).await.unwrap();
    assert_eq!(loaded, intent);
}

#[tokio::test]
async fn unknown_payment_intent_is_not_found() {
    let repository = repository(&MemoryStore::new());
    let id = Uuid::new_v4().to_string();

    let err = get_payment_intent(&repository, &id).await.unwrap_err();
    assert!(matches!(err, UseCaseError::NotFound(unknown) if unknown == id));

    let gateway = StubPaymentGateway::accepting("ch_123456");
    let err = charge_payment_intent(&repository, &gateway, &id)
        .await
        .unwrap_err();
    assert!(matches!(err, UseCaseError::NotFound(_)));
    assert_eq!(gateway.call_count(), 0);
}

#[tokio::test]
async fn creating_the_same_intent_twice_is_a_collision() {
    let repository = repository(&MemoryStore::new());
    let intent = create_payment_intent(&repository, "cust_123456", 100, "USD")
        .await
        .unwrap();

    let err = repository.create(&intent).await.unwrap_err();
    assert!(matches!(err, RepositoryError::IdentifierCollision(id) if id == intent.id()));
}

#[tokio::test]
async fn charges_the_intent_through_the_gateway_exactly_once() {
    let store = MemoryStore::new();
    let repository = repository(&store);
    let gateway = StubPaymentGateway::accepting("ch_123456");

    let intent = create_payment_intent(&repository, "cust_123456", 100, "USD")
        .await
        .unwrap();
    let charged = charge_payment_intent(&repository, &gateway, intent.id())
        .await
        .unwrap();

    assert_eq!(charged.state(), PaymentIntentState::Charged);
    assert_eq!(charged.charge_outcome().unwrap().id, "ch_123456");
    assert_eq!(
        gateway.calls(),
        vec![(intent.id().to_owned(), 100, "USD".to_owned())]
    );

    let loaded = get_payment_intent(&repository, intent.id()).await.unwrap();
    assert_eq!(loaded.state(), PaymentIntentState::Charged);
    assert_eq!(loaded.charge_outcome().unwrap().id, "ch_123456");
    assert!(lock_is_released(&store, intent.id()).await);
}

#[tokio::test]
async fn declined_charge_is_recorded_as_charge_failed() {
    let store = MemoryStore::new();
    let repository = repository(&store);
    let gateway = StubPaymentGateway::declining("ch_123456", "card_declined", "Insufficient funds");

    let intent = create_payment_intent(&repository, "cust_123456", 100, "USD")
        .await
        .unwrap();
    let charged = charge_payment_intent(&repository, &gateway, intent.id())
        .await
        .unwrap();

    assert_eq!(charged.state(), PaymentIntentState::ChargeFailed);
    let charge = charged.charge_outcome().unwrap();
    assert_eq!(charge.error_code.as_deref(), Some("card_declined"));
    assert_eq!(charge.error_message.as_deref(), Some("Insufficient funds"));

    let loaded = get_payment_intent(&repository, intent.id()).await.unwrap();
    assert_eq!(loaded.state(), PaymentIntentState::ChargeFailed);
    assert!(lock_is_released(&store, intent.id()).await);
}

#[tokio::test]
async fn gateway_outage_leaves_the_intent_chargeable_and_the_lock_released() {
    let store = MemoryStore::new();
    let repository = repository(&store);
    let gateway = StubPaymentGateway::unreachable();

    let intent = create_payment_intent(&repository, "cust_123456", 100, "USD")
        .await
        .unwrap();
    let err = charge_payment_intent(&repository, &gateway, intent.id())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        UseCaseError::Intent(PaymentIntentError::Gateway(_))
    ));

    let loaded = get_payment_intent(&repository, intent.id()).await.unwrap();
    assert_eq!(loaded.state(), PaymentIntentState::Created);
    assert!(loaded.charge_outcome().is_none());
    assert!(lock_is_released(&store, intent.id()).await);
}

#[tokio::test]
async fn charging_a_settled_intent_is_a_state_error_without_a_gateway_call() {
    let repository = repository(&MemoryStore::new());
    let gateway = StubPaymentGateway::accepting("ch_123456");

    let intent = create_payment_intent(&repository, "cust_123456", 100, "USD")
        .await
        .unwrap();
    charge_payment_intent(&repository, &gateway, intent.id())
        .await
        .unwrap();

    let err = charge_payment_intent(&repository, &gateway, intent.id())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        UseCaseError::Intent(PaymentIntentError::State(PaymentIntentState::Charged))
    ));
    assert_eq!(gateway.call_count(), 1);
}

#[tokio::test]
async fn concurrent_charges_reach_the_gateway_exactly_once() {
    let store = MemoryStore::new();
    let repository = repository(&store);
    let gateway = StubPaymentGateway::accepting("ch_123456");

    let intent = create_payment_intent(&repository, "cust_123456", 100, "USD")
        .await
        .unwrap();

    let (first, second) = tokio::join!(
        charge_payment_intent(&repository, &gateway, intent.id()),
        charge_payment_intent(&repository, &gateway, intent.id()),
    );

    assert_eq!(gateway.call_count(), 1);

    let (winner, loser) = match (first, second) {
        (Ok(winner), Err(loser)) => (winner, loser),
        (Err(loser), Ok(winner)) => (winner, loser),
        other => panic!("expected exactly one winner, got {other:?}"),
    };
    assert_eq!(winner.state(), PaymentIntentState::Charged);
    // The loser either failed to take the lock or, arriving after the
    // release, found the intent already settled.
    assert!(matches!(
        loser,
        UseCaseError::Lock(LockError::AcquisitionFailed(_))
            | UseCaseError::Intent(PaymentIntentError::State(_))
    ));

    let loaded = get_payment_intent(&repository, intent.id()).await.unwrap();
    assert_eq!(loaded.state(), PaymentIntentState::Charged);
    assert!(lock_is_released(&store, intent.id()).await);
}

#[tokio::test]
async fn amount_changes_are_persisted_while_the_intent_is_chargeable() {
    let repository = repository(&MemoryStore::new());
    let intent = create_payment_intent(&repository, "cust_123456", 100, "USD")
        .await
        .unwrap();

    change_payment_intent_amount(&repository, intent.id(), 250)
        .await
        .unwrap();

    let loaded = get_payment_intent(&repository, intent.id()).await.unwrap();
    assert_eq!(loaded.amount(), 250);

    let gateway = StubPaymentGateway::accepting("ch_123456");
    charge_payment_intent(&repository, &gateway, intent.id())
        .await
        .unwrap();
    assert_eq!(gateway.calls()[0].1, 250);

    let err = change_payment_intent_amount(&repository, intent.id(), 300)
        .await
        .unwrap_err();
    assert!(matches!(err, UseCaseError::Intent(PaymentIntentError::State(_))));
}
