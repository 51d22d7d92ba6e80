//! Thin orchestrations over the repository, the lock, and the gateway.

use crate::kv::KvStore;
use crate::lock::LockError;
use crate::repository::RepositoryError;

use super::gateway::PaymentGateway;
use super::intent::{PaymentIntent, PaymentIntentError};
use super::repository::{KvPaymentIntentRepository, PaymentIntentRepository};

#[derive(Debug, thiserror::Error)]
pub enum UseCaseError {
    #[error("payment intent {0} not found")]
    NotFound(String),
    #[error(transparent)]
    Intent(#[from] PaymentIntentError),
    #[error(transparent)]
    Lock(#[from] LockError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

pub async fn create_payment_intent<R>(
    repository: &R,
    customer_id: &str,
    amount: i64,
    currency: &str,
) -> Result<PaymentIntent, UseCaseError>
where
    R: PaymentIntentRepository,
{
    let payment_intent = PaymentIntent::create(customer_id, amount, currency);
    repository.create(&payment_intent).await?;
    Ok(payment_intent)
}

pub async fn get_payment_intent<R>(
    repository: &R,
    payment_intent_id: &str,
) -> Result<PaymentIntent, UseCaseError>
where
    R: PaymentIntentRepository,
{
    repository
        .get(payment_intent_id)
        .await?
        .ok_or_else(|| UseCaseError::NotFound(payment_intent_id.to_owned()))
}

pub async fn change_payment_intent_amount<R>(
    repository: &R,
    payment_intent_id: &str,
    amount: i64,
) -> Result<PaymentIntent, UseCaseError>
where
    R: PaymentIntentRepository,
{
    let mut payment_intent = get_payment_intent(repository, payment_intent_id).await?;
    payment_intent.change_amount(amount)?;
    repository.update(&payment_intent).await?;
    Ok(payment_intent)
}

/// Charges the intent, serialized by the item lock so the gateway sees the
/// charge at most once under contention.
///
/// Concurrent callers either fail to acquire the lock, or arrive after the
/// release and find the intent in a terminal state, surfacing the state
/// error. Neither reaches the gateway.
pub async fn charge_payment_intent<S, G>(
    repository: &KvPaymentIntentRepository<S>,
    gateway: &G,
    payment_intent_id: &str,
) -> Result<PaymentIntent, UseCaseError>
where
    S: KvStore + Clone,
    G: PaymentGateway,
{
    // Fail fast before touching the lock; acquisition on a missing item
    // would fail anyway, but with the less precise error.
    let _ = get_payment_intent(repository, payment_intent_id).await?;

    repository
        .lock()
        .with_lock(
            KvPaymentIntentRepository::<S>::key(payment_intent_id),
            || async move {
                // Re-read under the lock: the lock does not invalidate
                // whatever the caller read before acquiring it.
                let mut payment_intent = get_payment_intent(repository, payment_intent_id).await?;
                payment_intent.charge(gateway).await?;
                repository.update(&payment_intent).await?;
                Ok::<_, UseCaseError>(payment_intent)
            },
        )
        .await?
}
