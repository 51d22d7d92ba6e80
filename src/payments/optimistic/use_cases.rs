//! Thin orchestrations: load, mutate in memory, persist.
//!
//! None of them retries on a version conflict; it surfaces as
//! [`RepositoryError::OptimisticLock`] and the caller decides.

use crate::payments::Charge;
use crate::repository::RepositoryError;

use super::intent::{PaymentIntent, PaymentIntentError};
use super::repository::PaymentIntentRepository;

#[derive(Debug, thiserror::Error)]
pub enum UseCaseError {
    #[error("payment intent {0} not found")]
    NotFound(String),
    #[error(transparent)]
    Intent(#[from] PaymentIntentError),
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

pub async fn request_payment_intent_charge<R>(
    repository: &R,
    payment_intent_id: &str,
) -> Result<PaymentIntent, UseCaseError>
where
    R: PaymentIntentRepository,
{
    let mut payment_intent = get_payment_intent(repository, payment_intent_id).await?;
    payment_intent.request_charge()?;
    repository.update(&payment_intent).await?;
    Ok(payment_intent)
}

/// Records the gateway's response for a requested charge, settling the
/// intent into its terminal state.
pub async fn handle_charge_response<R>(
    repository: &R,
    payment_intent_id: &str,
    charge: Charge,
) -> Result<PaymentIntent, UseCaseError>
where
    R: PaymentIntentRepository,
{
    let mut payment_intent = get_payment_intent(repository, payment_intent_id).await?;
    payment_intent.handle_charge_response(charge)?;
    repository.update(&payment_intent).await?;
    Ok(payment_intent)
}
