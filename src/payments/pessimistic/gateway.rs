use async_trait::async_trait;

use crate::kv::BoxError;

/// The external payment gateway. One capability: charge a payment intent.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn charge(
        &self,
        payment_intent_id: &str,
        amount: i64,
        currency: &str,
    ) -> Result<GatewayCharge, GatewayError>;
}

/// A charge the gateway accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayCharge {
    pub id: String,
}

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// The gateway processed the request and declined it. A terminal
    /// outcome for the intent.
    #[error("charge {id} declined: {error_code}")]
    Declined {
        id: String,
        error_code: String,
        error_message: String,
    },
    /// The gateway could not be reached or answered out of protocol. Not an
    /// outcome; nothing about the intent changed.
    #[error("payment gateway unavailable")]
    Transport(#[source] BoxError),
}
