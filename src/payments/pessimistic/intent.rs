use std::fmt;

use uuid::Uuid;

use crate::kv::BoxError;
use crate::payments::Charge;
use crate::repository::SchemaError;

use super::gateway::{GatewayError, PaymentGateway};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentIntentState {
    Created,
    Charged,
    ChargeFailed,
}

impl PaymentIntentState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentIntentState::Created => "CREATED",
            PaymentIntentState::Charged => "CHARGED",
            PaymentIntentState::ChargeFailed => "CHARGE_FAILED",
        }
    }

    pub(crate) fn parse(value: &str) -> Result<Self, SchemaError> {
        match value {
            "CREATED" => Ok(PaymentIntentState::Created),
            "CHARGED" => Ok(PaymentIntentState::Charged),
            "CHARGE_FAILED" => Ok(PaymentIntentState::ChargeFailed),
            other => Err(SchemaError::Invalid(format!("unknown state {other}"))),
        }
    }
}

impl fmt::Display for PaymentIntentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PaymentIntentError {
    /// The requested operation is not legal in the intent's current state.
    #[error("illegal operation in state {0}")]
    State(PaymentIntentState),
    /// The gateway could not be consulted; the intent did not change.
    #[error("payment gateway unavailable")]
    Gateway(#[source] BoxError),
}

/// A payment intent, charged at most once.
///
/// The state machine: `CREATED → CHARGED` when the gateway accepts,
/// `CREATED → CHARGE_FAILED` when it declines. Terminal states admit no
/// further operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentIntent {
    id: String,
    state: PaymentIntentState,
    customer_id: String,
    amount: i64,
    currency: String,
    charge: Option<Charge>,
}

impl PaymentIntent {
    pub fn create(customer_id: &str, amount: i64, currency: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            state: PaymentIntentState::Created,
            customer_id: customer_id.to_owned(),
            amount,
            currency: currency.to_owned(),
            charge: None,
        }
    }

    pub(crate) fn from_parts(
        id: String,
        state: PaymentIntentState,
        customer_id: String,
        amount: i64,
        currency: String,
        charge: Option<Charge>,
    ) -> Self {
        Self {
            id,
            state,
            customer_id,
            amount,
            currency,
            charge,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> PaymentIntentState {
        self.state
    }

    pub fn customer_id(&self) -> &str {
        &self.customer_id
    }

    pub fn amount(&self) -> i64 {
        self.amount
    }

    pub fn currency(&self) -> &str {
        &self.currency
    }

    pub fn charge_outcome(&self) -> Option<&Charge> {
        self.charge.as_ref()
    }

    /// Charges the intent through the gateway and settles it into a terminal
    /// state. A transport failure leaves the intent untouched.
    pub async fn charge<G>(&mut self, gateway: &G) -> Result<(), PaymentIntentError>
    where
        G: PaymentGateway + ?Sized,
    {
        if self.state != PaymentIntentState::Created {
            return Err(PaymentIntentError::State(self.state));
        }

        match gateway.charge(&self.id, self.amount, &self.currency).await {
            Ok(charge) => {
                self.state = PaymentIntentState::Charged;
                self.charge = Some(Charge {
                    id: charge.id,
                    error_code: None,
                    error_message: None,
                });
            }
            Err(GatewayError::Declined {
                id,
                error_code,
                error_message,
            }) => {
                self.state = PaymentIntentState::ChargeFailed;
                self.charge = Some(Charge {
                    id,
                    error_code: Some(error_code),
                    error_message: Some(error_message),
                });
            }
            Err(GatewayError::Transport(source)) => {
                return Err(PaymentIntentError::Gateway(source));
            }
        }
        Ok(())
    }

    pub fn change_amount(&mut self, amount: i64) -> Result<(), PaymentIntentError> {
        if self.state != PaymentIntentState::Created {
            return Err(PaymentIntentError::State(self.state));
        }
        self.amount = amount;
        Ok(())
    }
}
