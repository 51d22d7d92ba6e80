use std::fmt;

use uuid::Uuid;

use crate::payments::Charge;
use crate::repository::SchemaError;
use crate::Version;

use super::events::PaymentIntentEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentIntentState {
    Created,
    ChargeRequested,
    Charged,
    ChargeFailed,
}

impl PaymentIntentState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentIntentState::Created => "CREATED",
            PaymentIntentState::ChargeRequested => "CHARGE_REQUESTED",
            PaymentIntentState::Charged => "CHARGED",
            PaymentIntentState::ChargeFailed => "CHARGE_FAILED",
        }
    }

    pub(crate) fn parse(value: &str) -> Result<Self, SchemaError> {
        match value {
            "CREATED" => Ok(PaymentIntentState::Created),
            "CHARGE_REQUESTED" => Ok(PaymentIntentState::ChargeRequested),
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
}

/// A payment intent evolved through explicit state transitions, each emitted
/// as an event for downstream pollers.
///
/// `version` is the version the intent was loaded at; `events` collects what
/// was emitted since then. Both belong to the repository protocol: a
/// successful update persists the events and advances the stored version,
/// and the caller reloads to observe it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentIntent {
    id: String,
    state: PaymentIntentState,
    customer_id: String,
    amount: i64,
    currency: String,
    charge: Option<Charge>,
    version: Version,
    events: Vec<PaymentIntentEvent>,
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
            version: 0,
            events: vec![],
        }
    }

    pub(crate) fn from_parts(
        id: String,
        state: PaymentIntentState,
        customer_id: String,
        amount: i64,
        currency: String,
        charge: Option<Charge>,
        version: Version,
    ) -> Self {
        Self {
            id,
            state,
            customer_id,
            amount,
            currency,
            charge,
            version,
            events: vec![],
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

    pub fn version(&self) -> Version {
        self.version
    }

    /// Events emitted since the intent was loaded, in emission order.
    pub fn events(&self) -> &[PaymentIntentEvent] {
        &self.events
    }

    pub fn change_amount(&mut self, amount: i64) -> Result<(), PaymentIntentError> {
        if self.state != PaymentIntentState::Created {
            return Err(PaymentIntentError::State(self.state));
        }
        self.amount = amount;
        Ok(())
    }

    /// Asks for the intent to be charged; the actual gateway call happens
    /// downstream, driven by the emitted event.
    pub fn request_charge(&mut self) -> Result<(), PaymentIntentError> {
        if self.state != PaymentIntentState::Created {
            return Err(PaymentIntentError::State(self.state));
        }
        self.state = PaymentIntentState::ChargeRequested;
        self.events
            .push(PaymentIntentEvent::PaymentIntentChargeRequested {
                id: Uuid::new_v4().to_string(),
                payment_intent_id: self.id.clone(),
                amount: self.amount,
                currency: self.currency.clone(),
            });
        Ok(())
    }

    /// Settles the intent with the gateway's response: into `CHARGED` when
    /// the charge carries no error code, into `CHARGE_FAILED` otherwise.
    pub fn handle_charge_response(&mut self, charge: Charge) -> Result<(), PaymentIntentError> {
        if self.state != PaymentIntentState::ChargeRequested {
            return Err(PaymentIntentError::State(self.state));
        }

        let event = match &charge.error_code {
            None => {
                self.state = PaymentIntentState::Charged;
                PaymentIntentEvent::PaymentIntentCharged {
                    id: Uuid::new_v4().to_string(),
                    payment_intent_id: self.id.clone(),
                    charge_id: charge.id.clone(),
                }
            }
            Some(error_code) => {
                self.state = PaymentIntentState::ChargeFailed;
                PaymentIntentEvent::PaymentIntentChargeFailed {
                    id: Uuid::new_v4().to_string(),
                    payment_intent_id: self.id.clone(),
                    charge_id: charge.id.clone(),
                    error_code: error_code.clone(),
                    error_message: charge.error_message.clone().unwrap_or_default(),
                }
            }
        };

        self.charge = Some(charge);
        self.events.push(event);
        Ok(())
    }
}
