use serde::{Deserialize, Serialize};

use crate::event::DomainEvent;

/// Facts a payment intent emits, keyed by their wire name.
///
/// The serialized form is the event envelope payload: the tag plus the
/// variant's fields, e.g.
/// `{"name":"PaymentIntentChargeRequested","id":"…","payment_intent_id":"…",
/// "amount":100,"currency":"USD"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "name")]
pub enum PaymentIntentEvent {
    PaymentIntentChargeRequested {
        id: String,
        payment_intent_id: String,
        amount: i64,
        currency: String,
    },
    PaymentIntentCharged {
        id: String,
        payment_intent_id: String,
        charge_id: String,
    },
    PaymentIntentChargeFailed {
        id: String,
        payment_intent_id: String,
        charge_id: String,
        error_code: String,
        error_message: String,
    },
}

impl PaymentIntentEvent {
    pub fn id(&self) -> &str {
        match self {
            PaymentIntentEvent::PaymentIntentChargeRequested { id, .. }
            | PaymentIntentEvent::PaymentIntentCharged { id, .. }
            | PaymentIntentEvent::PaymentIntentChargeFailed { id, .. } => id,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            PaymentIntentEvent::PaymentIntentChargeRequested { .. } => {
                "PaymentIntentChargeRequested"
            }
            PaymentIntentEvent::PaymentIntentCharged { .. } => "PaymentIntentCharged",
            PaymentIntentEvent::PaymentIntentChargeFailed { .. } => "PaymentIntentChargeFailed",
        }
    }

    pub fn payment_intent_id(&self) -> &str {
        match self {
            PaymentIntentEvent::PaymentIntentChargeRequested {
                payment_intent_id, ..
            }
            | PaymentIntentEvent::PaymentIntentCharged {
                payment_intent_id, ..
            }
            | PaymentIntentEvent::PaymentIntentChargeFailed {
                payment_intent_id, ..
            } => payment_intent_id,
        }
    }
}

impl DomainEvent for PaymentIntentEvent {
    fn id(&self) -> &str {
        PaymentIntentEvent::id(self)
    }

    fn name(&self) -> &'static str {
        PaymentIntentEvent::name(self)
    }
}
