//! Reference payment domains exercising the two concurrency cores.
//!
//! Both model a payment intent: [`pessimistic`] charges it through an
//! external gateway under the item lock, [`optimistic`] evolves it through a
//! state machine under optimistic concurrency control, emitting
//! change-of-state events for downstream pollers.

use serde::{Deserialize, Serialize};

use crate::kv::Value;
use crate::repository::SchemaError;

pub mod optimistic;
pub mod pessimistic;

/// Outcome of a charge against the payment gateway, attached to the intent
/// on either terminal transition.
///
/// On the wire this is a JSON string in the `Charge` attribute, or `NULL`
/// while no charge was attempted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Charge {
    pub id: String,
    #[serde(default)]
    pub error_code: Option<String>,
    #[serde(default)]
    pub error_message: Option<String>,
}

impl Charge {
    pub(crate) fn to_value(charge: Option<&Charge>) -> Result<Value, SchemaError> {
        match charge {
            None => Ok(Value::Null),
            Some(charge) => Ok(Value::S(serde_json::to_string(charge)?)),
        }
    }

    pub(crate) fn from_value(value: Option<&Value>) -> Result<Option<Charge>, SchemaError> {
        match value {
            None | Some(Value::Null) => Ok(None),
            Some(Value::S(json)) => Ok(Some(serde_json::from_str(json)?)),
            Some(_) => Err(SchemaError::UnexpectedType("Charge")),
        }
    }
}
