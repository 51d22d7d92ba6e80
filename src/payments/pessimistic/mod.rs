//! Payment intent charged through an external gateway exactly once,
//! serialized by the pessimistic item lock.

mod gateway;
mod intent;
mod repository;
pub mod use_cases;

pub use gateway::{GatewayCharge, GatewayError, PaymentGateway};
pub use intent::{PaymentIntent, PaymentIntentError, PaymentIntentState};
pub use repository::{KvPaymentIntentRepository, PaymentIntentRepository};
