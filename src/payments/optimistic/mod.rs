//! Payment intent evolved through a state machine under optimistic
//! concurrency control, emitting change-of-state events atomically with
//! every update.

mod events;
mod intent;
mod repository;
pub mod use_cases;

pub use events::PaymentIntentEvent;
pub use intent::{PaymentIntent, PaymentIntentError, PaymentIntentState};
pub use repository::{KvPaymentIntentRepository, PaymentIntentRepository, PaymentIntentSchema};
