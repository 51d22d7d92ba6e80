//! Concurrency-control toolkit for DynamoDB-class key-value stores.
//!
//! Two cooperating cores:
//!
//! - [`lock`]: an advisory, per-item pessimistic lock implemented by
//!   stamping a reserved attribute on the target record, with optional
//!   stale-lock expiry.
//! - [`repository`]: an optimistic, versioned aggregate repository that
//!   persists an aggregate record and its emitted domain events in a single
//!   atomic transaction, rejecting concurrent mutators on a `Version`
//!   counter.
//!
//! Both cores talk to the store exclusively through the [`kv`] adapter, so
//! they run unchanged against DynamoDB ([`kv::dynamodb::DynamoStore`],
//! behind the `dynamodb` feature) or the in-memory fake
//! ([`kv::memory::MemoryStore`]) used in tests.
//!
//! The [`payments`] module ships two reference domains exercising the cores:
//! a payment intent charged through an external gateway exactly once under
//! the pessimistic lock, and a payment intent evolved through a state
//! machine with change-of-state events under optimistic concurrency control.

pub mod clock;
pub mod event;
pub mod kv;
pub mod lock;
pub mod payments;
pub mod repository;

mod types;

pub use types::Version;
