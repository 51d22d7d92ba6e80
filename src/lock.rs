//! Advisory, per-item pessimistic lock over a KV record.
//!
//! The lock is a reserved attribute (`__LockedAt` by default) stamped on the
//! target item with a conditional update; releasing removes it. Acquisition
//! fails fast, callers never wait. With a configured timeout, a lock older
//! than the timeout is treated as abandoned and may be overwritten.

use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Duration, SecondsFormat, Utc};

use crate::clock::{Clock, SystemClock};
use crate::kv::{Assignment, Condition, Key, KvError, KvStore, Update, Value};

pub const DEFAULT_LOCK_ATTRIBUTE: &str = "__LockedAt";

#[derive(Debug, thiserror::Error)]
pub enum LockError {
    /// The lock is held by someone else, or the item does not exist.
    #[error("could not acquire lock on item [{0}]")]
    AcquisitionFailed(Key),
    /// The item vanished while the lock was held; there was nothing to
    /// release.
    #[error("could not release lock, item [{0}] not found")]
    ItemNotFound(Key),
    #[error(transparent)]
    Store(KvError),
}

/// Scopes critical sections over single items of `table`.
///
/// Cheap to construct; holds only the store handle and its configuration.
/// The lock is advisory: it serializes callers that go through `with_lock`
/// on the same key and constrains nobody else.
pub struct PessimisticLock<S> {
    store: S,
    table: String,
    lock_attribute: String,
    lock_timeout: Option<Duration>,
    clock: Arc<dyn Clock>,
}

impl<S> PessimisticLock<S>
where
    S: KvStore,
{
    pub fn new(store: S, table: impl Into<String>) -> Self {
        Self {
            store,
            table: table.into(),
            lock_attribute: DEFAULT_LOCK_ATTRIBUTE.to_owned(),
            lock_timeout: None,
            clock: Arc::new(SystemClock),
        }
    }

    /// Uses a different attribute as the lock marker.
    #[must_use]
    pub fn with_lock_attribute(mut self, lock_attribute: impl Into<String>) -> Self {
        self.lock_attribute = lock_attribute.into();
        self
    }

    /// Treats a held lock as abandoned once it is strictly older than
    /// `lock_timeout`, allowing it to be overwritten. At exactly
    /// `lock_timeout` of age the lock is still valid.
    #[must_use]
    pub fn with_lock_timeout(mut self, lock_timeout: Duration) -> Self {
        self.lock_timeout = Some(lock_timeout);
        self
    }

    #[must_use]
    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Runs `body` while holding the lock on `key`.
    ///
    /// Entering the scope succeeds only if the lock can be acquired; the item
    /// must already exist and is never created here. The lock is released on
    /// every exit path, exactly once. Not reentrant: a nested `with_lock` on
    /// the same key fails acquisition.
    ///
    /// Returns two layers of errors:
    /// - `Err(_)` if the lock protocol failed (acquisition, release, store);
    /// - `Ok(Err(_))` if `body` failed; its error wins over any release
    ///   failure, which is then only logged.
    pub async fn with_lock<F, Fut, T, E>(&self, key: Key, body: F) -> Result<Result<T, E>, LockError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.acquire(&key).await?;

        let outcome = body().await;
        match (outcome, self.release(&key).await) {
            (Ok(value), Ok(())) => Ok(Ok(value)),
            (Ok(_), Err(release_err)) => Err(release_err),
            (Err(body_err), release) => {
                if let Err(release_err) = release {
                    tracing::warn!(
                        key = %key,
                        error = %release_err,
                        "lock release failed after the critical section errored"
                    );
                }
                Ok(Err(body_err))
            }
        }
    }

    #[tracing::instrument(skip_all, fields(key = %key), err)]
    async fn acquire(&self, key: &Key) -> Result<(), LockError> {
        let now = self.clock.now();

        let mut lock_free = Condition::AttributeNotExists(self.lock_attribute.clone());
        if let Some(timeout) = self.lock_timeout {
            // A lock is discardable iff it is strictly older than the
            // timeout; at the boundary it is still valid.
            let expires_at = iso8601(now - timeout);
            lock_free = lock_free.or(Condition::LessThan(
                self.lock_attribute.clone(),
                Value::S(expires_at),
            ));
        }

        let update = Update {
            key: key.clone(),
            assignments: vec![Assignment::Set(
                self.lock_attribute.clone(),
                Value::S(iso8601(now)),
            )],
            condition: Some(key.exists_condition().and(lock_free)),
        };

        match self.store.update(&self.table, update).await {
            Ok(()) => Ok(()),
            Err(KvError::ConditionFailed) => Err(LockError::AcquisitionFailed(key.clone())),
            Err(err) => Err(LockError::Store(err)),
        }
    }

    #[tracing::instrument(skip_all, fields(key = %key), err)]
    async fn release(&self, key: &Key) -> Result<(), LockError> {
        let update = Update {
            key: key.clone(),
            assignments: vec![Assignment::Remove(self.lock_attribute.clone())],
            condition: Some(key.exists_condition()),
        };

        match self.store.update(&self.table, update).await {
            Ok(()) => Ok(()),
            Err(KvError::ConditionFailed) => Err(LockError::ItemNotFound(key.clone())),
            Err(err) => Err(LockError::Store(err)),
        }
    }
}

fn iso8601(instant: DateTime<Utc>) -> String {
    // Fixed-width UTC rendering, so that lexicographic comparison on the
    // stored strings equals temporal comparison.
    instant.to_rfc3339_opts(SecondsFormat::Micros, true)
}
