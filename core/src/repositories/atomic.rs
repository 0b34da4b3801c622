//! Bounded retry loop for optimistic read-modify-write operations.

use futures_util::future::BoxFuture;
use tracing::debug;

use crate::errors::{StoreError, StoreResult};

/// Outcome of one attempt of a read-modify-write cycle.
#[derive(Debug)]
pub enum Atomic<T> {
    /// The conditional write landed; stop with this value
    Commit(T),
    /// A concurrent writer interleaved; re-read and try again
    Retry,
}

/// Runs optimistic operations until they commit, a non-retryable error
/// surfaces, or the attempt budget is spent.
///
/// The closure receives the zero-based attempt number and re-reads whatever
/// state it depends on at the start of every attempt. Conflict-classified
/// storage errors (deadlocks, busy handles) are retried exactly like an
/// explicit [`Atomic::Retry`], so both storage families drive the same loop.
#[derive(Debug, Clone)]
pub struct AtomicRunner {
    max_attempts: u32,
}

impl Default for AtomicRunner {
    fn default() -> Self {
        Self { max_attempts: 10 }
    }
}

impl AtomicRunner {
    /// Create a runner with an explicit attempt budget (minimum 1)
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
        }
    }

    /// Drive one operation to completion.
    ///
    /// # Returns
    /// * `Ok(value)` - Some attempt committed
    /// * `Err(StoreError::RetriesExhausted)` - Every attempt lost its race
    /// * `Err(_)` - An attempt failed with a non-retryable storage error
    pub async fn run<'a, T>(
        &self,
        mut op: impl FnMut(u32) -> BoxFuture<'a, StoreResult<Atomic<T>>>,
    ) -> StoreResult<T> {
        for attempt in 0..self.max_attempts {
            match op(attempt).await {
                Ok(Atomic::Commit(value)) => return Ok(value),
                Ok(Atomic::Retry) => {
                    debug!(attempt, "optimistic operation lost a race, retrying");
                }
                Err(err) if err.is_retryable() => {
                    debug!(attempt, error = %err, "retryable storage conflict, retrying");
                }
                Err(err) => return Err(err),
            }
        }
        Err(StoreError::RetriesExhausted {
            attempts: self.max_attempts,
        })
    }
}
