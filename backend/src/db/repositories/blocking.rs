//! Blocking store calls that stop once their caller has gone away.
//!
//! A blocking store call runs on the blocking pool while the async caller awaits the
//! `JoinHandle`. When the caller is dropped (store timeout or cancellation), tokio lets the
//! blocking closure run to completion. [`run_blocking`] raises an [`Abandoned`] flag on drop so
//! the closure can skip further attempts and roll back a write before it commits.

#![cfg_attr(not(feature = "postgres-repo"), allow(dead_code))]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task;

use crate::db::repository::{ErrorContext, RepositoryError, RepositoryResult};

/// Set once the async caller stopped waiting for the result.
#[derive(Debug, Clone, Default)]
pub(crate) struct Abandoned(Arc<AtomicBool>);

impl Abandoned {
    pub(crate) fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Fail with an error naming `operation` when the caller is gone.
    pub(crate) fn check(&self, operation: &str) -> RepositoryResult<()> {
        if self.is_set() {
            return Err(RepositoryError::internal_with_context(
                "caller stopped waiting",
                ErrorContext::new(operation).with_details("abandoned"),
            ));
        }
        Ok(())
    }
}

struct RaiseOnDrop(Abandoned);

impl Drop for RaiseOnDrop {
    fn drop(&mut self) {
        self.0 .0.store(true, Ordering::SeqCst);
    }
}

/// Retry budget for [`run_blocking`].
#[derive(Debug, Clone, Copy)]
pub(crate) struct RetryPolicy {
    pub max_retries: u32,
    /// First backoff, doubled after every failed attempt.
    pub initial_delay: Duration,
}

/// Run `attempt` on the blocking pool, retrying retryable errors with exponential backoff.
///
/// No attempt starts after the returned future is dropped. `attempt` receives the flag so it can
/// check it again right before committing.
pub(crate) async fn run_blocking<T, F>(
    operation: &'static str,
    policy: RetryPolicy,
    mut attempt: F,
) -> RepositoryResult<T>
where
    T: Send + 'static,
    F: FnMut(&Abandoned) -> RepositoryResult<T> + Send + 'static,
{
    let abandoned = Abandoned::default();
    let _raise = RaiseOnDrop(abandoned.clone());

    task::spawn_blocking(move || {
        let mut delay = policy.initial_delay;
        let mut tries = 0;
        loop {
            abandoned.check(operation)?;
            match attempt(&abandoned) {
                Err(err) if err.is_retryable() && tries < policy.max_retries => {
                    log::debug!(
                        "{} failed (attempt {}), retrying in {:?}: {}",
                        operation,
                        tries + 1,
                        delay,
                        err
                    );
                    tries += 1;
                    std::thread::sleep(delay);
                    delay *= 2;
                }
                result => return result,
            }
        }
    })
    .await
    .map_err(|e| {
        RepositoryError::internal_with_context(
            format!("Task join error: {}", e),
            ErrorContext::new(operation).with_details("spawn_blocking"),
        )
    })?
}
