//! Timeout and cancellation wrappers for collaborator calls.

use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::error::{EngineError, EngineResult};
use crate::db::repository::{ErrorContext, RepositoryError, RepositoryResult};

fn timed_out(limit: Duration, operation: &str) -> RepositoryError {
    RepositoryError::TimeoutError {
        message: format!("{} did not answer within {:?}", operation, limit),
        context: ErrorContext::new(operation).retryable(),
    }
}

/// Run a store call with an upper bound; expiry becomes a `TimeoutError`.
pub(crate) async fn bounded<T, F>(limit: Duration, operation: &str, fut: F) -> RepositoryResult<T>
where
    F: Future<Output = RepositoryResult<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(timed_out(limit, operation)),
    }
}

/// Like [`bounded`], but also returns [`EngineError::Cancelled`] as soon as `cancel` fires.
pub(crate) async fn guarded<T, F>(
    cancel: &CancellationToken,
    limit: Duration,
    operation: &str,
    fut: F,
) -> EngineResult<T>
where
    F: Future<Output = RepositoryResult<T>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(EngineError::Cancelled),
        result = bounded(limit, operation, fut) => result.map_err(EngineError::from),
    }
}

/// How a store write run under a deadline and a cancellation token ended.
pub(crate) enum Write<T> {
    Done(T),
    /// The store answered with an error.
    Failed(EngineError),
    /// The deadline passed or cancellation fired while the write was in flight, so it may or
    /// may not have been applied.
    Interrupted { reason: EngineError, cancelled: bool },
    /// Cancellation was observed before the write started.
    NotStarted,
}

/// Issue a write unless `cancel` already fired, bounded by `limit`.
pub(crate) async fn guarded_write<T, F>(
    cancel: &CancellationToken,
    limit: Duration,
    operation: &str,
    fut: F,
) -> Write<T>
where
    F: Future<Output = RepositoryResult<T>>,
{
    if cancel.is_cancelled() {
        return Write::NotStarted;
    }
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Write::Interrupted {
            reason: EngineError::Cancelled,
            cancelled: true,
        },
        result = tokio::time::timeout(limit, fut) => match result {
            Ok(Ok(value)) => Write::Done(value),
            Ok(Err(err)) => Write::Failed(err.into()),
            Err(_) => Write::Interrupted {
                reason: timed_out(limit, operation).into(),
                cancelled: false,
            },
        },
    }
}
