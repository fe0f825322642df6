//! In-memory directory provider.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::{DirectoryError, DirectoryProvider};

/// Channel to member map held in memory.
///
/// Cloning shares the underlying state, so a test can keep a handle and change membership or
/// inject failures while the engine holds another.
#[derive(Clone, Default)]
pub struct StaticDirectory {
    inner: Arc<RwLock<StaticState>>,
    fetches: Arc<AtomicUsize>,
}

#[derive(Default)]
struct StaticState {
    channels: HashMap<String, HashSet<String>>,
    failure: Option<DirectoryError>,
    latency: Option<Duration>,
}

impl StaticDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style helper to seed a channel.
    pub fn with_channel<I, S>(self, channel: impl Into<String>, members: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.set_members(channel, members);
        self
    }

    /// Replace the membership of `channel`.
    pub fn set_members<I, S>(&self, channel: impl Into<String>, members: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let members = members.into_iter().map(Into::into).collect();
        self.inner.write().channels.insert(channel.into(), members);
    }

    /// Make every fetch fail with `error` until [`clear_failure`](Self::clear_failure).
    pub fn fail_with(&self, error: DirectoryError) {
        self.inner.write().failure = Some(error);
    }

    pub fn clear_failure(&self) {
        self.inner.write().failure = None;
    }

    /// Delay every fetch by `latency`.
    pub fn set_latency(&self, latency: Option<Duration>) {
        self.inner.write().latency = latency;
    }

    /// Number of fetches started, including failed ones.
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl DirectoryProvider for StaticDirectory {
    async fn fetch_members(&self, channel: &str) -> Result<HashSet<String>, DirectoryError> {
        self.fetches.fetch_add(1, Ordering::Relaxed);

        let latency = self.inner.read().latency;
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        let state = self.inner.read();
        if let Some(err) = &state.failure {
            return Err(err.clone());
        }
        state
            .channels
            .get(channel)
            .cloned()
            .ok_or_else(|| DirectoryError::ChannelNotFound(channel.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fetch_returns_seeded_members() {
        let dir = StaticDirectory::new().with_channel("C1", ["a@x.io", "b@x.io"]);
        let members = dir.fetch_members("C1").await.unwrap();
        assert_eq!(members.len(), 2);
        assert!(members.contains("a@x.io"));
        assert_eq!(dir.fetch_count(), 1);
    }

    #[tokio::test]
    async fn test_unknown_channel() {
        let dir = StaticDirectory::new();
        assert_eq!(
            dir.fetch_members("nope").await.unwrap_err(),
            DirectoryError::ChannelNotFound("nope".into())
        );
    }

    #[tokio::test]
    async fn test_injected_failure_is_shared_between_clones() {
        let dir = StaticDirectory::new().with_channel("C1", ["a@x.io"]);
        let handle = dir.clone();
        handle.fail_with(DirectoryError::Unavailable("down".into()));

        let err = dir.fetch_members("C1").await.unwrap_err();
        assert!(err.is_transient());

        handle.clear_failure();
        assert!(dir.fetch_members("C1").await.is_ok());
    }
}
