//! External directory providers.
//!
//! A directory answers one question: which identities are members of a channel right now.
//! The roster reconciler treats the answer as the source of truth for who is active.
//!
//! - [`StaticDirectory`]: in-memory channel map for tests and local development
//! - `SlackDirectory` (feature `slack-directory`): Slack Web API

use async_trait::async_trait;
use std::collections::HashSet;

pub mod static_dir;
#[cfg(feature = "slack-directory")]
pub mod slack;

pub use static_dir::StaticDirectory;
#[cfg(feature = "slack-directory")]
pub use slack::SlackDirectory;

/// Failure talking to an external directory.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DirectoryError {
    /// Network failure, rate limiting or a 5xx from the provider.
    #[error("directory unavailable: {0}")]
    Unavailable(String),

    /// The provider rejected our credentials.
    #[error("directory rejected credentials: {0}")]
    Unauthorized(String),

    #[error("directory channel not found: {0}")]
    ChannelNotFound(String),

    /// The provider answered with something we could not interpret.
    #[error("unexpected directory response: {0}")]
    InvalidResponse(String),
}

impl DirectoryError {
    /// Whether retrying later could succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

/// Source of external membership for roster reconciliation.
///
/// Members are returned as raw strings (usually emails); normalization and validation happen
/// in the reconciler so that malformed entries are reported per identity.
#[async_trait]
pub trait DirectoryProvider: Send + Sync {
    async fn fetch_members(&self, channel: &str) -> Result<HashSet<String>, DirectoryError>;
}
